//! Binary entry point for the srcfacts CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Parse srcML documents into a model
//! srcfacts build out/srcml --out model.json
//!
//! # Drop one source file's contribution
//! srcfacts remove --model model.json --file src/a.cpp
//!
//! # Ask what a name use refers to
//! srcfacts resolve --model model.json --at src/a.cpp:12:9
//! ```
//!
//! All responses are JSON on stdout; logs go to stderr.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use srcfacts::cli;
use srcfacts::config::{parse_language, CliOverrides, ResolvedConfig};
use srcfacts::error::{OutputErrorCode, SrcFactsError, SrcFactsResult};
use srcfacts::model::Language;
use srcfacts::output::{emit_response, ErrorResponse};

// ============================================================================
// CLI Structure
// ============================================================================

/// Incremental cross-reference model of srcML-annotated code.
#[derive(Parser, Debug)]
#[command(name = "srcfacts", version, about = "Incremental symbolic code model built from srcML")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Project root holding `srcfacts.json` (default: current directory).
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Seconds to wait for the model lock.
    #[arg(long, global = true)]
    lock_timeout: Option<u64>,

    /// Parser worker threads (0 = all cores).
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Language for units without a `language` attribute.
    #[arg(long, global = true, value_parser = parse_language_flag)]
    language: Option<Language>,

    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

fn parse_language_flag(raw: &str) -> Result<Language, String> {
    parse_language("--language", raw).map_err(|e| e.to_string())
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse srcML documents (files or directories of *.xml) into a model.
    Build {
        /// Documents or directories to read.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Where to write the model.
        #[arg(long)]
        out: PathBuf,
        /// Update an existing model, skipping unchanged documents.
        #[arg(long)]
        incremental: bool,
    },
    /// Remove one source file's contribution from a model.
    Remove {
        #[arg(long)]
        model: PathBuf,
        /// Source file name as recorded in the markup.
        #[arg(long)]
        file: String,
    },
    /// List scopes at a qualified name (`A.B.Foo` or `A::B::Foo`).
    Find {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        name: String,
    },
    /// Resolve the name use at a position.
    Resolve {
        #[arg(long)]
        model: PathBuf,
        /// Position as `file:line:col`.
        #[arg(long)]
        at: String,
    },
    /// List every resolved call edge.
    Calls {
        #[arg(long)]
        model: PathBuf,
    },
    /// Summarize a model.
    Stats {
        #[arg(long)]
        model: PathBuf,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON, like every other response.
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn resolve_config(global: &GlobalArgs) -> SrcFactsResult<ResolvedConfig> {
    let root = match &global.project {
        Some(root) => root.clone(),
        None => std::env::current_dir().map_err(|e| SrcFactsError::io(".", e))?,
    };
    let overrides = CliOverrides {
        lock_timeout_secs: global.lock_timeout,
        workers: global.workers,
        language: global.language,
    };
    ResolvedConfig::resolve(&root, &overrides).map_err(SrcFactsError::from)
}

/// Execute the CLI command.
fn execute(cli: Cli) -> SrcFactsResult<()> {
    let config = resolve_config(&cli.global)?;
    let mut stdout = io::stdout();
    let written = match cli.command {
        Command::Build {
            paths,
            out,
            incremental,
        } => emit_response(&cli::build(&paths, &out, incremental, &config)?, &mut stdout),
        Command::Remove { model, file } => emit_response(&cli::remove(&model, &file, &config)?, &mut stdout),
        Command::Find { model, name } => emit_response(&cli::find(&model, &name, &config)?, &mut stdout),
        Command::Resolve { model, at } => emit_response(&cli::resolve(&model, &at, &config)?, &mut stdout),
        Command::Calls { model } => emit_response(&cli::calls(&model, &config)?, &mut stdout),
        Command::Stats { model } => emit_response(&cli::stats(&model)?, &mut stdout),
    };
    written.map_err(|e| SrcFactsError::io("<stdout>", e))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod cli_parsing {
        use super::*;

        #[test]
        fn build_takes_paths_and_out() {
            let cli = Cli::try_parse_from(["srcfacts", "build", "a.xml", "dir", "--out", "m.json"]).unwrap();
            match cli.command {
                Command::Build {
                    paths,
                    out,
                    incremental,
                } => {
                    assert_eq!(paths, vec![PathBuf::from("a.xml"), PathBuf::from("dir")]);
                    assert_eq!(out, PathBuf::from("m.json"));
                    assert!(!incremental);
                }
                _ => panic!("expected Build"),
            }
        }

        #[test]
        fn build_requires_a_path() {
            assert!(Cli::try_parse_from(["srcfacts", "build", "--out", "m.json"]).is_err());
        }

        #[test]
        fn resolve_takes_a_position() {
            let cli = Cli::try_parse_from(["srcfacts", "resolve", "--model", "m.json", "--at", "a.cpp:3:4"]).unwrap();
            match cli.command {
                Command::Resolve { model, at } => {
                    assert_eq!(model, PathBuf::from("m.json"));
                    assert_eq!(at, "a.cpp:3:4");
                }
                _ => panic!("expected Resolve"),
            }
        }

        #[test]
        fn global_flags_follow_the_subcommand() {
            let cli = Cli::try_parse_from([
                "srcfacts",
                "stats",
                "--model",
                "m.json",
                "--workers",
                "2",
                "--language",
                "cpp",
                "--lock-timeout",
                "5",
            ])
            .unwrap();
            assert_eq!(cli.global.workers, Some(2));
            assert_eq!(cli.global.language, Some(Language::CPlusPlus));
            assert_eq!(cli.global.lock_timeout, Some(5));
        }

        #[test]
        fn unknown_language_is_rejected() {
            assert!(Cli::try_parse_from(["srcfacts", "stats", "--model", "m", "--language", "cobol"]).is_err());
        }
    }
}
