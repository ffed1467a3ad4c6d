//! Layered configuration.
//!
//! Precedence, lowest to highest:
//!
//! 1. built-in defaults (lock timeout 30 s, all cores, no forced language)
//! 2. project config: `srcfacts.json` in the project root
//! 3. environment: `SRCFACTS_LOCK_TIMEOUT_SECS`, `SRCFACTS_WORKERS`, `SRCFACTS_LANGUAGE`
//! 4. CLI flags
//!
//! Each resolved value remembers where it came from.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::concurrency::{AvailableCores, ConcurrencyPolicy, FixedWorkers};
use crate::model::Language;

/// Name of the project configuration file.
pub const PROJECT_CONFIG_FILE: &str = "srcfacts.json";

/// Default advisory lock timeout.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

pub const ENV_LOCK_TIMEOUT: &str = "SRCFACTS_LOCK_TIMEOUT_SECS";
pub const ENV_WORKERS: &str = "SRCFACTS_WORKERS";
pub const ENV_LANGUAGE: &str = "SRCFACTS_LANGUAGE";

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid project config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value from the environment or a flag could not be interpreted.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

// ============================================================================
// Configuration Sources
// ============================================================================

/// Configuration value source (for precedence tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    /// Built-in default value.
    Default = 0,
    /// From `srcfacts.json`.
    ProjectConfig = 1,
    /// From environment variable.
    EnvVar = 2,
    /// From CLI flag (highest precedence).
    CliFlag = 3,
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Keep whichever value has the higher precedence; ties go to `other`.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source {
            other
        } else {
            self
        }
    }
}

/// Contents of `srcfacts.json`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub lock_timeout_secs: Option<u64>,
    /// Worker count; 0 means all cores.
    pub workers: Option<usize>,
    pub language: Option<String>,
}

impl ProjectConfig {
    /// Read the project config under `root`, if there is one.
    pub fn load(root: &Path) -> ConfigResult<Option<Self>> {
        let path = root.join(PROJECT_CONFIG_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| ConfigError::Parse { path, source })
    }
}

/// CLI configuration overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// --lock-timeout flag (seconds).
    pub lock_timeout_secs: Option<u64>,
    /// --workers flag.
    pub workers: Option<usize>,
    /// --language flag.
    pub language: Option<Language>,
}

// ============================================================================
// Resolved Configuration
// ============================================================================

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub lock_timeout_secs: ConfigValue<u64>,
    /// Worker count; 0 means all cores.
    pub workers: ConfigValue<usize>,
    /// Forced language for units without a `language` attribute.
    pub language: Option<ConfigValue<Language>>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ResolvedConfig {
            lock_timeout_secs: ConfigValue::new(DEFAULT_LOCK_TIMEOUT_SECS, ConfigSource::Default),
            workers: ConfigValue::new(0, ConfigSource::Default),
            language: None,
        }
    }
}

impl ResolvedConfig {
    /// Resolve configuration from all sources using the process environment.
    pub fn resolve(project_root: &Path, cli_overrides: &CliOverrides) -> ConfigResult<Self> {
        Self::resolve_with_env(project_root, cli_overrides, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with_env(
        project_root: &Path,
        cli_overrides: &CliOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<Self> {
        let mut config = ResolvedConfig::default();
        if let Some(project) = ProjectConfig::load(project_root)? {
            config.apply_project_config(&project)?;
        }
        config.apply_env_vars(env)?;
        config.apply_cli_overrides(cli_overrides);
        tracing::debug!(
            lock_timeout_secs = config.lock_timeout_secs.value,
            workers = config.workers.value,
            language = ?config.language.as_ref().map(|l| l.value),
            "resolved configuration"
        );
        Ok(config)
    }

    fn apply_project_config(&mut self, project: &ProjectConfig) -> ConfigResult<()> {
        let source = ConfigSource::ProjectConfig;
        if let Some(secs) = project.lock_timeout_secs {
            self.set_lock_timeout(secs, source);
        }
        if let Some(workers) = project.workers {
            self.set_workers(workers, source);
        }
        if let Some(language) = &project.language {
            self.set_language(parse_language("language", language)?, source);
        }
        Ok(())
    }

    fn apply_env_vars(&mut self, env: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        let source = ConfigSource::EnvVar;
        if let Some(raw) = env(ENV_LOCK_TIMEOUT) {
            self.set_lock_timeout(parse_number(ENV_LOCK_TIMEOUT, &raw)?, source);
        }
        if let Some(raw) = env(ENV_WORKERS) {
            self.set_workers(parse_number(ENV_WORKERS, &raw)?, source);
        }
        if let Some(raw) = env(ENV_LANGUAGE) {
            self.set_language(parse_language(ENV_LANGUAGE, &raw)?, source);
        }
        Ok(())
    }

    fn apply_cli_overrides(&mut self, overrides: &CliOverrides) {
        let source = ConfigSource::CliFlag;
        if let Some(secs) = overrides.lock_timeout_secs {
            self.set_lock_timeout(secs, source);
        }
        if let Some(workers) = overrides.workers {
            self.set_workers(workers, source);
        }
        if let Some(language) = overrides.language {
            self.set_language(language, source);
        }
    }

    fn set_lock_timeout(&mut self, secs: u64, source: ConfigSource) {
        let current = self.lock_timeout_secs.clone();
        self.lock_timeout_secs = current.merge(ConfigValue::new(secs, source));
    }

    fn set_workers(&mut self, workers: usize, source: ConfigSource) {
        let current = self.workers.clone();
        self.workers = current.merge(ConfigValue::new(workers, source));
    }

    fn set_language(&mut self, language: Language, source: ConfigSource) {
        let incoming = ConfigValue::new(language, source);
        self.language = Some(match self.language.take() {
            Some(current) => current.merge(incoming),
            None => incoming,
        });
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs.value)
    }

    /// Concurrency policy for batch parsing.
    pub fn policy(&self) -> Box<dyn ConcurrencyPolicy> {
        match self.workers.value {
            0 => Box::new(AvailableCores::all()),
            n => Box::new(FixedWorkers(n)),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> ConfigResult<T> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// Accept srcML names (`C++`, `C#`) and common spellings (`cpp`, `csharp`).
pub fn parse_language(key: &str, raw: &str) -> ConfigResult<Language> {
    let trimmed = raw.trim();
    Language::from_srcml(trimmed)
        .or(match trimmed.to_ascii_lowercase().as_str() {
            "c" => Some(Language::C),
            "cpp" | "cxx" | "c++" => Some(Language::CPlusPlus),
            "java" => Some(Language::Java),
            "cs" | "csharp" | "c#" => Some(Language::CSharp),
            _ => None,
        })
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

// ============================================================================
// Tests
// ============================================================================
