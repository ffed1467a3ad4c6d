//! Command implementations for the srcfacts CLI.
//!
//! Each command takes its parsed arguments plus a [`ResolvedConfig`] and
//! returns a response struct; `main.rs` owns printing and exit codes. The
//! model file is always accessed through a [`WorkingSet`], so every command
//! honors the configured lock timeout.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use srcfacts_core::concurrency::{parse_all, CancellationToken, UnitOutcome};
use srcfacts_core::config::ResolvedConfig;
use srcfacts_core::error::{SrcFactsError, SrcFactsResult};
use srcfacts_core::lock::{digest, WorkingSet};
use srcfacts_core::markup::{load_units, Element};
use srcfacts_core::model::Language;
use srcfacts_core::output::{
    BuildResponse, CallsResponse, FailedUnit, FindResponse, LocationInfo, RemoveResponse, ResolveResponse,
    StatsResponse, UpdateCounts,
};
use srcfacts_core::parse::{CodeParser, LanguageRules};
use srcfacts_core::resolve::{call_edges, expression_at, find_matches, find_scopes};
use srcfacts_core::store::{load_model, save_model};
use srcfacts_cpp::CppRules;
use srcfacts_csharp::CSharpRules;
use srcfacts_java::JavaRules;

/// File extension of srcML documents picked up from directories.
const MARKUP_EXTENSION: &str = "xml";

// ============================================================================
// Helpers
// ============================================================================

/// Language rules for a language, boxed for runtime dispatch.
pub fn rules_for(language: Language) -> Box<dyn LanguageRules> {
    match language {
        Language::C => Box::new(CppRules::c()),
        Language::CPlusPlus => Box::new(CppRules::new()),
        Language::Java => Box::new(JavaRules),
        Language::CSharp => Box::new(CSharpRules),
    }
}

/// Expand paths into srcML documents: files as given, directories walked for `*.xml`.
pub fn collect_markup_files(paths: &[PathBuf]) -> SrcFactsResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_file() {
            out.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            return Err(SrcFactsError::io(
                path,
                io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
            ));
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop"));
                SrcFactsError::io(path, source)
            })?;
            let is_markup = entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == MARKUP_EXTENSION);
            if is_markup {
                out.push(entry.into_path());
            }
        }
    }
    Ok(out)
}

/// Parse a `file:line:col` position.
pub fn parse_position(at: &str) -> SrcFactsResult<(String, u32, u32)> {
    let mut parts = at.rsplitn(3, ':');
    let (Some(col), Some(line), Some(file)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(SrcFactsError::invalid_args(format!(
            "invalid position '{}', expected file:line:col",
            at
        )));
    };
    let number = |raw: &str, what: &str| {
        raw.parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| SrcFactsError::invalid_args(format!("invalid {} '{}' in '{}'", what, raw, at)))
    };
    if file.is_empty() {
        return Err(SrcFactsError::invalid_args(format!("missing file name in '{}'", at)));
    }
    Ok((file.to_string(), number(line, "line")?, number(col, "column")?))
}

fn open_model(path: &Path) -> SrcFactsResult<WorkingSet> {
    Ok(WorkingSet::from_stored(load_model(path)?))
}

struct PendingUnit {
    unit: Element,
    digest: String,
}

// ============================================================================
// Commands
// ============================================================================

/// Parse every unit under `paths` and save the aggregate to `out`.
///
/// With `incremental`, an existing model at `out` is updated in place and
/// units whose document digest is unchanged are skipped.
pub fn build(paths: &[PathBuf], out: &Path, incremental: bool, config: &ResolvedConfig) -> SrcFactsResult<BuildResponse> {
    let documents = collect_markup_files(paths)?;
    if documents.is_empty() {
        return Err(SrcFactsError::invalid_args("no srcML documents found"));
    }

    let forced = config.language.as_ref().map(|l| l.value);
    let mut failed = Vec::new();
    let mut by_language: BTreeMap<Language, Vec<PendingUnit>> = BTreeMap::new();
    for document in &documents {
        let text = fs::read_to_string(document).map_err(|e| SrcFactsError::io(document, e))?;
        let units = match load_units(&text) {
            Ok(units) => units,
            Err(err) => {
                tracing::warn!(path = %document.display(), error = %err, "skipping unreadable document");
                failed.push(FailedUnit {
                    source: document.display().to_string(),
                    message: err.to_string(),
                });
                continue;
            }
        };
        let document_digest = digest(text.as_bytes());
        for unit in units {
            let language = unit.attr("language").and_then(Language::from_srcml).or(forced);
            match language {
                Some(language) => by_language.entry(language).or_default().push(PendingUnit {
                    unit,
                    digest: document_digest.clone(),
                }),
                None => failed.push(FailedUnit {
                    source: unit.file_name().unwrap_or(unit.xpath()).to_string(),
                    message: format!("unsupported language {:?}", unit.attr("language").unwrap_or("")),
                }),
            }
        }
    }

    let timeout = config.lock_timeout();
    let working_set = if incremental && out.exists() {
        open_model(out)?
    } else {
        let root_language = forced
            .or_else(|| by_language.keys().next().copied())
            .unwrap_or(Language::CPlusPlus);
        WorkingSet::new(root_language)
    };

    let policy = config.policy();
    let cancel = CancellationToken::new();
    let mut counts = UpdateCounts::default();
    for (language, pending) in by_language {
        let parser = CodeParser::new(rules_for(language));
        let (units, digests): (Vec<Element>, Vec<String>) = pending.into_iter().map(|p| (p.unit, p.digest)).unzip();
        let outcomes = parse_all(&parser, &units, policy.as_ref(), &cancel);
        for ((outcome, unit_digest), unit) in outcomes.into_iter().zip(digests).zip(&units) {
            match outcome {
                UnitOutcome::Parsed(tree) => counts.record(working_set.update_file(tree, &unit_digest, timeout)?),
                UnitOutcome::Failed(err) => failed.push(FailedUnit {
                    source: unit.file_name().unwrap_or(unit.xpath()).to_string(),
                    message: err.to_string(),
                }),
                UnitOutcome::Cancelled => {}
            }
        }
    }

    let model = working_set.snapshot(timeout)?;
    save_model(&model, out)?;
    tracing::info!(
        documents = documents.len(),
        added = counts.added,
        replaced = counts.replaced,
        unchanged = counts.unchanged,
        failed = failed.len(),
        "built model"
    );
    Ok(BuildResponse::new(out.display().to_string(), &model.tree, counts, failed))
}

/// Remove one file's contribution from a saved model.
pub fn remove(model_path: &Path, file: &str, config: &ResolvedConfig) -> SrcFactsResult<RemoveResponse> {
    let timeout = config.lock_timeout();
    let working_set = open_model(model_path)?;
    let stats = working_set.remove_file(file, timeout)?;
    let model = working_set.snapshot(timeout)?;
    save_model(&model, model_path)?;
    Ok(RemoveResponse::new(file, stats, &model.tree))
}

/// Named scopes at a qualified path.
pub fn find(model_path: &Path, name: &str, config: &ResolvedConfig) -> SrcFactsResult<FindResponse> {
    let working_set = open_model(model_path)?;
    let view = working_set.read(config.lock_timeout())?;
    let scopes = find_scopes(view.tree(), name);
    if scopes.is_empty() {
        return Err(SrcFactsError::ScopeNotFound { name: name.to_string() });
    }
    Ok(FindResponse::new(name, view.tree(), &scopes))
}

/// Declarations the name use at `file:line:col` refers to.
pub fn resolve(model_path: &Path, at: &str, config: &ResolvedConfig) -> SrcFactsResult<ResolveResponse> {
    let (file, line, col) = parse_position(at)?;
    let working_set = open_model(model_path)?;
    let view = working_set.read(config.lock_timeout())?;
    let tree = view.tree();
    let expr = expression_at(tree, &file, line, col).ok_or_else(|| SrcFactsError::nothing_at(file.as_str(), line, col))?;
    let matches = find_matches(tree, expr);
    Ok(ResolveResponse::new(
        LocationInfo::new(file, line, col),
        tree.render(expr),
        tree,
        &matches,
    ))
}

/// Every resolved call edge in a saved model.
pub fn calls(model_path: &Path, config: &ResolvedConfig) -> SrcFactsResult<CallsResponse> {
    let working_set = open_model(model_path)?;
    let view = working_set.read(config.lock_timeout())?;
    Ok(CallsResponse::new(view.tree(), &call_edges(view.tree())))
}

/// Size and shape of a saved model.
pub fn stats(model_path: &Path) -> SrcFactsResult<StatsResponse> {
    let model = load_model(model_path)?;
    Ok(StatsResponse::new(model.saved_at.clone(), &model.tree))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use srcfacts_core::error::OutputErrorCode;

    mod positions {
        use super::*;

        #[test]
        fn parses_file_line_col() {
            assert_eq!(parse_position("src/a.cpp:12:4").unwrap(), ("src/a.cpp".to_string(), 12, 4));
        }

        #[test]
        fn file_names_may_contain_colons() {
            assert_eq!(parse_position("C:/x/a.cpp:1:2").unwrap(), ("C:/x/a.cpp".to_string(), 1, 2));
        }

        #[test]
        fn malformed_positions_are_invalid_arguments() {
            for bad in ["a.cpp", "a.cpp:1", "a.cpp:x:1", "a.cpp:1:0", ":1:1"] {
                let err = parse_position(bad).unwrap_err();
                assert_eq!(err.error_code(), OutputErrorCode::InvalidArguments, "{}", bad);
            }
        }
    }

    mod documents {
        use super::*;

        #[test]
        fn directories_are_walked_for_markup() {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir(dir.path().join("nested")).unwrap();
            fs::write(dir.path().join("b.xml"), "<unit/>").unwrap();
            fs::write(dir.path().join("nested").join("a.xml"), "<unit/>").unwrap();
            fs::write(dir.path().join("notes.txt"), "skip").unwrap();

            let found = collect_markup_files(&[dir.path().to_path_buf()]).unwrap();
            let names: Vec<String> = found
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect();
            assert_eq!(names, vec!["b.xml", "a.xml"]);
        }

        #[test]
        fn missing_path_is_an_input_error() {
            let dir = tempfile::tempdir().unwrap();
            let err = collect_markup_files(&[dir.path().join("missing")]).unwrap_err();
            assert_eq!(err.error_code(), OutputErrorCode::InputError);
        }

        #[test]
        fn every_language_has_rules() {
            for language in [Language::C, Language::CPlusPlus, Language::Java, Language::CSharp] {
                assert_eq!(rules_for(language).language(), language);
            }
        }
    }
}
