//! Persistence of scope trees.
//!
//! A stored model is a JSON document:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "saved_at": "2026-01-01T00:00:00Z",
//!   "files": { "a.cpp": "9f86d0..." },
//!   "tree": { ... }
//! }
//! ```
//!
//! Writes go to a temporary file in the target directory that is then
//! renamed over the destination, so readers see the old or the new model
//! and never a partial one.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ScopeTree;

/// Version written by [`save`] and accepted by [`load`].
pub const FORMAT_VERSION: u32 = 1;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while saving or loading a model.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document was written by an incompatible version.
    #[error("unsupported model format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Stored Model
// ============================================================================

/// On-disk form of an aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredModel {
    pub format_version: u32,
    pub saved_at: String,
    /// Content digest per merged file.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    pub tree: ScopeTree,
}

impl StoredModel {
    /// Wrap a tree for saving, stamped with the current time.
    pub fn new(tree: ScopeTree, files: BTreeMap<String, String>) -> Self {
        StoredModel {
            format_version: FORMAT_VERSION,
            saved_at: format_timestamp(SystemTime::now()),
            files,
            tree,
        }
    }
}

/// Save a tree without a digest registry.
pub fn save(tree: &ScopeTree, path: &Path) -> StoreResult<()> {
    save_model(&StoredModel::new(tree.clone(), BTreeMap::new()), path)
}

/// Atomically write a stored model.
pub fn save_model(model: &StoredModel, path: &Path) -> StoreResult<()> {
    let content = serde_json::to_vec(model)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    temp.write_all(&content).map_err(|e| StoreError::io(temp.path(), e))?;
    temp.persist(path).map_err(|e| StoreError::io(path, e.error))?;
    tracing::debug!(
        path = %path.display(),
        bytes = content.len(),
        statements = model.tree.statement_count(),
        "saved model"
    );
    Ok(())
}

/// Load the tree of a stored model.
pub fn load(path: &Path) -> StoreResult<ScopeTree> {
    load_model(path).map(|m| m.tree)
}

/// Load and validate a stored model.
pub fn load_model(path: &Path) -> StoreResult<StoredModel> {
    let content = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    let model: StoredModel = serde_json::from_slice(&content)?;
    if model.format_version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: model.format_version,
            expected: FORMAT_VERSION,
        });
    }
    tracing::debug!(
        path = %path.display(),
        saved_at = %model.saved_at,
        statements = model.tree.statement_count(),
        "loaded model"
    );
    Ok(model)
}

/// Format a timestamp for JSON output (ISO 8601).
pub(crate) fn format_timestamp(time: SystemTime) -> String {
    use chrono::{DateTime, Utc};

    let datetime: DateTime<Utc> = time.into();
    datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equality::assert_structurally_equal;
    use crate::test_support::{aggregate, parse_snippet};
    use crate::unmerge::remove_file;
    use tempfile::TempDir;

    const HEADER: &str = "<namespace>namespace <name>N</name> <block>{<class>class <name>A</name> <block>{<private>private: <function_decl><type><name>int</name></type> <name>Foo</name><parameter_list>(<parameter><decl><type><name>int</name></type> <name>x</name><init>= <expr><literal type=\"number\">1</literal></expr></init></decl></parameter>)</parameter_list>;</function_decl></private>}</block>;</class>}</block></namespace>";
    const SOURCE: &str = "<function><type><name>int</name></type> <name><name>N</name><operator>::</operator><name>A</name><operator>::</operator><name>Foo</name></name><parameter_list>(<parameter><decl><type><name>int</name></type> <name>x</name></decl></parameter>)</parameter_list> <block>{<return>return <expr><name>x</name></expr>;</return>}</block></function>";

    mod round_trip {
        use super::*;

        #[test]
        fn parsed_tree_survives_save_and_load() {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("model.json");
            let tree = parse_snippet(HEADER, "a.h");
            save(&tree, &path).unwrap();
            let loaded = load(&path).unwrap();
            assert_structurally_equal(&tree, &loaded);
        }

        #[test]
        fn reloaded_aggregate_still_unmerges_exactly() {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("model.json");
            let tree = aggregate(&[("a.h", HEADER), ("a.cpp", SOURCE)]);
            save(&tree, &path).unwrap();

            let mut loaded = load(&path).unwrap();
            remove_file(&mut loaded, "a.h");
            assert_structurally_equal(&loaded, &aggregate(&[("a.cpp", SOURCE)]));
        }

        #[test]
        fn digests_are_kept() {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("model.json");
            let files = BTreeMap::from([("a.h".to_string(), "abc".to_string())]);
            save_model(&StoredModel::new(parse_snippet(HEADER, "a.h"), files.clone()), &path).unwrap();
            assert_eq!(load_model(&path).unwrap().files, files);
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn wrong_version_is_rejected() {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("model.json");
            let mut model = StoredModel::new(parse_snippet(HEADER, "a.h"), BTreeMap::new());
            model.format_version = 99;
            fs::write(&path, serde_json::to_vec(&model).unwrap()).unwrap();
            let err = load(&path).unwrap_err();
            assert!(matches!(err, StoreError::UnsupportedVersion { found: 99, .. }));
        }

        #[test]
        fn missing_file_is_an_io_error() {
            let temp = TempDir::new().unwrap();
            let err = load(&temp.path().join("missing.json")).unwrap_err();
            assert!(matches!(err, StoreError::Io { .. }));
        }

        #[test]
        fn garbage_is_a_json_error() {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("model.json");
            fs::write(&path, "not json").unwrap();
            assert!(matches!(load(&path).unwrap_err(), StoreError::Json(_)));
        }
    }

    #[test]
    fn timestamp_is_iso8601() {
        let ts = format_timestamp(SystemTime::UNIX_EPOCH);
        assert_eq!(ts, "1970-01-01T00:00:00Z");
    }
}
