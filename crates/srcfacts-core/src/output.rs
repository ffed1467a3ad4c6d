//! JSON output types for CLI responses.
//!
//! Every response starts with `status` and `schema_version`. Lists are
//! sorted so the same model and query always print the same bytes.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{OutputErrorCode, SrcFactsError};
use crate::lock::UpdateOutcome;
use crate::model::{Declaration, Location, ScopeTree, StatementId};
use crate::resolve::CallEdge;
use crate::unmerge::RemovalStats;

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Shared Types
// ============================================================================

/// Position in a source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationInfo {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl LocationInfo {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        LocationInfo {
            file: file.into(),
            line,
            col,
        }
    }
}

impl From<&Location> for LocationInfo {
    fn from(location: &Location) -> Self {
        LocationInfo::new(location.file.clone(), location.line, location.column)
    }
}

/// A declaration as printed by queries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclarationInfo {
    /// namespace, type, method, property or variable.
    pub kind: String,
    pub name: String,
    /// Dot-joined enclosing scopes plus the name.
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInfo>,
}

impl DeclarationInfo {
    pub fn from_declaration(tree: &ScopeTree, declaration: Declaration) -> Self {
        match declaration {
            Declaration::Scope(id) => Self::from_scope(tree, id),
            Declaration::Variable(id) => {
                let name = tree.declared_name(id).unwrap_or_default().to_string();
                let owner = tree
                    .expression_statement(id)
                    .map(|s| tree.full_name(s))
                    .unwrap_or_default();
                let full_name = if owner.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", owner, name)
                };
                DeclarationInfo {
                    kind: "variable".to_string(),
                    name,
                    full_name,
                    location: tree
                        .expression(id)
                        .and_then(|e| e.location.as_ref())
                        .map(LocationInfo::from),
                }
            }
        }
    }

    pub fn from_scope(tree: &ScopeTree, id: StatementId) -> Self {
        let stmt = tree.statement(id);
        DeclarationInfo {
            kind: stmt.map(|s| s.kind_name()).unwrap_or("unknown").to_string(),
            name: stmt.and_then(|s| s.name()).unwrap_or_default().to_string(),
            full_name: tree.full_name(id),
            location: tree.primary_location(id).map(LocationInfo::from),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error information for error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInfo>,
}

impl ErrorInfo {
    pub fn from_error(err: &SrcFactsError) -> Self {
        let code = OutputErrorCode::from(err).code();
        let (details, location) = match err {
            SrcFactsError::NothingAt { file, line, col } => (None, Some(LocationInfo::new(file.clone(), *line, *col))),
            SrcFactsError::ScopeNotFound { name } => (Some(serde_json::json!({ "name": name })), None),
            SrcFactsError::Io { path, .. } => (Some(serde_json::json!({ "path": path.display().to_string() })), None),
            _ => (None, None),
        };
        ErrorInfo {
            code,
            message: err.to_string(),
            details,
            location,
        }
    }
}

/// Response for any failed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Status: "error".
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    pub fn from_error(err: &SrcFactsError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Response Structs
// ============================================================================

/// A unit that could not be turned into a tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailedUnit {
    pub source: String,
    pub message: String,
}

/// How many units each update outcome covered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCounts {
    pub added: usize,
    pub replaced: usize,
    pub unchanged: usize,
}

impl UpdateCounts {
    pub fn record(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::Added => self.added += 1,
            UpdateOutcome::Replaced => self.replaced += 1,
            UpdateOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Response for `build`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResponse {
    pub status: String,
    pub schema_version: String,
    pub model: String,
    pub files: Vec<String>,
    pub statements: usize,
    pub expressions: usize,
    pub units: UpdateCounts,
    pub failed: Vec<FailedUnit>,
}

impl BuildResponse {
    pub fn new(model: impl Into<String>, tree: &ScopeTree, units: UpdateCounts, mut failed: Vec<FailedUnit>) -> Self {
        failed.sort();
        BuildResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            model: model.into(),
            files: tree.files().into_iter().collect(),
            statements: tree.statement_count(),
            expressions: tree.expression_count(),
            units,
            failed,
        }
    }
}

/// Response for `remove`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub status: String,
    pub schema_version: String,
    pub file: String,
    pub pruned: usize,
    pub reattached: usize,
    pub remaining_files: Vec<String>,
}

impl RemoveResponse {
    pub fn new(file: impl Into<String>, stats: RemovalStats, tree: &ScopeTree) -> Self {
        RemoveResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            file: file.into(),
            pruned: stats.pruned,
            reattached: stats.reattached,
            remaining_files: tree.files().into_iter().collect(),
        }
    }
}

/// Response for `find`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindResponse {
    pub status: String,
    pub schema_version: String,
    pub name: String,
    pub scopes: Vec<DeclarationInfo>,
}

impl FindResponse {
    pub fn new(name: impl Into<String>, tree: &ScopeTree, scopes: &[StatementId]) -> Self {
        let mut infos: Vec<DeclarationInfo> = scopes.iter().map(|s| DeclarationInfo::from_scope(tree, *s)).collect();
        infos.sort();
        FindResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            name: name.into(),
            scopes: infos,
        }
    }
}

/// Response for `resolve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub status: String,
    pub schema_version: String,
    pub at: LocationInfo,
    /// Rendered text of the resolved use.
    pub expression: String,
    /// Matches in resolution order.
    pub matches: Vec<DeclarationInfo>,
}

impl ResolveResponse {
    pub fn new(at: LocationInfo, expression: impl Into<String>, tree: &ScopeTree, matches: &[Declaration]) -> Self {
        ResolveResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            at,
            expression: expression.into(),
            matches: matches.iter().map(|d| DeclarationInfo::from_declaration(tree, *d)).collect(),
        }
    }
}

/// One call graph edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallEdgeInfo {
    pub caller: String,
    pub callee: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<LocationInfo>,
}

/// Response for `calls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallsResponse {
    pub status: String,
    pub schema_version: String,
    pub edges: Vec<CallEdgeInfo>,
}

impl CallsResponse {
    pub fn new(tree: &ScopeTree, edges: &[CallEdge]) -> Self {
        let mut infos: Vec<CallEdgeInfo> = edges
            .iter()
            .map(|e| CallEdgeInfo {
                caller: tree.full_name(e.caller),
                callee: tree.full_name(e.callee),
                at: tree
                    .expression(e.call)
                    .and_then(|x| x.location.as_ref())
                    .map(LocationInfo::from),
            })
            .collect();
        infos.sort();
        CallsResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            edges: infos,
        }
    }
}

/// Response for `stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub status: String,
    pub schema_version: String,
    pub saved_at: String,
    pub files: Vec<String>,
    pub statements: usize,
    pub expressions: usize,
    /// Statement count per kind.
    pub kinds: BTreeMap<String, usize>,
}

impl StatsResponse {
    pub fn new(saved_at: impl Into<String>, tree: &ScopeTree) -> Self {
        let mut kinds = BTreeMap::new();
        for id in tree.descendants_and_self(tree.root()) {
            if let Some(stmt) = tree.statement(id) {
                *kinds.entry(stmt.kind_name().to_string()).or_insert(0) += 1;
            }
        }
        StatsResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            saved_at: saved_at.into(),
            files: tree.files().into_iter().collect(),
            statements: tree.statement_count(),
            expressions: tree.expression_count(),
            kinds,
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Emit a response as pretty-printed JSON.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================
