//! Structural equality of scope trees.
//!
//! Two trees are structurally equal when they describe the same program
//! regardless of arena layout or merge order:
//!
//! - children of named scopes compare as a multiset, other children in order
//! - locations, facets, signatures and parent types compare as multisets
//! - expressions compare by shape and text, never by id
//! - derived values (active accessibility, partial flag, arity) must agree

use std::fmt;

use crate::model::{ExpressionId, ExpressionKind, ScopeTree, Statement, StatementId, StatementKind};

/// First difference found between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    /// Slash-separated path to the differing node.
    pub path: String,
    pub reason: String,
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Compare two trees from their roots.
pub fn structurally_equal(left: &ScopeTree, right: &ScopeTree) -> Result<(), Difference> {
    compare(left, left.root(), right, right.root(), "")
}

/// Panic with the first difference. Intended for tests.
pub fn assert_structurally_equal(left: &ScopeTree, right: &ScopeTree) {
    if let Err(diff) = structurally_equal(left, right) {
        panic!("trees differ at {}", diff);
    }
}

/// Canonical text of a whole subtree; equal subtrees give equal text.
pub fn canonical_form(tree: &ScopeTree, id: StatementId) -> String {
    let mut out = summary(tree, id);
    let Some(stmt) = tree.statement(id) else {
        return out;
    };
    let mut children: Vec<String> = stmt.child_ids().into_iter().map(|c| canonical_form(tree, c)).collect();
    if stmt.is_named_scope() {
        children.sort();
    }
    out.push('{');
    for child in children {
        out.push_str(&child);
        out.push(';');
    }
    out.push('}');
    out
}

fn compare(left: &ScopeTree, l: StatementId, right: &ScopeTree, r: StatementId, parent_path: &str) -> Result<(), Difference> {
    let (Some(ls), Some(rs)) = (left.statement(l), right.statement(r)) else {
        return Err(Difference {
            path: parent_path.to_string(),
            reason: "dangling statement id".into(),
        });
    };
    let path = if l == left.root() {
        String::new()
    } else {
        format!("{}/{}", parent_path, label(ls))
    };
    let (lsum, rsum) = (summary(left, l), summary(right, r));
    if lsum != rsum {
        return Err(Difference {
            path,
            reason: format!("left {} but right {}", lsum, rsum),
        });
    }

    let mut lkids = ls.child_ids();
    let mut rkids = rs.child_ids();
    if lkids.len() != rkids.len() {
        return Err(Difference {
            path,
            reason: format!("{} children on the left, {} on the right", lkids.len(), rkids.len()),
        });
    }
    if ls.is_named_scope() {
        lkids.sort_by_cached_key(|c| canonical_form(left, *c));
        rkids.sort_by_cached_key(|c| canonical_form(right, *c));
    }
    for (lc, rc) in lkids.into_iter().zip(rkids) {
        compare(left, lc, right, rc, &path)?;
    }
    Ok(())
}

fn label(stmt: &Statement) -> String {
    match stmt.name() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => stmt.kind_name().to_string(),
    }
}

/// Node-local description: everything except child statements.
fn summary(tree: &ScopeTree, id: StatementId) -> String {
    let Some(stmt) = tree.statement(id) else {
        return "?".into();
    };
    let mut parts = vec![format!("{}:{}", stmt.kind_name(), stmt.language)];
    if let Some(name) = stmt.name() {
        parts.push(format!("name={}", name));
    }

    let mut locations: Vec<String> = stmt
        .locations
        .iter()
        .map(|l| {
            format!(
                "{}-{}:{}@{}{}",
                l,
                l.end_line,
                l.end_column,
                l.xpath,
                if l.is_reference { "#ref" } else { "" }
            )
        })
        .collect();
    locations.sort();
    parts.push(format!("locations={:?}", locations));

    if let Some(header) = stmt.header() {
        let mut facets: Vec<String> = header
            .facets
            .iter()
            .map(|f| {
                format!(
                    "{}|{:?}|{}|partial={}|relocated={}",
                    f.file,
                    f.accessibility,
                    f.prefix.map(|p| describe(tree, p)).unwrap_or_default(),
                    f.is_partial,
                    f.relocated
                )
            })
            .collect();
        facets.sort();
        parts.push(format!("facets={:?}", facets));
        parts.push(format!("access={:?}", header.accessibility()));
        parts.push(format!("partial={}", header.is_partial()));
    }

    let sorted = |ids: &[ExpressionId]| {
        let mut out: Vec<String> = ids.iter().map(|e| describe(tree, *e)).collect();
        out.sort();
        out
    };
    match &stmt.kind {
        StatementKind::Type(data) => {
            parts.push(format!("kind={:?}", data.kind));
            parts.push(format!("parents={:?}", sorted(&data.parent_types)));
        }
        StatementKind::Method(data) => {
            parts.push(format!("role={:?}", data.role));
            let mut signatures: Vec<String> = data
                .signatures
                .iter()
                .map(|s| {
                    let params: Vec<String> = s.parameters.iter().map(|p| describe(tree, *p)).collect();
                    format!(
                        "{}|{}|{}",
                        s.file,
                        s.return_type.map(|t| describe(tree, t)).unwrap_or_default(),
                        params.join(",")
                    )
                })
                .collect();
            signatures.sort();
            parts.push(format!("signatures={:?}", signatures));
            parts.push(format!("initializers={:?}", sorted(&data.initializers)));
            parts.push(format!("arity={:?}", tree.arity(id)));
        }
        StatementKind::Property(data) => {
            parts.push(format!("types={:?}", sorted(&data.property_types)));
        }
        StatementKind::Namespace(_) => {}
        other => {
            let exprs: Vec<String> = stmt.expression_ids().iter().map(|e| describe(tree, *e)).collect();
            parts.push(format!("expressions={:?}", exprs));
            match other {
                StatementKind::Alias { alias_name, .. } => parts.push(format!("alias={}", alias_name)),
                StatementKind::Label { name } => parts.push(format!("label={}", name)),
                StatementKind::Extern { linkage } => parts.push(format!("linkage={:?}", linkage)),
                StatementKind::Case { is_default, .. } => parts.push(format!("default={}", is_default)),
                _ => {}
            }
        }
    }
    parts.join(" ")
}

/// Shape-and-text description of an expression subtree.
fn describe(tree: &ScopeTree, id: ExpressionId) -> String {
    let Some(expr) = tree.expression(id) else {
        return "?".into();
    };
    let head = match &expr.kind {
        ExpressionKind::Group => "group".to_string(),
        ExpressionKind::NamePrefix => "prefix".to_string(),
        ExpressionKind::NameUse(name) => format!("name:{}", name.name),
        ExpressionKind::TypeUse { name, .. } => format!("type:{}", name.name),
        ExpressionKind::MethodCall(call) => format!(
            "call:{}:{}{}{}",
            call.name.name,
            u8::from(call.is_constructor),
            u8::from(call.is_destructor),
            u8::from(call.is_initializer)
        ),
        ExpressionKind::VariableUse { name, .. } => format!("var:{}", name.name),
        ExpressionKind::VariableDeclaration(decl) => {
            format!("decl:{}:{:?}:{}", decl.name, decl.accessibility, decl.is_variadic)
        }
        ExpressionKind::Literal { kind, text } => format!("lit:{:?}:{}", kind, text),
        ExpressionKind::Operator { text } => format!("op:{}", text),
    };
    let subs: Vec<String> = expr.sub_expression_ids().iter().map(|s| describe(tree, *s)).collect();
    if subs.is_empty() {
        head
    } else {
        format!("{}[{}]", head, subs.join(","))
    }
}

// ============================================================================
// Tests
// ============================================================================
