//! Merging of scope trees.
//!
//! Merging grafts one tree into another and then restructures each scope:
//! children with the same [`MergeKey`] are folded into one survivor, and
//! children whose declared prefix (`void A::B::Foo()`) names a scope below
//! the merging scope are moved there. Both steps recurse into the survivor,
//! so a merge is idempotent with respect to node identity.
//!
//! The survivor keeps every contribution: locations, scope facets, method
//! signatures, parent types and initializers are concatenated so that
//! [`crate::unmerge::remove_file`] can take one file's share back out.

use std::collections::HashMap;

use crate::model::{
    ExpressionId, Language, MethodRole, ModelError, ModelResult, ScopeTree, Statement, StatementId,
    StatementKind, TypeKind,
};

/// Identity used to decide whether two sibling statements are the same declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MergeKey {
    /// The unnamed root namespace.
    Global,
    Namespace {
        language: Language,
        name: String,
    },
    Type {
        language: Language,
        kind: TypeKind,
        name: String,
    },
    /// Methods match on parameter types, not parameter names.
    Method {
        language: Language,
        role: MethodRole,
        name: String,
        parameter_types: Vec<String>,
    },
    Property {
        language: Language,
        name: String,
    },
    /// Never merges with anything else.
    Unique(StatementId),
}

/// Compute the merge identity of a statement.
pub fn merge_key(tree: &ScopeTree, id: StatementId) -> MergeKey {
    let Some(stmt) = tree.statement(id) else {
        return MergeKey::Unique(id);
    };
    if tree.is_global(id) {
        return MergeKey::Global;
    }
    let language = stmt.language;
    match &stmt.kind {
        StatementKind::Namespace(data) if !data.header.name.is_empty() => MergeKey::Namespace {
            language,
            name: data.header.name.clone(),
        },
        StatementKind::Type(data) if !data.header.name.is_empty() => MergeKey::Type {
            language,
            kind: data.kind,
            name: data.header.name.clone(),
        },
        StatementKind::Method(data) if !data.header.name.is_empty() => MergeKey::Method {
            language,
            role: data.role,
            name: data.header.name.clone(),
            parameter_types: tree.parameter_types(id),
        },
        StatementKind::Property(data) => MergeKey::Property {
            language,
            name: data.header.name.clone(),
        },
        _ => MergeKey::Unique(id),
    }
}

/// Merge `other` into `target`, consuming `other`.
///
/// Both roots must be global namespaces.
pub fn merge(target: &mut ScopeTree, other: ScopeTree) -> ModelResult<()> {
    if !target.is_global(target.root()) || !other.is_global(other.root()) {
        return Err(ModelError::IncompatibleRoots {
            left: target.full_name(target.root()),
            right: other.full_name(other.root()),
        });
    }
    let files = other.files();
    let incoming = target.graft(other);
    let root = target.root();
    merge_into(target, root, incoming);
    tracing::info!(
        files = ?files,
        statements = target.statement_count(),
        expressions = target.expression_count(),
        "merged scope tree"
    );
    Ok(())
}

/// Merge two trees into a new one.
pub fn merged(mut left: ScopeTree, right: ScopeTree) -> ModelResult<ScopeTree> {
    merge(&mut left, right)?;
    Ok(left)
}

/// Fold `donor` into `survivor`; both must live in `tree` with equal keys.
pub(crate) fn merge_into(tree: &mut ScopeTree, survivor: StatementId, donor: StatementId) {
    let Some(donated) = tree.take_statement(donor) else {
        return;
    };
    let expressions = donated.expression_ids();
    let Statement {
        kind,
        children,
        content,
        locations,
        ..
    } = donated;

    let mut orphaned_content = None;
    if let Some(target) = tree.statement_mut(survivor) {
        target.locations.extend(locations);
        absorb_kind(&mut target.kind, kind);
        match (target.content, content) {
            (None, Some(c)) => target.content = Some(c),
            (Some(_), Some(c)) => orphaned_content = Some(c),
            _ => {}
        }
    }
    if let Some(c) = orphaned_content {
        tree.discard_expression(c);
    }
    for expr in expressions.into_iter().filter(|e| Some(*e) != orphaned_content) {
        tree.attach_expression(survivor, expr);
    }
    for child in children {
        tree.append_child(survivor, child);
    }
    restructure(tree, survivor);
}

/// Append the donor's per-contribution data to the survivor's.
fn absorb_kind(target: &mut StatementKind, donor: StatementKind) {
    match (target, donor) {
        (StatementKind::Namespace(t), StatementKind::Namespace(d)) => {
            t.header.facets.extend(d.header.facets);
        }
        (StatementKind::Type(t), StatementKind::Type(d)) => {
            t.header.facets.extend(d.header.facets);
            t.parent_types.extend(d.parent_types);
        }
        (StatementKind::Method(t), StatementKind::Method(d)) => {
            t.header.facets.extend(d.header.facets);
            t.signatures.extend(d.signatures);
            t.initializers.extend(d.initializers);
        }
        (StatementKind::Property(t), StatementKind::Property(d)) => {
            t.header.facets.extend(d.header.facets);
            t.property_types.extend(d.property_types);
        }
        (target, donor) => {
            tracing::warn!(
                survivor = ?std::mem::discriminant(target),
                donor = ?std::mem::discriminant(&donor),
                "merging statements of different kinds"
            );
        }
    }
}

/// Merge same-key children of `scope` and relocate children with a pending prefix.
pub(crate) fn restructure(tree: &mut ScopeTree, scope: StatementId) {
    let Some(children) = tree.statement(scope).map(|s| s.children.clone()) else {
        return;
    };
    let (pending, settled): (Vec<StatementId>, Vec<StatementId>) =
        children.into_iter().partition(|c| has_pending_prefix(tree, *c));

    let mut kept = Vec::with_capacity(settled.len() + pending.len());
    let mut seen: HashMap<MergeKey, StatementId> = HashMap::new();
    for child in settled {
        let key = merge_key(tree, child);
        match seen.get(&key) {
            Some(&survivor) => merge_into(tree, survivor, child),
            None => {
                seen.insert(key, child);
                kept.push(child);
            }
        }
    }

    let mut moved = Vec::new();
    for child in pending {
        match relocation_target(tree, scope, child) {
            Some(target) => moved.push((child, target)),
            None => kept.push(child),
        }
    }
    if let Some(stmt) = tree.statement_mut(scope) {
        stmt.children = kept;
    }

    for (child, target) in moved {
        if let Some(header) = tree.statement_mut(child).and_then(Statement::header_mut) {
            for facet in header.facets.iter_mut().filter(|f| f.is_pending()) {
                facet.relocated = true;
            }
        }
        tracing::debug!(%child, %target, "relocated prefixed declaration");
        tree.append_child(target, child);
        restructure(tree, target);
    }
}

fn has_pending_prefix(tree: &ScopeTree, id: StatementId) -> bool {
    tree.statement(id)
        .and_then(Statement::header)
        .is_some_and(|h| h.has_pending_prefix())
}

/// Pending prefix expression of a statement.
pub(crate) fn pending_prefix(tree: &ScopeTree, id: StatementId) -> Option<ExpressionId> {
    tree.statement(id)?
        .header()?
        .facets
        .iter()
        .find(|f| f.is_pending())
        .and_then(|f| f.prefix)
}

/// Scope below `scope` named by the child's prefix, if it exists.
fn relocation_target(tree: &ScopeTree, scope: StatementId, child: StatementId) -> Option<StatementId> {
    let prefix = pending_prefix(tree, child)?;
    let names = tree.prefix_names(prefix);
    if names.is_empty() {
        return None;
    }
    names.iter().try_fold(scope, |current, name| {
        tree.statement(current)?.children.iter().copied().find(|c| {
            *c != child
                && tree
                    .statement(*c)
                    .is_some_and(|s| (s.is_namespace() || s.is_type()) && s.name() == Some(name.as_str()))
        })
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessModifier, Language};
    use crate::test_support::{aggregate, parse_snippet, scope_at};

    const HEADER: &str = "<class>class <name>A</name> <block>{<public>public: <function_decl><type><name>void</name></type> <name>Foo</name><parameter_list>(<parameter><decl><type><name>int</name></type> <name>x</name></decl></parameter>)</parameter_list>;</function_decl></public>}</block>;</class>";
    const SOURCE: &str = "<function><type><name>void</name></type> <name><name>A</name><operator>::</operator><name>Foo</name></name><parameter_list>(<parameter><decl><type><name>int</name></type> <name>y</name></decl></parameter>)</parameter_list> <block>{<return>return;</return>}</block></function>";

    mod keys {
        use super::*;

        #[test]
        fn methods_key_on_parameter_types() {
            let tree = parse_snippet(HEADER, "a.h");
            let foo = scope_at(&tree, &["A", "Foo"]).unwrap();
            assert_eq!(
                merge_key(&tree, foo),
                MergeKey::Method {
                    language: Language::CPlusPlus,
                    role: MethodRole::Method,
                    name: "Foo".into(),
                    parameter_types: vec!["int".into()],
                }
            );
        }

        #[test]
        fn anonymous_namespaces_are_unique() {
            let tree = parse_snippet("<namespace>namespace <block>{}</block></namespace>", "a.cpp");
            let anon = tree.root_statement().children[0];
            assert_eq!(merge_key(&tree, anon), MergeKey::Unique(anon));
        }

        #[test]
        fn root_is_global() {
            let tree = parse_snippet("", "a.cpp");
            assert_eq!(merge_key(&tree, tree.root()), MergeKey::Global);
        }
    }

    mod folding {
        use super::*;

        #[test]
        fn same_namespace_merges_and_accumulates_locations() {
            let ns = "<namespace>namespace <name>N</name> <block>{}</block></namespace>";
            let tree = aggregate(&[("a.cpp", ns), ("b.cpp", ns)]);
            assert_eq!(tree.root_statement().children.len(), 1);
            let n = scope_at(&tree, &["N"]).unwrap();
            let files: Vec<&str> = tree
                .statement(n)
                .unwrap()
                .locations
                .iter()
                .map(|l| l.file.as_str())
                .collect();
            assert_eq!(files, vec!["a.cpp", "b.cpp"]);
        }

        #[test]
        fn out_of_line_definition_joins_declaration() {
            let tree = aggregate(&[("a.h", HEADER), ("a.cpp", SOURCE)]);
            let a = scope_at(&tree, &["A"]).unwrap();
            assert_eq!(tree.statement(a).unwrap().children.len(), 1);
            let foo = scope_at(&tree, &["A", "Foo"]).unwrap();
            let stmt = tree.statement(foo).unwrap();
            assert_eq!(stmt.locations.len(), 2);
            assert_eq!(stmt.children.len(), 1);
            assert_eq!(stmt.header().unwrap().accessibility(), AccessModifier::Public);
            assert!(tree.root_statement().children.iter().all(|c| *c == a));
        }

        #[test]
        fn definition_before_declaration_relocates_on_arrival() {
            let tree = aggregate(&[("a.cpp", SOURCE), ("a.h", HEADER)]);
            assert_eq!(tree.root_statement().children.len(), 1);
            let foo = scope_at(&tree, &["A", "Foo"]).unwrap();
            assert_eq!(tree.statement(foo).unwrap().locations.len(), 2);
        }

        #[test]
        fn unmatched_prefix_stays_pending() {
            let tree = aggregate(&[("a.cpp", SOURCE)]);
            let foo = tree.root_statement().children[0];
            assert!(pending_prefix(&tree, foo).is_some());
        }

        #[test]
        fn expressions_follow_the_survivor() {
            let tree = aggregate(&[("a.h", HEADER), ("a.cpp", SOURCE)]);
            let foo = scope_at(&tree, &["A", "Foo"]).unwrap();
            for expr in tree.find_expressions(foo, false) {
                assert_eq!(tree.expression_statement(expr), Some(foo));
            }
        }

        #[test]
        fn overloads_stay_apart() {
            let overload = "<class>class <name>A</name> <block>{<public>public: <function_decl><type><name>void</name></type> <name>Foo</name><parameter_list>()</parameter_list>;</function_decl></public>}</block>;</class>";
            let tree = aggregate(&[("a.h", HEADER), ("b.h", overload)]);
            let a = scope_at(&tree, &["A"]).unwrap();
            assert_eq!(tree.statement(a).unwrap().children.len(), 2);
        }
    }

    mod roots {
        use super::*;

        #[test]
        fn merged_returns_combined_tree() {
            let left = parse_snippet(HEADER, "a.h");
            let right = parse_snippet(SOURCE, "a.cpp");
            let tree = merged(left, right).unwrap();
            assert_eq!(tree.files().len(), 2);
        }
    }
}
