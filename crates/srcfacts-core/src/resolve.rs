//! Name, call and type resolution against a scope tree.
//!
//! [`find_matches`] binds a use (name, type, variable or call) to the
//! declarations it may refer to. The lookup order is:
//!
//! 1. keywords: `this`, and `base`/`super` where the language has one
//! 2. an explicit prefix (`A::B::x`, `::x`), walked as nested scope lookups
//! 3. a calling object (`a.x`, `a->x`, `f().x`), whose type supplies the members
//! 4. the lexical chain from the innermost statement outwards; the first
//!    level with a match wins
//! 5. aliases, then imports, visible at the use site (nearest first)
//!
//! Calls keep only candidates whose arity accepts the argument count.
//! Constructor calls resolve the named type and then its constructors.
//! Resolution never fails: an unresolvable use yields an empty list.

use std::collections::HashSet;

use serde::Serialize;

use crate::merge::pending_prefix;
use crate::model::{
    Declaration, Expression, ExpressionId, ExpressionKind, Location, MethodRole, ScopeTree,
    StatementId, StatementKind,
};

/// Operators that select a member of the preceding component.
const MEMBER_OPERATORS: &[&str] = &[".", "->", "?.", ".*", "->*", "::"];

/// Declarations a use may refer to, best matches first.
pub fn find_matches(tree: &ScopeTree, expr: ExpressionId) -> Vec<Declaration> {
    Resolver::new(tree).find_matches(expr)
}

/// Type and namespace scopes an expression evaluates to.
pub fn resolve_type(tree: &ScopeTree, expr: ExpressionId) -> Vec<StatementId> {
    Resolver::new(tree).scopes_of(expr)
}

/// Import statements visible at a use site, nearest first.
pub fn imports_in_scope(tree: &ScopeTree, statement: StatementId, at: Option<&Location>) -> Vec<StatementId> {
    visible_statements(tree, statement, at, |kind| matches!(kind, StatementKind::Import { .. }))
}

/// Alias statements visible at a use site, nearest first.
pub fn aliases_in_scope(tree: &ScopeTree, statement: StatementId, at: Option<&Location>) -> Vec<StatementId> {
    visible_statements(tree, statement, at, |kind| matches!(kind, StatementKind::Alias { .. }))
}

/// Statements of one kind in the same file, preceding the use, innermost scope first.
fn visible_statements(
    tree: &ScopeTree,
    statement: StatementId,
    at: Option<&Location>,
    wanted: impl Fn(&StatementKind) -> bool,
) -> Vec<StatementId> {
    let at = at.or_else(|| tree.primary_location(statement));
    let mut out = Vec::new();
    for scope in tree.ancestors_and_self(statement) {
        let Some(stmt) = tree.statement(scope) else {
            continue;
        };
        let mut here: Vec<StatementId> = stmt
            .children
            .iter()
            .copied()
            .filter(|c| {
                let Some(child) = tree.statement(*c) else {
                    return false;
                };
                if !wanted(&child.kind) {
                    return false;
                }
                match (at, child.locations.first()) {
                    (Some(use_site), Some(loc)) => {
                        loc.file == use_site.file
                            && (!child.language.is_c_family() || loc.precedes(use_site))
                    }
                    _ => true,
                }
            })
            .collect();
        here.reverse();
        out.extend(here);
    }
    out
}

/// Innermost named-scope expression use at a position.
pub fn expression_at(tree: &ScopeTree, file: &str, line: u32, column: u32) -> Option<ExpressionId> {
    let stmt = tree.statement_at(file, line, column)?;
    tree.find_expressions(stmt, false)
        .into_iter()
        .filter_map(|id| {
            let expr = tree.expression(id)?;
            expr.name_data()?;
            let loc = expr.location.as_ref()?;
            if loc.file != file || !loc.contains_position(line, column) {
                return None;
            }
            Some((id, (loc.end_line.saturating_sub(loc.line), loc.end_column.saturating_sub(loc.column))))
        })
        .min_by_key(|(_, span)| *span)
        .map(|(id, _)| id)
}

/// Named scopes reached by a qualified path (`A.B.Foo` or `A::B::Foo`).
pub fn find_scopes(tree: &ScopeTree, qualified: &str) -> Vec<StatementId> {
    let names: Vec<&str> = qualified
        .split("::")
        .flat_map(|part| part.split('.'))
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return vec![tree.root()];
    }
    let mut scopes = vec![tree.root()];
    for name in names {
        scopes = scopes
            .into_iter()
            .flat_map(|s| tree.named_children(s, name))
            .filter_map(|d| match d {
                Declaration::Scope(id) => Some(id),
                Declaration::Variable(_) => None,
            })
            .collect();
    }
    scopes
}

// ============================================================================
// Call Graph
// ============================================================================

/// One resolved call from a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CallEdge {
    pub caller: StatementId,
    pub callee: StatementId,
    pub call: ExpressionId,
}

/// Every resolved (caller, callee) pair in the tree.
pub fn call_edges(tree: &ScopeTree) -> Vec<CallEdge> {
    let mut resolver = Resolver::new(tree);
    let mut edges = Vec::new();
    let mut seen = HashSet::new();
    for stmt in tree.descendants_and_self(tree.root()) {
        let Some(caller) = tree
            .ancestors_and_self(stmt)
            .into_iter()
            .find(|s| tree.statement(*s).is_some_and(|x| x.is_method()))
        else {
            continue;
        };
        for expr in tree.find_expressions(stmt, false) {
            if tree.expression(expr).and_then(Expression::as_call).is_none() {
                continue;
            }
            for decl in resolver.find_matches(expr) {
                let Declaration::Scope(callee) = decl else {
                    continue;
                };
                if !tree.statement(callee).is_some_and(|s| s.is_method()) {
                    continue;
                }
                let edge = CallEdge { caller, callee, call: expr };
                if seen.insert(edge) {
                    edges.push(edge);
                }
            }
        }
    }
    tracing::debug!(edges = edges.len(), "computed call graph");
    edges
}

/// Calls that resolve to `method`.
pub fn callers_of(tree: &ScopeTree, method: StatementId) -> Vec<CallEdge> {
    call_edges(tree).into_iter().filter(|e| e.callee == method).collect()
}

/// Calls made from the body of `method`.
pub fn callees_of(tree: &ScopeTree, method: StatementId) -> Vec<CallEdge> {
    call_edges(tree).into_iter().filter(|e| e.caller == method).collect()
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolution state; `active` breaks cycles through prefixes and types.
struct Resolver<'t> {
    tree: &'t ScopeTree,
    active: HashSet<ExpressionId>,
}

impl<'t> Resolver<'t> {
    fn new(tree: &'t ScopeTree) -> Self {
        Resolver {
            tree,
            active: HashSet::new(),
        }
    }

    fn find_matches(&mut self, expr: ExpressionId) -> Vec<Declaration> {
        if !self.active.insert(expr) {
            return Vec::new();
        }
        let out = self.resolve(expr);
        self.active.remove(&expr);
        out
    }

    fn resolve(&mut self, id: ExpressionId) -> Vec<Declaration> {
        let tree = self.tree;
        let Some(expr) = tree.expression(id) else {
            return Vec::new();
        };
        if expr.as_declaration().is_some() {
            return vec![Declaration::Variable(id)];
        }
        let Some(name) = expr.name_data() else {
            return Vec::new();
        };
        let Some(statement) = tree.expression_statement(id) else {
            return Vec::new();
        };

        if name.name == "this" {
            return self
                .enclosing_type(statement)
                .map(Declaration::Scope)
                .into_iter()
                .collect();
        }
        if Some(name.name.as_str()) == expr.language.parent_keyword() {
            return self
                .enclosing_type(statement)
                .map(|t| self.parent_types(t))
                .unwrap_or_default()
                .into_iter()
                .map(Declaration::Scope)
                .collect();
        }

        if let Some(prefix) = name.prefix {
            let scopes = self.resolve_prefix(prefix);
            let found = scopes
                .into_iter()
                .flat_map(|s| self.members(s, &name.name))
                .collect();
            return self.filter_for_use(id, found);
        }

        if let Some(object) = self.calling_object(id) {
            let found = self
                .scopes_of(object)
                .into_iter()
                .flat_map(|s| self.members(s, &name.name))
                .collect();
            return self.filter_for_use(id, found);
        }

        let at = expr.location.as_ref();
        for scope in tree.ancestors_and_self(statement) {
            let found = self.lookup_at_level(scope, &name.name, at);
            let found = self.filter_for_use(id, found);
            if !found.is_empty() {
                return found;
            }
        }

        for alias in aliases_in_scope(tree, statement, at) {
            let Some(StatementKind::Alias { target, alias_name }) = tree.statement(alias).map(|s| &s.kind) else {
                continue;
            };
            if alias_name != &name.name {
                continue;
            }
            if let Some(target) = target {
                let found = self.find_matches(*target);
                let found = self.filter_for_use(id, found);
                if !found.is_empty() {
                    return found;
                }
            }
        }

        for import in imports_in_scope(tree, statement, at) {
            let Some(StatementKind::Import {
                namespace: Some(target),
            }) = tree.statement(import).map(|s| &s.kind)
            else {
                continue;
            };
            let containers: Vec<StatementId> = self
                .find_matches(*target)
                .into_iter()
                .filter_map(|d| as_container(tree, d))
                .collect();
            let found = containers
                .into_iter()
                .flat_map(|s| self.members(s, &name.name))
                .collect();
            let found = self.filter_for_use(id, found);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    fn enclosing_type(&self, statement: StatementId) -> Option<StatementId> {
        self.tree
            .ancestors_and_self(statement)
            .into_iter()
            .find(|s| self.tree.statement(*s).is_some_and(|x| x.is_type()))
    }

    /// Resolved parent types of a type.
    fn parent_types(&mut self, ty: StatementId) -> Vec<StatementId> {
        let Some(data) = self.tree.statement(ty).and_then(|s| s.as_type()) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for parent in data.parent_types.clone() {
            for scope in self.scopes_of(parent) {
                if scope != ty && !out.contains(&scope) {
                    out.push(scope);
                }
            }
        }
        out
    }

    /// Scopes named by a prefix expression (`A::B::`).
    fn resolve_prefix(&mut self, prefix: ExpressionId) -> Vec<StatementId> {
        let tree = self.tree;
        let Some(expr) = tree.expression(prefix) else {
            return Vec::new();
        };
        let components = expr.components.clone();
        let global = components
            .first()
            .and_then(|c| tree.expression(*c))
            .and_then(Expression::operator_text)
            == Some("::");
        let names: Vec<ExpressionId> = components
            .into_iter()
            .filter(|c| tree.expression(*c).and_then(Expression::used_name).is_some())
            .collect();
        let Some((first, rest)) = names.split_first() else {
            return if global { vec![tree.root()] } else { Vec::new() };
        };

        let mut scopes: Vec<StatementId> = if global {
            let name = tree.expression(*first).and_then(Expression::used_name).unwrap_or_default();
            self.members(tree.root(), name)
                .into_iter()
                .filter_map(|d| as_container(tree, d))
                .collect()
        } else {
            self.find_matches(*first)
                .into_iter()
                .filter_map(|d| as_container(tree, d))
                .collect()
        };
        for next in rest {
            let name = tree.expression(*next).and_then(Expression::used_name).unwrap_or_default();
            let found: Vec<Declaration> = scopes.into_iter().flat_map(|s| self.members(s, name)).collect();
            scopes = found.into_iter().filter_map(|d| as_container(tree, d)).collect();
        }
        scopes
    }

    /// The component before a member operator preceding `id`, if any.
    fn calling_object(&self, id: ExpressionId) -> Option<ExpressionId> {
        let before = self.tree.siblings_before(id).ok()?;
        let (operator, rest) = before.split_last()?;
        let text = self.tree.expression(*operator)?.operator_text()?;
        if !MEMBER_OPERATORS.contains(&text) {
            return None;
        }
        rest.last().copied()
    }

    /// Type and namespace scopes an expression evaluates to.
    fn scopes_of(&mut self, id: ExpressionId) -> Vec<StatementId> {
        let tree = self.tree;
        let is_call = tree.expression(id).and_then(Expression::as_call).is_some();
        let mut out = Vec::new();
        for decl in self.find_matches(id) {
            let found = match decl {
                Declaration::Scope(s) => {
                    let Some(stmt) = tree.statement(s) else {
                        continue;
                    };
                    match &stmt.kind {
                        StatementKind::Type(_) | StatementKind::Namespace(_) => vec![s],
                        StatementKind::Method(data) if data.role == MethodRole::Constructor => {
                            stmt.parent.into_iter().collect()
                        }
                        StatementKind::Method(_) if is_call => match tree.return_type(s) {
                            Some(ret) => self.scopes_of(ret),
                            None => Vec::new(),
                        },
                        StatementKind::Property(data) => data
                            .property_types
                            .clone()
                            .into_iter()
                            .flat_map(|t| self.scopes_of(t))
                            .collect(),
                        _ => Vec::new(),
                    }
                }
                Declaration::Variable(v) => match tree
                    .expression(v)
                    .and_then(Expression::as_declaration)
                    .and_then(|d| d.variable_type)
                {
                    Some(ty) => self.scopes_of(ty),
                    None => Vec::new(),
                },
            };
            for scope in found {
                if !out.contains(&scope) {
                    out.push(scope);
                }
            }
        }
        out
    }

    /// Members named `name` of a type or namespace, inherited ones included.
    fn members(&mut self, scope: StatementId, name: &str) -> Vec<Declaration> {
        let mut visited = HashSet::new();
        self.members_inner(scope, name, &mut visited)
    }

    fn members_inner(&mut self, scope: StatementId, name: &str, visited: &mut HashSet<StatementId>) -> Vec<Declaration> {
        if !visited.insert(scope) {
            return Vec::new();
        }
        let found = self.tree.named_children(scope, name);
        if !found.is_empty() {
            return found;
        }
        if self.tree.statement(scope).is_some_and(|s| s.is_type()) {
            let mut inherited = Vec::new();
            for parent in self.parent_types(scope) {
                inherited.extend(self.members_inner(parent, name, visited));
            }
            return inherited;
        }
        Vec::new()
    }

    /// Declarations named `name` visible at one level of the lexical chain.
    fn lookup_at_level(&mut self, scope: StatementId, name: &str, at: Option<&Location>) -> Vec<Declaration> {
        let tree = self.tree;
        let Some(stmt) = tree.statement(scope) else {
            return Vec::new();
        };
        let ordered = !(stmt.is_type() || stmt.is_namespace());
        let visible = |decl: ExpressionId| -> bool {
            if !ordered {
                return true;
            }
            let Some(loc) = tree.expression(decl).and_then(|e| e.location.as_ref()) else {
                return true;
            };
            match at {
                Some(use_site) if use_site.file == loc.file => {
                    (loc.line, loc.column) <= (use_site.line, use_site.column)
                }
                _ => true,
            }
        };

        let mut out: Vec<Declaration> = tree
            .named_children(scope, name)
            .into_iter()
            .filter(|d| match d {
                Declaration::Variable(v) => visible(*v),
                Declaration::Scope(_) => true,
            })
            .collect();

        let local_roots: Vec<ExpressionId> = match &stmt.kind {
            StatementKind::Method(_) => tree.parameters(scope),
            StatementKind::For { initializer, .. } => initializer.iter().copied().collect(),
            StatementKind::Foreach { condition } => condition.iter().copied().collect(),
            StatementKind::Catch { parameter } => parameter.iter().copied().collect(),
            StatementKind::UsingBlock { initializer } => initializer.iter().copied().collect(),
            _ => Vec::new(),
        };
        for root in local_roots {
            out.extend(
                tree.expression_descendants(root)
                    .into_iter()
                    .filter(|e| tree.declared_name(*e) == Some(name))
                    .map(Declaration::Variable),
            );
        }

        if out.is_empty() && stmt.is_type() {
            let mut visited = HashSet::from([scope]);
            for parent in self.parent_types(scope) {
                out.extend(self.members_inner(parent, name, &mut visited));
            }
        }

        if out.is_empty() && stmt.is_method() {
            if let Some(prefix) = pending_prefix(tree, scope) {
                for target in self.resolve_prefix(prefix) {
                    out.extend(self.members(target, name));
                }
            }
        }
        out
    }

    /// Keep the candidates compatible with how the name is used.
    fn filter_for_use(&mut self, id: ExpressionId, candidates: Vec<Declaration>) -> Vec<Declaration> {
        let tree = self.tree;
        let Some(expr) = tree.expression(id) else {
            return Vec::new();
        };
        match &expr.kind {
            ExpressionKind::MethodCall(call) => {
                let arguments = call.arguments.len();
                let mut out = Vec::new();
                for decl in candidates {
                    let Declaration::Scope(s) = decl else {
                        if !call.is_constructor || call.is_initializer {
                            out.push(decl);
                        }
                        continue;
                    };
                    let Some(stmt) = tree.statement(s) else {
                        continue;
                    };
                    match &stmt.kind {
                        StatementKind::Method(data) => {
                            let role_fits = if call.is_destructor {
                                data.role == MethodRole::Destructor
                            } else if call.is_constructor && !call.is_initializer {
                                data.role == MethodRole::Constructor
                            } else {
                                data.role != MethodRole::Destructor
                            };
                            if role_fits && tree.arity(s).accepts(arguments) {
                                out.push(decl);
                            }
                        }
                        StatementKind::Type(_) => {
                            let constructors = self.constructors(s, arguments);
                            if constructors.is_empty() {
                                out.push(decl);
                            } else {
                                out.extend(constructors);
                            }
                        }
                        _ => {}
                    }
                }
                dedup(out)
            }
            ExpressionKind::TypeUse { .. } => {
                let types: Vec<Declaration> = candidates
                    .iter()
                    .copied()
                    .filter(|d| as_container(tree, *d).is_some())
                    .collect();
                if types.is_empty() { candidates } else { types }
            }
            _ => candidates,
        }
    }

    /// Constructors of a type accepting `arguments` arguments.
    fn constructors(&self, ty: StatementId, arguments: usize) -> Vec<Declaration> {
        let tree = self.tree;
        let Some(stmt) = tree.statement(ty) else {
            return Vec::new();
        };
        let name = stmt.name().unwrap_or_default();
        stmt.children
            .iter()
            .copied()
            .filter(|c| {
                tree.statement(*c).is_some_and(|x| {
                    x.as_method()
                        .is_some_and(|m| m.role == MethodRole::Constructor && x.name() == Some(name))
                })
            })
            .filter(|c| tree.arity(*c).accepts(arguments))
            .map(Declaration::Scope)
            .collect()
    }
}

/// Type or namespace a declaration stands for as a container of members.
fn as_container(tree: &ScopeTree, decl: Declaration) -> Option<StatementId> {
    match decl {
        Declaration::Scope(s) if tree.statement(s).is_some_and(|x| x.is_type() || x.is_namespace()) => Some(s),
        _ => None,
    }
}

fn dedup(declarations: Vec<Declaration>) -> Vec<Declaration> {
    let mut seen = HashSet::new();
    declarations.into_iter().filter(|d| seen.insert(*d)).collect()
}

// ============================================================================
// Tests
// ============================================================================
