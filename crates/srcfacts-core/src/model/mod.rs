//! Statement/expression model.
//!
//! Every scope tree is an arena: statements and expressions live in slot
//! vectors and refer to each other through [`StatementId`] and
//! [`ExpressionId`]. Parent links are plain ids, so moving a subtree is an
//! id rewrite and no node owns its parent.
//!
//! ## Node families
//!
//! | Family | Kinds |
//! |--------|-------|
//! | Named scopes | namespace, type, method, property |
//! | Condition blocks | if, while, do, for, foreach, switch, case |
//! | Other statements | block, try/catch, using block, lock, extern, alias, import, label, jumps, expression, declaration, empty |
//! | Expressions | group, name prefix, name use, type use, method call, variable use, variable declaration, literal, operator |
//!
//! ## Invariants
//!
//! - A child's `parent` is exactly the statement whose child lists hold it.
//! - Nodes reachable from the root of an aggregate have at least one location
//!   (the root itself may be empty when nothing has been merged yet).
//! - Untyped sibling declarations (`int a, b;`) share one type expression id.

mod expression;
mod statement;

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use expression::{CallData, Expression, ExpressionKind, NameData, VariableDeclarationData};
pub use statement::{
    MethodData, MethodRole, MethodSignature, NamespaceData, PropertyData, ScopeFacet, ScopeHeader,
    Statement, StatementKind, TypeData,
};

// ============================================================================
// Identifiers
// ============================================================================

/// Handle of a statement inside one [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatementId(pub u32);

impl StatementId {
    pub fn new(id: u32) -> Self {
        StatementId(id)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt_{}", self.0)
    }
}

/// Handle of an expression inside one [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionId(pub u32);

impl ExpressionId {
    pub fn new(id: u32) -> Self {
        ExpressionId(id)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr_{}", self.0)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Source language of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    C,
    CPlusPlus,
    Java,
    CSharp,
}

impl Language {
    /// Map a srcML `language` attribute value.
    pub fn from_srcml(name: &str) -> Option<Language> {
        match name {
            "C" => Some(Language::C),
            "C++" => Some(Language::CPlusPlus),
            "Java" => Some(Language::Java),
            "C#" => Some(Language::CSharp),
            _ => None,
        }
    }

    /// The srcML name of the language.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "C",
            Language::CPlusPlus => "C++",
            Language::Java => "Java",
            Language::CSharp => "C#",
        }
    }

    /// C and C++ share declaration-order and scope-operator rules.
    pub fn is_c_family(&self) -> bool {
        matches!(self, Language::C | Language::CPlusPlus)
    }

    /// Keyword naming the parent type of the enclosing class.
    pub fn parent_keyword(&self) -> Option<&'static str> {
        match self {
            Language::Java => Some("super"),
            Language::CSharp => Some("base"),
            Language::C | Language::CPlusPlus => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared accessibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessModifier {
    #[default]
    None,
    Public,
    Internal,
    ProtectedInternal,
    Protected,
    Private,
}

impl AccessModifier {
    /// Map a single access keyword.
    pub fn from_keyword(keyword: &str) -> Option<AccessModifier> {
        match keyword {
            "public" => Some(AccessModifier::Public),
            "internal" => Some(AccessModifier::Internal),
            "protected" => Some(AccessModifier::Protected),
            "private" => Some(AccessModifier::Private),
            _ => None,
        }
    }

    /// Combine a list of specifiers (`protected internal` included).
    pub fn from_specifiers<S: AsRef<str>>(specifiers: &[S]) -> Option<AccessModifier> {
        let has = |kw: &str| specifiers.iter().any(|s| s.as_ref() == kw);
        if has("protected") && has("internal") {
            return Some(AccessModifier::ProtectedInternal);
        }
        specifiers
            .iter()
            .find_map(|s| AccessModifier::from_keyword(s.as_ref()))
    }
}

/// Kind of a type definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    Union,
    Enumeration,
}

impl TypeKind {
    /// Single-letter code used in merge identities.
    pub fn letter(&self) -> char {
        match self {
            TypeKind::Class => 'C',
            TypeKind::Struct => 'S',
            TypeKind::Interface => 'I',
            TypeKind::Union => 'U',
            TypeKind::Enumeration => 'E',
        }
    }
}

/// Kind of a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralKind {
    Number,
    String,
    Boolean,
    Character,
    Null,
    Other,
}

impl LiteralKind {
    /// Map the srcML `type` attribute of a literal.
    pub fn from_srcml(kind: Option<&str>) -> LiteralKind {
        match kind {
            Some("number") => LiteralKind::Number,
            Some("string") => LiteralKind::String,
            Some("boolean") => LiteralKind::Boolean,
            Some("char") => LiteralKind::Character,
            Some("null") | Some("nullptr") => LiteralKind::Null,
            _ => LiteralKind::Other,
        }
    }
}

// ============================================================================
// Location
// ============================================================================

/// One physical occurrence of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub xpath: String,
    /// Declaration-only occurrence (forward declaration, prototype).
    pub is_reference: bool,
}

impl Location {
    /// Create a point location.
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Location {
            file: file.into(),
            line,
            column,
            end_line: line,
            end_column: column,
            xpath: String::new(),
            is_reference: false,
        }
    }

    /// Set the end position.
    pub fn with_end(mut self, end_line: u32, end_column: u32) -> Self {
        self.end_line = end_line;
        self.end_column = end_column;
        self
    }

    /// Set the structural locator.
    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = xpath.into();
        self
    }

    /// Mark as a declaration-only occurrence.
    pub fn as_reference(mut self, is_reference: bool) -> Self {
        self.is_reference = is_reference;
        self
    }

    /// Whether `other` lies within this location.
    ///
    /// Structural locators are compared when both sides have one; positions
    /// are compared otherwise.
    pub fn contains(&self, other: &Location) -> bool {
        if self.file != other.file {
            return false;
        }
        if !self.xpath.is_empty() && !other.xpath.is_empty() {
            return other.xpath == self.xpath
                || (other.xpath.starts_with(&self.xpath)
                    && other.xpath[self.xpath.len()..].starts_with('/'));
        }
        self.contains_position(other.line, other.column)
            && (other.end_line, other.end_column) <= (self.end_line, self.end_column)
    }

    /// Whether a line/column position lies within this location.
    pub fn contains_position(&self, line: u32, column: u32) -> bool {
        (self.line, self.column) <= (line, column) && (line, column) <= (self.end_line, self.end_column)
    }

    /// Same file and starts strictly before `other`.
    pub fn precedes(&self, other: &Location) -> bool {
        self.file == other.file && (self.line, self.column) < (other.line, other.column)
    }

    /// Number of lines covered (used to pick the innermost match).
    fn span(&self) -> (u32, u32) {
        (
            self.end_line.saturating_sub(self.line),
            self.end_column.saturating_sub(self.column),
        )
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

// ============================================================================
// Declarations and Errors
// ============================================================================

/// A named entity that a use can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Declaration {
    /// Namespace, type, method or property.
    Scope(StatementId),
    /// Variable, field or parameter declaration.
    Variable(ExpressionId),
}

/// Errors raised by model queries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// The expression names a parent that does not list it as a component.
    #[error("{expression} is not a component of its parent expression")]
    DetachedExpression { expression: ExpressionId },

    /// The expression has no parent expression.
    #[error("{expression} has no parent expression")]
    NoParentExpression { expression: ExpressionId },

    #[error("unknown statement {0}")]
    UnknownStatement(StatementId),

    #[error("unknown expression {0}")]
    UnknownExpression(ExpressionId),

    /// Two roots with different identities cannot be merged.
    #[error("cannot merge root {left} with root {right}")]
    IncompatibleRoots { left: String, right: String },
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Required and total parameter counts of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub required: usize,
    pub total: usize,
    pub variadic: bool,
}

impl Arity {
    /// Whether a call with `arguments` arguments fits.
    pub fn accepts(&self, arguments: usize) -> bool {
        arguments >= self.required && (self.variadic || arguments <= self.total)
    }
}

// ============================================================================
// Scope Tree
// ============================================================================

/// Arena holding one file-local tree or one merged aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeTree {
    statements: Vec<Option<Statement>>,
    expressions: Vec<Option<Expression>>,
    root: StatementId,
}

impl ScopeTree {
    /// Create an empty aggregate: a global namespace with no locations.
    pub fn new(language: Language) -> Self {
        let root = Statement {
            kind: StatementKind::Namespace(NamespaceData {
                header: ScopeHeader::bare(""),
            }),
            language,
            parent: None,
            children: Vec::new(),
            content: None,
            locations: Vec::new(),
        };
        ScopeTree {
            statements: vec![Some(root)],
            expressions: Vec::new(),
            root: StatementId(0),
        }
    }

    /// Create a tree around an already built root statement.
    pub fn with_root(root: Statement) -> Self {
        ScopeTree {
            statements: vec![Some(root)],
            expressions: Vec::new(),
            root: StatementId(0),
        }
    }

    pub fn root(&self) -> StatementId {
        self.root
    }

    pub fn root_statement(&self) -> &Statement {
        match self.statement(self.root) {
            Some(stmt) => stmt,
            None => unreachable!("the root slot is never freed"),
        }
    }

    pub fn statement(&self, id: StatementId) -> Option<&Statement> {
        self.statements.get(id.index()).and_then(Option::as_ref)
    }

    pub fn statement_mut(&mut self, id: StatementId) -> Option<&mut Statement> {
        self.statements.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn expression(&self, id: ExpressionId) -> Option<&Expression> {
        self.expressions.get(id.index()).and_then(Option::as_ref)
    }

    pub fn expression_mut(&mut self, id: ExpressionId) -> Option<&mut Expression> {
        self.expressions.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Live statement ids in slot order.
    pub fn statement_ids(&self) -> impl Iterator<Item = StatementId> + '_ {
        self.statements
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| StatementId(i as u32))
    }

    /// Number of live statements.
    pub fn statement_count(&self) -> usize {
        self.statements.iter().filter(|s| s.is_some()).count()
    }

    /// Number of live expressions.
    pub fn expression_count(&self) -> usize {
        self.expressions.iter().filter(|e| e.is_some()).count()
    }

    /// Every file named by a location reachable from the root.
    pub fn files(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for id in self.descendants_and_self(self.root) {
            if let Some(stmt) = self.statement(id) {
                out.extend(stmt.locations.iter().map(|l| l.file.clone()));
            }
        }
        out
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// Store a statement and return its id.
    pub fn alloc_statement(&mut self, statement: Statement) -> StatementId {
        let id = StatementId(self.statements.len() as u32);
        self.statements.push(Some(statement));
        id
    }

    /// Store an expression and return its id.
    pub fn alloc_expression(&mut self, expression: Expression) -> ExpressionId {
        let id = ExpressionId(self.expressions.len() as u32);
        self.expressions.push(Some(expression));
        id
    }

    /// Append `child` to the body of `parent`.
    pub fn append_child(&mut self, parent: StatementId, child: StatementId) {
        if let Some(stmt) = self.statement_mut(child) {
            stmt.parent = Some(parent);
        }
        if let Some(stmt) = self.statement_mut(parent) {
            stmt.children.push(child);
        }
    }

    /// Append `component` to the components of `parent`.
    pub fn push_component(&mut self, parent: ExpressionId, component: ExpressionId) {
        self.adopt_expression(parent, component);
        if let Some(expr) = self.expression_mut(parent) {
            expr.components.push(component);
        }
    }

    /// Point `child` at `owner` without listing it as a component.
    pub fn adopt_expression(&mut self, owner: ExpressionId, child: ExpressionId) {
        if let Some(expr) = self.expression_mut(child) {
            expr.parent_expression = Some(owner);
        }
    }

    /// Record `statement` as the owner of the expression subtree at `root`.
    pub fn attach_expression(&mut self, statement: StatementId, root: ExpressionId) {
        for id in self.expression_descendants(root) {
            if let Some(expr) = self.expression_mut(id) {
                expr.parent_statement = Some(statement);
            }
        }
    }

    /// Set the content expression of a statement.
    pub fn set_content(&mut self, statement: StatementId, content: ExpressionId) {
        if let Some(stmt) = self.statement_mut(statement) {
            stmt.content = Some(content);
        }
        self.attach_expression(statement, content);
    }

    /// Remove a single statement from the arena, leaving its children in place.
    pub(crate) fn take_statement(&mut self, id: StatementId) -> Option<Statement> {
        self.statements.get_mut(id.index()).and_then(Option::take)
    }

    /// Free a statement subtree and every expression it owns.
    pub fn discard_statement(&mut self, id: StatementId) {
        let Some(stmt) = self.statements.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        for expr in stmt.expression_ids() {
            self.discard_expression(expr);
        }
        for child in stmt.child_ids() {
            self.discard_statement(child);
        }
    }

    /// Free an expression subtree. Shared sub-expressions are freed once.
    pub fn discard_expression(&mut self, id: ExpressionId) {
        let Some(expr) = self.expressions.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        for sub in expr.sub_expression_ids() {
            self.discard_expression(sub);
        }
    }

    /// Move every node of `other` into this arena; returns `other`'s root here.
    pub fn graft(&mut self, other: ScopeTree) -> StatementId {
        let stmt_offset = self.statements.len() as u32;
        let expr_offset = self.expressions.len() as u32;
        let mut shift_stmt = |id: &mut StatementId| id.0 += stmt_offset;
        let mut shift_expr = |id: &mut ExpressionId| id.0 += expr_offset;

        for mut slot in other.statements {
            if let Some(stmt) = slot.as_mut() {
                stmt.visit_ids_mut(&mut shift_stmt, &mut shift_expr);
            }
            self.statements.push(slot);
        }
        for mut slot in other.expressions {
            if let Some(expr) = slot.as_mut() {
                expr.visit_ids_mut(&mut shift_stmt, &mut shift_expr);
            }
            self.expressions.push(slot);
        }
        StatementId(other.root.0 + stmt_offset)
    }

    // ------------------------------------------------------------------------
    // Statement navigation
    // ------------------------------------------------------------------------

    /// Parent chain, innermost first (excludes `id`).
    pub fn ancestors(&self, id: StatementId) -> Vec<StatementId> {
        let mut out = Vec::new();
        let mut current = self.statement(id).and_then(|s| s.parent);
        while let Some(parent) = current {
            out.push(parent);
            current = self.statement(parent).and_then(|s| s.parent);
        }
        out
    }

    /// `id` followed by its parent chain.
    pub fn ancestors_and_self(&self, id: StatementId) -> Vec<StatementId> {
        let mut out = vec![id];
        out.extend(self.ancestors(id));
        out
    }

    /// Pre-order descendants, excluding `id`.
    pub fn descendants(&self, id: StatementId) -> Vec<StatementId> {
        let mut out = self.descendants_and_self(id);
        out.remove(0);
        out
    }

    /// Pre-order walk starting at `id`.
    pub fn descendants_and_self(&self, id: StatementId) -> Vec<StatementId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(stmt) = self.statement(current) else {
                continue;
            };
            out.push(current);
            let mut kids = stmt.child_ids();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Dot-joined names of the named scopes from the root down to `id`.
    pub fn full_name(&self, id: StatementId) -> String {
        let mut names: Vec<&str> = self
            .ancestors_and_self(id)
            .into_iter()
            .filter_map(|s| self.statement(s).and_then(Statement::name))
            .filter(|n| !n.is_empty())
            .collect();
        names.reverse();
        names.join(".")
    }

    /// First defining location, else the first location.
    pub fn primary_location(&self, id: StatementId) -> Option<&Location> {
        let stmt = self.statement(id)?;
        stmt.locations
            .iter()
            .find(|l| !l.is_reference)
            .or_else(|| stmt.locations.first())
    }

    /// Whether the node is the tree root with an empty name.
    pub fn is_global(&self, id: StatementId) -> bool {
        id == self.root
            && self
                .statement(id)
                .is_some_and(|s| s.is_namespace() && s.name() == Some(""))
    }

    /// Named scopes and declared variables called `name` directly under `scope`.
    pub fn named_children(&self, scope: StatementId, name: &str) -> Vec<Declaration> {
        let Some(stmt) = self.statement(scope) else {
            return Vec::new();
        };
        let mut scopes = Vec::new();
        let mut variables = Vec::new();
        for child in &stmt.children {
            let Some(child_stmt) = self.statement(*child) else {
                continue;
            };
            if child_stmt.name() == Some(name) {
                scopes.push(Declaration::Scope(*child));
            } else if matches!(child_stmt.kind, StatementKind::Declaration) {
                variables.extend(
                    self.declared_variables(*child)
                        .into_iter()
                        .filter(|d| self.declared_name(*d) == Some(name))
                        .map(Declaration::Variable),
                );
            }
        }
        scopes.extend(variables);
        scopes
    }

    /// Variable declarations grouped in a declaration statement.
    pub fn declared_variables(&self, statement: StatementId) -> Vec<ExpressionId> {
        let Some(content) = self.statement(statement).and_then(|s| s.content) else {
            return Vec::new();
        };
        self.expression_descendants(content)
            .into_iter()
            .filter(|e| {
                self.expression(*e)
                    .is_some_and(|x| x.as_declaration().is_some())
            })
            .collect()
    }

    /// Name of a variable declaration expression.
    pub fn declared_name(&self, id: ExpressionId) -> Option<&str> {
        self.expression(id)
            .and_then(Expression::as_declaration)
            .map(|d| d.name.as_str())
    }

    /// Innermost statement in `file` whose location covers the position.
    pub fn statement_at(&self, file: &str, line: u32, column: u32) -> Option<StatementId> {
        self.descendants_and_self(self.root)
            .into_iter()
            .filter_map(|id| {
                let stmt = self.statement(id)?;
                let loc = stmt
                    .locations
                    .iter()
                    .filter(|l| l.file == file && l.contains_position(line, column))
                    .min_by_key(|l| l.span())?;
                Some((id, loc.span()))
            })
            .min_by_key(|(_, span)| *span)
            .map(|(id, _)| id)
    }

    // ------------------------------------------------------------------------
    // Method helpers
    // ------------------------------------------------------------------------

    /// The preferred signature of a method.
    ///
    /// Scores: +1 when every parameter is named, +1 when any parameter has a
    /// default value. Ties keep the earliest contribution.
    pub fn active_signature(&self, method: StatementId) -> Option<&MethodSignature> {
        let data = self.statement(method)?.as_method()?;
        let mut best: Option<(&MethodSignature, u8)> = None;
        for sig in &data.signatures {
            let score = self.signature_score(sig);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((sig, score));
            }
        }
        best.map(|(sig, _)| sig)
    }

    fn signature_score(&self, sig: &MethodSignature) -> u8 {
        let decls: Vec<&VariableDeclarationData> = sig
            .parameters
            .iter()
            .filter_map(|p| self.expression(*p).and_then(Expression::as_declaration))
            .collect();
        let all_named = decls.iter().all(|d| !d.name.is_empty());
        let any_default = decls.iter().any(|d| d.initializer.is_some());
        u8::from(all_named) + u8::from(any_default)
    }

    /// Parameter declarations of the preferred signature.
    pub fn parameters(&self, method: StatementId) -> Vec<ExpressionId> {
        self.active_signature(method)
            .map(|s| s.parameters.clone())
            .unwrap_or_default()
    }

    /// Return type of the preferred signature, falling back to any contribution.
    pub fn return_type(&self, method: StatementId) -> Option<ExpressionId> {
        let data = self.statement(method)?.as_method()?;
        self.active_signature(method)
            .and_then(|s| s.return_type)
            .or_else(|| data.signatures.iter().find_map(|s| s.return_type))
    }

    /// Rendered parameter types of the preferred signature.
    pub fn parameter_types(&self, method: StatementId) -> Vec<String> {
        self.parameters(method)
            .into_iter()
            .map(|p| {
                self.expression(p)
                    .and_then(Expression::as_declaration)
                    .and_then(|d| d.variable_type)
                    .map(|t| self.render(t))
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Call-site arity of a method.
    pub fn arity(&self, method: StatementId) -> Arity {
        let mut arity = Arity {
            required: 0,
            total: 0,
            variadic: false,
        };
        for param in self.parameters(method) {
            let Some(decl) = self.expression(param).and_then(Expression::as_declaration) else {
                continue;
            };
            if decl.is_variadic {
                arity.variadic = true;
                continue;
            }
            arity.total += 1;
            if decl.initializer.is_none() {
                arity.required += 1;
            }
        }
        arity
    }

    // ------------------------------------------------------------------------
    // Expression navigation
    // ------------------------------------------------------------------------

    /// Statement that owns an expression.
    pub fn expression_statement(&self, id: ExpressionId) -> Option<StatementId> {
        self.expression(id).and_then(|e| e.parent_statement)
    }

    /// `id` and every sub-expression beneath it, each listed once.
    pub fn expression_descendants(&self, id: ExpressionId) -> Vec<ExpressionId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Some(expr) = self.expression(current) else {
                continue;
            };
            out.push(current);
            let mut subs = expr.sub_expression_ids();
            subs.reverse();
            stack.extend(subs);
        }
        out
    }

    /// Expressions owned by a statement, optionally including descendants' expressions.
    pub fn find_expressions(&self, statement: StatementId, deep: bool) -> Vec<ExpressionId> {
        let roots = if deep {
            self.descendants_and_self(statement)
        } else {
            vec![statement]
        };
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for stmt_id in roots {
            let Some(stmt) = self.statement(stmt_id) else {
                continue;
            };
            for root in stmt.expression_ids() {
                for e in self.expression_descendants(root) {
                    if seen.insert(e) {
                        out.push(e);
                    }
                }
            }
        }
        out
    }

    fn component_position(&self, id: ExpressionId) -> ModelResult<(ExpressionId, usize)> {
        let expr = self
            .expression(id)
            .ok_or(ModelError::UnknownExpression(id))?;
        let parent_id = expr
            .parent_expression
            .ok_or(ModelError::NoParentExpression { expression: id })?;
        let parent = self
            .expression(parent_id)
            .ok_or(ModelError::UnknownExpression(parent_id))?;
        let position = parent
            .components
            .iter()
            .position(|c| *c == id)
            .ok_or(ModelError::DetachedExpression { expression: id })?;
        Ok((parent_id, position))
    }

    /// Components of the parent that come before `id`.
    pub fn siblings_before(&self, id: ExpressionId) -> ModelResult<Vec<ExpressionId>> {
        let (parent, position) = self.component_position(id)?;
        let components = &self
            .expression(parent)
            .ok_or(ModelError::UnknownExpression(parent))?
            .components;
        Ok(components[..position].to_vec())
    }

    /// Components of the parent that come after `id`.
    pub fn siblings_after(&self, id: ExpressionId) -> ModelResult<Vec<ExpressionId>> {
        let (parent, position) = self.component_position(id)?;
        let components = &self
            .expression(parent)
            .ok_or(ModelError::UnknownExpression(parent))?
            .components;
        Ok(components[position + 1..].to_vec())
    }

    /// Names of the segments of a name prefix (`A::B::` gives `["A", "B"]`).
    pub fn prefix_names(&self, prefix: ExpressionId) -> Vec<String> {
        self.expression(prefix)
            .map(|p| {
                p.components
                    .iter()
                    .filter_map(|c| self.expression(*c).and_then(Expression::used_name))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Source text rendering of an expression.
    pub fn render(&self, id: ExpressionId) -> String {
        let mut out = String::new();
        self.render_into(id, &mut out);
        out
    }

    fn render_into(&self, id: ExpressionId, out: &mut String) {
        let Some(expr) = self.expression(id) else {
            return;
        };
        let render_prefix = |name: &NameData, out: &mut String| {
            if let Some(prefix) = name.prefix {
                self.render_into(prefix, out);
            }
        };
        match &expr.kind {
            ExpressionKind::Group | ExpressionKind::NamePrefix => {
                for c in &expr.components {
                    self.render_into(*c, out);
                }
            }
            ExpressionKind::NameUse(name) | ExpressionKind::VariableUse { name, .. } => {
                render_prefix(name, out);
                out.push_str(&name.name);
            }
            ExpressionKind::TypeUse {
                name,
                type_arguments,
            } => {
                render_prefix(name, out);
                out.push_str(&name.name);
                if !type_arguments.is_empty() {
                    out.push('<');
                    self.render_list(type_arguments, out);
                    out.push('>');
                }
            }
            ExpressionKind::MethodCall(call) => {
                render_prefix(&call.name, out);
                out.push_str(&call.name.name);
                out.push('(');
                self.render_list(&call.arguments, out);
                out.push(')');
            }
            ExpressionKind::VariableDeclaration(decl) => {
                if let Some(t) = decl.variable_type {
                    self.render_into(t, out);
                    out.push(' ');
                }
                out.push_str(&decl.name);
            }
            ExpressionKind::Literal { text, .. } | ExpressionKind::Operator { text } => {
                out.push_str(text)
            }
        }
    }

    fn render_list(&self, ids: &[ExpressionId], out: &mut String) {
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.render_into(*id, out);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32, column: u32) -> Location {
        Location::new("a.cpp", line, column)
    }

    fn name_use(tree: &mut ScopeTree, name: &str) -> ExpressionId {
        tree.alloc_expression(Expression::new(
            ExpressionKind::NameUse(NameData::new(name)),
            Language::CPlusPlus,
            Some(loc(1, 1)),
        ))
    }

    fn operator(tree: &mut ScopeTree, text: &str) -> ExpressionId {
        tree.alloc_expression(Expression::new(
            ExpressionKind::Operator {
                text: text.to_string(),
            },
            Language::CPlusPlus,
            Some(loc(1, 1)),
        ))
    }

    fn namespace(tree: &mut ScopeTree, parent: StatementId, name: &str) -> StatementId {
        let stmt = Statement::new(
            StatementKind::Namespace(NamespaceData {
                header: ScopeHeader::new(name, ScopeFacet::new("a.cpp", AccessModifier::None)),
            }),
            Language::CPlusPlus,
            loc(1, 1),
        );
        let id = tree.alloc_statement(stmt);
        tree.append_child(parent, id);
        id
    }

    mod location_tests {
        use super::*;

        #[test]
        fn xpath_containment_respects_segment_boundaries() {
            let outer = loc(1, 1).with_xpath("/unit[1]/function[1]");
            let inner = loc(2, 1).with_xpath("/unit[1]/function[1]/block[1]");
            let sibling = loc(9, 1).with_xpath("/unit[1]/function[10]");
            assert!(outer.contains(&inner));
            assert!(!outer.contains(&sibling));
        }

        #[test]
        fn position_containment_without_xpath() {
            let outer = loc(1, 1).with_end(10, 1);
            assert!(outer.contains(&loc(5, 3)));
            assert!(!outer.contains(&loc(11, 1)));
            assert!(!outer.contains(&Location::new("b.cpp", 5, 3)));
        }

        #[test]
        fn precedes_requires_same_file() {
            assert!(loc(1, 5).precedes(&loc(2, 1)));
            assert!(!loc(2, 1).precedes(&loc(1, 5)));
            assert!(!Location::new("b.cpp", 1, 1).precedes(&loc(2, 1)));
        }
    }

    mod tree_tests {
        use super::*;

        #[test]
        fn append_child_sets_parent() {
            let mut tree = ScopeTree::new(Language::CPlusPlus);
            let root = tree.root();
            let a = namespace(&mut tree, root, "A");
            let b = namespace(&mut tree, a, "B");
            assert_eq!(tree.statement(b).unwrap().parent, Some(a));
            assert_eq!(tree.ancestors(b), vec![a, root]);
            assert_eq!(tree.full_name(b), "A.B");
            assert!(tree.is_global(root));
            assert!(!tree.is_global(a));
        }

        #[test]
        fn graft_shifts_every_id() {
            let mut left = ScopeTree::new(Language::CPlusPlus);
            let left_root = left.root();
            namespace(&mut left, left_root, "L");

            let mut right = ScopeTree::new(Language::CPlusPlus);
            let right_root = right.root();
            let r = namespace(&mut right, right_root, "R");
            let expr = name_use(&mut right, "x");
            right.set_content(r, expr);

            let grafted = left.graft(right);
            let grafted_root = left.statement(grafted).unwrap();
            let child = grafted_root.children[0];
            assert_eq!(left.statement(child).unwrap().name(), Some("R"));
            assert_eq!(left.statement(child).unwrap().parent, Some(grafted));
            let content = left.statement(child).unwrap().content.unwrap();
            assert_eq!(left.expression_statement(content), Some(child));
            assert_eq!(left.render(content), "x");
        }

        #[test]
        fn discard_frees_subtree() {
            let mut tree = ScopeTree::new(Language::CPlusPlus);
            let root = tree.root();
            let a = namespace(&mut tree, root, "A");
            let b = namespace(&mut tree, a, "B");
            let expr = name_use(&mut tree, "x");
            tree.set_content(b, expr);
            tree.discard_statement(a);
            assert!(tree.statement(a).is_none());
            assert!(tree.statement(b).is_none());
            assert!(tree.expression(expr).is_none());
            assert_eq!(tree.statement_count(), 1);
        }
    }

    mod expression_tests {
        use super::*;

        #[test]
        fn render_prefixed_name() {
            let mut tree = ScopeTree::new(Language::CPlusPlus);
            let prefix = tree.alloc_expression(Expression::new(
                ExpressionKind::NamePrefix,
                Language::CPlusPlus,
                None,
            ));
            let a = name_use(&mut tree, "A");
            let op = operator(&mut tree, "::");
            tree.push_component(prefix, a);
            tree.push_component(prefix, op);
            let foo = tree.alloc_expression(Expression::new(
                ExpressionKind::NameUse(NameData {
                    name: "Foo".to_string(),
                    prefix: Some(prefix),
                }),
                Language::CPlusPlus,
                None,
            ));
            tree.adopt_expression(foo, prefix);
            assert_eq!(tree.render(foo), "A::Foo");
            assert_eq!(tree.prefix_names(prefix), vec!["A".to_string()]);
        }

        #[test]
        fn sibling_queries_follow_component_order() {
            let mut tree = ScopeTree::new(Language::CPlusPlus);
            let group =
                tree.alloc_expression(Expression::new(ExpressionKind::Group, Language::CPlusPlus, None));
            let a = name_use(&mut tree, "a");
            let op = operator(&mut tree, "->");
            let b = name_use(&mut tree, "b");
            for c in [a, op, b] {
                tree.push_component(group, c);
            }
            assert_eq!(tree.siblings_before(b).unwrap(), vec![a, op]);
            assert_eq!(tree.siblings_after(a).unwrap(), vec![op, b]);
            assert!(tree.siblings_after(b).unwrap().is_empty());
        }

        #[test]
        fn detached_component_is_an_error() {
            let mut tree = ScopeTree::new(Language::CPlusPlus);
            let group =
                tree.alloc_expression(Expression::new(ExpressionKind::Group, Language::CPlusPlus, None));
            let stray = name_use(&mut tree, "stray");
            tree.adopt_expression(group, stray);
            assert_eq!(
                tree.siblings_before(stray),
                Err(ModelError::DetachedExpression { expression: stray })
            );
            let orphan = name_use(&mut tree, "orphan");
            assert!(matches!(
                tree.siblings_after(orphan),
                Err(ModelError::NoParentExpression { .. })
            ));
        }
    }

    mod enum_tests {
        use super::*;

        #[test]
        fn access_from_specifiers_combines_protected_internal() {
            assert_eq!(
                AccessModifier::from_specifiers(&["protected", "internal"]),
                Some(AccessModifier::ProtectedInternal)
            );
            assert_eq!(
                AccessModifier::from_specifiers(&["static", "public"]),
                Some(AccessModifier::Public)
            );
            assert_eq!(AccessModifier::from_specifiers(&["static"]), None);
        }

        #[test]
        fn language_round_trips_srcml_names() {
            for lang in [Language::C, Language::CPlusPlus, Language::Java, Language::CSharp] {
                assert_eq!(Language::from_srcml(lang.as_str()), Some(lang));
            }
            assert_eq!(Language::from_srcml("Python"), None);
        }

        #[test]
        fn arity_accepts_defaults_and_varargs() {
            let fixed = Arity {
                required: 1,
                total: 2,
                variadic: false,
            };
            assert!(!fixed.accepts(0));
            assert!(fixed.accepts(1));
            assert!(fixed.accepts(2));
            assert!(!fixed.accepts(3));
            let varargs = Arity {
                variadic: true,
                ..fixed
            };
            assert!(varargs.accepts(7));
        }
    }
}
