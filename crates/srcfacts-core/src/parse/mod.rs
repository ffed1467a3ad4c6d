//! Tag-driven parser dispatch.
//!
//! A [`CodeParser`] turns one srcML unit into a file-local [`ScopeTree`].
//! Element tags are looked up in a [`LanguageRules`] table that maps each
//! tag to a [`StatementRule`]; the shared builder then constructs the
//! statement and its expressions. Tags with no rule are skipped, so an
//! unrecognized construct never fails the unit.
//!
//! Languages differ only through [`LanguageRules`]:
//!
//! - extra or overridden tags (`import`/`package` in Java, access regions in C++)
//! - accessibility and `partial` policy
//! - classification of `using`/`import` elements into imports, aliases and blocks
//! - which operators separate members in expression context

mod expressions;

use thiserror::Error;

use crate::markup::Element;
use crate::model::{
    AccessModifier, ExpressionId, Language, Location, MethodData, MethodRole, MethodSignature,
    NamespaceData, PropertyData, ScopeFacet, ScopeHeader, ScopeTree, Statement, StatementId,
    StatementKind, TypeData, TypeKind,
};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised before parsing of a unit can start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The element handed to the parser is not a unit.
    #[error("expected a unit element, found <{found}>")]
    NotAUnit { found: String },

    /// The unit carries no `filename` attribute and none was supplied.
    #[error("unit has no filename attribute")]
    MissingFileName,
}

/// Result type for parse operations.
pub type ParseResult<T> = Result<T, ParseError>;

// ============================================================================
// Rules
// ============================================================================

/// How an element tag becomes a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementRule {
    Block,
    Namespace,
    /// Java `package`; consumed at the unit level.
    Package,
    Type { kind: TypeKind, is_reference: bool },
    Method { role: MethodRole, is_reference: bool },
    Property,
    If,
    /// `if_stmt` wrapper holding `if`, else-if and `else` parts.
    IfGroup,
    While,
    DoWhile,
    For,
    Foreach,
    Switch,
    Case,
    DefaultCase,
    Try,
    /// `using` element, classified by [`LanguageRules::classify_using`].
    Using,
    /// Java `import` element, classified like `using`.
    Import,
    /// Resource block (`using (...) {}` in its dedicated markup).
    UsingBlock,
    Extern,
    Label,
    Goto,
    Break,
    Continue,
    Return,
    Throw,
    Lock,
    ExpressionStatement,
    DeclarationStatement,
    /// Bare `decl` in statement position (enum values).
    Declaration,
    Empty,
    /// C++ `public:`/`private:`/`protected:` region.
    AccessRegion(AccessModifier),
    /// Wrapper whose statement children belong to the enclosing scope.
    Transparent,
}

/// Tag table shared by every language.
pub fn common_statement_rule(tag: &str) -> Option<StatementRule> {
    use StatementRule as R;
    let rule = match tag {
        "block" => R::Block,
        "namespace" => R::Namespace,
        "class" => type_rule(TypeKind::Class, false),
        "class_decl" => type_rule(TypeKind::Class, true),
        "struct" => type_rule(TypeKind::Struct, false),
        "struct_decl" => type_rule(TypeKind::Struct, true),
        "union" => type_rule(TypeKind::Union, false),
        "union_decl" => type_rule(TypeKind::Union, true),
        "interface" => type_rule(TypeKind::Interface, false),
        "interface_decl" => type_rule(TypeKind::Interface, true),
        "enum" => type_rule(TypeKind::Enumeration, false),
        "enum_decl" => type_rule(TypeKind::Enumeration, true),
        "function" => method_rule(MethodRole::Method, false),
        "function_decl" => method_rule(MethodRole::Method, true),
        "constructor" => method_rule(MethodRole::Constructor, false),
        "constructor_decl" => method_rule(MethodRole::Constructor, true),
        "destructor" => method_rule(MethodRole::Destructor, false),
        "destructor_decl" => method_rule(MethodRole::Destructor, true),
        "property" => R::Property,
        "if" => R::If,
        "if_stmt" => R::IfGroup,
        "while" => R::While,
        "do" => R::DoWhile,
        "for" => R::For,
        "foreach" => R::Foreach,
        "switch" => R::Switch,
        "case" => R::Case,
        "default" => R::DefaultCase,
        "try" => R::Try,
        "using" => R::Using,
        "using_stmt" => R::UsingBlock,
        "extern" => R::Extern,
        "label" => R::Label,
        "goto" => R::Goto,
        "break" => R::Break,
        "continue" => R::Continue,
        "return" => R::Return,
        "throw" => R::Throw,
        "expr_stmt" => R::ExpressionStatement,
        "decl_stmt" => R::DeclarationStatement,
        "decl" => R::Declaration,
        "empty_stmt" => R::Empty,
        "template" | "block_content" => R::Transparent,
        _ => return None,
    };
    Some(rule)
}

fn type_rule(kind: TypeKind, is_reference: bool) -> StatementRule {
    StatementRule::Type { kind, is_reference }
}

fn method_rule(role: MethodRole, is_reference: bool) -> StatementRule {
    StatementRule::Method { role, is_reference }
}

/// What a `using`/`import` element means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsingForm<'e> {
    /// Opens every member of the named namespace.
    Import { target: &'e Element },
    /// Binds one name to one target; `None` takes the target's last segment.
    Alias {
        alias_name: Option<&'e str>,
        target: &'e Element,
    },
    /// Resource-scoped block.
    Block,
    /// Not recognized; produces no statement.
    Unknown,
}

/// Per-language parsing policy.
pub trait LanguageRules: Send + Sync {
    /// Language stamped on every node.
    fn language(&self) -> Language;

    /// Rule for an element tag; `None` skips the element.
    fn statement_rule(&self, tag: &str) -> Option<StatementRule> {
        common_statement_rule(tag)
    }

    /// Declared accessibility for a list of specifier keywords.
    fn access_modifier(&self, specifiers: &[String]) -> AccessModifier {
        AccessModifier::from_specifiers(specifiers).unwrap_or_default()
    }

    /// Whether the specifiers mark a partial type or method.
    fn is_partial(&self, specifiers: &[String]) -> bool {
        specifiers.iter().any(|s| s == "partial")
    }

    /// Classify a `using`/`import` element.
    fn classify_using<'e>(&self, element: &'e Element) -> UsingForm<'e>;

    /// The file's `package` declaration wraps every other statement (Java).
    fn package_wraps_unit(&self) -> bool {
        false
    }

    /// Operators that separate members in expression context.
    fn member_operators(&self) -> &'static [&'static str];
}

impl<T: LanguageRules + ?Sized> LanguageRules for Box<T> {
    fn language(&self) -> Language {
        (**self).language()
    }

    fn statement_rule(&self, tag: &str) -> Option<StatementRule> {
        (**self).statement_rule(tag)
    }

    fn access_modifier(&self, specifiers: &[String]) -> AccessModifier {
        (**self).access_modifier(specifiers)
    }

    fn is_partial(&self, specifiers: &[String]) -> bool {
        (**self).is_partial(specifiers)
    }

    fn classify_using<'e>(&self, element: &'e Element) -> UsingForm<'e> {
        (**self).classify_using(element)
    }

    fn package_wraps_unit(&self) -> bool {
        (**self).package_wraps_unit()
    }

    fn member_operators(&self) -> &'static [&'static str] {
        (**self).member_operators()
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parser for one language.
#[derive(Debug, Clone)]
pub struct CodeParser<R> {
    rules: R,
}

impl<R: LanguageRules> CodeParser<R> {
    pub fn new(rules: R) -> Self {
        CodeParser { rules }
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    pub fn language(&self) -> Language {
        self.rules.language()
    }

    /// Parse a unit, using its `filename` attribute as the file identity.
    pub fn parse_unit(&self, unit: &Element) -> ParseResult<ScopeTree> {
        let file = unit.file_name().ok_or(ParseError::MissingFileName)?;
        self.parse_unit_as(unit, file)
    }

    /// Parse a unit, stamping `file` on every location.
    pub fn parse_unit_as(&self, unit: &Element, file: &str) -> ParseResult<ScopeTree> {
        if !unit.is("unit") {
            return Err(ParseError::NotAUnit {
                found: unit.tag().to_string(),
            });
        }
        let language = self.rules.language();
        let mut builder = Builder {
            rules: &self.rules,
            language,
            file: file.to_string(),
            tree: ScopeTree::new(language),
            region: None,
        };
        let root = Statement::new(
            StatementKind::Namespace(NamespaceData {
                header: ScopeHeader::new("", builder.facet(AccessModifier::None)),
            }),
            language,
            builder.location(unit, false),
        );
        builder.tree = ScopeTree::with_root(root);
        let root_id = builder.tree.root();

        let mut target = root_id;
        if self.rules.package_wraps_unit() {
            if let Some(package) = unit.child("package") {
                target = builder.package_namespaces(root_id, unit, package);
            }
        }
        builder.parse_body(target, unit.elements());

        tracing::debug!(
            file,
            language = %language,
            statements = builder.tree.statement_count(),
            expressions = builder.tree.expression_count(),
            "parsed unit"
        );
        Ok(builder.tree)
    }
}

// ============================================================================
// Name Helpers
// ============================================================================

/// One piece of a possibly qualified name.
#[derive(Debug, Clone, Copy)]
pub(crate) enum NamePart<'e> {
    Name(&'e Element),
    Operator(&'e Element),
}

/// Split a `name` element into its segments and separators.
///
/// A simple, generic (`List<T>`) or indexed (`a[i]`) name is one segment.
pub(crate) fn name_parts(name: &Element) -> Vec<NamePart<'_>> {
    let has_operator = name.elements().any(|c| c.is("operator"));
    if !name.has_child("name") || !has_operator {
        return vec![NamePart::Name(name)];
    }
    name.elements()
        .filter_map(|c| match c.tag() {
            "name" => Some(NamePart::Name(c)),
            "operator" => Some(NamePart::Operator(c)),
            _ => None,
        })
        .collect()
}

/// Text of one name segment, without generic arguments or index.
pub(crate) fn segment_text(segment: &Element) -> String {
    match segment.child("name") {
        Some(inner) if !segment.elements().any(|c| c.is("operator")) => segment_text(inner),
        _ => segment.text().trim().to_string(),
    }
}

/// Last segment of a possibly qualified name (`A::B::Foo` gives `Foo`).
pub fn simple_name(name: &Element) -> String {
    name_parts(name)
        .iter()
        .rev()
        .find_map(|p| match p {
            NamePart::Name(n) if segment_text(n) != "*" => Some(segment_text(n)),
            _ => None,
        })
        .unwrap_or_default()
}

/// Every segment of a qualified name (`A.B.C` gives `["A", "B", "C"]`).
pub fn qualified_names(name: &Element) -> Vec<String> {
    name_parts(name)
        .iter()
        .filter_map(|p| match p {
            NamePart::Name(n) => Some(segment_text(n)),
            NamePart::Operator(_) => None,
        })
        .filter(|s| !s.is_empty() && s != "*")
        .collect()
}

/// Specifier keywords on an element and on its `type` child.
pub fn specifiers(element: &Element) -> Vec<String> {
    let own = element.children_tagged("specifier");
    let typed = element
        .child("type")
        .into_iter()
        .flat_map(|t| t.children_tagged("specifier"));
    own.chain(typed).map(|s| s.text().trim().to_string()).collect()
}

/// Statement elements of a block, looking through `block_content`.
fn block_items(block: &Element) -> Vec<&Element> {
    block
        .elements()
        .flat_map(|c| {
            if c.is("block_content") {
                c.elements().collect()
            } else {
                vec![c]
            }
        })
        .collect()
}

/// Statements of a body item: a block's contents, or the item itself.
fn body_of(item: &Element) -> Vec<&Element> {
    if item.is("block") {
        block_items(item)
    } else {
        vec![item]
    }
}

fn is_expression_tag(element: &Element) -> bool {
    matches!(element.tag(), "expr" | "decl" | "function_decl")
}

fn first_expression_element(element: &Element) -> Option<&Element> {
    element.elements().find(|c| is_expression_tag(c))
}

/// Children with `control` wrappers flattened (for/foreach markup).
fn control_parts(element: &Element) -> Vec<&Element> {
    element
        .elements()
        .flat_map(|c| {
            if c.is("control") {
                c.elements().collect()
            } else {
                vec![c]
            }
        })
        .collect()
}

/// Parent type names from `super`/`super_list`/`extends`/`implements`.
fn parent_type_elements(element: &Element) -> Vec<&Element> {
    fn collect<'e>(element: &'e Element, out: &mut Vec<&'e Element>) {
        for child in element.elements() {
            match child.tag() {
                "name" => out.push(child),
                "super" | "super_list" | "extends" | "implements" => collect(child, out),
                _ => {}
            }
        }
    }
    let mut out = Vec::new();
    for child in element.elements() {
        if matches!(child.tag(), "super" | "super_list") {
            collect(child, &mut out);
        }
    }
    out
}

fn is_void(type_element: &Element) -> bool {
    type_element
        .children_tagged("name")
        .last()
        .is_some_and(|n| n.text().trim() == "void")
}

// ============================================================================
// Builder
// ============================================================================

/// Mutable state while parsing one unit.
pub(crate) struct Builder<'r, R: ?Sized> {
    rules: &'r R,
    language: Language,
    file: String,
    tree: ScopeTree,
    /// Access of the enclosing C++ region, if any.
    region: Option<AccessModifier>,
}

impl<R: LanguageRules + ?Sized> Builder<'_, R> {
    fn location(&self, element: &Element, is_reference: bool) -> Location {
        Location {
            file: self.file.clone(),
            line: element.line,
            column: element.column,
            end_line: element.end_line,
            end_column: element.end_column,
            xpath: element.xpath().to_string(),
            is_reference,
        }
    }

    fn facet(&self, accessibility: AccessModifier) -> ScopeFacet {
        ScopeFacet::new(self.file.clone(), accessibility)
    }

    /// Declared access, else the enclosing region's access.
    fn access_for(&self, specifiers: &[String]) -> AccessModifier {
        match self.rules.access_modifier(specifiers) {
            AccessModifier::None => self.region.unwrap_or_default(),
            declared => declared,
        }
    }

    fn new_statement(&self, kind: StatementKind, element: &Element, is_reference: bool) -> Statement {
        Statement::new(kind, self.language, self.location(element, is_reference))
    }

    /// Store a statement and mark it as owner of its expressions.
    fn finish(&mut self, statement: Statement) -> StatementId {
        let expressions = statement.expression_ids();
        let id = self.tree.alloc_statement(statement);
        for expr in expressions {
            self.tree.attach_expression(id, expr);
        }
        id
    }

    fn simple(&mut self, kind: StatementKind, element: &Element) -> StatementId {
        let stmt = self.new_statement(kind, element, false);
        self.finish(stmt)
    }

    fn parse_body<'e>(&mut self, parent: StatementId, elements: impl IntoIterator<Item = &'e Element>) {
        for element in elements {
            for child in self.parse_statement(element) {
                self.tree.append_child(parent, child);
            }
        }
    }

    fn add_body_item(&mut self, parent: StatementId, item: &Element) {
        self.parse_body(parent, body_of(item));
    }

    fn add_children_except(&mut self, parent: StatementId, element: &Element, skip: &[&str]) {
        for child in element.elements() {
            if !skip.contains(&child.tag()) {
                self.add_body_item(parent, child);
            }
        }
    }

    fn push_else(&mut self, if_id: StatementId, child: StatementId) {
        if let Some(stmt) = self.tree.statement_mut(child) {
            stmt.parent = Some(if_id);
        }
        if let Some(StatementKind::If { else_children, .. }) =
            self.tree.statement_mut(if_id).map(|s| &mut s.kind)
        {
            else_children.push(child);
        }
    }

    fn add_else_item(&mut self, if_id: StatementId, item: &Element) {
        for element in body_of(item) {
            for child in self.parse_statement(element) {
                self.push_else(if_id, child);
            }
        }
    }

    fn with_region<T>(&mut self, region: Option<AccessModifier>, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.region, region);
        let out = f(self);
        self.region = saved;
        out
    }

    fn condition_of(&mut self, element: &Element) -> Option<ExpressionId> {
        let condition = element.child("condition")?;
        let expr = first_expression_element(condition)?;
        self.parse_expression(expr)
    }

    fn expression_children(&mut self, element: &Element) -> Option<ExpressionId> {
        let items: Vec<&Element> = element.elements().filter(|c| is_expression_tag(c)).collect();
        self.parse_expression_list(&items, element)
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    fn parse_statement(&mut self, element: &Element) -> Vec<StatementId> {
        use StatementRule as R;
        let Some(rule) = self.rules.statement_rule(element.tag()) else {
            tracing::trace!(tag = element.tag(), line = element.line, "skipping element");
            return Vec::new();
        };
        let one = |id: StatementId| vec![id];
        match rule {
            R::Block => {
                let id = self.simple(StatementKind::Block, element);
                self.parse_body(id, block_items(element));
                one(id)
            }
            R::Namespace => self.parse_namespace(element).into_iter().collect(),
            R::Package => Vec::new(),
            R::Type { kind, is_reference } => one(self.parse_type(element, kind, is_reference)),
            R::Method { role, is_reference } => one(self.parse_method(element, role, is_reference)),
            R::Property => one(self.parse_property(element)),
            R::If => one(self.parse_if(element)),
            R::IfGroup => self.parse_if_group(element).into_iter().collect(),
            R::While => {
                let condition = self.condition_of(element);
                let id = self.simple(StatementKind::While { condition }, element);
                self.add_children_except(id, element, &["condition"]);
                one(id)
            }
            R::DoWhile => {
                let condition = self.condition_of(element);
                let id = self.simple(StatementKind::DoWhile { condition }, element);
                self.add_children_except(id, element, &["condition"]);
                one(id)
            }
            R::For => one(self.parse_for(element)),
            R::Foreach => one(self.parse_foreach(element)),
            R::Switch => {
                let condition = self.condition_of(element);
                let id = self.simple(StatementKind::Switch { condition }, element);
                self.add_children_except(id, element, &["condition"]);
                one(id)
            }
            R::Case => {
                let label = element.child("expr");
                let condition = label.and_then(|e| self.parse_expression(e));
                let id = self.simple(
                    StatementKind::Case {
                        condition,
                        is_default: false,
                    },
                    element,
                );
                let mut label_seen = false;
                for child in element.elements() {
                    if child.is("expr") && !label_seen {
                        label_seen = true;
                        continue;
                    }
                    self.add_body_item(id, child);
                }
                one(id)
            }
            R::DefaultCase => {
                let id = self.simple(
                    StatementKind::Case {
                        condition: None,
                        is_default: true,
                    },
                    element,
                );
                self.add_children_except(id, element, &[]);
                one(id)
            }
            R::Try => one(self.parse_try(element)),
            R::Using | R::Import => self.parse_using(element).into_iter().collect(),
            R::UsingBlock => one(self.parse_using_block(element)),
            R::Extern => {
                let linkage = element.child("literal").map(|l| l.text().trim().to_string());
                let id = self.simple(StatementKind::Extern { linkage }, element);
                self.add_children_except(id, element, &["literal"]);
                one(id)
            }
            R::Label => {
                let name = element
                    .child("name")
                    .map(|n| n.text().trim().to_string())
                    .unwrap_or_default();
                one(self.simple(StatementKind::Label { name }, element))
            }
            R::Goto => self.content_statement(StatementKind::Goto, element, "name"),
            R::Break => one(self.simple(StatementKind::Break, element)),
            R::Continue => one(self.simple(StatementKind::Continue, element)),
            R::Return => self.content_statement(StatementKind::Return, element, "expr"),
            R::Throw => self.content_statement(StatementKind::Throw, element, "expr"),
            R::Lock => {
                let content = element
                    .child("init")
                    .or_else(|| element.child("condition"))
                    .and_then(|c| self.expression_children(c));
                let id = self.simple(StatementKind::Lock, element);
                if let Some(content) = content {
                    self.tree.set_content(id, content);
                }
                self.add_children_except(id, element, &["init", "condition"]);
                one(id)
            }
            R::ExpressionStatement => {
                let content = element.child("expr").and_then(|e| self.parse_expression(e));
                let id = self.simple(StatementKind::Expression, element);
                if let Some(content) = content {
                    self.tree.set_content(id, content);
                }
                self.add_children_except(id, element, &["expr"]);
                one(id)
            }
            R::DeclarationStatement => {
                let content = self.expression_children(element);
                let id = self.simple(StatementKind::Declaration, element);
                if let Some(content) = content {
                    self.tree.set_content(id, content);
                }
                one(id)
            }
            R::Declaration => {
                let content = self.parse_expression(element);
                let id = self.simple(StatementKind::Declaration, element);
                if let Some(content) = content {
                    self.tree.set_content(id, content);
                }
                one(id)
            }
            R::Empty => one(self.simple(StatementKind::Empty, element)),
            R::AccessRegion(access) => self.with_region(Some(access), |b| {
                element
                    .elements()
                    .flat_map(|c| b.parse_statement(c))
                    .collect::<Vec<_>>()
            }),
            R::Transparent => element
                .elements()
                .flat_map(|c| self.parse_statement(c))
                .collect(),
        }
    }

    fn content_statement(&mut self, kind: StatementKind, element: &Element, tag: &str) -> Vec<StatementId> {
        let content = element.child(tag).and_then(|e| self.parse_expression(e));
        let id = self.simple(kind, element);
        if let Some(content) = content {
            self.tree.set_content(id, content);
        }
        vec![id]
    }

    // ------------------------------------------------------------------------
    // Named scopes
    // ------------------------------------------------------------------------

    /// Nested namespaces for a Java package; returns the innermost.
    fn package_namespaces(&mut self, root: StatementId, unit: &Element, package: &Element) -> StatementId {
        let names = package.child("name").map(qualified_names).unwrap_or_default();
        let mut current = root;
        for name in names {
            let stmt = Statement::new(
                StatementKind::Namespace(NamespaceData {
                    header: ScopeHeader::new(name, self.facet(AccessModifier::None)),
                }),
                self.language,
                self.location(unit, false),
            );
            let id = self.finish(stmt);
            self.tree.append_child(current, id);
            current = id;
        }
        current
    }

    fn parse_namespace(&mut self, element: &Element) -> Option<StatementId> {
        if element.has_child("init") {
            // `namespace fs = std::filesystem;`
            let alias_name = element.child("name").map(simple_name).unwrap_or_default();
            let target = element
                .child("init")
                .and_then(|init| init.descendants().into_iter().find(|d| d.is("name")))
                .and_then(|n| self.parse_scope_name(n));
            return Some(self.simple(StatementKind::Alias { target, alias_name }, element));
        }

        let names = match element.child("name") {
            Some(name) => qualified_names(name),
            None => Vec::new(),
        };
        let names = if names.is_empty() { vec![String::new()] } else { names };

        let mut outer = None;
        let mut current: Option<StatementId> = None;
        for name in names {
            let stmt = self.new_statement(
                StatementKind::Namespace(NamespaceData {
                    header: ScopeHeader::new(name, self.facet(AccessModifier::None)),
                }),
                element,
                false,
            );
            let id = self.finish(stmt);
            match current {
                Some(parent) => self.tree.append_child(parent, id),
                None => outer = Some(id),
            }
            current = Some(id);
        }
        let inner = current?;
        self.with_region(None, |b| {
            if let Some(block) = element.child("block") {
                b.parse_body(inner, block_items(block));
            }
        });
        outer
    }

    /// Declared name and optional qualifying prefix of a scope.
    fn declared_name(&mut self, element: &Element) -> (String, Option<ExpressionId>) {
        let Some(name) = element.child("name") else {
            return (String::new(), None);
        };
        let parts = name_parts(name);
        let Some(last) = parts.iter().rposition(|p| matches!(p, NamePart::Name(_))) else {
            return (String::new(), None);
        };
        let text = match parts[last] {
            NamePart::Name(n) => segment_text(n),
            NamePart::Operator(_) => String::new(),
        };
        (text, self.build_prefix(&parts[..last]))
    }

    fn parse_type(&mut self, element: &Element, kind: TypeKind, is_reference: bool) -> StatementId {
        let (name, prefix) = self.declared_name(element);
        let specs = specifiers(element);
        let facet = self
            .facet(self.access_for(&specs))
            .with_prefix(prefix)
            .with_partial(self.rules.is_partial(&specs));
        let parent_types = self.with_region(None, |b| {
            parent_type_elements(element)
                .into_iter()
                .filter_map(|n| b.parse_type_use(n))
                .collect()
        });
        let stmt = self.new_statement(
            StatementKind::Type(TypeData {
                header: ScopeHeader::new(name, facet),
                kind,
                parent_types,
            }),
            element,
            is_reference,
        );
        let id = self.finish(stmt);
        self.with_region(None, |b| {
            if let Some(block) = element.child("block") {
                b.parse_body(id, block_items(block));
            }
        });
        id
    }

    fn parse_method(&mut self, element: &Element, role: MethodRole, is_reference: bool) -> StatementId {
        let (name, prefix) = self.declared_name(element);
        let specs = specifiers(element);
        let facet = self
            .facet(self.access_for(&specs))
            .with_prefix(prefix)
            .with_partial(self.rules.is_partial(&specs));

        self.with_region(None, |b| {
            let return_type = element
                .child("type")
                .filter(|t| t.attr("ref").is_none() && !is_void(t))
                .and_then(|t| b.parse_type_use(t));
            let parameters = element
                .child("parameter_list")
                .map(|list| {
                    list.elements()
                        .filter(|p| p.is("parameter") || p.is("param"))
                        .filter_map(|p| b.parse_parameter(p))
                        .collect()
                })
                .unwrap_or_default();
            let initializers = element
                .elements()
                .filter(|c| c.is("member_init_list") || c.is("member_list"))
                .flat_map(|list| list.children_tagged("call"))
                .flat_map(|call| b.parse_call(call, false, true))
                .collect();

            let stmt = b.new_statement(
                StatementKind::Method(MethodData {
                    header: ScopeHeader::new(name, facet),
                    role,
                    signatures: vec![MethodSignature {
                        file: b.file.clone(),
                        return_type,
                        parameters,
                    }],
                    initializers,
                }),
                element,
                is_reference,
            );
            let id = b.finish(stmt);
            if let Some(block) = element.child("block") {
                b.parse_body(id, block_items(block));
            }
            id
        })
    }

    fn parse_property(&mut self, element: &Element) -> StatementId {
        let (name, _) = self.declared_name(element);
        let specs = specifiers(element);
        let facet = self.facet(self.access_for(&specs));
        let property_types = element
            .child("type")
            .and_then(|t| self.parse_type_use(t))
            .into_iter()
            .collect();
        let stmt = self.new_statement(
            StatementKind::Property(PropertyData {
                header: ScopeHeader::new(name, facet),
                property_types,
            }),
            element,
            false,
        );
        let id = self.finish(stmt);
        self.with_region(None, |b| {
            if let Some(block) = element.child("block") {
                b.parse_body(id, block_items(block));
            }
        });
        id
    }

    // ------------------------------------------------------------------------
    // Control flow
    // ------------------------------------------------------------------------

    fn parse_if(&mut self, element: &Element) -> StatementId {
        let condition = self.condition_of(element);
        let id = self.simple(
            StatementKind::If {
                condition,
                else_children: Vec::new(),
            },
            element,
        );
        for child in element.elements() {
            match child.tag() {
                "condition" => {}
                "then" => {
                    for item in child.elements() {
                        self.add_body_item(id, item);
                    }
                }
                "else" => {
                    for item in child.elements() {
                        self.add_else_item(id, item);
                    }
                }
                _ => self.add_body_item(id, child),
            }
        }
        id
    }

    fn parse_if_group(&mut self, element: &Element) -> Option<StatementId> {
        let mut first = None;
        let mut last: Option<StatementId> = None;
        for child in element.elements() {
            match child.tag() {
                "if" => {
                    let id = self.parse_if(child);
                    match last {
                        Some(previous) => self.push_else(previous, id),
                        None => first = Some(id),
                    }
                    last = Some(id);
                }
                "else" => {
                    if let Some(previous) = last {
                        for item in child.elements() {
                            self.add_else_item(previous, item);
                        }
                    }
                }
                _ => {}
            }
        }
        first
    }

    fn parse_for(&mut self, element: &Element) -> StatementId {
        let parts = control_parts(element);
        let find = |tag: &str| parts.iter().copied().find(|p| p.is(tag));
        let initializer = find("init").and_then(|i| self.expression_children(i));
        let condition = find("condition")
            .and_then(first_expression_element)
            .and_then(|e| self.parse_expression(e));
        let incrementer = find("incr")
            .and_then(first_expression_element)
            .and_then(|e| self.parse_expression(e));
        let id = self.simple(
            StatementKind::For {
                initializer,
                condition,
                incrementer,
            },
            element,
        );
        for part in parts {
            if !matches!(part.tag(), "init" | "condition" | "incr") {
                self.add_body_item(id, part);
            }
        }
        id
    }

    fn parse_foreach(&mut self, element: &Element) -> StatementId {
        let parts = control_parts(element);
        let condition = parts
            .iter()
            .copied()
            .find(|p| p.is("init"))
            .and_then(|i| self.expression_children(i));
        let id = self.simple(StatementKind::Foreach { condition }, element);
        for part in parts {
            if !part.is("init") {
                self.add_body_item(id, part);
            }
        }
        id
    }

    fn parse_try(&mut self, element: &Element) -> StatementId {
        let id = self.simple(
            StatementKind::Try {
                catches: Vec::new(),
                finally: Vec::new(),
            },
            element,
        );
        for child in element.elements() {
            match child.tag() {
                "catch" => {
                    let catch = self.parse_catch(child);
                    self.push_try_part(id, catch, false);
                }
                "finally" => {
                    for item in child.elements() {
                        for stmt_el in body_of(item) {
                            for stmt in self.parse_statement(stmt_el) {
                                self.push_try_part(id, stmt, true);
                            }
                        }
                    }
                }
                _ => self.add_body_item(id, child),
            }
        }
        id
    }

    fn push_try_part(&mut self, try_id: StatementId, child: StatementId, is_finally: bool) {
        if let Some(stmt) = self.tree.statement_mut(child) {
            stmt.parent = Some(try_id);
        }
        if let Some(StatementKind::Try { catches, finally }) =
            self.tree.statement_mut(try_id).map(|s| &mut s.kind)
        {
            if is_finally {
                finally.push(child);
            } else {
                catches.push(child);
            }
        }
    }

    fn parse_catch(&mut self, element: &Element) -> StatementId {
        let parameter_element = element
            .child("parameter_list")
            .and_then(|l| l.elements().find(|p| p.is("parameter") || p.is("param")))
            .or_else(|| element.child("parameter"))
            .or_else(|| element.child("param"));
        let parameter = parameter_element.and_then(|p| self.parse_parameter(p));
        let id = self.simple(StatementKind::Catch { parameter }, element);
        self.add_children_except(id, element, &["parameter_list", "parameter", "param"]);
        id
    }

    fn parse_using(&mut self, element: &Element) -> Option<StatementId> {
        match self.rules.classify_using(element) {
            UsingForm::Import { target } => {
                let namespace = self.parse_scope_name(target);
                Some(self.simple(StatementKind::Import { namespace }, element))
            }
            UsingForm::Alias { alias_name, target } => {
                let alias_name = alias_name
                    .map(str::to_string)
                    .unwrap_or_else(|| simple_name(target));
                let target = self.parse_scope_name(target);
                Some(self.simple(StatementKind::Alias { target, alias_name }, element))
            }
            UsingForm::Block => Some(self.parse_using_block(element)),
            UsingForm::Unknown => {
                tracing::trace!(line = element.line, "unrecognized using form");
                None
            }
        }
    }

    fn parse_using_block(&mut self, element: &Element) -> StatementId {
        let initializer = element.child("init").and_then(|i| self.expression_children(i));
        let id = self.simple(StatementKind::UsingBlock { initializer }, element);
        self.add_children_except(id, element, &["init"]);
        id
    }
}

// ============================================================================
// Tests
// ============================================================================
