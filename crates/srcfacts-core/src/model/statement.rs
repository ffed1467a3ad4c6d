//! Statement nodes of the scope tree.

use serde::{Deserialize, Serialize};

use super::{AccessModifier, ExpressionId, Language, Location, StatementId, TypeKind};

// ============================================================================
// Named Scope Header
// ============================================================================

/// What one contributing declaration said about a named scope.
///
/// A freshly parsed scope has one facet; merging concatenates facets and
/// unmerging drops the facets of the removed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFacet {
    /// File that contributed this facet.
    pub file: String,
    /// Declared (or defaulted) accessibility.
    pub accessibility: AccessModifier,
    /// Qualifying prefix such as `A::B::` in `void A::B::Foo()`.
    pub prefix: Option<ExpressionId>,
    /// Declared `partial`.
    pub is_partial: bool,
    /// The prefix has been resolved and the node moved under its target.
    pub relocated: bool,
}

impl ScopeFacet {
    /// Create a facet for a declaration in `file`.
    pub fn new(file: impl Into<String>, accessibility: AccessModifier) -> Self {
        ScopeFacet {
            file: file.into(),
            accessibility,
            prefix: None,
            is_partial: false,
            relocated: false,
        }
    }

    /// Set the prefix expression.
    pub fn with_prefix(mut self, prefix: Option<ExpressionId>) -> Self {
        self.prefix = prefix;
        self
    }

    /// Set the partial flag.
    pub fn with_partial(mut self, is_partial: bool) -> Self {
        self.is_partial = is_partial;
        self
    }

    /// The prefix still waits for a target scope.
    pub fn is_pending(&self) -> bool {
        self.prefix.is_some() && !self.relocated
    }
}

/// Name plus per-contribution facets shared by every named scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeHeader {
    pub name: String,
    pub facets: Vec<ScopeFacet>,
}

impl ScopeHeader {
    /// Create a header with one facet.
    pub fn new(name: impl Into<String>, facet: ScopeFacet) -> Self {
        ScopeHeader {
            name: name.into(),
            facets: vec![facet],
        }
    }

    /// Header without facets (used for the empty global root).
    pub fn bare(name: impl Into<String>) -> Self {
        ScopeHeader {
            name: name.into(),
            facets: Vec::new(),
        }
    }

    /// First non-`None` accessibility in contribution order.
    pub fn accessibility(&self) -> AccessModifier {
        self.facets
            .iter()
            .map(|f| f.accessibility)
            .find(|a| *a != AccessModifier::None)
            .unwrap_or(AccessModifier::None)
    }

    /// First declared prefix.
    pub fn prefix(&self) -> Option<ExpressionId> {
        self.facets.iter().find_map(|f| f.prefix)
    }

    /// Any contribution declared the scope partial.
    pub fn is_partial(&self) -> bool {
        self.facets.iter().any(|f| f.is_partial)
    }

    /// Some contribution carries a prefix that has not been resolved yet.
    pub fn has_pending_prefix(&self) -> bool {
        self.facets.iter().any(ScopeFacet::is_pending)
    }

    /// Every contribution reached this position by relocation.
    pub fn is_floating(&self) -> bool {
        !self.facets.is_empty() && self.facets.iter().all(|f| f.relocated)
    }
}

// ============================================================================
// Kind-specific Data
// ============================================================================

/// Namespace data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceData {
    pub header: ScopeHeader,
}

/// Type definition data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeData {
    pub header: ScopeHeader,
    pub kind: TypeKind,
    /// Parent type references in declaration order (all contributions).
    pub parent_types: Vec<ExpressionId>,
}

/// Constructor/destructor/plain method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodRole {
    Method,
    Constructor,
    Destructor,
}

/// Return type and parameters contributed by one declaration of a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub file: String,
    pub return_type: Option<ExpressionId>,
    /// Ordered parameters (variable declaration expressions).
    pub parameters: Vec<ExpressionId>,
}

/// Method definition data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodData {
    pub header: ScopeHeader,
    pub role: MethodRole,
    pub signatures: Vec<MethodSignature>,
    /// Constructor member initializers (`: a_(1), Base(2)`).
    pub initializers: Vec<ExpressionId>,
}

impl MethodData {
    pub fn is_constructor(&self) -> bool {
        self.role == MethodRole::Constructor
    }

    pub fn is_destructor(&self) -> bool {
        self.role == MethodRole::Destructor
    }
}

/// Property definition data (accessors are child methods).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyData {
    pub header: ScopeHeader,
    pub property_types: Vec<ExpressionId>,
}

// ============================================================================
// Statement
// ============================================================================

/// Discriminated statement kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Block,
    Namespace(NamespaceData),
    Type(TypeData),
    Method(MethodData),
    Property(PropertyData),
    If {
        condition: Option<ExpressionId>,
        else_children: Vec<StatementId>,
    },
    While {
        condition: Option<ExpressionId>,
    },
    DoWhile {
        condition: Option<ExpressionId>,
    },
    For {
        initializer: Option<ExpressionId>,
        condition: Option<ExpressionId>,
        incrementer: Option<ExpressionId>,
    },
    Foreach {
        condition: Option<ExpressionId>,
    },
    Switch {
        condition: Option<ExpressionId>,
    },
    Case {
        condition: Option<ExpressionId>,
        is_default: bool,
    },
    Try {
        catches: Vec<StatementId>,
        finally: Vec<StatementId>,
    },
    Catch {
        parameter: Option<ExpressionId>,
    },
    UsingBlock {
        initializer: Option<ExpressionId>,
    },
    Lock,
    Extern {
        linkage: Option<String>,
    },
    Alias {
        target: Option<ExpressionId>,
        alias_name: String,
    },
    Import {
        namespace: Option<ExpressionId>,
    },
    Label {
        name: String,
    },
    Goto,
    Break,
    Continue,
    Return,
    Throw,
    /// Expression statement; the expression is the content.
    Expression,
    /// Declaration statement; the content groups the declared variables.
    Declaration,
    Empty,
}

/// The universal node of the scope tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub language: Language,
    pub parent: Option<StatementId>,
    pub children: Vec<StatementId>,
    pub content: Option<ExpressionId>,
    pub locations: Vec<Location>,
}

impl Statement {
    /// Create a parentless statement with one location.
    pub fn new(kind: StatementKind, language: Language, location: Location) -> Self {
        Statement {
            kind,
            language,
            parent: None,
            children: Vec::new(),
            content: None,
            locations: vec![location],
        }
    }

    /// Header of a namespace, type, method or property.
    pub fn header(&self) -> Option<&ScopeHeader> {
        match &self.kind {
            StatementKind::Namespace(data) => Some(&data.header),
            StatementKind::Type(data) => Some(&data.header),
            StatementKind::Method(data) => Some(&data.header),
            StatementKind::Property(data) => Some(&data.header),
            _ => None,
        }
    }

    /// Mutable header of a named scope.
    pub fn header_mut(&mut self) -> Option<&mut ScopeHeader> {
        match &mut self.kind {
            StatementKind::Namespace(data) => Some(&mut data.header),
            StatementKind::Type(data) => Some(&mut data.header),
            StatementKind::Method(data) => Some(&mut data.header),
            StatementKind::Property(data) => Some(&mut data.header),
            _ => None,
        }
    }

    /// Name of a named scope.
    pub fn name(&self) -> Option<&str> {
        self.header().map(|h| h.name.as_str())
    }

    pub fn is_named_scope(&self) -> bool {
        self.header().is_some()
    }

    pub fn is_namespace(&self) -> bool {
        matches!(self.kind, StatementKind::Namespace(_))
    }

    pub fn is_type(&self) -> bool {
        matches!(self.kind, StatementKind::Type(_))
    }

    pub fn is_method(&self) -> bool {
        matches!(self.kind, StatementKind::Method(_))
    }

    pub fn as_type(&self) -> Option<&TypeData> {
        match &self.kind {
            StatementKind::Type(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&MethodData> {
        match &self.kind {
            StatementKind::Method(data) => Some(data),
            _ => None,
        }
    }

    /// Condition expression of condition-block statements.
    pub fn condition(&self) -> Option<ExpressionId> {
        match &self.kind {
            StatementKind::If { condition, .. }
            | StatementKind::While { condition }
            | StatementKind::DoWhile { condition }
            | StatementKind::For { condition, .. }
            | StatementKind::Foreach { condition }
            | StatementKind::Switch { condition }
            | StatementKind::Case { condition, .. } => *condition,
            _ => None,
        }
    }

    /// Short kind label used in output and diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            StatementKind::Block => "block",
            StatementKind::Namespace(_) => "namespace",
            StatementKind::Type(_) => "type",
            StatementKind::Method(_) => "method",
            StatementKind::Property(_) => "property",
            StatementKind::If { .. } => "if",
            StatementKind::While { .. } => "while",
            StatementKind::DoWhile { .. } => "do",
            StatementKind::For { .. } => "for",
            StatementKind::Foreach { .. } => "foreach",
            StatementKind::Switch { .. } => "switch",
            StatementKind::Case { .. } => "case",
            StatementKind::Try { .. } => "try",
            StatementKind::Catch { .. } => "catch",
            StatementKind::UsingBlock { .. } => "using_block",
            StatementKind::Lock => "lock",
            StatementKind::Extern { .. } => "extern",
            StatementKind::Alias { .. } => "alias",
            StatementKind::Import { .. } => "import",
            StatementKind::Label { .. } => "label",
            StatementKind::Goto => "goto",
            StatementKind::Break => "break",
            StatementKind::Continue => "continue",
            StatementKind::Return => "return",
            StatementKind::Throw => "throw",
            StatementKind::Expression => "expression",
            StatementKind::Declaration => "declaration",
            StatementKind::Empty => "empty",
        }
    }

    /// Every child statement: body, else branch, catches, finally.
    pub fn child_ids(&self) -> Vec<StatementId> {
        let mut out = self.children.clone();
        match &self.kind {
            StatementKind::If { else_children, .. } => out.extend(else_children.iter().copied()),
            StatementKind::Try { catches, finally } => {
                out.extend(catches.iter().copied());
                out.extend(finally.iter().copied());
            }
            _ => {}
        }
        out
    }

    /// Root expressions owned directly by this statement.
    pub fn expression_ids(&self) -> Vec<ExpressionId> {
        let mut out: Vec<ExpressionId> = self.content.into_iter().collect();
        if let Some(header) = self.header() {
            out.extend(header.facets.iter().filter_map(|f| f.prefix));
        }
        match &self.kind {
            StatementKind::Type(data) => out.extend(data.parent_types.iter().copied()),
            StatementKind::Method(data) => {
                for sig in &data.signatures {
                    out.extend(sig.return_type);
                    out.extend(sig.parameters.iter().copied());
                }
                out.extend(data.initializers.iter().copied());
            }
            StatementKind::Property(data) => out.extend(data.property_types.iter().copied()),
            StatementKind::For {
                initializer,
                condition,
                incrementer,
            } => {
                out.extend(*initializer);
                out.extend(*condition);
                out.extend(*incrementer);
            }
            StatementKind::Catch { parameter } => out.extend(*parameter),
            StatementKind::UsingBlock { initializer } => out.extend(*initializer),
            StatementKind::Alias { target, .. } => out.extend(*target),
            StatementKind::Import { namespace } => out.extend(*namespace),
            _ => out.extend(self.condition()),
        }
        out
    }

    /// Visit every id field for rewriting.
    pub(crate) fn visit_ids_mut(
        &mut self,
        on_stmt: &mut dyn FnMut(&mut StatementId),
        on_expr: &mut dyn FnMut(&mut ExpressionId),
    ) {
        if let Some(parent) = self.parent.as_mut() {
            on_stmt(parent);
        }
        self.children.iter_mut().for_each(&mut *on_stmt);
        if let Some(content) = self.content.as_mut() {
            on_expr(content);
        }
        if let Some(header) = self.header_mut() {
            for facet in &mut header.facets {
                if let Some(prefix) = facet.prefix.as_mut() {
                    on_expr(prefix);
                }
            }
        }
        fn opt(slot: &mut Option<ExpressionId>, f: &mut dyn FnMut(&mut ExpressionId)) {
            if let Some(id) = slot.as_mut() {
                f(id);
            }
        }
        match &mut self.kind {
            StatementKind::Type(data) => data.parent_types.iter_mut().for_each(&mut *on_expr),
            StatementKind::Method(data) => {
                for sig in &mut data.signatures {
                    opt(&mut sig.return_type, on_expr);
                    sig.parameters.iter_mut().for_each(&mut *on_expr);
                }
                data.initializers.iter_mut().for_each(&mut *on_expr);
            }
            StatementKind::Property(data) => data.property_types.iter_mut().for_each(&mut *on_expr),
            StatementKind::If {
                condition,
                else_children,
            } => {
                opt(condition, on_expr);
                else_children.iter_mut().for_each(&mut *on_stmt);
            }
            StatementKind::While { condition }
            | StatementKind::DoWhile { condition }
            | StatementKind::Foreach { condition }
            | StatementKind::Switch { condition }
            | StatementKind::Case { condition, .. } => opt(condition, on_expr),
            StatementKind::For {
                initializer,
                condition,
                incrementer,
            } => {
                opt(initializer, on_expr);
                opt(condition, on_expr);
                opt(incrementer, on_expr);
            }
            StatementKind::Try { catches, finally } => {
                catches.iter_mut().for_each(&mut *on_stmt);
                finally.iter_mut().for_each(&mut *on_stmt);
            }
            StatementKind::Catch { parameter } => opt(parameter, on_expr),
            StatementKind::UsingBlock { initializer } => opt(initializer, on_expr),
            StatementKind::Alias { target, .. } => opt(target, on_expr),
            StatementKind::Import { namespace } => opt(namespace, on_expr),
            _ => {}
        }
    }
}
