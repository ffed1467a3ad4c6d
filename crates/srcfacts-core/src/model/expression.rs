//! Use-site expression nodes.

use serde::{Deserialize, Serialize};

use super::{AccessModifier, ExpressionId, Language, LiteralKind, Location, StatementId};

/// Name and optional qualifying prefix shared by every name-bearing use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameData {
    pub name: String,
    /// A [`ExpressionKind::NamePrefix`] expression.
    pub prefix: Option<ExpressionId>,
}

impl NameData {
    pub fn new(name: impl Into<String>) -> Self {
        NameData {
            name: name.into(),
            prefix: None,
        }
    }
}

/// Method call data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallData {
    pub name: NameData,
    pub arguments: Vec<ExpressionId>,
    pub type_arguments: Vec<ExpressionId>,
    pub is_constructor: bool,
    pub is_destructor: bool,
    /// Call appears in a constructor's member initializer list.
    pub is_initializer: bool,
}

/// Variable declaration data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDeclarationData {
    pub name: String,
    /// Declared type; untyped siblings share one id.
    pub variable_type: Option<ExpressionId>,
    pub initializer: Option<ExpressionId>,
    pub accessibility: AccessModifier,
    /// Variadic parameter (`...`, `String... args`, `params int[] xs`).
    pub is_variadic: bool,
}

/// Discriminated expression kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionKind {
    /// Plain expression grouping its components.
    Group,
    /// Qualifying prefix; components alternate names and scope operators.
    NamePrefix,
    NameUse(NameData),
    TypeUse {
        name: NameData,
        type_arguments: Vec<ExpressionId>,
    },
    MethodCall(CallData),
    VariableUse {
        name: NameData,
        index: Option<ExpressionId>,
    },
    VariableDeclaration(VariableDeclarationData),
    Literal {
        kind: LiteralKind,
        text: String,
    },
    Operator {
        text: String,
    },
}

/// A use-site construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub language: Language,
    /// Ordered sub-expressions (`a->b.Foo()` has five).
    pub components: Vec<ExpressionId>,
    pub parent_expression: Option<ExpressionId>,
    pub parent_statement: Option<StatementId>,
    pub location: Option<Location>,
}

impl Expression {
    /// Create a detached expression.
    pub fn new(kind: ExpressionKind, language: Language, location: Option<Location>) -> Self {
        Expression {
            kind,
            language,
            components: Vec::new(),
            parent_expression: None,
            parent_statement: None,
            location,
        }
    }

    /// Name data of NameUse-family expressions (name, type, call, variable use).
    pub fn name_data(&self) -> Option<&NameData> {
        match &self.kind {
            ExpressionKind::NameUse(name)
            | ExpressionKind::TypeUse { name, .. }
            | ExpressionKind::VariableUse { name, .. } => Some(name),
            ExpressionKind::MethodCall(call) => Some(&call.name),
            _ => None,
        }
    }

    pub(crate) fn name_data_mut(&mut self) -> Option<&mut NameData> {
        match &mut self.kind {
            ExpressionKind::NameUse(name)
            | ExpressionKind::TypeUse { name, .. }
            | ExpressionKind::VariableUse { name, .. } => Some(name),
            ExpressionKind::MethodCall(call) => Some(&mut call.name),
            _ => None,
        }
    }

    /// The used name, when this is a NameUse-family expression.
    pub fn used_name(&self) -> Option<&str> {
        self.name_data().map(|n| n.name.as_str())
    }

    pub fn as_call(&self) -> Option<&CallData> {
        match &self.kind {
            ExpressionKind::MethodCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_declaration(&self) -> Option<&VariableDeclarationData> {
        match &self.kind {
            ExpressionKind::VariableDeclaration(decl) => Some(decl),
            _ => None,
        }
    }

    /// Operator text when this is an operator use.
    pub fn operator_text(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Operator { text } => Some(text),
            _ => None,
        }
    }

    /// Generic type use (has type arguments).
    pub fn is_generic(&self) -> bool {
        matches!(&self.kind, ExpressionKind::TypeUse { type_arguments, .. } if !type_arguments.is_empty())
    }

    /// Sub-expressions held outside `components` (prefix, arguments, types, ...).
    pub fn attached_ids(&self) -> Vec<ExpressionId> {
        let mut out: Vec<ExpressionId> = self.name_data().and_then(|n| n.prefix).into_iter().collect();
        match &self.kind {
            ExpressionKind::TypeUse { type_arguments, .. } => out.extend(type_arguments.iter().copied()),
            ExpressionKind::MethodCall(call) => {
                out.extend(call.arguments.iter().copied());
                out.extend(call.type_arguments.iter().copied());
            }
            ExpressionKind::VariableUse { index, .. } => out.extend(*index),
            ExpressionKind::VariableDeclaration(decl) => {
                out.extend(decl.variable_type);
                out.extend(decl.initializer);
            }
            _ => {}
        }
        out
    }

    /// Components followed by attached sub-expressions.
    pub fn sub_expression_ids(&self) -> Vec<ExpressionId> {
        let mut out = self.components.clone();
        out.extend(self.attached_ids());
        out
    }

    pub(crate) fn visit_ids_mut(
        &mut self,
        on_stmt: &mut dyn FnMut(&mut StatementId),
        on_expr: &mut dyn FnMut(&mut ExpressionId),
    ) {
        self.components.iter_mut().for_each(&mut *on_expr);
        if let Some(parent) = self.parent_expression.as_mut() {
            on_expr(parent);
        }
        if let Some(stmt) = self.parent_statement.as_mut() {
            on_stmt(stmt);
        }
        if let Some(prefix) = self.name_data_mut().and_then(|n| n.prefix.as_mut()) {
            on_expr(prefix);
        }
        match &mut self.kind {
            ExpressionKind::TypeUse { type_arguments, .. } => {
                type_arguments.iter_mut().for_each(&mut *on_expr)
            }
            ExpressionKind::MethodCall(call) => {
                call.arguments.iter_mut().for_each(&mut *on_expr);
                call.type_arguments.iter_mut().for_each(&mut *on_expr);
            }
            ExpressionKind::VariableUse { index, .. } => {
                if let Some(id) = index.as_mut() {
                    on_expr(id);
                }
            }
            ExpressionKind::VariableDeclaration(decl) => {
                if let Some(id) = decl.variable_type.as_mut() {
                    on_expr(id);
                }
                if let Some(id) = decl.initializer.as_mut() {
                    on_expr(id);
                }
            }
            _ => {}
        }
    }
}
