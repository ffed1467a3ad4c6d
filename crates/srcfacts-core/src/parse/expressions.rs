//! Expression construction.
//!
//! Expression markup is read as a flat component list. Parentheses open
//! and close nested groups; compound names are split on member operators
//! into one use per segment, and scope operators inside a segment become
//! the segment's [`ExpressionKind::NamePrefix`].

use super::{name_parts, segment_text, Builder, LanguageRules, NamePart};
use crate::markup::Element;
use crate::model::{
    AccessModifier, CallData, Expression, ExpressionId, ExpressionKind, LiteralKind, NameData,
    VariableDeclarationData,
};

/// Type and accessibility of the first declaration in a list.
type SharedDeclaration = (Option<ExpressionId>, AccessModifier);

impl<R: LanguageRules + ?Sized> Builder<'_, R> {
    fn alloc(&mut self, kind: ExpressionKind, element: &Element) -> ExpressionId {
        let location = self.location(element, false);
        self.tree
            .alloc_expression(Expression::new(kind, self.language, Some(location)))
    }

    fn adopt_all(&mut self, owner: ExpressionId, children: impl IntoIterator<Item = ExpressionId>) {
        for child in children {
            self.tree.adopt_expression(owner, child);
        }
    }

    /// Parse one expression-bearing element.
    pub(super) fn parse_expression(&mut self, element: &Element) -> Option<ExpressionId> {
        let pieces = self.parse_components(element, false);
        self.wrap(pieces, element)
    }

    /// Parse a sequence of sibling elements as one expression.
    pub(super) fn parse_expression_list(&mut self, elements: &[&Element], owner: &Element) -> Option<ExpressionId> {
        let mut stack: Vec<Vec<ExpressionId>> = vec![Vec::new()];
        let mut shared: Option<SharedDeclaration> = None;
        let mut after_new = false;

        for element in elements {
            let pieces = self.parse_components(element, after_new);
            after_new = element.is("operator") && element.text().trim() == "new";
            for piece in pieces {
                self.share_declaration_type(piece, &mut shared);
                let operator = self
                    .tree
                    .expression(piece)
                    .and_then(Expression::operator_text)
                    .map(str::to_string);
                match operator.as_deref() {
                    Some("(") => {
                        self.tree.discard_expression(piece);
                        stack.push(Vec::new());
                    }
                    Some(")") if stack.len() > 1 => {
                        self.tree.discard_expression(piece);
                        self.close_group(&mut stack, owner);
                    }
                    _ => {
                        if let Some(top) = stack.last_mut() {
                            top.push(piece);
                        }
                    }
                }
            }
        }
        while stack.len() > 1 {
            self.close_group(&mut stack, owner);
        }
        let top = stack.pop().unwrap_or_default();
        self.wrap(top, owner)
    }

    fn close_group(&mut self, stack: &mut Vec<Vec<ExpressionId>>, owner: &Element) {
        let inner = stack.pop().unwrap_or_default();
        if let Some(group) = self.wrap(inner, owner) {
            if let Some(top) = stack.last_mut() {
                top.push(group);
            }
        }
    }

    /// One piece stays as is; several become a group.
    fn wrap(&mut self, pieces: Vec<ExpressionId>, owner: &Element) -> Option<ExpressionId> {
        match pieces.len() {
            0 => None,
            1 => pieces.into_iter().next(),
            _ => {
                let group = self.alloc(ExpressionKind::Group, owner);
                for piece in pieces {
                    self.tree.push_component(group, piece);
                }
                Some(group)
            }
        }
    }

    /// Untyped declarations after the first take its type and accessibility.
    fn share_declaration_type(&mut self, piece: ExpressionId, shared: &mut Option<SharedDeclaration>) {
        let Some(decl) = self.tree.expression(piece).and_then(Expression::as_declaration) else {
            return;
        };
        match shared {
            None => *shared = Some((decl.variable_type, decl.accessibility)),
            Some((variable_type, accessibility)) => {
                if decl.variable_type.is_some() {
                    return;
                }
                if let Some(ExpressionKind::VariableDeclaration(decl)) =
                    self.tree.expression_mut(piece).map(|e| &mut e.kind)
                {
                    decl.variable_type = *variable_type;
                    decl.accessibility = *accessibility;
                }
            }
        }
    }

    fn parse_components(&mut self, element: &Element, after_new: bool) -> Vec<ExpressionId> {
        match element.tag() {
            "expr" => {
                let items: Vec<&Element> = element.elements().collect();
                self.parse_expression_list(&items, element).into_iter().collect()
            }
            "decl" | "function_decl" => self.parse_declaration(element).into_iter().collect(),
            "name" => self.parse_name_components(element),
            "type" => self.parse_type_use(element).into_iter().collect(),
            "call" => self.parse_call(element, after_new, false),
            "operator" => vec![self.operator(element)],
            "literal" => {
                let kind = LiteralKind::from_srcml(element.attr("type"));
                let text = element.text();
                vec![self.alloc(ExpressionKind::Literal { kind, text }, element)]
            }
            "comment" => Vec::new(),
            tag => {
                let items: Vec<&Element> = element.elements().collect();
                if items.is_empty() {
                    return Vec::new();
                }
                tracing::trace!(tag, line = element.line, "flattening expression element");
                self.parse_expression_list(&items, element).into_iter().collect()
            }
        }
    }

    fn operator(&mut self, element: &Element) -> ExpressionId {
        let text = element.text().trim().to_string();
        self.alloc(ExpressionKind::Operator { text }, element)
    }

    fn is_member_operator(&self, operator: &Element) -> bool {
        let text = operator.text();
        self.rules.member_operators().contains(&text.trim())
    }

    /// Segments separated by member operators, and the operators themselves.
    fn member_segments<'e>(&self, parts: Vec<NamePart<'e>>) -> (Vec<Vec<NamePart<'e>>>, Vec<&'e Element>) {
        let mut segments = vec![Vec::new()];
        let mut operators = Vec::new();
        for part in parts {
            if let NamePart::Operator(op) = part {
                if self.is_member_operator(op) {
                    operators.push(op);
                    segments.push(Vec::new());
                    continue;
                }
            }
            if let Some(current) = segments.last_mut() {
                current.push(part);
            }
        }
        (segments, operators)
    }

    /// Build the prefix expression for the scope parts before a name.
    pub(super) fn build_prefix(&mut self, parts: &[NamePart<'_>]) -> Option<ExpressionId> {
        let first = match parts.first()? {
            NamePart::Name(e) | NamePart::Operator(e) => *e,
        };
        let prefix = self.alloc(ExpressionKind::NamePrefix, first);
        for part in parts {
            let component = match part {
                NamePart::Name(e) => self.name_use(e, None, None),
                NamePart::Operator(e) => self.operator(e),
            };
            self.tree.push_component(prefix, component);
        }
        Some(prefix)
    }

    fn name_use(&mut self, element: &Element, prefix: Option<ExpressionId>, index: Option<ExpressionId>) -> ExpressionId {
        let name = NameData {
            name: segment_text(element),
            prefix,
        };
        let kind = match index {
            Some(_) => ExpressionKind::VariableUse { name, index },
            None => ExpressionKind::NameUse(name),
        };
        let id = self.alloc(kind, element);
        self.adopt_all(id, prefix.into_iter().chain(index));
        id
    }

    fn index_of(&mut self, element: &Element) -> Option<ExpressionId> {
        let index = element.child("index")?;
        let items: Vec<&Element> = index.elements().collect();
        self.parse_expression_list(&items, index)
    }

    /// Use for one segment: the last name, qualified by what precedes it.
    fn segment_use(&mut self, segment: &[NamePart<'_>], index: Option<ExpressionId>) -> Vec<ExpressionId> {
        let Some(last) = segment.iter().rposition(|p| matches!(p, NamePart::Name(_))) else {
            return segment
                .iter()
                .map(|p| match p {
                    NamePart::Name(e) | NamePart::Operator(e) => self.operator(e),
                })
                .collect();
        };
        let NamePart::Name(element) = segment[last] else {
            return Vec::new();
        };
        let prefix = self.build_prefix(&segment[..last]);
        vec![self.name_use(element, prefix, index)]
    }

    /// Name in expression context (`a->b.c`, `A::x`, `arr[i]`).
    fn parse_name_components(&mut self, element: &Element) -> Vec<ExpressionId> {
        let (segments, operators) = self.member_segments(name_parts(element));
        let count = segments.len();
        let mut out = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            let index = if i + 1 == count { self.index_of(element) } else { None };
            out.extend(self.segment_use(segment, index));
            if let Some(op) = operators.get(i) {
                out.push(self.operator(op));
            }
        }
        out
    }

    /// Name in type context; every operator qualifies.
    pub(super) fn parse_scope_name(&mut self, element: &Element) -> Option<ExpressionId> {
        let name = if element.is("type") {
            element.children_tagged("name").last()?
        } else {
            element
        };
        let mut parts = name_parts(name);
        // Wildcard imports: `java.util.*`
        while let Some(last) = parts.last() {
            match last {
                NamePart::Operator(_) => {
                    parts.pop();
                }
                NamePart::Name(n) if segment_text(n) == "*" => {
                    parts.pop();
                }
                NamePart::Name(_) => break,
            }
        }
        let last = parts.len().checked_sub(1)?;
        let NamePart::Name(target) = parts[last] else {
            return None;
        };
        let prefix = self.build_prefix(&parts[..last]);
        Some(self.name_use(target, prefix, None))
    }

    /// Type reference from a `type` or `name` element.
    pub(super) fn parse_type_use(&mut self, element: &Element) -> Option<ExpressionId> {
        if element.is("type") {
            if element.attr("ref").is_some() {
                return None;
            }
            let name = element.children_tagged("name").last()?;
            return self.parse_type_use(name);
        }
        let parts = name_parts(element);
        let last = parts.iter().rposition(|p| matches!(p, NamePart::Name(_)))?;
        let NamePart::Name(target) = parts[last] else {
            return None;
        };
        let prefix = self.build_prefix(&parts[..last]);
        let type_arguments = self.generic_arguments(target);
        let id = self.alloc(
            ExpressionKind::TypeUse {
                name: NameData {
                    name: segment_text(target),
                    prefix,
                },
                type_arguments: type_arguments.clone(),
            },
            target,
        );
        self.adopt_all(id, prefix.into_iter().chain(type_arguments));
        Some(id)
    }

    /// Type arguments of a generic name segment (`List<int>`).
    fn generic_arguments(&mut self, segment: &Element) -> Vec<ExpressionId> {
        let Some(list) = segment.child("argument_list") else {
            return Vec::new();
        };
        let is_type_name = |c: &&Element| c.is("name") || c.is("type");
        list.children_tagged("argument")
            .filter_map(|arg| {
                arg.elements()
                    .find(is_type_name)
                    .or_else(|| arg.child("expr").and_then(|e| e.elements().find(is_type_name)))
            })
            .filter_map(|name| self.parse_type_use(name))
            .collect()
    }

    /// Method call; earlier member segments become separate components.
    pub(super) fn parse_call(&mut self, element: &Element, after_new: bool, is_initializer: bool) -> Vec<ExpressionId> {
        let Some(name_element) = element.child("name") else {
            let items: Vec<&Element> = element.elements().collect();
            return self.parse_expression_list(&items, element).into_iter().collect();
        };
        let (segments, operators) = self.member_segments(name_parts(name_element));
        let mut out = Vec::new();
        let Some((last_segment, leading)) = segments.split_last() else {
            return out;
        };
        for (i, segment) in leading.iter().enumerate() {
            out.extend(self.segment_use(segment, None));
            if let Some(op) = operators.get(i) {
                out.push(self.operator(op));
            }
        }

        let Some(last) = last_segment.iter().rposition(|p| matches!(p, NamePart::Name(_))) else {
            return out;
        };
        let NamePart::Name(target) = last_segment[last] else {
            return out;
        };
        let prefix = self.build_prefix(&last_segment[..last]);
        let type_arguments = self.generic_arguments(target);
        let arguments: Vec<ExpressionId> = element
            .child("argument_list")
            .map(|list| {
                list.children_tagged("argument")
                    .filter_map(|arg| {
                        let items: Vec<&Element> = arg.elements().collect();
                        self.parse_expression_list(&items, arg)
                    })
                    .collect()
            })
            .unwrap_or_default();
        let name = segment_text(target);
        let is_destructor = name.starts_with('~');
        let call = self.alloc(
            ExpressionKind::MethodCall(CallData {
                name: NameData { name, prefix },
                arguments: arguments.clone(),
                type_arguments: type_arguments.clone(),
                is_constructor: after_new || is_initializer,
                is_destructor,
                is_initializer,
            }),
            element,
        );
        self.adopt_all(
            call,
            prefix.into_iter().chain(arguments).chain(type_arguments),
        );
        out.push(call);
        out
    }

    /// Variable, field or parameter declaration.
    pub(super) fn parse_declaration(&mut self, element: &Element) -> Option<ExpressionId> {
        let name = element.child("name").map(super::simple_name).unwrap_or_default();
        let variable_type = element.child("type").and_then(|t| self.parse_type_use(t));
        let specifiers = super::specifiers(element);
        let accessibility = self.access_for(&specifiers);
        let is_variadic = element.own_text().contains("...")
            || element.child("type").is_some_and(|t| t.text().contains("..."))
            || specifiers.iter().any(|s| s == "params");
        let initializer = element
            .child("init")
            .or_else(|| element.child("range"))
            .and_then(|init| {
                let items: Vec<&Element> = init.elements().collect();
                self.parse_expression_list(&items, init)
            });
        let id = self.alloc(
            ExpressionKind::VariableDeclaration(VariableDeclarationData {
                name,
                variable_type,
                initializer,
                accessibility,
                is_variadic,
            }),
            element,
        );
        self.adopt_all(id, variable_type.into_iter().chain(initializer));
        Some(id)
    }

    /// Parameter of a method or catch clause.
    pub(super) fn parse_parameter(&mut self, parameter: &Element) -> Option<ExpressionId> {
        match parameter.elements().find(|c| c.is("decl") || c.is("function_decl")) {
            Some(decl) => self.parse_declaration(decl),
            None if parameter.text().contains("...") => {
                let id = self.alloc(
                    ExpressionKind::VariableDeclaration(VariableDeclarationData {
                        name: String::new(),
                        variable_type: None,
                        initializer: None,
                        accessibility: AccessModifier::None,
                        is_variadic: true,
                    }),
                    parameter,
                );
                Some(id)
            }
            None => None,
        }
    }
}
