//! C and C++ language support for srcfacts.
//!
//! [`CppRules`] extends the shared tag table with C++ access regions and
//! classifies the three `using` forms:
//!
//! - `using namespace x;` opens a namespace (import)
//! - `using A::Foo;` binds `Foo` to `A::Foo` (alias)
//! - `using X = T;` binds `X` to `T` (alias)
//!
//! C units use the same rules under [`CppRules::c`]; C has no `using`, so
//! classification never fires there.

use srcfacts_core::markup::{Element, Node};
use srcfacts_core::model::{AccessModifier, Language};
use srcfacts_core::parse::{common_statement_rule, CodeParser, LanguageRules, StatementRule, UsingForm};

/// Tag table and policy for C and C++.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CppRules {
    language: Language,
}

impl CppRules {
    /// Rules for C++ units.
    pub fn new() -> Self {
        CppRules {
            language: Language::CPlusPlus,
        }
    }

    /// Rules for C units.
    pub fn c() -> Self {
        CppRules { language: Language::C }
    }
}

impl Default for CppRules {
    fn default() -> Self {
        Self::new()
    }
}

/// A parser for C++ units.
pub fn cpp_parser() -> CodeParser<CppRules> {
    CodeParser::new(CppRules::new())
}

/// A parser for C units.
pub fn c_parser() -> CodeParser<CppRules> {
    CodeParser::new(CppRules::c())
}

impl LanguageRules for CppRules {
    fn language(&self) -> Language {
        self.language
    }

    fn statement_rule(&self, tag: &str) -> Option<StatementRule> {
        match tag {
            "public" => Some(StatementRule::AccessRegion(AccessModifier::Public)),
            "private" => Some(StatementRule::AccessRegion(AccessModifier::Private)),
            "protected" => Some(StatementRule::AccessRegion(AccessModifier::Protected)),
            // `friend` wraps an ordinary declaration.
            "friend" => Some(StatementRule::Transparent),
            _ => common_statement_rule(tag),
        }
    }

    fn is_partial(&self, _specifiers: &[String]) -> bool {
        false
    }

    fn classify_using<'e>(&self, element: &'e Element) -> UsingForm<'e> {
        if let Some(target) = element.child("namespace").and_then(|ns| ns.child("name")) {
            return UsingForm::Import { target };
        }
        if let Some(init) = element.child("init") {
            let target = init
                .child("type")
                .and_then(|t| t.children_tagged("name").last())
                .or_else(|| init.child("name"));
            return match target {
                Some(target) => UsingForm::Alias {
                    alias_name: element.child("name").and_then(leaf_text),
                    target,
                },
                None => UsingForm::Unknown,
            };
        }
        match element.child("name") {
            // Older markup keeps the `namespace` keyword as plain text.
            Some(target) if element.own_text().contains("namespace") => UsingForm::Import { target },
            Some(target) => UsingForm::Alias {
                alias_name: None,
                target,
            },
            None => {
                tracing::trace!(line = element.line, "using without a name");
                UsingForm::Unknown
            }
        }
    }

    fn member_operators(&self) -> &'static [&'static str] {
        &[".", "->", ".*", "->*"]
    }
}

/// The text of an element holding nothing but text.
fn leaf_text(element: &Element) -> Option<&str> {
    match element.nodes() {
        [Node::Text(text)] => Some(text.trim()),
        _ => None,
    }
}
