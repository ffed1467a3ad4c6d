//! C# language support for srcfacts.
//!
//! `using` covers three constructs in C#, told apart by shape:
//!
//! - `using A.B;` and `using static A.B;` open a namespace or type (import)
//! - `using X = A.B;` binds `X` to `A.B` (alias)
//! - `using (r) { ... }` and `using var r = ...;` scope a resource (block)
//!
//! Partial types merge across files; accessibility follows the declared
//! keywords, with `protected internal` recognized as one modifier.

use srcfacts_core::markup::{Element, Node};
use srcfacts_core::model::Language;
use srcfacts_core::parse::{common_statement_rule, CodeParser, LanguageRules, StatementRule, UsingForm};

/// Tag table and policy for C#.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CSharpRules;

/// A parser for C# units.
pub fn csharp_parser() -> CodeParser<CSharpRules> {
    CodeParser::new(CSharpRules)
}

impl LanguageRules for CSharpRules {
    fn language(&self) -> Language {
        Language::CSharp
    }

    fn statement_rule(&self, tag: &str) -> Option<StatementRule> {
        match tag {
            "lock" => Some(StatementRule::Lock),
            "event" => Some(StatementRule::Property),
            "checked" | "unchecked" | "unsafe" | "fixed" => Some(StatementRule::Transparent),
            _ => common_statement_rule(tag),
        }
    }

    fn classify_using<'e>(&self, element: &'e Element) -> UsingForm<'e> {
        if element.has_child("block") || element.has_child("decl") || element.own_text().contains('(') {
            return UsingForm::Block;
        }
        if let Some(init) = element.child("init") {
            let target = init
                .child("name")
                .or_else(|| init.child("expr").and_then(|e| e.child("name")))
                .or_else(|| init.child("type").and_then(|t| t.children_tagged("name").last()));
            return match target {
                Some(target) => UsingForm::Alias {
                    alias_name: element.child("name").and_then(leaf_text),
                    target,
                },
                None => UsingForm::Unknown,
            };
        }
        let names: Vec<&Element> = element.children_tagged("name").collect();
        match names.as_slice() {
            // `using X = A.B;` without an init wrapper.
            [alias, target] if element.own_text().contains('=') => UsingForm::Alias {
                alias_name: leaf_text(*alias),
                target: *target,
            },
            [target] => UsingForm::Import { target: *target },
            _ => {
                tracing::trace!(line = element.line, "unrecognized using directive");
                UsingForm::Unknown
            }
        }
    }

    fn member_operators(&self) -> &'static [&'static str] {
        &[".", "->", "?."]
    }
}

/// The text of an element holding nothing but text.
fn leaf_text(element: &Element) -> Option<&str> {
    match element.nodes() {
        [Node::Text(text)] => Some(text.trim()),
        _ => None,
    }
}
