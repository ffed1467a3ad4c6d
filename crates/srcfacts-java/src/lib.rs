//! Java language support for srcfacts.
//!
//! The `package` declaration wraps the whole file in nested namespaces.
//! `import a.b.C;` binds `C` (alias) and `import a.b.*;` opens `a.b`
//! (import). `synchronized` blocks become lock statements.

use srcfacts_core::markup::Element;
use srcfacts_core::model::{Language, TypeKind};
use srcfacts_core::parse::{common_statement_rule, CodeParser, LanguageRules, StatementRule, UsingForm};

/// Tag table and policy for Java.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JavaRules;

/// A parser for Java units.
pub fn java_parser() -> CodeParser<JavaRules> {
    CodeParser::new(JavaRules)
}

impl LanguageRules for JavaRules {
    fn language(&self) -> Language {
        Language::Java
    }

    fn statement_rule(&self, tag: &str) -> Option<StatementRule> {
        match tag {
            "package" => Some(StatementRule::Package),
            "import" => Some(StatementRule::Import),
            "synchronized" => Some(StatementRule::Lock),
            "annotation_defn" => Some(StatementRule::Type {
                kind: TypeKind::Interface,
                is_reference: false,
            }),
            // Static and instance initializer blocks.
            "static" => Some(StatementRule::Transparent),
            _ => common_statement_rule(tag),
        }
    }

    fn is_partial(&self, _specifiers: &[String]) -> bool {
        false
    }

    fn classify_using<'e>(&self, element: &'e Element) -> UsingForm<'e> {
        let Some(target) = element.child("name") else {
            tracing::trace!(line = element.line, "import without a name");
            return UsingForm::Unknown;
        };
        if target.text().trim_end().ends_with('*') {
            UsingForm::Import { target }
        } else {
            UsingForm::Alias {
                alias_name: None,
                target,
            }
        }
    }

    fn package_wraps_unit(&self) -> bool {
        true
    }

    fn member_operators(&self) -> &'static [&'static str] {
        &["."]
    }
}
