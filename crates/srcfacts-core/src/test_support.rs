//! Shared fixtures for unit tests in this crate.

use crate::markup::{unit_from_snippet, Element};
use crate::merge::merge;
use crate::model::{AccessModifier, Language, ScopeTree, StatementId};
use crate::parse::{common_statement_rule, CodeParser, LanguageRules, StatementRule, UsingForm};

/// Minimal C++-flavored rules for exercising the shared engine.
pub(crate) struct PlainRules;

impl LanguageRules for PlainRules {
    fn language(&self) -> Language {
        Language::CPlusPlus
    }

    fn statement_rule(&self, tag: &str) -> Option<StatementRule> {
        match tag {
            "public" => Some(StatementRule::AccessRegion(AccessModifier::Public)),
            "private" => Some(StatementRule::AccessRegion(AccessModifier::Private)),
            "protected" => Some(StatementRule::AccessRegion(AccessModifier::Protected)),
            _ => common_statement_rule(tag),
        }
    }

    fn classify_using<'e>(&self, element: &'e Element) -> UsingForm<'e> {
        match element.child("name") {
            Some(target) if element.own_text().contains("namespace") => UsingForm::Import { target },
            Some(target) => UsingForm::Alias {
                alias_name: None,
                target,
            },
            None => UsingForm::Unknown,
        }
    }

    fn member_operators(&self) -> &'static [&'static str] {
        &[".", "->"]
    }
}

/// Parse a markup fragment as file `file`.
pub(crate) fn parse_snippet(snippet: &str, file: &str) -> ScopeTree {
    let unit = unit_from_snippet(snippet, file, "C++").unwrap();
    CodeParser::new(PlainRules).parse_unit(&unit).unwrap()
}

/// Merge the given files into an empty aggregate.
pub(crate) fn aggregate(files: &[(&str, &str)]) -> ScopeTree {
    let mut tree = ScopeTree::new(Language::CPlusPlus);
    for (file, snippet) in files {
        merge(&mut tree, parse_snippet(snippet, file)).unwrap();
    }
    tree
}

/// Named child of a scope, by name.
pub(crate) fn child_named(tree: &ScopeTree, scope: StatementId, name: &str) -> Option<StatementId> {
    tree.statement(scope)?
        .children
        .iter()
        .copied()
        .find(|c| tree.statement(*c).and_then(|s| s.name()) == Some(name))
}

/// Follow a path of names from the root.
pub(crate) fn scope_at(tree: &ScopeTree, path: &[&str]) -> Option<StatementId> {
    path.iter()
        .try_fold(tree.root(), |scope, name| child_named(tree, scope, name))
}
