//! Java model tests: packages, imports, inheritance and file removal.

use srcfacts_core::equality::assert_structurally_equal;
use srcfacts_core::markup::unit_from_snippet;
use srcfacts_core::merge::merge;
use srcfacts_core::model::{
    Declaration, Expression, ExpressionId, ExpressionKind, Language, ScopeTree, StatementId, StatementKind,
};
use srcfacts_core::resolve::{aliases_in_scope, find_matches, find_scopes};
use srcfacts_core::unmerge::remove_file;
use srcfacts_java::java_parser;

fn parse(file: &str, snippet: &str) -> ScopeTree {
    let unit = unit_from_snippet(snippet, file, "Java").unwrap();
    java_parser().parse_unit(&unit).unwrap()
}

fn aggregate(files: &[(&str, &str)]) -> ScopeTree {
    let mut tree = ScopeTree::new(Language::Java);
    for (file, snippet) in files {
        merge(&mut tree, parse(file, snippet)).unwrap();
    }
    tree
}

fn scope(tree: &ScopeTree, path: &str) -> StatementId {
    let found = find_scopes(tree, path);
    assert_eq!(found.len(), 1, "expected exactly one scope at {}", path);
    found[0]
}

fn type_use(tree: &ScopeTree, within: StatementId, name: &str) -> ExpressionId {
    tree.find_expressions(within, true)
        .into_iter()
        .find(|e| {
            let expr = tree.expression(*e).unwrap();
            matches!(expr.kind, ExpressionKind::TypeUse { .. }) && expr.used_name() == Some(name)
        })
        .unwrap()
}

fn scopes(decls: &[Declaration]) -> Vec<StatementId> {
    decls
        .iter()
        .filter_map(|d| match d {
            Declaration::Scope(s) => Some(*s),
            Declaration::Variable(_) => None,
        })
        .collect()
}

const WIDGET: &str = "<package>package <name><name>com</name><operator>.</operator><name>acme</name></name>;</package><class><specifier>public</specifier> class <name>Widget</name> <block>{<function><specifier>public</specifier> <type><name>void</name></type> <name>draw</name><parameter_list>()</parameter_list> <block>{}</block></function>}</block></class>";

const APP_ALIAS: &str = "<package>package <name>app</name>;</package><import>import <name><name>com</name><operator>.</operator><name>acme</name><operator>.</operator><name>Widget</name></name>;</import><class>class <name>Main</name> <block>{<function><type><name>void</name></type> <name>run</name><parameter_list>()</parameter_list> <block>{<decl_stmt><decl><type><name>Widget</name></type> <name>w</name></decl>;</decl_stmt>}</block></function>}</block></class>";

const APP_WILDCARD: &str = "<package>package <name>app</name>;</package><import>import <name><name>com</name><operator>.</operator><name>acme</name><operator>.</operator><name>*</name></name>;</import><class>class <name>Other</name> <block>{<function><type><name>void</name></type> <name>run</name><parameter_list>()</parameter_list> <block>{<decl_stmt><decl><type><name>Widget</name></type> <name>w</name></decl>;</decl_stmt>}</block></function>}</block></class>";

mod packages {
    use super::*;

    #[test]
    fn package_wraps_the_file() {
        let tree = parse("Widget.java", WIDGET);
        let widget = scope(&tree, "com.acme.Widget");
        assert_eq!(tree.full_name(widget), "com.acme.Widget");
        assert_eq!(scope(&tree, "com.acme.Widget.draw"), tree.statement(widget).unwrap().children[0]);
    }

    #[test]
    fn files_in_one_package_share_its_namespace() {
        let tree = aggregate(&[("Main.java", APP_ALIAS), ("Other.java", APP_WILDCARD)]);
        let app = scope(&tree, "app");
        assert_eq!(tree.statement(app).unwrap().locations.len(), 2);
        scope(&tree, "app.Main");
        scope(&tree, "app.Other");
    }

    #[test]
    fn removing_one_file_of_a_package_is_exact() {
        let mut tree = aggregate(&[("Widget.java", WIDGET), ("Main.java", APP_ALIAS), ("Other.java", APP_WILDCARD)]);
        remove_file(&mut tree, "Main.java");
        let expected = aggregate(&[("Widget.java", WIDGET), ("Other.java", APP_WILDCARD)]);
        assert_structurally_equal(&tree, &expected);
    }
}

mod imports {
    use super::*;

    #[test]
    fn single_type_import_is_an_alias_named_after_the_type() {
        let tree = parse("Main.java", APP_ALIAS);
        let app = scope(&tree, "app");
        let import = tree
            .statement(app)
            .unwrap()
            .children
            .iter()
            .copied()
            .find(|c| matches!(tree.statement(*c).unwrap().kind, StatementKind::Alias { .. }))
            .unwrap();
        let StatementKind::Alias { target, alias_name } = &tree.statement(import).unwrap().kind else {
            unreachable!();
        };
        assert_eq!(alias_name, "Widget");
        assert_eq!(tree.render(target.unwrap()), "com.acme.Widget");

        let run = scope(&tree, "app.Main.run");
        assert_eq!(aliases_in_scope(&tree, run, None), vec![import]);
    }

    #[test]
    fn alias_resolves_across_packages() {
        let tree = aggregate(&[("Widget.java", WIDGET), ("Main.java", APP_ALIAS)]);
        let run = scope(&tree, "app.Main.run");
        let used = type_use(&tree, run, "Widget");
        assert_eq!(scopes(&find_matches(&tree, used)), vec![scope(&tree, "com.acme.Widget")]);
    }

    #[test]
    fn wildcard_import_resolves_across_packages() {
        let tree = aggregate(&[("Widget.java", WIDGET), ("Other.java", APP_WILDCARD)]);
        let run = scope(&tree, "app.Other.run");
        let used = type_use(&tree, run, "Widget");
        assert_eq!(scopes(&find_matches(&tree, used)), vec![scope(&tree, "com.acme.Widget")]);
    }

    #[test]
    fn imports_do_not_leak_into_other_files() {
        let tree = aggregate(&[
            ("Widget.java", WIDGET),
            ("Main.java", APP_ALIAS),
            (
                "Plain.java",
                "<package>package <name>app</name>;</package><class>class <name>Plain</name> <block>{<function><type><name>void</name></type> <name>run</name><parameter_list>()</parameter_list> <block>{<decl_stmt><decl><type><name>Widget</name></type> <name>w</name></decl>;</decl_stmt>}</block></function>}</block></class>",
            ),
        ]);
        let run = scope(&tree, "app.Plain.run");
        let used = type_use(&tree, run, "Widget");
        assert!(find_matches(&tree, used).is_empty());
    }
}

mod inheritance {
    use super::*;

    const SHAPES: &str = "<class>class <name>Base</name> <block>{<function><type><name>void</name></type> <name>draw</name><parameter_list>()</parameter_list> <block>{}</block></function>}</block></class><class>class <name>Derived</name> <super_list><extends>extends <super><name>Base</name></super></extends></super_list> <block>{<function><type><name>void</name></type> <name>draw</name><parameter_list>()</parameter_list> <block>{<expr_stmt><expr><call><name><name>super</name><operator>.</operator><name>draw</name></name><argument_list>()</argument_list></call></expr>;</expr_stmt>}</block></function><function><type><name>void</name></type> <name>paint</name><parameter_list>()</parameter_list> <block>{<expr_stmt><expr><call><name>draw</name><argument_list>()</argument_list></call></expr>;</expr_stmt>}</block></function>}</block></class>";

    fn call_in(tree: &ScopeTree, method: &str) -> ExpressionId {
        let within = scope(tree, method);
        tree.find_expressions(within, true)
            .into_iter()
            .find(|e| tree.expression(*e).and_then(Expression::as_call).is_some())
            .unwrap()
    }

    #[test]
    fn super_call_binds_to_the_parent_type() {
        let tree = aggregate(&[("Shapes.java", SHAPES)]);
        let call = call_in(&tree, "Derived.draw");
        assert_eq!(scopes(&find_matches(&tree, call)), vec![scope(&tree, "Base.draw")]);
    }

    #[test]
    fn own_member_hides_the_inherited_one() {
        let tree = aggregate(&[("Shapes.java", SHAPES)]);
        let call = call_in(&tree, "Derived.paint");
        assert_eq!(scopes(&find_matches(&tree, call)), vec![scope(&tree, "Derived.draw")]);
    }
}
