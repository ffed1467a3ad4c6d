//! C and C++ model tests: parsing, merging, file removal and resolution.

use srcfacts_core::equality::assert_structurally_equal;
use srcfacts_core::markup::unit_from_snippet;
use srcfacts_core::merge::{merge, merged};
use srcfacts_core::model::{
    Declaration, Expression, ExpressionId, ExpressionKind, Language, ScopeTree, StatementId, StatementKind,
};
use srcfacts_core::resolve::{find_matches, find_scopes, imports_in_scope};
use srcfacts_core::unmerge::remove_file;
use srcfacts_cpp::{c_parser, cpp_parser};

fn parse(file: &str, snippet: &str) -> ScopeTree {
    let unit = unit_from_snippet(snippet, file, "C++").unwrap();
    cpp_parser().parse_unit(&unit).unwrap()
}

fn aggregate(files: &[(&str, &str)]) -> ScopeTree {
    let mut tree = ScopeTree::new(Language::CPlusPlus);
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

fn calls_named(tree: &ScopeTree, name: &str) -> Vec<ExpressionId> {
    tree.find_expressions(tree.root(), true)
        .into_iter()
        .filter(|e| tree.expression(*e).and_then(Expression::as_call).is_some_and(|c| c.name.name == name))
        .collect()
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

const HEADER: &str = "<namespace>namespace <name>shapes</name> <block>{<class>class <name>Circle</name> <block>{<public>public: <function_decl><type><name>double</name></type> <name>area</name><parameter_list>()</parameter_list>;</function_decl></public><private>private: <decl_stmt><decl><type><name>double</name></type> <name>r</name></decl>;</decl_stmt></private>}</block>;</class>}</block></namespace>";

const SOURCE: &str = "<function><type><name>double</name></type> <name><name>shapes</name><operator>::</operator><name>Circle</name><operator>::</operator><name>area</name></name><parameter_list>()</parameter_list> <block>{<return>return <expr><name>r</name> <operator>*</operator> <name>r</name></expr>;</return>}</block></function>";

const MAIN: &str = "<function><type><name>int</name></type> <name>main</name><parameter_list>()</parameter_list> <block>{<decl_stmt><decl><type><name><name>shapes</name><operator>::</operator><name>Circle</name></name></type> <name>c</name></decl>;</decl_stmt><return>return <expr><literal type=\"number\">0</literal></expr>;</return>}</block></function>";

mod merging {
    use super::*;

    #[test]
    fn merge_order_does_not_matter() {
        let forward = aggregate(&[("circle.h", HEADER), ("circle.cpp", SOURCE), ("main.cpp", MAIN)]);
        let backward = aggregate(&[("main.cpp", MAIN), ("circle.cpp", SOURCE), ("circle.h", HEADER)]);
        assert_structurally_equal(&forward, &backward);
    }

    #[test]
    fn merged_pairs_commute() {
        let left = merged(parse("circle.h", HEADER), parse("circle.cpp", SOURCE)).unwrap();
        let right = merged(parse("circle.cpp", SOURCE), parse("circle.h", HEADER)).unwrap();
        assert_structurally_equal(&left, &right);
    }

    #[test]
    fn out_of_line_definition_lands_in_its_class() {
        let tree = aggregate(&[("circle.h", HEADER), ("circle.cpp", SOURCE)]);
        let area = scope(&tree, "shapes::Circle::area");
        let locations = &tree.statement(area).unwrap().locations;
        assert_eq!(locations.len(), 2);
        assert_eq!(locations.iter().filter(|l| l.is_reference).count(), 1);
        assert_eq!(tree.full_name(area), "shapes.Circle.area");
    }

    #[test]
    fn forward_declaration_adds_one_reference_location() {
        let tree = aggregate(&[
            ("fwd.h", "<class_decl>class <name>Circle</name>;</class_decl>"),
            ("circle.h", "<class>class <name>Circle</name> <block>{}</block>;</class>"),
        ]);
        let circle = scope(&tree, "Circle");
        let locations = &tree.statement(circle).unwrap().locations;
        assert_eq!(locations.len(), 2);
        assert_eq!(locations.iter().filter(|l| l.is_reference).count(), 1);
        assert_eq!(tree.primary_location(circle).unwrap().file, "circle.h");
    }

    #[test]
    fn qualified_namespace_nests() {
        let tree = parse(
            "a.cpp",
            "<namespace>namespace <name><name>a</name><operator>::</operator><name>b</name></name> <block>{}</block></namespace>",
        );
        let b = scope(&tree, "a::b");
        assert_eq!(tree.full_name(b), "a.b");
    }
}

mod removal {
    use super::*;

    #[test]
    fn removing_a_file_is_the_inverse_of_adding_it() {
        let mut tree = aggregate(&[("circle.h", HEADER), ("circle.cpp", SOURCE), ("main.cpp", MAIN)]);
        remove_file(&mut tree, "circle.cpp");
        let expected = aggregate(&[("circle.h", HEADER), ("main.cpp", MAIN)]);
        assert_structurally_equal(&tree, &expected);
    }

    #[test]
    fn removing_the_header_keeps_the_definition() {
        let mut tree = aggregate(&[("circle.h", HEADER), ("circle.cpp", SOURCE)]);
        let stats = remove_file(&mut tree, "circle.h");
        assert!(stats.pruned > 0);
        let expected = aggregate(&[("circle.cpp", SOURCE)]);
        assert_structurally_equal(&tree, &expected);
    }

    #[test]
    fn removing_every_file_leaves_an_empty_root() {
        let mut tree = aggregate(&[("circle.h", HEADER), ("circle.cpp", SOURCE)]);
        remove_file(&mut tree, "circle.cpp");
        remove_file(&mut tree, "circle.h");
        assert!(tree.root_statement().children.is_empty());
        assert!(tree.files().is_empty());
    }
}

mod using_forms {
    use super::*;

    #[test]
    fn scoped_using_declaration_is_an_alias() {
        let tree = parse(
            "a.cpp",
            "<using>using <name><name>A</name><operator>::</operator><name>Foo</name></name>;</using>",
        );
        let alias = tree.root_statement().children[0];
        let StatementKind::Alias { target, alias_name } = &tree.statement(alias).unwrap().kind else {
            panic!("expected an alias");
        };
        assert_eq!(alias_name, "Foo");
        assert_eq!(tree.render(target.unwrap()), "A::Foo");
    }

    #[test]
    fn nested_imports_are_listed_innermost_first() {
        let tree = parse(
            "a.cpp",
            "<using>using <namespace>namespace <name>std</name></namespace>;</using><namespace>namespace <name>a</name> <block>{<using>using <namespace>namespace <name><name>x</name><operator>::</operator><name>y</name><operator>::</operator><name>z</name></name></namespace>;</using><function><type><name>void</name></type> <name>f</name><parameter_list>()</parameter_list> <block>{<expr_stmt><expr><call><name>g</name><argument_list>()</argument_list></call></expr>;</expr_stmt>}</block></function>}</block></namespace>",
        );
        let call = calls_named(&tree, "g")[0];
        let stmt = tree.expression_statement(call).unwrap();
        let at = tree.expression(call).unwrap().location.clone();
        let rendered: Vec<String> = imports_in_scope(&tree, stmt, at.as_ref())
            .into_iter()
            .filter_map(|i| match &tree.statement(i).unwrap().kind {
                StatementKind::Import { namespace } => namespace.map(|n| tree.render(n)),
                _ => None,
            })
            .collect();
        assert_eq!(rendered, vec!["x::y::z".to_string(), "std".to_string()]);
    }

    #[test]
    fn alias_makes_a_namespace_member_visible() {
        let tree = aggregate(&[(
            "a.cpp",
            "<namespace>namespace <name>A</name> <block>{<class>class <name>Foo</name> <block>{}</block>;</class>}</block></namespace><using>using <name><name>A</name><operator>::</operator><name>Foo</name></name>;</using><function><type><name>void</name></type> <name>f</name><parameter_list>()</parameter_list> <block>{<decl_stmt><decl><type><name>Foo</name></type> <name>x</name></decl>;</decl_stmt>}</block></function>",
        )]);
        let f = scope(&tree, "f");
        let use_of_foo = tree
            .find_expressions(f, true)
            .into_iter()
            .find(|e| {
                let expr = tree.expression(*e).unwrap();
                matches!(expr.kind, ExpressionKind::TypeUse { .. }) && expr.used_name() == Some("Foo")
            })
            .unwrap();
        assert_eq!(scopes(&find_matches(&tree, use_of_foo)), vec![scope(&tree, "A::Foo")]);
    }
}

mod resolution {
    use super::*;

    const TWO_CONTAINERS: &str = "<class>class <name>Set</name> <block>{<public>public: <function><type><name>bool</name></type> <name>Contains</name><parameter_list>()</parameter_list> <block>{}</block></function></public>}</block>;</class><class>class <name>List</name> <block>{<public>public: <function><type><name>bool</name></type> <name>Contains</name><parameter_list>()</parameter_list> <block>{}</block></function><function><type><name>void</name></type> <name>Check</name><parameter_list>()</parameter_list> <block>{<expr_stmt><expr><call><name>Contains</name><argument_list>()</argument_list></call></expr>;</expr_stmt>}</block></function></public>}</block>;</class>";

    #[test]
    fn unqualified_call_stays_in_its_own_type() {
        let tree = aggregate(&[("a.cpp", TWO_CONTAINERS)]);
        let call = calls_named(&tree, "Contains")[0];
        assert_eq!(scopes(&find_matches(&tree, call)), vec![scope(&tree, "List::Contains")]);
    }

    #[test]
    fn this_binds_to_the_innermost_type() {
        let tree = aggregate(&[(
            "a.cpp",
            "<class>class <name>Outer</name> <block>{<public>public: <class>class <name>Inner</name> <block>{<public>public: <function><type><name>void</name></type> <name>Bar</name><parameter_list>()</parameter_list> <block>{}</block></function><function><type><name>void</name></type> <name>Run</name><parameter_list>()</parameter_list> <block>{<expr_stmt><expr><call><name><name>this</name><operator>-&gt;</operator><name>Bar</name></name><argument_list>()</argument_list></call></expr>;</expr_stmt>}</block></function></public>}</block>;</class><function><type><name>void</name></type> <name>Bar</name><parameter_list>()</parameter_list> <block>{}</block></function></public>}</block>;</class>",
        )]);
        let call = calls_named(&tree, "Bar")[0];
        assert_eq!(scopes(&find_matches(&tree, call)), vec![scope(&tree, "Outer::Inner::Bar")]);
    }

    #[test]
    fn default_arguments_widen_arity() {
        let tree = aggregate(&[(
            "a.cpp",
            "<function><type><name>void</name></type> <name>foo</name><parameter_list>(<parameter><decl><type><name>int</name></type> <name>a</name><init>= <expr><literal type=\"number\">0</literal></expr></init></decl></parameter>)</parameter_list> <block>{}</block></function><function><type><name>void</name></type> <name>caller</name><parameter_list>()</parameter_list> <block>{<expr_stmt><expr><call><name>foo</name><argument_list>()</argument_list></call></expr>;</expr_stmt><expr_stmt><expr><call><name>foo</name><argument_list>(<argument><expr><literal type=\"number\">5</literal></expr></argument>)</argument_list></call></expr>;</expr_stmt>}</block></function>",
        )]);
        let foo = scope(&tree, "foo");
        let calls = calls_named(&tree, "foo");
        assert_eq!(calls.len(), 2);
        for call in calls {
            assert_eq!(scopes(&find_matches(&tree, call)), vec![foo]);
        }
    }

    #[test]
    fn too_many_arguments_match_nothing() {
        let tree = aggregate(&[(
            "a.cpp",
            "<function><type><name>void</name></type> <name>foo</name><parameter_list>()</parameter_list> <block>{}</block></function><function><type><name>void</name></type> <name>caller</name><parameter_list>()</parameter_list> <block>{<expr_stmt><expr><call><name>foo</name><argument_list>(<argument><expr><literal type=\"number\">5</literal></expr></argument>)</argument_list></call></expr>;</expr_stmt>}</block></function>",
        )]);
        let call = calls_named(&tree, "foo")[0];
        assert!(find_matches(&tree, call).is_empty());
    }

    #[test]
    fn definition_body_sees_class_members() {
        let tree = aggregate(&[("circle.h", HEADER), ("circle.cpp", SOURCE)]);
        let area = scope(&tree, "shapes::Circle::area");
        let r_use = tree
            .find_expressions(area, true)
            .into_iter()
            .find(|e| {
                let expr = tree.expression(*e).unwrap();
                !matches!(expr.kind, ExpressionKind::TypeUse { .. }) && expr.used_name() == Some("r")
            })
            .unwrap();
        let found = find_matches(&tree, r_use);
        assert_eq!(found.len(), 1);
        assert!(matches!(found[0], Declaration::Variable(_)));
    }
}

mod c_units {
    use super::*;

    #[test]
    fn c_units_are_stamped_with_c() {
        let unit = unit_from_snippet(
            "<struct>struct <name>point</name> <block>{<decl_stmt><decl><type><name>int</name></type> <name>x</name></decl>;</decl_stmt>}</block>;</struct>",
            "point.h",
            "C",
        )
        .unwrap();
        let tree = c_parser().parse_unit(&unit).unwrap();
        let point = scope(&tree, "point");
        assert_eq!(tree.statement(point).unwrap().language, Language::C);
        assert_eq!(tree.declared_variables(tree.statement(point).unwrap().children[0]).len(), 1);
    }
}
