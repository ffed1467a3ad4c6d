//! Owned façade over srcML markup.
//!
//! srcML documents are parsed with `roxmltree` and copied into a small owned
//! tree so that parsers can hold elements without borrowing the source text.
//! Every element carries:
//!
//! | Field | Source |
//! |-------|--------|
//! | `tag` | local element name; `cpp:` prefix for preprocessor elements |
//! | attributes | keyed by local name (`type`, `filename`, `ref`, ...) |
//! | `line`/`column` | `pos:start` / `pos:line`+`pos:column`, else document position |
//! | `xpath` | `/unit[@filename='a.cpp']/class[1]/block[1]` style locator |
//!
//! An archive (a `<unit>` whose children are `<unit>` elements) yields one
//! element per nested unit; a plain document yields its root unit.

use std::fmt::Write as _;

use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading markup.
#[derive(Debug, Error)]
pub enum MarkupError {
    /// The text is not well-formed XML.
    #[error("malformed srcML: {0}")]
    Malformed(#[from] roxmltree::Error),

    /// The document root is not a `unit` element.
    #[error("expected a unit root element, found <{found}>")]
    NotAUnit { found: String },
}

/// Result type for markup operations.
pub type MarkupResult<T> = Result<T, MarkupError>;

const POSITION_NAMESPACE_MARKER: &str = "position";
const CPP_NAMESPACE_MARKER: &str = "/cpp";

const SNIPPET_NAMESPACES: &str = concat!(
    r#"xmlns="http://www.srcML.org/srcML/src" "#,
    r#"xmlns:cpp="http://www.srcML.org/srcML/cpp" "#,
    r#"xmlns:op="http://www.srcML.org/srcML/operator" "#,
    r#"xmlns:lit="http://www.srcML.org/srcML/literal" "#,
    r#"xmlns:type="http://www.srcML.org/srcML/type" "#,
    r#"xmlns:pos="http://www.srcML.org/srcML/position""#,
);

// ============================================================================
// Element Tree
// ============================================================================

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// One srcML element with its position metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
    /// 1-based start line.
    pub line: u32,
    /// 1-based start column.
    pub column: u32,
    /// 1-based end line.
    pub end_line: u32,
    /// 1-based end column.
    pub end_column: u32,
    xpath: String,
}

impl Element {
    /// The element tag (local name, or `cpp:<name>` for preprocessor markup).
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Check the tag.
    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }

    /// Attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The structural locator of this element.
    pub fn xpath(&self) -> &str {
        &self.xpath
    }

    /// All children, text included.
    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.elements().find(|e| e.tag == tag)
    }

    /// Child elements with the given tag.
    pub fn children_tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.tag == tag)
    }

    /// Whether any direct child element has the given tag.
    pub fn has_child(&self, tag: &str) -> bool {
        self.child(tag).is_some()
    }

    /// Concatenated descendant text.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    /// Text of the direct text children only (no descendants).
    pub fn own_text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Depth-first descendants (excluding self).
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.elements().collect();
        stack.reverse();
        while let Some(element) = stack.pop() {
            out.push(element);
            let mut kids: Vec<&Element> = element.elements().collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Source file name of a unit element.
    pub fn file_name(&self) -> Option<&str> {
        self.attr("filename")
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => element.collect_text(out),
            }
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load every compilation unit in a srcML document.
pub fn load_units(xml: &str) -> MarkupResult<Vec<Element>> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "unit" {
        return Err(MarkupError::NotAUnit {
            found: root.tag_name().name().to_string(),
        });
    }

    let nested: Vec<roxmltree::Node<'_, '_>> = root
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "unit")
        .collect();

    if nested.is_empty() {
        Ok(vec![convert(&doc, root, unit_xpath(root, 1))])
    } else {
        Ok(nested
            .into_iter()
            .enumerate()
            .map(|(i, unit)| convert(&doc, unit, unit_xpath(unit, i + 1)))
            .collect())
    }
}

/// Load a document that must contain exactly one unit.
pub fn load_unit(xml: &str) -> MarkupResult<Element> {
    let mut units = load_units(xml)?;
    match units.len() {
        1 => Ok(units.remove(0)),
        _ => Err(MarkupError::NotAUnit {
            found: format!("archive with {} units", units.len()),
        }),
    }
}

/// Wrap a markup fragment in a unit element and load it.
pub fn unit_from_snippet(snippet: &str, file_name: &str, language: &str) -> MarkupResult<Element> {
    let xml = format!(
        r#"<unit {} language="{}" filename="{}">{}</unit>"#,
        SNIPPET_NAMESPACES,
        escape_attr(language),
        escape_attr(file_name),
        snippet
    );
    load_unit(&xml)
}

fn unit_xpath(unit: roxmltree::Node<'_, '_>, index: usize) -> String {
    match unit.attributes().find(|a| a.name() == "filename") {
        Some(attr) => format!("/unit[@filename='{}']", attr.value()),
        None => format!("/unit[{}]", index),
    }
}

fn convert(doc: &roxmltree::Document<'_>, node: roxmltree::Node<'_, '_>, xpath: String) -> Element {
    let mut attributes = Vec::new();
    let mut start: Option<(u32, u32)> = None;
    let mut end: Option<(u32, u32)> = None;
    let mut line: Option<u32> = None;
    let mut column: Option<u32> = None;

    for attr in node.attributes() {
        let in_position_ns = attr
            .namespace()
            .is_some_and(|ns| ns.contains(POSITION_NAMESPACE_MARKER));
        if in_position_ns {
            match attr.name() {
                "start" => start = parse_line_column(attr.value()),
                "end" => end = parse_line_column(attr.value()),
                "line" => line = attr.value().parse().ok(),
                "column" => column = attr.value().parse().ok(),
                _ => {}
            }
        } else {
            attributes.push((attr.name().to_string(), attr.value().to_string()));
        }
    }

    let range = node.range();
    let (line, column) = start
        .or_else(|| line.map(|l| (l, column.unwrap_or(1))))
        .unwrap_or_else(|| {
            let pos = doc.text_pos_at(range.start);
            (pos.row, pos.col)
        });
    let (end_line, end_column) = end.unwrap_or_else(|| {
        let pos = doc.text_pos_at(range.end);
        (pos.row, pos.col)
    });

    let mut children = Vec::new();
    let mut sibling_counts: Vec<(String, usize)> = Vec::new();
    for child in node.children() {
        if child.is_element() {
            let tag = tag_for(child);
            let index = match sibling_counts.iter_mut().find(|(t, _)| *t == tag) {
                Some((_, count)) => {
                    *count += 1;
                    *count
                }
                None => {
                    sibling_counts.push((tag.clone(), 1));
                    1
                }
            };
            let mut child_xpath = xpath.clone();
            let _ = write!(child_xpath, "/{}[{}]", tag, index);
            children.push(Node::Element(convert(doc, child, child_xpath)));
        } else if let Some(text) = child.text() {
            if child.is_text() {
                children.push(Node::Text(text.to_string()));
            }
        }
    }

    Element {
        tag: tag_for(node),
        attributes,
        children,
        line,
        column,
        end_line: end_line.max(line),
        end_column,
        xpath,
    }
}

fn tag_for(node: roxmltree::Node<'_, '_>) -> String {
    let name = node.tag_name().name();
    match node.tag_name().namespace() {
        Some(ns) if ns.ends_with(CPP_NAMESPACE_MARKER) => format!("cpp:{}", name),
        _ => name.to_string(),
    }
}

fn parse_line_column(value: &str) -> Option<(u32, u32)> {
    let (line, column) = value.split_once(':')?;
    Some((line.trim().parse().ok()?, column.trim().parse().ok()?))
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod loading {
        use super::*;

        #[test]
        fn snippet_unit_carries_file_name_and_language() {
            let unit = unit_from_snippet("<empty_stmt>;</empty_stmt>", "a.cpp", "C++").unwrap();
            assert_eq!(unit.tag(), "unit");
            assert_eq!(unit.file_name(), Some("a.cpp"));
            assert_eq!(unit.attr("language"), Some("C++"));
            assert_eq!(unit.xpath(), "/unit[@filename='a.cpp']");
        }

        #[test]
        fn archive_yields_each_nested_unit() {
            let xml = r#"<unit xmlns="http://www.srcML.org/srcML/src">
<unit filename="a.cpp"><empty_stmt>;</empty_stmt></unit>
<unit filename="b.cpp"><empty_stmt>;</empty_stmt></unit>
</unit>"#;
            let units = load_units(xml).unwrap();
            assert_eq!(units.len(), 2);
            assert_eq!(units[1].file_name(), Some("b.cpp"));
        }

        #[test]
        fn non_unit_root_is_rejected() {
            let err = load_units("<class/>").unwrap_err();
            assert!(matches!(err, MarkupError::NotAUnit { .. }));
        }

        #[test]
        fn malformed_text_is_rejected() {
            assert!(matches!(
                load_units("<unit>"),
                Err(MarkupError::Malformed(_))
            ));
        }
    }

    mod positions {
        use super::*;

        #[test]
        fn position_attributes_win_over_document_offsets() {
            let unit = unit_from_snippet(
                r#"<class pos:start="7:3" pos:end="9:1">class <name>A</name></class>"#,
                "a.cpp",
                "C++",
            )
            .unwrap();
            let class = unit.child("class").unwrap();
            assert_eq!((class.line, class.column), (7, 3));
            assert_eq!((class.end_line, class.end_column), (9, 1));
        }

        #[test]
        fn legacy_line_column_attributes_are_read() {
            let unit = unit_from_snippet(
                r#"<name pos:line="4" pos:column="12">x</name>"#,
                "a.cpp",
                "C++",
            )
            .unwrap();
            let name = unit.child("name").unwrap();
            assert_eq!((name.line, name.column), (4, 12));
            assert!(name.attr("line").is_none());
        }

        #[test]
        fn missing_positions_fall_back_to_document_order() {
            let unit = unit_from_snippet(
                "<empty_stmt>;</empty_stmt>\n<empty_stmt>;</empty_stmt>",
                "a.cpp",
                "C++",
            )
            .unwrap();
            let stmts: Vec<_> = unit.children_tagged("empty_stmt").collect();
            assert!(stmts[0].line < stmts[1].line);
        }
    }

    mod structure {
        use super::*;

        #[test]
        fn xpath_counts_same_tag_siblings() {
            let unit = unit_from_snippet(
                "<decl_stmt/><function/><decl_stmt/>",
                "a.cpp",
                "C++",
            )
            .unwrap();
            let xpaths: Vec<_> = unit.elements().map(|e| e.xpath().to_string()).collect();
            assert_eq!(
                xpaths,
                vec![
                    "/unit[@filename='a.cpp']/decl_stmt[1]",
                    "/unit[@filename='a.cpp']/function[1]",
                    "/unit[@filename='a.cpp']/decl_stmt[2]",
                ]
            );
        }

        #[test]
        fn namespaced_tags_use_local_names() {
            let unit = unit_from_snippet(
                r#"<expr><op:operator>::</op:operator><lit:literal type="number">1</lit:literal></expr><cpp:if>#if</cpp:if>"#,
                "a.cpp",
                "C++",
            )
            .unwrap();
            let expr = unit.child("expr").unwrap();
            let tags: Vec<_> = expr.elements().map(|e| e.tag().to_string()).collect();
            assert_eq!(tags, vec!["operator", "literal"]);
            assert!(unit.child("cpp:if").is_some());
            assert!(unit.child("if").is_none());
        }

        #[test]
        fn text_concatenates_descendants() {
            let unit = unit_from_snippet(
                "<name><name>A</name><op:operator>::</op:operator><name>B</name></name>",
                "a.cpp",
                "C++",
            )
            .unwrap();
            let name = unit.child("name").unwrap();
            assert_eq!(name.text(), "A::B");
            assert_eq!(name.own_text(), "");
            assert_eq!(name.descendants().len(), 3);
        }
    }
}
