//! Cross-module round-trip and conformance-style tests.

use verbatim_xml::{parse, Document, EntityResolver, NodeKind, Parser, DOCUMENT};

/// Documents exercising every node kind and the lexical details the tree
/// must preserve.
const CORPUS: &[&str] = &[
    "<a/>",
    "<a></a>",
    "<a>text</a>",
    "<a  b='1'  c=\"2\" ></a >",
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root/>\n",
    "<a><!-- a comment --><![CDATA[raw <>& text]]></a>",
    "<a>x&amp;y&#x41;z</a>",
    "<?xml version=\"1.0\"?>\n<?style href=\"x.css\"?>\n<a/>\n",
    "<ns:a xmlns:ns='urn:n'><ns:b  attr = 'v' /></ns:a>",
    "<a>\n  <b>\n    <c/>\n  </b>\n</a>",
    "<a x=\"it's\" y='say \"hi\"'/>",
    "< a >x</ a >",
    "<!DOCTYPE r><r/>",
    "<!DOCTYPE r SYSTEM \"r.dtd\">\n<r/>",
    "<!DOCTYPE r PUBLIC \"-//X//DTD r//EN\" \"r.dtd\"><r/>",
    "<!DOCTYPE sql [ <!ENTITY name 'value' -- comment --> \
     <!ELEMENT sql (#PCDATA)> <!ATTLIST sql id ID #IMPLIED> ]>\n<sql id=\"q1\">&name;</sql>\n",
    "<!DOCTYPE r [<!NOTATION gif SYSTEM \"image/gif\">\
     <!ENTITY pic SYSTEM \"p.gif\" NDATA gif>]><r/>",
    "<!DOCTYPE r [<!ENTITY % pe \"x\">%pe;<!-- dtd comment -->]><r/>",
    "<a>\u{e9}l\u{e9}ment \u{1F600}</a>",
];

#[test]
fn round_trip_corpus() {
    for text in CORPUS {
        let doc = parse(text).unwrap_or_else(|e| panic!("{text:?}: {e}"));
        assert_eq!(doc.to_xml(), *text, "round trip failed for {text:?}");
    }
}

/// Node kinds and text of a tree, flattened depth-first
fn shape(doc: &Document) -> Vec<(NodeKind, String)> {
    fn walk(doc: &Document, id: verbatim_xml::NodeId, out: &mut Vec<(NodeKind, String)>) {
        out.push((doc.node(id).kind(), doc.node_to_xml(id)));
        for &child in doc.children(id) {
            walk(doc, child, out);
        }
    }
    let mut out = Vec::new();
    walk(doc, DOCUMENT, &mut out);
    out
}

#[test]
fn reparse_is_idempotent() {
    for text in CORPUS {
        let first = parse(text).unwrap();
        let second = parse(&first.to_xml()).unwrap();
        assert_eq!(shape(&first), shape(&second), "reparse differs for {text:?}");
    }
}

#[test]
fn not_well_formed_fixtures_fail_with_exact_messages() {
    let fixtures: &[(&str, &str)] = &[
        (
            "<a x=\"1\" x=\"2\"/>",
            "There is already an attribute with the name \"x\"",
        ),
        (
            "<a></b>",
            "End tag \"</b>\" does not match begin tag \"<a>\" at line 1, column 1",
        ),
        ("<a/><b/>", "Only one root element allowed per document"),
        (
            "<a/><?xml version=\"1.0\"?>",
            "The XML declaration must be the first node of the document",
        ),
        ("<a>x]]>y</a>", "The character sequence \"]]>\" is not allowed in text"),
        (
            "<a><!-- x -- y --></a>",
            "The character sequence \"--\" is not allowed in comments",
        ),
        ("<a>&amp</a>", "Missing ';' of entity reference"),
        ("<a x=\"<\"/>", "The character '<' is not allowed in attribute values"),
        ("<a", "Missing '>' of start tag"),
        ("<a><b>", "Unexpected end-of-file while parsing children of element b"),
        ("<!DOCTYPE a [", "Unexpected end-of-file while parsing DOCTYPE"),
        ("<a/>text", "Text node is not allowed here"),
    ];
    for (text, message) in fixtures {
        let err = parse(text).unwrap_err();
        assert_eq!(err.message(), *message, "for {text:?}");
        assert!(err.location().is_some(), "no location for {text:?}");
    }
}

#[test]
fn duplicate_attribute_location_points_at_second_occurrence() {
    let err = parse("<a x=\"1\"\n   x=\"2\"/>").unwrap_err();
    let location = err.location().unwrap();
    assert_eq!(location.line, 2);
    assert_eq!(location.column, 4);
}

#[test]
fn expansion_resolves_all_entities_in_valid_documents() {
    let doc = Parser::new()
        .expand_entities(true)
        .parse("<!DOCTYPE a [<!ENTITY who 'world'>]><a>hello &who;&#33;</a>")
        .unwrap();
    let root = doc.root_element().unwrap();
    assert_eq!(doc.text(root), "hello world!");
}

#[test]
fn expansion_with_layered_resolver_chain() {
    let mut html = EntityResolver::xml();
    html.add("nbsp", "\u{a0}");
    let mut local = EntityResolver::new().with_parent(std::sync::Arc::new(html));
    local.add("brand", "Acme");

    let doc = Parser::new()
        .expand_entities(true)
        .resolver(local)
        .parse("<a>&brand;&nbsp;&lt;</a>")
        .unwrap();
    assert_eq!(doc.text(doc.root_element().unwrap()), "Acme\u{a0}<");
}

#[test]
fn edits_serialize_with_default_formatting() {
    let mut doc = parse("<list>\n  <item id='1'/>\n</list>").unwrap();
    let root = doc.root_element().unwrap();
    doc.set_attribute(root, "size", "1");
    assert_eq!(
        doc.to_xml(),
        "<list size=\"1\">\n  <item id='1'/>\n</list>"
    );
}
