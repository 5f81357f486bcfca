//! XML node representation
//!
//! Nodes live in the [`Document`](super::document::Document) arena and are
//! addressed by `NodeId` (u32 index). A node stores its parent link, an
//! ordered child list and a kind-specific payload carrying the exact literal
//! text needed to reproduce the input byte-for-byte: attribute quote chars
//! and leading whitespace, the raw begin/end tag name spellings, DOCTYPE
//! prologue/epilogue text, raw declaration literals.

use std::collections::HashMap;

/// Compact node identifier (index into arena)
pub type NodeId = u32;

/// Type of XML node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Document root
    Document,
    /// Element node
    Element,
    /// Text content (plain or CDATA)
    Text,
    /// Comment
    Comment,
    /// Processing instruction
    ProcessingInstruction,
    /// Unexpanded entity reference
    Entity,
    /// `<!DOCTYPE ...>` declaration
    DocType,
    /// `<!ELEMENT ...>` declaration
    DocTypeElement,
    /// `<!ATTLIST ...>` declaration
    DocTypeAttributeList,
    /// `<!ENTITY ...>` declaration
    DocTypeEntity,
    /// `<!NOTATION ...>` declaration
    DocTypeNotation,
}

impl NodeKind {
    /// Node kind name used in error messages
    pub fn description(&self) -> &'static str {
        match self {
            NodeKind::Document => "Document",
            NodeKind::Element => "Element",
            NodeKind::Text => "Text",
            NodeKind::Comment => "Comment",
            NodeKind::ProcessingInstruction => "Processing instruction",
            NodeKind::Entity => "Entity",
            NodeKind::DocType => "DOCTYPE",
            NodeKind::DocTypeElement => "ELEMENT declaration",
            NodeKind::DocTypeAttributeList => "ATTLIST declaration",
            NodeKind::DocTypeEntity => "ENTITY declaration",
            NodeKind::DocTypeNotation => "NOTATION declaration",
        }
    }
}

/// One attribute of an element, with every lexical detail preserved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Whitespace between the previous token and the attribute name
    pub leading: String,
    pub name: String,
    /// Literal text between the name and the opening quote, usually `=`
    pub equals: String,
    /// `'` or `"`
    pub quote: char,
    /// Value text exactly as it appears between the quotes
    pub value: String,
}

impl Attribute {
    /// A synthesized attribute with default formatting (` name="value"`)
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute {
            leading: " ".to_string(),
            name: name.into(),
            equals: "=".to_string(),
            quote: '"',
            value: value.into(),
        }
    }

    /// Append this attribute's literal text to `out`
    pub fn write_xml(&self, out: &mut String) {
        out.push_str(&self.leading);
        out.push_str(&self.name);
        out.push_str(&self.equals);
        out.push(self.quote);
        out.push_str(&self.value);
        out.push(self.quote);
    }
}

/// How the DOCTYPE references its definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocTypeKind {
    /// Internal subset only
    Inline,
    /// `SYSTEM "..."`
    System,
    /// `PUBLIC "..." "..."`
    Public,
}

/// Payload of a `<!DOCTYPE ...>` node
///
/// `prologue` holds the raw text from `<!DOCTYPE` up to and including the
/// `[` opening the internal subset (or the whole declaration when there is
/// no subset); `epilogue` holds the raw text from `]` through the closing
/// `>`. Subset content serializes from the declaration children in between.
#[derive(Debug, Clone, Default)]
pub struct DocType {
    pub name: String,
    pub kind: Option<DocTypeKind>,
    pub public_literal: Option<String>,
    pub system_literal: Option<String>,
    pub prologue: String,
    pub epilogue: String,
    /// name → ELEMENT declaration (first declaration wins)
    pub elements: HashMap<String, NodeId>,
    /// element name → ATTLIST declarations (an element may have several)
    pub attribute_lists: HashMap<String, Vec<NodeId>>,
    /// name → general ENTITY declaration (first wins)
    pub entities: HashMap<String, NodeId>,
    /// name → parameter ENTITY declaration (first wins)
    pub parameter_entities: HashMap<String, NodeId>,
}

/// Payload of an `<!ENTITY ...>` declaration
#[derive(Debug, Clone, Default)]
pub struct DocTypeEntity {
    /// Full raw declaration text, used for serialization
    pub literal: String,
    pub name: String,
    /// True for `<!ENTITY % name ...>`
    pub parameter: bool,
    /// Literal replacement text between the quotes; None for external
    /// entities
    pub value: Option<String>,
    /// Memoized result of expanding nested `%pe;` and `&#...;` references
    pub resolved: Option<String>,
    pub system_literal: Option<String>,
    pub public_literal: Option<String>,
    /// Notation name of an unparsed entity
    pub ndata: Option<String>,
}

/// Kind-specific node payload
#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element {
        /// Tag name as spelled in the start tag, including any tolerated
        /// whitespace after `<`
        begin_name: String,
        /// End-tag spelling including any whitespace around the name;
        /// None for empty tags and synthesized elements
        end_name: Option<String>,
        /// Whitespace between the last attribute and `>`/`/>`
        close_gap: String,
        /// True when the start tag closed with `/>`
        empty: bool,
        attributes: Vec<Attribute>,
    },
    Text {
        /// Literal XML text (entities already escaped)
        text: String,
        cdata: bool,
    },
    Comment {
        /// Text between `<!--` and `-->`
        text: String,
    },
    ProcessingInstruction {
        /// Whitespace between `<?` and the target
        leading: String,
        target: String,
        /// Everything between the target and `?>`
        text: String,
    },
    Entity {
        /// Raw reference text, e.g. `&name;` or `%name;`
        text: String,
    },
    DocType(Box<DocType>),
    DocTypeElement {
        /// Full raw declaration text
        literal: String,
        name: String,
    },
    DocTypeAttributeList {
        /// Full raw declaration text
        literal: String,
        element_name: String,
        /// ELEMENT declaration this list belongs to, linked by the
        /// mapping pass
        element: Option<NodeId>,
    },
    DocTypeEntity(Box<DocTypeEntity>),
    DocTypeNotation {
        /// Full raw declaration text
        literal: String,
        name: String,
    },
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Document => NodeKind::Document,
            NodeData::Element { .. } => NodeKind::Element,
            NodeData::Text { .. } => NodeKind::Text,
            NodeData::Comment { .. } => NodeKind::Comment,
            NodeData::ProcessingInstruction { .. } => NodeKind::ProcessingInstruction,
            NodeData::Entity { .. } => NodeKind::Entity,
            NodeData::DocType(_) => NodeKind::DocType,
            NodeData::DocTypeElement { .. } => NodeKind::DocTypeElement,
            NodeData::DocTypeAttributeList { .. } => NodeKind::DocTypeAttributeList,
            NodeData::DocTypeEntity(_) => NodeKind::DocTypeEntity,
            NodeData::DocTypeNotation { .. } => NodeKind::DocTypeNotation,
        }
    }
}

/// A node in the document arena
///
/// `span` is the source byte range the node was parsed from; None for
/// synthesized nodes.
#[derive(Debug, Clone)]
pub struct XmlNode {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub span: Option<(usize, usize)>,
    pub data: NodeData,
}

impl XmlNode {
    pub fn new(data: NodeData) -> Self {
        XmlNode {
            parent: None,
            children: Vec::new(),
            span: None,
            data,
        }
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.span = Some((start, end));
        self
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    #[inline]
    pub fn is_element(&self) -> bool {
        self.kind() == NodeKind::Element
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_default_formatting() {
        let attr = Attribute::new("id", "7");
        let mut out = String::new();
        attr.write_xml(&mut out);
        assert_eq!(out, " id=\"7\"");
    }

    #[test]
    fn test_attribute_preserves_quote_style() {
        let attr = Attribute {
            leading: "  ".to_string(),
            name: "x".to_string(),
            equals: " = ".to_string(),
            quote: '\'',
            value: "1".to_string(),
        };
        let mut out = String::new();
        attr.write_xml(&mut out);
        assert_eq!(out, "  x = '1'");
    }

    #[test]
    fn test_node_kind() {
        let node = XmlNode::new(NodeData::Text {
            text: "hi".to_string(),
            cdata: false,
        });
        assert_eq!(node.kind(), NodeKind::Text);
        assert!(node.span.is_none());
        assert!(!node.has_children());
    }
}
