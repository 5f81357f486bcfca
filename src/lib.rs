//! verbatim-xml - Lossless round-tripping XML parser
//!
//! Parses XML into a tree that preserves every lexical decision of the
//! input: whitespace, attribute quote style, comment placement, DOCTYPE
//! formatting. For any well-formed document with no external DTD,
//! `parse(x)?.to_xml() == x` byte-for-byte.
//!
//! Layers:
//! - `core`: source buffer, character rules, tokens, the main and DTD
//!   tokenizers, entity resolution
//! - `parser`: well-formedness enforcement and tree building
//! - `dom`: arena document with a mutation API and the round-trip
//!   serializer
//!
//! ```
//! let doc = verbatim_xml::parse("<greeting  who='world'>hi</greeting>")?;
//! assert_eq!(doc.to_xml(), "<greeting  who='world'>hi</greeting>");
//! let root = doc.root_element().unwrap();
//! assert_eq!(doc.attribute(root, "who"), Some("world"));
//! # Ok::<(), verbatim_xml::XmlError>(())
//! ```

pub mod core;
pub mod dom;
pub mod error;
pub mod location;
pub mod parser;

pub use crate::core::chars::CharValidator;
pub use crate::core::entities::{escape, unescape, EntityResolver};
pub use crate::core::source::Source;
pub use crate::dom::{Attribute, Document, NodeData, NodeId, NodeKind, XmlNode, DOCUMENT};
pub use crate::error::{EntityError, XmlError};
pub use crate::location::Location;
pub use crate::parser::Parser;

/// Parse a document in round-trip mode
pub fn parse(text: &str) -> Result<Document, XmlError> {
    parser::parse_str(text)
}
