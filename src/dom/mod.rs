//! Arena document model: nodes, attributes and the round-trip serializer.

pub mod document;
pub mod node;

pub use document::{Document, DOCUMENT};
pub use node::{
    Attribute, DocType, DocTypeEntity, DocTypeKind, NodeData, NodeId, NodeKind, XmlNode,
};
