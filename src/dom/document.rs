//! Arena-based XML document
//!
//! All nodes live in one `Vec`, addressed by `NodeId`; parent/child links
//! are indices, never owning references. The document node is always id 0.
//! Mutation keeps the single-parent invariant automatically: appending or
//! inserting a node that already has a parent detaches it from the old
//! container first.
//!
//! Serialization is a depth-first concatenation of per-node literal text.
//! For an unedited parse this reproduces the input byte-for-byte.

use super::node::{Attribute, DocTypeEntity, NodeData, NodeId, NodeKind, XmlNode};
use crate::core::chars::CharValidator;
use crate::core::entities::{escape, expand_numeric_reference};
use crate::error::EntityError;

/// NodeId of the document root
pub const DOCUMENT: NodeId = 0;

/// Expansion depth limit guarding against entity reference cycles
const MAX_ENTITY_DEPTH: usize = 64;

/// An XML document stored in arena format
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<XmlNode>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document containing only the root node
    pub fn new() -> Self {
        Document {
            nodes: vec![XmlNode::new(NodeData::Document)],
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &XmlNode {
        &self.nodes[id as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut XmlNode {
        &mut self.nodes[id as usize]
    }

    /// Add an unattached node to the arena
    pub fn push(&mut self, node: XmlNode) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(node);
        id
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Append `child` to `parent`'s child list, detaching it from any
    /// previous parent
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
    }

    /// Insert `child` at `index` in `parent`'s child list, detaching it
    /// from any previous parent
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        self.node_mut(child).parent = Some(parent);
        let children = &mut self.node_mut(parent).children;
        let index = index.min(children.len());
        children.insert(index, child);
    }

    /// Remove `child` from `parent`; returns false when it was not a child
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.node(child).parent != Some(parent) {
            return false;
        }
        self.detach(child);
        true
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(old_parent) = self.node(child).parent {
            let children = &mut self.node_mut(old_parent).children;
            children.retain(|&c| c != child);
            self.node_mut(child).parent = None;
        }
    }

    /// The root element, if one exists
    pub fn root_element(&self) -> Option<NodeId> {
        self.node(DOCUMENT)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).is_element())
    }

    /// The `<!DOCTYPE>` node, if present
    pub fn doctype(&self) -> Option<NodeId> {
        self.node(DOCUMENT)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).kind() == NodeKind::DocType)
    }

    /// Tag name of an element; tolerated whitespace in the start tag's
    /// spelling (`< a >`) is not part of the name
    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).data {
            NodeData::Element { begin_name, .. } => {
                Some(begin_name.trim_start_matches([' ', '\t', '\r', '\n']))
            }
            _ => None,
        }
    }

    /// Value of the named attribute
    pub fn attribute(&self, element: NodeId, name: &str) -> Option<&str> {
        match &self.node(element).data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|a| a.name == name)
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    /// Attributes of an element in document order
    pub fn attributes(&self, element: NodeId) -> &[Attribute] {
        match &self.node(element).data {
            NodeData::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Set an attribute, updating in place when the name already exists
    /// (insertion order is preserved)
    pub fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attributes, .. } = &mut self.node_mut(element).data {
            match attributes.iter_mut().find(|a| a.name == name) {
                Some(attr) => attr.value = value.to_string(),
                None => attributes.push(Attribute::new(name, value)),
            }
        }
    }

    /// Remove the named attribute; returns false when absent
    pub fn remove_attribute(&mut self, element: NodeId, name: &str) -> bool {
        if let NodeData::Element { attributes, .. } = &mut self.node_mut(element).data {
            let before = attributes.len();
            attributes.retain(|a| a.name != name);
            return attributes.len() < before;
        }
        false
    }

    /// Replace an element's children with a single text node; the text is
    /// XML-escaped
    pub fn set_text(&mut self, element: NodeId, text: &str) {
        let old: Vec<NodeId> = self.node(element).children.clone();
        for child in old {
            self.detach(child);
        }
        let text_node = self.push(XmlNode::new(NodeData::Text {
            text: escape(text).into_owned(),
            cdata: false,
        }));
        self.append_child(element, text_node);
    }

    /// Concatenated unescaped text of all descendant text nodes
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.node(id).data {
            NodeData::Text { text, cdata } => {
                if *cdata {
                    out.push_str(text);
                } else {
                    out.push_str(&crate::core::entities::unescape(text));
                }
            }
            _ => {
                for &child in &self.node(id).children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// Resolve a namespace prefix by walking ancestors' `xmlns` /
    /// `xmlns:prefix` attributes; `None` prefix looks up the default
    /// namespace
    pub fn namespace_uri(&self, element: NodeId, prefix: Option<&str>) -> Option<&str> {
        let attr_name = match prefix {
            Some(p) => format!("xmlns:{p}"),
            None => "xmlns".to_string(),
        };
        let mut current = Some(element);
        while let Some(id) = current {
            if self.node(id).is_element() {
                if let Some(uri) = self.attribute(id, &attr_name) {
                    return Some(uri);
                }
            }
            current = self.node(id).parent;
        }
        None
    }

    /// Namespace URI bound to an element's own prefix (the part of its
    /// name before `:`, or the default namespace)
    pub fn element_namespace_uri(&self, element: NodeId) -> Option<&str> {
        let name = self.element_name(element)?;
        let prefix = name.split_once(':').map(|(p, _)| p);
        self.namespace_uri(element, prefix)
    }

    // ----- DOCTYPE indexes ---------------------------------------------

    /// ELEMENT declaration for a name
    pub fn doctype_element(&self, name: &str) -> Option<NodeId> {
        match &self.node(self.doctype()?).data {
            NodeData::DocType(dt) => dt.elements.get(name).copied(),
            _ => None,
        }
    }

    /// ATTLIST declarations for an element name, in declaration order
    pub fn doctype_attribute_lists(&self, element_name: &str) -> Vec<NodeId> {
        match self.doctype().map(|id| &self.node(id).data) {
            Some(NodeData::DocType(dt)) => dt
                .attribute_lists
                .get(element_name)
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// General ENTITY declaration for a name
    pub fn doctype_entity(&self, name: &str) -> Option<NodeId> {
        match &self.node(self.doctype()?).data {
            NodeData::DocType(dt) => dt.entities.get(name).copied(),
            _ => None,
        }
    }

    /// Parameter ENTITY declaration for a name
    pub fn doctype_parameter_entity(&self, name: &str) -> Option<NodeId> {
        match &self.node(self.doctype()?).data {
            NodeData::DocType(dt) => dt.parameter_entities.get(name).copied(),
            _ => None,
        }
    }

    /// Build the DOCTYPE's derived indexes and the ATTLIST→ELEMENT
    /// back-references
    ///
    /// First declaration wins for each name; later duplicates stay in the
    /// child list but are not indexed. Runs once after DOCTYPE parsing;
    /// callers that mutate declarations may run it again.
    pub fn map_elements_and_attributes(&mut self) {
        let doctype = match self.doctype() {
            Some(id) => id,
            None => return,
        };
        let children = self.node(doctype).children.clone();

        let mut elements = std::collections::HashMap::new();
        let mut attribute_lists: std::collections::HashMap<String, Vec<NodeId>> =
            std::collections::HashMap::new();
        let mut entities = std::collections::HashMap::new();
        let mut parameter_entities = std::collections::HashMap::new();

        for &child in &children {
            match &self.node(child).data {
                NodeData::DocTypeElement { name, .. } => {
                    elements.entry(name.clone()).or_insert(child);
                }
                NodeData::DocTypeAttributeList { element_name, .. } => {
                    attribute_lists
                        .entry(element_name.clone())
                        .or_default()
                        .push(child);
                }
                NodeData::DocTypeEntity(entity) => {
                    let index = if entity.parameter {
                        &mut parameter_entities
                    } else {
                        &mut entities
                    };
                    index.entry(entity.name.clone()).or_insert(child);
                }
                _ => {}
            }
        }

        // Link each ATTLIST to its ELEMENT declaration
        for lists in attribute_lists.values() {
            for &list in lists {
                let element_name = match &self.node(list).data {
                    NodeData::DocTypeAttributeList { element_name, .. } => element_name.clone(),
                    _ => continue,
                };
                let target = elements.get(&element_name).copied();
                if let NodeData::DocTypeAttributeList { element, .. } =
                    &mut self.node_mut(list).data
                {
                    *element = target;
                }
            }
        }

        if let NodeData::DocType(dt) = &mut self.node_mut(doctype).data {
            dt.elements = elements;
            dt.attribute_lists = attribute_lists;
            dt.entities = entities;
            dt.parameter_entities = parameter_entities;
        }
    }

    /// Fully-resolved replacement text of an ENTITY declaration
    ///
    /// Expands nested `%pe;` and `&#...;` references in the literal value;
    /// general `&name;` references are left untouched. Numeric references
    /// are checked against `validator`. The result is memoized on the
    /// entity. Reference cycles and expansions deeper than
    /// [`MAX_ENTITY_DEPTH`] fail with [`EntityError::CircularReference`].
    pub fn resolved_entity_text(
        &mut self,
        entity: NodeId,
        validator: CharValidator,
    ) -> Result<String, EntityError> {
        if let NodeData::DocTypeEntity(e) = &self.node(entity).data {
            if let Some(resolved) = &e.resolved {
                return Ok(resolved.clone());
            }
        }
        let mut visiting = Vec::new();
        let resolved = self.resolve_entity(entity, validator, &mut visiting)?;
        if let NodeData::DocTypeEntity(e) = &mut self.node_mut(entity).data {
            e.resolved = Some(resolved.clone());
        }
        Ok(resolved)
    }

    fn resolve_entity(
        &self,
        entity: NodeId,
        validator: CharValidator,
        visiting: &mut Vec<String>,
    ) -> Result<String, EntityError> {
        let (name, value) = match &self.node(entity).data {
            NodeData::DocTypeEntity(e) => (
                e.name.clone(),
                e.value.clone().unwrap_or_default(),
            ),
            _ => return Ok(String::new()),
        };
        if visiting.iter().any(|n| n == &name) || visiting.len() >= MAX_ENTITY_DEPTH {
            return Err(EntityError::CircularReference(name));
        }
        visiting.push(name);
        let result = self.expand_entity_value(&value, validator, visiting);
        visiting.pop();
        result
    }

    fn expand_entity_value(
        &self,
        value: &str,
        validator: CharValidator,
        visiting: &mut Vec<String>,
    ) -> Result<String, EntityError> {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(pos) = rest.find(['%', '&']) {
            out.push_str(&rest[..pos]);
            rest = &rest[pos..];
            let body_len = reference_body_len(&rest[1..]);
            if body_len == 0 || rest[1 + body_len..].as_bytes().first() != Some(&b';') {
                // A bare delimiter is literal text
                let delim_len = rest.chars().next().map(char::len_utf8).unwrap_or(0);
                out.push_str(&rest[..delim_len]);
                rest = &rest[delim_len..];
                continue;
            }
            let reference = &rest[..body_len + 2];
            if rest.starts_with('%') {
                let pe_name = &reference[1..reference.len() - 1];
                match self.doctype_parameter_entity(pe_name) {
                    Some(pe) => {
                        let expanded = self.resolve_entity(pe, validator, visiting)?;
                        out.push_str(&expanded);
                    }
                    None => return Err(EntityError::NotDefined(pe_name.to_string())),
                }
            } else if reference.starts_with("&#") {
                out.push_str(&expand_numeric_reference(reference, validator)?);
            } else {
                // General entity reference, left for document-level expansion
                out.push_str(reference);
            }
            rest = &rest[reference.len()..];
        }
        out.push_str(rest);
        Ok(out)
    }

    // ----- serialization -----------------------------------------------


    /// Serialize the whole document; for an unedited parse this is the
    /// original input
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_node(DOCUMENT, &mut out);
        out
    }

    /// Serialize one node and its subtree
    pub fn node_to_xml(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        match &node.data {
            NodeData::Document => {
                for &child in &node.children {
                    self.write_node(child, out);
                }
            }
            NodeData::Element {
                begin_name,
                end_name,
                close_gap,
                empty,
                attributes,
            } => {
                out.push('<');
                out.push_str(begin_name);
                for attr in attributes {
                    attr.write_xml(out);
                }
                out.push_str(close_gap);
                if *empty {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in &node.children {
                        self.write_node(child, out);
                    }
                    out.push_str("</");
                    match end_name {
                        Some(end_name) => out.push_str(end_name),
                        None => out.push_str(begin_name),
                    }
                    out.push('>');
                }
            }
            NodeData::Text { text, cdata } => {
                if *cdata {
                    out.push_str("<![CDATA[");
                    out.push_str(text);
                    out.push_str("]]>");
                } else {
                    out.push_str(text);
                }
            }
            NodeData::Comment { text } => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::ProcessingInstruction {
                leading,
                target,
                text,
            } => {
                out.push_str("<?");
                out.push_str(leading);
                out.push_str(target);
                out.push_str(text);
                out.push_str("?>");
            }
            NodeData::Entity { text } => out.push_str(text),
            NodeData::DocType(dt) => {
                out.push_str(&dt.prologue);
                for &child in &node.children {
                    self.write_node(child, out);
                }
                out.push_str(&dt.epilogue);
            }
            NodeData::DocTypeElement { literal, .. }
            | NodeData::DocTypeAttributeList { literal, .. }
            | NodeData::DocTypeNotation { literal, .. } => out.push_str(literal),
            NodeData::DocTypeEntity(entity) => out.push_str(&entity.literal),
        }
    }
}

/// Length of a reference body at the start of `text`: a name, or `#`
/// followed by digits. Zero when no reference starts here.
fn reference_body_len(text: &str) -> usize {
    let mut len = 0;
    let mut chars = text.chars();
    if let Some('#') = text.chars().next() {
        chars.next();
        len += 1;
        for c in chars {
            if !c.is_ascii_alphanumeric() {
                break;
            }
            len += 1;
        }
        return if len > 1 { len } else { 0 };
    }
    for c in chars {
        if !crate::core::chars::is_name_char(c) {
            break;
        }
        len += c.len_utf8();
    }
    len
}

/// Build a synthesized entity declaration for tests and programmatic use
impl DocTypeEntity {
    pub fn general(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        DocTypeEntity {
            literal: format!("<!ENTITY {name} \"{value}\">"),
            name,
            parameter: false,
            value: Some(value),
            ..DocTypeEntity::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::DocType;

    fn element(doc: &mut Document, name: &str) -> NodeId {
        doc.push(XmlNode::new(NodeData::Element {
            begin_name: name.to_string(),
            end_name: None,
            close_gap: String::new(),
            empty: false,
            attributes: Vec::new(),
        }))
    }

    #[test]
    fn test_append_and_serialize() {
        let mut doc = Document::new();
        let root = element(&mut doc, "a");
        doc.append_child(DOCUMENT, root);
        doc.set_text(root, "x < y");
        assert_eq!(doc.to_xml(), "<a>x &lt; y</a>");
        assert_eq!(doc.text(root), "x < y");
    }

    #[test]
    fn test_single_parent_invariant() {
        let mut doc = Document::new();
        let root = element(&mut doc, "a");
        let first = element(&mut doc, "b");
        let second = element(&mut doc, "c");
        doc.append_child(DOCUMENT, root);
        doc.append_child(root, first);
        doc.append_child(first, second);

        // Re-parenting detaches from the old container automatically
        doc.append_child(root, second);
        assert_eq!(doc.children(first), &[] as &[NodeId]);
        assert_eq!(doc.children(root), &[first, second]);
        assert_eq!(doc.parent(second), Some(root));
    }

    #[test]
    fn test_insert_and_remove_child() {
        let mut doc = Document::new();
        let root = element(&mut doc, "a");
        let b = element(&mut doc, "b");
        let c = element(&mut doc, "c");
        doc.append_child(DOCUMENT, root);
        doc.append_child(root, c);
        doc.insert_child(root, 0, b);
        assert_eq!(doc.to_xml(), "<a><b></b><c></c></a>");

        assert!(doc.remove_child(root, b));
        assert!(!doc.remove_child(root, b));
        assert_eq!(doc.to_xml(), "<a><c></c></a>");
    }

    #[test]
    fn test_attributes() {
        let mut doc = Document::new();
        let root = element(&mut doc, "a");
        doc.append_child(DOCUMENT, root);
        doc.set_attribute(root, "x", "1");
        doc.set_attribute(root, "y", "2");
        doc.set_attribute(root, "x", "3");
        assert_eq!(doc.attribute(root, "x"), Some("3"));
        // Updating keeps insertion order
        assert_eq!(doc.to_xml(), "<a x=\"3\" y=\"2\"></a>");
        assert!(doc.remove_attribute(root, "x"));
        assert_eq!(doc.attribute(root, "x"), None);
    }

    #[test]
    fn test_namespace_lookup_walks_ancestors() {
        let mut doc = Document::new();
        let root = element(&mut doc, "a");
        let child = element(&mut doc, "p:b");
        doc.append_child(DOCUMENT, root);
        doc.append_child(root, child);
        doc.set_attribute(root, "xmlns", "urn:default");
        doc.set_attribute(root, "xmlns:p", "urn:p");

        assert_eq!(doc.namespace_uri(child, None), Some("urn:default"));
        assert_eq!(doc.namespace_uri(child, Some("p")), Some("urn:p"));
        assert_eq!(doc.namespace_uri(child, Some("q")), None);
        assert_eq!(doc.element_namespace_uri(child), Some("urn:p"));
        assert_eq!(doc.element_namespace_uri(root), Some("urn:default"));
    }

    fn doctype_with_entities(entries: &[(&str, bool, &str)]) -> (Document, NodeId) {
        let mut doc = Document::new();
        let dt = doc.push(XmlNode::new(NodeData::DocType(Box::new(DocType {
            name: "r".to_string(),
            prologue: "<!DOCTYPE r [".to_string(),
            epilogue: "]>".to_string(),
            ..DocType::default()
        }))));
        doc.append_child(DOCUMENT, dt);
        for (name, parameter, value) in entries {
            let node = doc.push(XmlNode::new(NodeData::DocTypeEntity(Box::new(
                DocTypeEntity {
                    parameter: *parameter,
                    ..DocTypeEntity::general(*name, *value)
                },
            ))));
            doc.append_child(dt, node);
        }
        doc.map_elements_and_attributes();
        (doc, dt)
    }

    #[test]
    fn test_entity_resolution_expands_nested_references() {
        let (mut doc, _) = doctype_with_entities(&[
            ("pe", true, "deep"),
            ("e", false, "a %pe; b &#65; &amp;"),
        ]);
        let entity = doc.doctype_entity("e").unwrap();
        assert_eq!(
            doc.resolved_entity_text(entity, CharValidator::new()).unwrap(),
            "a deep b A &amp;"
        );
        // Memoized
        if let NodeData::DocTypeEntity(e) = &doc.node(entity).data {
            assert_eq!(e.resolved.as_deref(), Some("a deep b A &amp;"));
        } else {
            unreachable!();
        }
    }

    #[test]
    fn test_validator_applies_to_numeric_references_in_entity_values() {
        let (mut doc, _) = doctype_with_entities(&[("e", false, "&#1;")]);
        let entity = doc.doctype_entity("e").unwrap();
        assert_eq!(
            doc.resolved_entity_text(entity, CharValidator::new()),
            Err(EntityError::ForbiddenCharacter(1))
        );
        assert_eq!(
            doc.resolved_entity_text(entity, CharValidator::lenient())
                .unwrap(),
            "\u{1}"
        );
    }

    #[test]
    fn test_entity_cycle_detected() {
        let (mut doc, _) = doctype_with_entities(&[
            ("a", true, "x %b; y"),
            ("b", true, "z %a;"),
            ("e", false, "%a;"),
        ]);
        let entity = doc.doctype_entity("e").unwrap();
        assert_eq!(
            doc.resolved_entity_text(entity, CharValidator::new()),
            Err(EntityError::CircularReference("a".to_string()))
        );
    }

    #[test]
    fn test_undefined_parameter_entity() {
        let (mut doc, _) = doctype_with_entities(&[("e", false, "%nope;")]);
        let entity = doc.doctype_entity("e").unwrap();
        assert_eq!(
            doc.resolved_entity_text(entity, CharValidator::new()),
            Err(EntityError::NotDefined("nope".to_string()))
        );
    }

    #[test]
    fn test_first_declaration_wins() {
        let (doc, _) = doctype_with_entities(&[("e", false, "first"), ("e", false, "second")]);
        let entity = doc.doctype_entity("e").unwrap();
        if let NodeData::DocTypeEntity(e) = &doc.node(entity).data {
            assert_eq!(e.value.as_deref(), Some("first"));
        } else {
            unreachable!();
        }
    }
}
