//! XML parser
//!
//! Drives the tokenizer and builds a [`Document`] with an explicit stack of
//! open elements. Enforces the well-formedness rules that span tokens:
//! single root element, XML declaration placement, matching end tags,
//! DOCTYPE declaration grammar. Every violation is a hard failure with a
//! source location; the message wording is stable and tested.
//!
//! Two modes:
//! - round-trip (default): entity references are kept as opaque nodes and
//!   `Document::to_xml` reproduces the input byte-for-byte;
//! - expanding (`expand_entities(true)`): entity references are resolved
//!   (DOCTYPE-declared entities first, then the resolver chain) and their
//!   replacement text is parsed in place.

use crate::core::chars::{self, CharValidator};
use crate::core::entities::{expand_numeric_reference, EntityResolver};
use crate::core::source::Source;
use crate::core::token::{Token, TokenKind};
use crate::core::tokenizer::Tokenizer;
use crate::dom::node::{DocType, DocTypeEntity, DocTypeKind};
use crate::dom::{Attribute, Document, NodeData, NodeId, XmlNode, DOCUMENT};
use crate::error::{EntityError, XmlError};
use crate::location::Location;
use std::sync::Arc;

/// Nested entity expansions deeper than this are treated as a cycle
const MAX_EXPANSION_DEPTH: usize = 64;

/// Parse a document in round-trip mode
pub fn parse_str(text: &str) -> Result<Document, XmlError> {
    Parser::new().parse(text)
}

/// Configurable parser
#[derive(Debug, Clone, Default)]
pub struct Parser {
    expand_entities: bool,
    resolver: Option<Arc<EntityResolver>>,
    validator: CharValidator,
}

impl Parser {
    pub fn new() -> Self {
        Parser::default()
    }

    /// Resolve entity references and parse their replacement text in place
    pub fn expand_entities(mut self, expand: bool) -> Self {
        self.expand_entities = expand;
        self
    }

    /// Install an entity resolver consulted after DOCTYPE-declared
    /// entities; defaults to the five predefined XML entities
    pub fn resolver(mut self, resolver: EntityResolver) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Replace the character validator
    pub fn validator(mut self, validator: CharValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn parse(&self, text: &str) -> Result<Document, XmlError> {
        self.parse_source(&Source::from(text))
    }

    pub fn parse_source(&self, source: &Source<'_>) -> Result<Document, XmlError> {
        let resolver = self
            .resolver
            .clone()
            .unwrap_or_else(|| Arc::new(EntityResolver::xml()));
        let mut run = ParseRun {
            parser: self,
            doc: Document::new(),
            stack: Vec::new(),
            seen_root: false,
            resolver,
        };
        run.parse_from(source, 0, false)?;
        if !run.seen_root {
            return Err(XmlError::at("No root element found", source, source.len()));
        }
        Ok(run.doc)
    }
}

/// An element whose end tag has not been seen yet
struct OpenElement {
    id: NodeId,
    /// Offset of its `<` in the source being parsed
    start: usize,
    name: String,
}

struct ParseRun<'p> {
    parser: &'p Parser,
    doc: Document,
    stack: Vec<OpenElement>,
    seen_root: bool,
    resolver: Arc<EntityResolver>,
}

impl ParseRun<'_> {
    fn container(&self) -> NodeId {
        self.stack.last().map(|open| open.id).unwrap_or(DOCUMENT)
    }

    fn append(&mut self, node: XmlNode) -> NodeId {
        let parent = self.container();
        let id = self.doc.push(node);
        self.doc.append_child(parent, id);
        id
    }

    fn span(token: &Token, synthesized: bool) -> Option<(usize, usize)> {
        if synthesized {
            None
        } else {
            Some((token.start, token.end))
        }
    }

    /// Tokenize `source` and build nodes into the current container.
    /// `synthesized` marks nodes parsed from entity replacement text,
    /// whose offsets do not refer to the document source.
    fn parse_from(
        &mut self,
        source: &Source<'_>,
        depth: usize,
        synthesized: bool,
    ) -> Result<(), XmlError> {
        let base = self.stack.len();
        let mut tokenizer = Tokenizer::new(source).with_validator(self.parser.validator);
        while let Some(token) = tokenizer.next()? {
            match token.kind {
                TokenKind::DocType => self.parse_doctype(source, &mut tokenizer, token)?,
                _ => self.handle_token(source, token, base, depth, synthesized)?,
            }
        }
        if self.stack.len() > base {
            let name = self.stack[self.stack.len() - 1].name.clone();
            return Err(XmlError::at(
                format!("Unexpected end-of-file while parsing children of element {name}"),
                source,
                source.len(),
            ));
        }
        Ok(())
    }

    fn handle_token(
        &mut self,
        source: &Source<'_>,
        token: Token,
        base: usize,
        depth: usize,
        synthesized: bool,
    ) -> Result<(), XmlError> {
        match token.kind {
            TokenKind::Text => self.handle_text(source, token, synthesized),
            TokenKind::CData => {
                if self.stack.is_empty() {
                    return Err(XmlError::at(
                        "CDATA node is not allowed here",
                        source,
                        token.start,
                    ));
                }
                let text = token.value_text(source).unwrap_or("").to_string();
                self.append(XmlNode {
                    parent: None,
                    children: Vec::new(),
                    span: Self::span(&token, synthesized),
                    data: NodeData::Text { text, cdata: true },
                });
                Ok(())
            }
            TokenKind::Comment => {
                let text = token.value_text(source).unwrap_or("").to_string();
                self.append(XmlNode {
                    parent: None,
                    children: Vec::new(),
                    span: Self::span(&token, synthesized),
                    data: NodeData::Comment { text },
                });
                Ok(())
            }
            TokenKind::ProcessingInstruction => {
                self.handle_processing_instruction(source, token, synthesized)
            }
            TokenKind::Entity => self.handle_entity(source, token, depth, synthesized),
            TokenKind::BeginElement => self.handle_begin_element(source, token, synthesized),
            TokenKind::Attribute => {
                self.handle_attribute(source, token);
                Ok(())
            }
            TokenKind::BeginElementEnd => {
                self.handle_begin_element_end(source, token);
                Ok(())
            }
            TokenKind::EndElement => self.handle_end_element(source, token, base),
            _ => Err(XmlError::at(
                format!("Unexpected {}", token.describe(source)),
                source,
                token.start,
            )),
        }
    }

    fn handle_text(
        &mut self,
        source: &Source<'_>,
        token: Token,
        synthesized: bool,
    ) -> Result<(), XmlError> {
        let text = token.text(source);
        if self.stack.is_empty() {
            // Whitespace between top-level nodes is preserved; anything
            // else has no place outside the root element
            if let Some(pos) = text.find(|c| !chars::is_whitespace(c)) {
                return Err(XmlError::at(
                    "Text node is not allowed here",
                    source,
                    token.start + pos,
                ));
            }
        }
        let text = text.to_string();
        self.append(XmlNode {
            parent: None,
            children: Vec::new(),
            span: Self::span(&token, synthesized),
            data: NodeData::Text { text, cdata: false },
        });
        Ok(())
    }

    fn handle_processing_instruction(
        &mut self,
        source: &Source<'_>,
        token: Token,
        synthesized: bool,
    ) -> Result<(), XmlError> {
        let name = token.name.clone().unwrap_or(token.start..token.start);
        let target = source.substring(name.start, name.end).to_string();
        if target.eq_ignore_ascii_case("xml") {
            let first = !synthesized
                && self.stack.is_empty()
                && self.doc.children(DOCUMENT).is_empty();
            if !first {
                return Err(XmlError::at(
                    "The XML declaration must be the first node of the document",
                    source,
                    token.start,
                ));
            }
        }
        let leading = source.substring(token.start + 2, name.start).to_string();
        let text = token.value_text(source).unwrap_or("").to_string();
        self.append(XmlNode {
            parent: None,
            children: Vec::new(),
            span: Self::span(&token, synthesized),
            data: NodeData::ProcessingInstruction {
                leading,
                target,
                text,
            },
        });
        Ok(())
    }

    fn handle_entity(
        &mut self,
        source: &Source<'_>,
        token: Token,
        depth: usize,
        synthesized: bool,
    ) -> Result<(), XmlError> {
        if self.stack.is_empty() {
            return Err(XmlError::at(
                "Entity node is not allowed here",
                source,
                token.start,
            ));
        }
        if !self.parser.expand_entities {
            let text = token.text(source).to_string();
            self.append(XmlNode {
                parent: None,
                children: Vec::new(),
                span: Self::span(&token, synthesized),
                data: NodeData::Entity { text },
            });
            return Ok(());
        }
        self.expand_entity(source, &token, depth)
    }

    fn expand_entity(
        &mut self,
        source: &Source<'_>,
        token: &Token,
        depth: usize,
    ) -> Result<(), XmlError> {
        let name = token.name_text(source).unwrap_or("").to_string();
        if depth >= MAX_EXPANSION_DEPTH {
            return Err(
                EntityError::CircularReference(name).into_xml_error(source, token.start)
            );
        }

        // Character references expand to their character, never reparsed
        if name.starts_with('#') {
            let expanded = expand_numeric_reference(token.text(source), self.parser.validator)
                .map_err(|e| e.into_xml_error(source, token.start))?;
            self.append_expanded_text(expanded);
            return Ok(());
        }

        let replacement = if let Some(entity) = self.doc.doctype_entity(&name) {
            self.doc
                .resolved_entity_text(entity, self.parser.validator)
                .map_err(|e| e.into_xml_error(source, token.start))?
        } else if let Some(text) = self.resolver.lookup(&name) {
            text.to_string()
        } else {
            return Err(
                EntityError::NotDefined(name).into_xml_error(source, token.start)
            );
        };

        // The predefined entities exist to escape markup characters; their
        // replacement is literal text. Declared entities are reparsed when
        // they contain markup.
        let predefined = matches!(name.as_str(), "lt" | "gt" | "amp" | "quot" | "apos");
        if predefined || !replacement.contains(['<', '&']) {
            self.append_expanded_text(replacement);
            return Ok(());
        }
        let sub = Source::from(replacement.as_str());
        self.parse_from(&sub, depth + 1, true)
    }

    fn append_expanded_text(&mut self, text: String) {
        self.append(XmlNode::new(NodeData::Text { text, cdata: false }));
    }

    fn handle_begin_element(
        &mut self,
        source: &Source<'_>,
        token: Token,
        synthesized: bool,
    ) -> Result<(), XmlError> {
        if self.stack.is_empty() {
            if self.seen_root {
                return Err(XmlError::at(
                    "Only one root element allowed per document",
                    source,
                    token.start,
                ));
            }
            self.seen_root = true;
        }
        let name = token.name_text(source).unwrap_or("").to_string();
        // The spelling keeps any tolerated whitespace between `<` and the name
        let spelling = source.substring(token.start + 1, token.end).to_string();
        let id = self.append(XmlNode {
            parent: None,
            children: Vec::new(),
            span: Self::span(&token, synthesized),
            data: NodeData::Element {
                begin_name: spelling,
                end_name: None,
                close_gap: String::new(),
                empty: false,
                attributes: Vec::new(),
            },
        });
        self.stack.push(OpenElement {
            id,
            start: token.start,
            name,
        });
        Ok(())
    }

    fn handle_attribute(&mut self, source: &Source<'_>, token: Token) {
        let open = match self.stack.last() {
            Some(open) => open.id,
            None => return,
        };
        let (name, value) = match (token.name.clone(), token.value.clone()) {
            (Some(name), Some(value)) => (name, value),
            _ => return,
        };
        let attr = Attribute {
            leading: source.substring(token.start, name.start).to_string(),
            name: source.substring(name.start, name.end).to_string(),
            equals: source.substring(name.end, value.start - 1).to_string(),
            quote: source.char_at(value.start - 1).unwrap_or('"'),
            value: source.substring(value.start, value.end).to_string(),
        };
        if let NodeData::Element { attributes, .. } = &mut self.doc.node_mut(open).data {
            attributes.push(attr);
        }
    }

    fn handle_begin_element_end(&mut self, source: &Source<'_>, token: Token) {
        let open = match self.stack.last() {
            Some(open) => open.id,
            None => return,
        };
        let gap_end = token.end - if token.empty { 2 } else { 1 };
        let gap = source.substring(token.start, gap_end).to_string();
        let node = self.doc.node_mut(open);
        if let Some(span) = &mut node.span {
            span.1 = token.end;
        }
        if let NodeData::Element {
            close_gap, empty, ..
        } = &mut node.data
        {
            *close_gap = gap;
            *empty = token.empty;
        }
        if token.empty {
            self.stack.pop();
        }
    }

    fn handle_end_element(
        &mut self,
        source: &Source<'_>,
        token: Token,
        base: usize,
    ) -> Result<(), XmlError> {
        let name = token.name_text(source).unwrap_or("").to_string();
        if self.stack.len() == base {
            return Err(XmlError::at(
                format!("Unexpected end tag \"</{name}>\""),
                source,
                token.start,
            ));
        }
        {
            let open = &self.stack[self.stack.len() - 1];
            if name != open.name {
                let location = Location::of(source, open.start);
                return Err(XmlError::at(
                    format!(
                        "End tag \"</{name}>\" does not match begin tag \"<{}>\" at {location}",
                        open.name
                    ),
                    source,
                    token.start,
                ));
            }
        }
        if let Some(open) = self.stack.pop() {
            let end_name = source.substring(token.start + 2, token.end - 1).to_string();
            let node = self.doc.node_mut(open.id);
            if let Some(span) = &mut node.span {
                span.1 = token.end;
            }
            if let NodeData::Element {
                end_name: slot, ..
            } = &mut node.data
            {
                *slot = Some(end_name);
            }
        }
        Ok(())
    }

    // ----- DOCTYPE -----------------------------------------------------

    fn parse_doctype(
        &mut self,
        source: &Source<'_>,
        tokenizer: &mut Tokenizer<'_, '_>,
        open: Token,
    ) -> Result<(), XmlError> {
        if !self.stack.is_empty() || self.seen_root || self.doc.doctype().is_some() {
            return Err(XmlError::at(
                "DOCTYPE node is not allowed here",
                source,
                open.start,
            ));
        }

        let dt_id = self.append(XmlNode {
            parent: None,
            children: Vec::new(),
            span: Some((open.start, open.end)),
            data: NodeData::DocType(Box::default()),
        });

        let mut dt = DocType {
            prologue: open.text(source).to_string(),
            ..DocType::default()
        };
        let mut name_seen = false;
        let mut in_subset = false;
        let mut in_epilogue = false;
        let end;

        loop {
            let token = match tokenizer.next()? {
                Some(token) => token,
                None => {
                    return Err(XmlError::at(
                        "Unexpected end-of-file while parsing DOCTYPE",
                        source,
                        source.len(),
                    ))
                }
            };
            let text = token.text(source);
            match token.kind {
                TokenKind::DoctypeEnd => {
                    if in_epilogue {
                        dt.epilogue.push('>');
                    } else {
                        dt.prologue.push('>');
                    }
                    end = token.end;
                    break;
                }
                TokenKind::DoctypeBeginSubset => {
                    dt.prologue.push('[');
                    in_subset = true;
                    dt.kind.get_or_insert(DocTypeKind::Inline);
                }
                TokenKind::DoctypeEndSubset => {
                    in_subset = false;
                    in_epilogue = true;
                    dt.epilogue.push(']');
                }
                TokenKind::DtdWhitespace => {
                    if in_epilogue {
                        dt.epilogue.push_str(text);
                    } else if in_subset {
                        let text = text.to_string();
                        self.doc_append(
                            dt_id,
                            XmlNode::new(NodeData::Text { text, cdata: false })
                                .with_span(token.start, token.end),
                        );
                    } else {
                        dt.prologue.push_str(text);
                    }
                }
                TokenKind::DtdText => {
                    if in_subset || in_epilogue {
                        return Err(XmlError::at(
                            format!("Unexpected \"{text}\" in DOCTYPE"),
                            source,
                            token.start,
                        ));
                    }
                    if !name_seen {
                        dt.name = text.to_string();
                        name_seen = true;
                    }
                    dt.prologue.push_str(text);
                }
                TokenKind::DoctypeSystem => {
                    self.require_header(in_subset || in_epilogue, source, &token, text)?;
                    dt.kind.get_or_insert(DocTypeKind::System);
                    dt.prologue.push_str(text);
                }
                TokenKind::DoctypePublic => {
                    self.require_header(in_subset || in_epilogue, source, &token, text)?;
                    dt.kind.get_or_insert(DocTypeKind::Public);
                    dt.prologue.push_str(text);
                }
                TokenKind::DoctypeQuotedText => {
                    self.require_header(in_subset || in_epilogue, source, &token, text)?;
                    let value = token.value_text(source).unwrap_or("").to_string();
                    match (dt.kind, dt.public_literal.is_none()) {
                        (Some(DocTypeKind::Public), true) => dt.public_literal = Some(value),
                        _ => dt.system_literal = Some(value),
                    }
                    dt.prologue.push_str(text);
                }
                TokenKind::DoctypeComment => {
                    let value = token.value_text(source).unwrap_or("").to_string();
                    if in_subset {
                        self.doc_append(
                            dt_id,
                            XmlNode::new(NodeData::Comment { text: value })
                                .with_span(token.start, token.end),
                        );
                    } else if in_epilogue {
                        dt.epilogue.push_str(text);
                    } else {
                        dt.prologue.push_str(text);
                    }
                }
                TokenKind::DoctypeParameterEntity => {
                    if !in_subset {
                        return Err(XmlError::at(
                            "Unexpected '%' in DOCTYPE",
                            source,
                            token.start,
                        ));
                    }
                    self.parse_parameter_reference(source, tokenizer, dt_id, token)?;
                }
                TokenKind::DoctypeElement
                | TokenKind::DoctypeAttList
                | TokenKind::DoctypeEntity
                | TokenKind::DoctypeNotation => {
                    if !in_subset {
                        return Err(XmlError::at(
                            "Markup declarations are only allowed inside the internal subset",
                            source,
                            token.start,
                        ));
                    }
                    self.parse_markup_declaration(source, tokenizer, dt_id, token)?;
                }
                _ => {
                    return Err(XmlError::at(
                        format!("Unexpected \"{text}\" in DOCTYPE"),
                        source,
                        token.start,
                    ))
                }
            }
        }

        if dt.kind.is_none() {
            dt.kind = Some(DocTypeKind::Inline);
        }
        let node = self.doc.node_mut(dt_id);
        node.span = Some((open.start, end));
        node.data = NodeData::DocType(Box::new(dt));
        self.doc.map_elements_and_attributes();
        Ok(())
    }

    fn require_header(
        &self,
        misplaced: bool,
        source: &Source<'_>,
        token: &Token,
        text: &str,
    ) -> Result<(), XmlError> {
        if misplaced {
            return Err(XmlError::at(
                format!("Unexpected \"{text}\" in DOCTYPE"),
                source,
                token.start,
            ));
        }
        Ok(())
    }

    fn doc_append(&mut self, parent: NodeId, node: XmlNode) -> NodeId {
        let id = self.doc.push(node);
        self.doc.append_child(parent, id);
        id
    }

    /// `%name;` at subset level becomes an opaque Entity node
    fn parse_parameter_reference(
        &mut self,
        source: &Source<'_>,
        tokenizer: &mut Tokenizer<'_, '_>,
        dt_id: NodeId,
        percent: Token,
    ) -> Result<(), XmlError> {
        let name = match tokenizer.next()? {
            Some(token) if token.kind == TokenKind::DtdText => token,
            _ => {
                return Err(XmlError::at(
                    "Missing ';' of parameter entity reference",
                    source,
                    percent.start,
                ))
            }
        };
        let semi = match tokenizer.next()? {
            Some(token) if token.kind == TokenKind::DoctypeParameterEntityEnd => token,
            _ => {
                return Err(XmlError::at(
                    "Missing ';' of parameter entity reference",
                    source,
                    percent.start,
                ))
            }
        };
        let text = source.substring(percent.start, semi.end).to_string();
        self.doc_append(
            dt_id,
            XmlNode::new(NodeData::Entity { text }).with_span(percent.start, semi.end),
        );
        Ok(())
    }

    /// One `<!ELEMENT|ATTLIST|ENTITY|NOTATION ...>` declaration
    fn parse_markup_declaration(
        &mut self,
        source: &Source<'_>,
        tokenizer: &mut Tokenizer<'_, '_>,
        dt_id: NodeId,
        open: Token,
    ) -> Result<(), XmlError> {
        let mut tokens = Vec::new();
        let end = loop {
            let token = match tokenizer.next()? {
                Some(token) => token,
                None => {
                    return Err(XmlError::at(
                        "Unexpected end-of-file while parsing DOCTYPE",
                        source,
                        source.len(),
                    ))
                }
            };
            match token.kind {
                TokenKind::DoctypeEnd => break token,
                TokenKind::DoctypeElement
                | TokenKind::DoctypeAttList
                | TokenKind::DoctypeEntity
                | TokenKind::DoctypeNotation => {
                    return Err(XmlError::at(
                        "Markup declarations cannot nest",
                        source,
                        token.start,
                    ))
                }
                _ => tokens.push(token),
            }
        };
        let literal = source.substring(open.start, end.end).to_string();

        let data = match open.kind {
            TokenKind::DoctypeElement => {
                let name = self
                    .first_name(&tokens, source)
                    .ok_or_else(|| {
                        XmlError::at("Missing name of ELEMENT declaration", source, open.start)
                    })?
                    .to_string();
                NodeData::DocTypeElement { literal, name }
            }
            TokenKind::DoctypeAttList => {
                self.check_attlist_whitespace(&tokens, source)?;
                let element_name = self
                    .first_name(&tokens, source)
                    .ok_or_else(|| {
                        XmlError::at(
                            "Missing element name of ATTLIST declaration",
                            source,
                            open.start,
                        )
                    })?
                    .to_string();
                NodeData::DocTypeAttributeList {
                    literal,
                    element_name,
                    element: None,
                }
            }
            TokenKind::DoctypeEntity => {
                let entity = self.parse_entity_declaration(&tokens, source, &open, literal)?;
                NodeData::DocTypeEntity(Box::new(entity))
            }
            _ => {
                let name = self
                    .first_name(&tokens, source)
                    .ok_or_else(|| {
                        XmlError::at("Missing name of NOTATION declaration", source, open.start)
                    })?
                    .to_string();
                self.check_notation_close(&tokens, source, &end)?;
                NodeData::DocTypeNotation { literal, name }
            }
        };

        self.doc_append(
            dt_id,
            XmlNode::new(data).with_span(open.start, end.end),
        );
        Ok(())
    }

    fn first_name<'a>(&self, tokens: &[Token], source: &'a Source<'_>) -> Option<&'a str> {
        tokens
            .iter()
            .find(|t| t.kind == TokenKind::DtdText)
            .and_then(|t| t.name_text(source))
    }

    /// ATTLIST grammar requires whitespace between the element name, each
    /// attribute name/type and each default
    fn check_attlist_whitespace(
        &self,
        tokens: &[Token],
        source: &Source<'_>,
    ) -> Result<(), XmlError> {
        let wordish = |kind: TokenKind| {
            matches!(
                kind,
                TokenKind::DtdText
                    | TokenKind::DoctypeQuotedText
                    | TokenKind::DoctypePcdata
                    | TokenKind::DoctypeImplied
                    | TokenKind::DoctypeRequired
                    | TokenKind::DoctypeFixed
            )
        };
        for pair in tokens.windows(2) {
            if wordish(pair[0].kind) && wordish(pair[1].kind) && pair[0].end == pair[1].start {
                return Err(XmlError::at(
                    "Missing whitespace in ATTLIST declaration",
                    source,
                    pair[1].start,
                ));
            }
        }
        Ok(())
    }

    /// The literal of a NOTATION declaration must be followed directly by
    /// the closing `>`
    fn check_notation_close(
        &self,
        tokens: &[Token],
        source: &Source<'_>,
        end: &Token,
    ) -> Result<(), XmlError> {
        match tokens.last() {
            Some(last) if last.kind == TokenKind::DoctypeQuotedText && last.end == end.start => {
                Ok(())
            }
            _ => Err(XmlError::at(
                "Expected '>' after the literal of the NOTATION declaration",
                source,
                end.start,
            )),
        }
    }

    fn parse_entity_declaration(
        &self,
        tokens: &[Token],
        source: &Source<'_>,
        open: &Token,
        literal: String,
    ) -> Result<DocTypeEntity, XmlError> {
        /// Which field the next quoted literal belongs to
        enum Slot {
            Value,
            System,
            Public,
        }

        let mut entity = DocTypeEntity {
            literal,
            ..DocTypeEntity::default()
        };
        let mut name_seen = false;
        let mut want_ndata_name = false;
        let mut slot = Slot::Value;

        for (index, token) in tokens.iter().enumerate() {
            match token.kind {
                TokenKind::DtdWhitespace => {}
                TokenKind::DoctypeParameterEntity if !name_seen => {
                    entity.parameter = true;
                    // `%` must be its own word in a declaration
                    if let Some(next) = tokens.get(index + 1) {
                        if next.kind != TokenKind::DtdWhitespace {
                            return Err(XmlError::at(
                                "Missing whitespace after '%' in ENTITY declaration",
                                source,
                                next.start,
                            ));
                        }
                    }
                }
                TokenKind::DtdText => {
                    if !name_seen {
                        entity.name = token.name_text(source).unwrap_or("").to_string();
                        name_seen = true;
                    } else if want_ndata_name {
                        entity.ndata = Some(token.name_text(source).unwrap_or("").to_string());
                        want_ndata_name = false;
                    }
                }
                TokenKind::DoctypeQuotedText => {
                    let text = token.value_text(source).unwrap_or("").to_string();
                    match slot {
                        Slot::Value if entity.value.is_none() => entity.value = Some(text),
                        Slot::System if entity.system_literal.is_none() => {
                            entity.system_literal = Some(text)
                        }
                        Slot::Public if entity.public_literal.is_none() => {
                            entity.public_literal = Some(text);
                            // The system id follows the public id
                            slot = Slot::System;
                        }
                        _ => {}
                    }
                }
                TokenKind::DoctypeSystem => slot = Slot::System,
                TokenKind::DoctypePublic => slot = Slot::Public,
                TokenKind::DoctypeNdata => {
                    if entity.parameter {
                        return Err(XmlError::at(
                            "NDATA is not allowed on parameter entities",
                            source,
                            token.start,
                        ));
                    }
                    let preceded_by_ws = index
                        .checked_sub(1)
                        .map(|i| tokens[i].kind == TokenKind::DtdWhitespace)
                        .unwrap_or(false);
                    if !preceded_by_ws {
                        return Err(XmlError::at(
                            "Missing whitespace before NDATA",
                            source,
                            token.start,
                        ));
                    }
                    want_ndata_name = true;
                }
                _ => {}
            }
        }

        if !name_seen {
            return Err(XmlError::at(
                "Missing name of ENTITY declaration",
                source,
                open.start,
            ));
        }
        if want_ndata_name {
            return Err(XmlError::at(
                "Missing notation name after NDATA",
                source,
                open.start,
            ));
        }
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeKind;

    fn roundtrip(text: &str) {
        let doc = parse_str(text).unwrap();
        assert_eq!(doc.to_xml(), text);
    }

    #[test]
    fn test_round_trip_basic() {
        roundtrip("<a>text</a>");
        roundtrip("<a/>");
        roundtrip("<a  b='1'  c=\"2\" ></a >");
        roundtrip("<?xml version=\"1.0\"?>\n<a>&amp;<!-- c --><![CDATA[<x>]]></a>\n");
    }

    #[test]
    fn test_round_trip_preserves_quote_and_whitespace() {
        let text = "<root  a = 'single'\tb=\"double\"><child\t/></root>";
        roundtrip(text);
    }

    #[test]
    fn test_tree_shape() {
        let doc = parse_str("<a x=\"1\"><b/>text</a>").unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(doc.element_name(root), Some("a"));
        assert_eq!(doc.attribute(root, "x"), Some("1"));
        let children = doc.children(root);
        assert_eq!(children.len(), 2);
        assert_eq!(doc.node(children[0]).kind(), NodeKind::Element);
        assert_eq!(doc.node(children[1]).kind(), NodeKind::Text);
        assert_eq!(doc.text(root), "text");
    }

    #[test]
    fn test_second_root_rejected() {
        let err = parse_str("<a/><b/>").unwrap_err();
        assert_eq!(err.message(), "Only one root element allowed per document");
        assert_eq!(err.location().unwrap().column, 5);
    }

    #[test]
    fn test_text_outside_root_rejected() {
        let err = parse_str("<a/> oops").unwrap_err();
        assert_eq!(err.message(), "Text node is not allowed here");
        // Location points at the first non-whitespace character
        assert_eq!(err.location().unwrap().column, 6);
    }

    #[test]
    fn test_whitespace_outside_root_preserved() {
        roundtrip("\n<a/>\n\n");
    }

    #[test]
    fn test_spaced_tag_names_round_trip() {
        roundtrip("< a >x</ a >");
        let doc = parse_str("< a  b='1' >x</ a >").unwrap();
        let root = doc.root_element().unwrap();
        // The spelling keeps the whitespace, the name does not
        assert_eq!(doc.element_name(root), Some("a"));
        assert_eq!(doc.attribute(root, "b"), Some("1"));

        let err = parse_str("< a ></b>").unwrap_err();
        assert_eq!(
            err.message(),
            "End tag \"</b>\" does not match begin tag \"<a>\" at line 1, column 1"
        );
    }

    #[test]
    fn test_tag_mismatch_names_both_and_opening_location() {
        let err = parse_str("<a></b>").unwrap_err();
        assert_eq!(
            err.message(),
            "End tag \"</b>\" does not match begin tag \"<a>\" at line 1, column 1"
        );
        assert_eq!(err.location().unwrap().column, 4);
    }

    #[test]
    fn test_eof_inside_element() {
        let err = parse_str("<a><b>").unwrap_err();
        assert_eq!(
            err.message(),
            "Unexpected end-of-file while parsing children of element b"
        );
    }

    #[test]
    fn test_surplus_end_tag() {
        let err = parse_str("<a/></a>").unwrap_err();
        assert_eq!(err.message(), "Unexpected end tag \"</a>\"");
    }

    #[test]
    fn test_xml_declaration_must_be_first() {
        roundtrip("<?xml version=\"1.0\"?><a/>");

        let err = parse_str("<a/><?xml version=\"1.0\"?>").unwrap_err();
        assert_eq!(
            err.message(),
            "The XML declaration must be the first node of the document"
        );

        let err = parse_str("\n<?xml version=\"1.0\"?><a/>").unwrap_err();
        assert_eq!(
            err.message(),
            "The XML declaration must be the first node of the document"
        );

        let err = parse_str("<a><?xml version=\"1.0\"?></a>").unwrap_err();
        assert_eq!(
            err.message(),
            "The XML declaration must be the first node of the document"
        );
    }

    #[test]
    fn test_no_root_element() {
        let err = parse_str("<!-- only a comment -->").unwrap_err();
        assert_eq!(err.message(), "No root element found");
    }

    #[test]
    fn test_entities_preserved_without_expansion() {
        let doc = parse_str("<a>&amp;&custom;</a>").unwrap();
        let root = doc.root_element().unwrap();
        let kinds: Vec<NodeKind> = doc
            .children(root)
            .iter()
            .map(|&c| doc.node(c).kind())
            .collect();
        assert_eq!(kinds, vec![NodeKind::Entity, NodeKind::Entity]);
        assert_eq!(doc.to_xml(), "<a>&amp;&custom;</a>");
    }

    #[test]
    fn test_entity_expansion_predefined_and_numeric() {
        let doc = Parser::new()
            .expand_entities(true)
            .parse("<a>&lt;&#65;&amp;</a>")
            .unwrap();
        let root = doc.root_element().unwrap();
        assert_eq!(doc.text(root), "<A&");
    }

    #[test]
    fn test_entity_expansion_from_doctype() {
        let doc = Parser::new()
            .expand_entities(true)
            .parse("<!DOCTYPE a [<!ENTITY e 'hi <b>x</b>'>]><a>&e;</a>")
            .unwrap();
        let root = doc.root_element().unwrap();
        let children = doc.children(root);
        assert_eq!(doc.node(children[0]).kind(), NodeKind::Text);
        assert_eq!(doc.node(children[1]).kind(), NodeKind::Element);
        assert_eq!(doc.element_name(children[1]), Some("b"));
        // Nodes from replacement text carry no source span
        assert!(doc.node(children[1]).span.is_none());
    }

    #[test]
    fn test_entity_expansion_from_resolver() {
        let mut resolver = EntityResolver::xml();
        resolver.add("greet", "hello");
        let doc = Parser::new()
            .expand_entities(true)
            .resolver(resolver)
            .parse("<a>&greet;</a>")
            .unwrap();
        assert_eq!(doc.text(doc.root_element().unwrap()), "hello");
    }

    #[test]
    fn test_unresolved_entity_with_expansion() {
        let err = Parser::new()
            .expand_entities(true)
            .parse("<a>&nope;</a>")
            .unwrap_err();
        assert_eq!(err.message(), "Entity \"nope\" is not defined");
    }

    #[test]
    fn test_lenient_validator_reaches_entity_values() {
        let text = "<!DOCTYPE a [<!ENTITY e '&#1;'>]><a>&e;</a>";

        let err = Parser::new().expand_entities(true).parse(text).unwrap_err();
        assert_eq!(
            err.message(),
            "Character 0x1 is not allowed in XML documents"
        );

        let doc = Parser::new()
            .expand_entities(true)
            .validator(CharValidator::lenient())
            .parse(text)
            .unwrap();
        assert_eq!(doc.text(doc.root_element().unwrap()), "\u{1}");
    }

    #[test]
    fn test_self_referential_entity_detected() {
        let err = Parser::new()
            .expand_entities(true)
            .parse("<!DOCTYPE a [<!ENTITY e '<b>&e;</b>'>]><a>&e;</a>")
            .unwrap_err();
        assert_eq!(
            err.message(),
            "Circular reference while expanding entity \"e\""
        );
    }

    #[test]
    fn test_doctype_round_trip_and_indexes() {
        let text = "<!DOCTYPE sql [ <!ENTITY name 'value' -- comment --> \
                    <!ELEMENT sql (#PCDATA)> <!ATTLIST sql id ID #IMPLIED> ]>\n<sql/>";
        let doc = parse_str(text).unwrap();
        assert_eq!(doc.to_xml(), text);

        let element = doc.doctype_element("sql").unwrap();
        assert_eq!(doc.node(element).kind(), NodeKind::DocTypeElement);

        let lists = doc.doctype_attribute_lists("sql");
        assert_eq!(lists.len(), 1);
        match &doc.node(lists[0]).data {
            NodeData::DocTypeAttributeList { element: back, .. } => {
                assert_eq!(*back, Some(element));
            }
            _ => unreachable!(),
        }

        let entity = doc.doctype_entity("name").unwrap();
        match &doc.node(entity).data {
            NodeData::DocTypeEntity(e) => {
                assert_eq!(e.name, "name");
                assert_eq!(e.value.as_deref(), Some("value"));
                assert!(!e.parameter);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_doctype_external_forms() {
        let doc = parse_str("<!DOCTYPE r SYSTEM \"r.dtd\"><r/>").unwrap();
        match &doc.node(doc.doctype().unwrap()).data {
            NodeData::DocType(dt) => {
                assert_eq!(dt.name, "r");
                assert_eq!(dt.kind, Some(DocTypeKind::System));
                assert_eq!(dt.system_literal.as_deref(), Some("r.dtd"));
            }
            _ => unreachable!(),
        }

        let doc =
            parse_str("<!DOCTYPE r PUBLIC \"-//X//DTD r//EN\" \"r.dtd\"><r/>").unwrap();
        match &doc.node(doc.doctype().unwrap()).data {
            NodeData::DocType(dt) => {
                assert_eq!(dt.kind, Some(DocTypeKind::Public));
                assert_eq!(dt.public_literal.as_deref(), Some("-//X//DTD r//EN"));
                assert_eq!(dt.system_literal.as_deref(), Some("r.dtd"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parameter_entity_declaration() {
        let doc = parse_str("<!DOCTYPE r [<!ENTITY % p \"v\">%p;]><r/>").unwrap();
        let pe = doc.doctype_parameter_entity("p").unwrap();
        match &doc.node(pe).data {
            NodeData::DocTypeEntity(e) => {
                assert!(e.parameter);
                assert_eq!(e.value.as_deref(), Some("v"));
            }
            _ => unreachable!(),
        }
        assert_eq!(doc.to_xml(), "<!DOCTYPE r [<!ENTITY % p \"v\">%p;]><r/>");
    }

    #[test]
    fn test_ndata_rules() {
        roundtrip("<!DOCTYPE r [<!ENTITY pic SYSTEM \"p.gif\" NDATA gif>]><r/>");

        let err =
            parse_str("<!DOCTYPE r [<!ENTITY % p SYSTEM \"p.gif\" NDATA gif>]><r/>").unwrap_err();
        assert_eq!(err.message(), "NDATA is not allowed on parameter entities");

        let err =
            parse_str("<!DOCTYPE r [<!ENTITY pic SYSTEM \"p.gif\"NDATA gif>]><r/>").unwrap_err();
        assert_eq!(err.message(), "Missing whitespace before NDATA");
    }

    #[test]
    fn test_attlist_whitespace_rule() {
        let err = parse_str("<!DOCTYPE r [<!ATTLIST r a CDATA#IMPLIED>]><r/>").unwrap_err();
        assert_eq!(err.message(), "Missing whitespace in ATTLIST declaration");
    }

    #[test]
    fn test_notation_close_rule() {
        roundtrip("<!DOCTYPE r [<!NOTATION gif SYSTEM \"image/gif\">]><r/>");

        let err =
            parse_str("<!DOCTYPE r [<!NOTATION gif SYSTEM \"image/gif\" >]><r/>").unwrap_err();
        assert_eq!(
            err.message(),
            "Expected '>' after the literal of the NOTATION declaration"
        );
    }

    #[test]
    fn test_doctype_not_allowed_inside_element() {
        let err = parse_str("<a><!DOCTYPE b></a>").unwrap_err();
        assert_eq!(err.message(), "DOCTYPE node is not allowed here");
    }
}
