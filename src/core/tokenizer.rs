//! XML tokenizer
//!
//! Pull scanner over a [`Source`] producing a flat stream of typed,
//! offset-annotated [`Token`]s for the main XML grammar: tags, attributes,
//! text, comments, CDATA sections, processing instructions and entity
//! references. On `<!DOCTYPE` it delegates to the [`DtdTokenizer`] and
//! resumes plain tokenization at the offset the sub-tokenizer stopped at,
//! so the parser sees one continuous token stream.
//!
//! Every consumed character is validated against the XML Char production;
//! violations name the enclosing construct. Duplicate attribute names are
//! rejected here, at the token boundary, so the error carries the exact
//! location of the second occurrence.

use crate::core::chars::{self, CharValidator};
use crate::core::dtd_tokenizer::DtdTokenizer;
use crate::core::source::Source;
use crate::core::token::{Token, TokenKind};
use crate::error::XmlError;

/// State kept while scanning the inside of a start tag
struct TagState {
    /// Offset of the opening `<`
    start: usize,
    /// Attribute names seen so far in this tag
    names: Vec<String>,
}

/// Pull tokenizer for the main XML grammar
///
/// Single-use: one instance tokenizes one document.
pub struct Tokenizer<'a, 's> {
    source: &'a Source<'s>,
    pos: usize,
    validator: CharValidator,
    entities_as_text: bool,
    tag: Option<TagState>,
    dtd: Option<DtdTokenizer<'a, 's>>,
}

impl<'a, 's> Tokenizer<'a, 's> {
    pub fn new(source: &'a Source<'s>) -> Self {
        Tokenizer {
            source,
            pos: 0,
            validator: CharValidator::new(),
            entities_as_text: false,
            tag: None,
            dtd: None,
        }
    }

    /// Replace the character validator
    pub fn with_validator(mut self, validator: CharValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Fold entity references into the surrounding TEXT instead of
    /// returning distinct ENTITY tokens
    pub fn treat_entities_as_text(mut self, fold: bool) -> Self {
        self.entities_as_text = fold;
        self
    }

    /// Current cursor offset
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// The next token, or `Ok(None)` at end of input
    pub fn next(&mut self) -> Result<Option<Token>, XmlError> {
        if let Some(dtd) = &mut self.dtd {
            match dtd.next()? {
                Some(token) => return Ok(Some(token)),
                None => {
                    if !dtd.is_closed() {
                        return Err(XmlError::at(
                            "Unexpected end-of-file while parsing DOCTYPE",
                            self.source,
                            self.source.len(),
                        ));
                    }
                    self.pos = dtd.offset();
                    self.dtd = None;
                }
            }
        }

        if self.tag.is_some() {
            return self.scan_in_tag().map(Some);
        }
        if self.pos >= self.source.len() {
            return Ok(None);
        }

        match self.source.byte_at(self.pos) {
            Some(b'<') => self.scan_markup().map(Some),
            Some(b'&') if !self.entities_as_text => self.scan_entity().map(Some),
            _ => self.scan_text().map(Some),
        }
    }

    fn error_at(&self, message: impl Into<String>, offset: usize) -> XmlError {
        XmlError::at(message, self.source, offset)
    }

    /// Inside a start tag: an attribute or the closing `>`/`/>`
    fn scan_in_tag(&mut self) -> Result<Token, XmlError> {
        let ws_start = self.pos;
        self.skip_whitespace();

        let tag_start = self.tag.as_ref().map(|t| t.start).unwrap_or(ws_start);
        let c = match self.source.char_at(self.pos) {
            Some(c) => c,
            None => return Err(self.error_at("Missing '>' of start tag", tag_start)),
        };

        match c {
            '>' => {
                self.pos += 1;
                self.tag = None;
                Ok(Token::new(TokenKind::BeginElementEnd, ws_start, self.pos))
            }
            '/' => {
                if !self.source.starts_with(self.pos, "/>") {
                    let found = self.source.char_at(self.pos + 1);
                    return Err(match found {
                        Some(found) => self.error_at(
                            format!("Expected \"/>\" but found \"/{found}\""),
                            self.pos,
                        ),
                        None => self.error_at("Missing '>' of start tag", tag_start),
                    });
                }
                self.pos += 2;
                self.tag = None;
                Ok(Token::new(TokenKind::BeginElementEnd, ws_start, self.pos).with_empty(true))
            }
            c if chars::is_name_start_char(c) => self.scan_attribute(ws_start, tag_start),
            c => Err(self.error_at(
                format!("Expected '>', \"/>\" or an attribute but found '{c}'"),
                self.pos,
            )),
        }
    }

    /// `[whitespace] name [whitespace] = [whitespace] quote value quote`
    fn scan_attribute(&mut self, ws_start: usize, tag_start: usize) -> Result<Token, XmlError> {
        let name_start = self.pos;
        self.skip_name_chars();
        let name_end = self.pos;
        let name = self.source.substring(name_start, name_end);

        let duplicate = match self.tag.as_mut() {
            Some(tag) => {
                let duplicate = tag.names.iter().any(|n| n == name);
                if !duplicate {
                    tag.names.push(name.to_string());
                }
                duplicate
            }
            None => false,
        };
        if duplicate {
            return Err(self.error_at(
                format!("There is already an attribute with the name \"{name}\""),
                name_start,
            ));
        }

        self.skip_whitespace();
        match self.source.char_at(self.pos) {
            Some('=') => self.pos += 1,
            Some(c) => {
                return Err(self.error_at(
                    format!("Expected '=' after attribute name but found '{c}'"),
                    self.pos,
                ))
            }
            None => return Err(self.error_at("Missing '>' of start tag", tag_start)),
        }

        self.skip_whitespace();
        let quote = match self.source.char_at(self.pos) {
            Some(c @ ('"' | '\'')) => c,
            Some(c) => {
                return Err(self.error_at(
                    format!("Expected '\"' or \"'\" after '=' but found '{c}'"),
                    self.pos,
                ))
            }
            None => return Err(self.error_at("Missing '>' of start tag", tag_start)),
        };
        let quote_pos = self.pos;
        self.pos += 1;
        let value_start = self.pos;

        loop {
            let c = match self.source.char_at(self.pos) {
                Some(c) => c,
                None => {
                    return Err(
                        self.error_at("Missing closing quote of attribute value", quote_pos)
                    )
                }
            };
            if c == quote {
                break;
            }
            match c {
                '<' => {
                    return Err(self.error_at(
                        "The character '<' is not allowed in attribute values",
                        self.pos,
                    ))
                }
                '&' => {
                    self.check_reference_syntax()?;
                    continue;
                }
                _ => {
                    if let Some(msg) = self.validator.check_char(self.source, self.pos) {
                        return Err(self.error_at(
                            format!("Illegal character found in attribute value. {msg}"),
                            self.pos,
                        ));
                    }
                    self.pos += c.len_utf8();
                }
            }
        }
        let value_end = self.pos;
        self.pos += 1;

        Ok(Token::new(TokenKind::Attribute, ws_start, self.pos)
            .with_name(name_start..name_end)
            .with_value(value_start..value_end))
    }

    /// Markup starting with `<`
    fn scan_markup(&mut self) -> Result<Token, XmlError> {
        let start = self.pos;
        if self.source.starts_with(start, "<!--") {
            return self.scan_comment();
        }
        if self.source.starts_with(start, "<![CDATA[") {
            return self.scan_cdata();
        }
        if self.source.starts_with(start, "<!DOCTYPE") {
            let mut dtd = DtdTokenizer::new(self.source, start, self.validator);
            // The first token is always the `<!DOCTYPE` opener
            let token = dtd.next()?;
            self.dtd = Some(dtd);
            return Ok(token.unwrap_or_else(|| Token::new(TokenKind::DocType, start, start)));
        }
        if self.source.starts_with(start, "<?") {
            return self.scan_processing_instruction();
        }
        if self.source.starts_with(start, "</") {
            return self.scan_end_tag();
        }
        if self.source.starts_with(start, "<!") {
            return Err(self.error_at(
                "Expected comment, CDATA section or DOCTYPE declaration after \"<!\"",
                start,
            ));
        }

        // Whitespace between `<` and the name is tolerated and kept as
        // part of the tag's spelling, so `< a >` survives a round trip
        self.pos = start + 1;
        self.skip_whitespace();
        let name_start = self.pos;
        match self.source.char_at(self.pos) {
            Some(c) if chars::is_name_start_char(c) => {
                self.skip_name_chars();
                let name_end = self.pos;
                self.tag = Some(TagState {
                    start,
                    names: Vec::new(),
                });
                Ok(Token::new(TokenKind::BeginElement, start, name_end)
                    .with_name(name_start..name_end))
            }
            Some(c) => Err(self.error_at(
                format!("Expected element name after '<' but found '{c}'"),
                name_start,
            )),
            None => Err(self.error_at("Missing '>' of start tag", start)),
        }
    }

    /// `<!--...-->`; the sequence `--` must not occur inside
    fn scan_comment(&mut self) -> Result<Token, XmlError> {
        let start = self.pos;
        self.pos = start + 4;
        loop {
            let c = match self.source.char_at(self.pos) {
                Some(c) => c,
                None => {
                    return Err(
                        self.error_at("Unexpected end-of-file while parsing comment", start)
                    )
                }
            };
            if c == '-' && self.source.starts_with(self.pos, "--") {
                if self.source.starts_with(self.pos, "-->") {
                    let token = Token::new(TokenKind::Comment, start, self.pos + 3)
                        .with_value(start + 4..self.pos);
                    self.pos += 3;
                    return Ok(token);
                }
                return Err(self.error_at(
                    "The character sequence \"--\" is not allowed in comments",
                    self.pos,
                ));
            }
            if let Some(msg) = self.validator.check_char(self.source, self.pos) {
                return Err(self.error_at(
                    format!("Illegal character found in comment. {msg}"),
                    self.pos,
                ));
            }
            self.pos += c.len_utf8();
        }
    }

    /// `<![CDATA[...]]>`
    fn scan_cdata(&mut self) -> Result<Token, XmlError> {
        let start = self.pos;
        self.pos = start + 9;
        loop {
            let c = match self.source.char_at(self.pos) {
                Some(c) => c,
                None => {
                    return Err(self.error_at(
                        "Unexpected end-of-file while parsing CDATA",
                        start,
                    ))
                }
            };
            if c == ']' && self.source.starts_with(self.pos, "]]>") {
                let token = Token::new(TokenKind::CData, start, self.pos + 3)
                    .with_value(start + 9..self.pos);
                self.pos += 3;
                return Ok(token);
            }
            if let Some(msg) = self.validator.check_char(self.source, self.pos) {
                return Err(self.error_at(
                    format!("Illegal character found in CDATA. {msg}"),
                    self.pos,
                ));
            }
            self.pos += c.len_utf8();
        }
    }

    /// `<?target ...?>`; whether the target `xml` forms a valid XML
    /// declaration is the parser's concern
    fn scan_processing_instruction(&mut self) -> Result<Token, XmlError> {
        let start = self.pos;
        self.pos = start + 2;
        self.skip_whitespace();

        let target_start = self.pos;
        match self.source.char_at(self.pos) {
            Some(c) if chars::is_name_start_char(c) => self.skip_name_chars(),
            _ => {
                return Err(
                    self.error_at("Missing target of processing instruction", self.pos)
                )
            }
        }
        let target_end = self.pos;

        loop {
            let c = match self.source.char_at(self.pos) {
                Some(c) => c,
                None => {
                    return Err(self.error_at(
                        "Unexpected end-of-file while parsing processing instruction",
                        start,
                    ))
                }
            };
            if c == '?' && self.source.starts_with(self.pos, "?>") {
                let token = Token::new(TokenKind::ProcessingInstruction, start, self.pos + 2)
                    .with_name(target_start..target_end)
                    .with_value(target_end..self.pos);
                self.pos += 2;
                return Ok(token);
            }
            if let Some(msg) = self.validator.check_char(self.source, self.pos) {
                return Err(self.error_at(
                    format!("Illegal character found in processing instruction. {msg}"),
                    self.pos,
                ));
            }
            self.pos += c.len_utf8();
        }
    }

    /// `</name >`; whitespace around the name is permitted
    fn scan_end_tag(&mut self) -> Result<Token, XmlError> {
        let start = self.pos;
        self.pos = start + 2;
        self.skip_whitespace();

        let name_start = self.pos;
        match self.source.char_at(self.pos) {
            Some(c) if chars::is_name_start_char(c) => self.skip_name_chars(),
            Some(c) => {
                return Err(self.error_at(
                    format!("Expected element name after \"</\" but found '{c}'"),
                    self.pos,
                ))
            }
            None => return Err(self.error_at("Missing '>' of end tag", start)),
        }
        let name_end = self.pos;

        self.skip_whitespace();
        match self.source.char_at(self.pos) {
            Some('>') => {
                self.pos += 1;
                Ok(Token::new(TokenKind::EndElement, start, self.pos)
                    .with_name(name_start..name_end))
            }
            Some(c) => Err(self.error_at(
                format!("Expected '>' of end tag but found '{c}'"),
                self.pos,
            )),
            None => Err(self.error_at("Missing '>' of end tag", start)),
        }
    }

    /// `&name;`, `&#N;` or `&#xN;`
    fn scan_entity(&mut self) -> Result<Token, XmlError> {
        let start = self.pos;
        self.pos = start + 1;
        let name_start = self.pos;

        match self.source.char_at(self.pos) {
            Some('#') => {
                self.pos += 1;
                if let Some('x' | 'X') = self.source.char_at(self.pos) {
                    self.pos += 1;
                }
                while let Some(c) = self.source.char_at(self.pos) {
                    if !c.is_ascii_alphanumeric() {
                        break;
                    }
                    self.pos += 1;
                }
            }
            Some(c) if chars::is_name_start_char(c) => self.skip_name_chars(),
            _ => return Err(self.error_at("Missing ';' of entity reference", start)),
        }

        let name_end = self.pos;
        match self.source.char_at(self.pos) {
            Some(';') => {
                self.pos += 1;
                Ok(Token::new(TokenKind::Entity, start, self.pos)
                    .with_name(name_start..name_end))
            }
            _ => Err(self.error_at("Missing ';' of entity reference", start)),
        }
    }

    /// Character data up to the next `<` (or `&` when entity tokens are
    /// enabled); the literal sequence `]]>` is rejected
    fn scan_text(&mut self) -> Result<Token, XmlError> {
        let start = self.pos;
        while let Some(c) = self.source.char_at(self.pos) {
            match c {
                '<' => break,
                '&' if !self.entities_as_text => break,
                ']' if self.source.starts_with(self.pos, "]]>") => {
                    return Err(self.error_at(
                        "The character sequence \"]]>\" is not allowed in text",
                        self.pos,
                    ))
                }
                _ => {
                    if let Some(msg) = self.validator.check_char(self.source, self.pos) {
                        return Err(self.error_at(
                            format!("Illegal character found in text. {msg}"),
                            self.pos,
                        ));
                    }
                    self.pos += c.len_utf8();
                }
            }
        }
        Ok(Token::new(TokenKind::Text, start, self.pos))
    }

    /// Validate an `&...;` reference inside an attribute value, leaving the
    /// cursor just past its `;`
    fn check_reference_syntax(&mut self) -> Result<(), XmlError> {
        let ref_start = self.pos;
        self.pos += 1;
        match self.source.char_at(self.pos) {
            Some('#') => {
                self.pos += 1;
                while let Some(c) = self.source.char_at(self.pos) {
                    if c == ';' {
                        self.pos += 1;
                        return Ok(());
                    }
                    if !c.is_ascii_alphanumeric() {
                        break;
                    }
                    self.pos += 1;
                }
            }
            Some(c) if chars::is_name_start_char(c) => {
                self.pos += c.len_utf8();
                while let Some(c) = self.source.char_at(self.pos) {
                    if c == ';' {
                        self.pos += 1;
                        return Ok(());
                    }
                    if !chars::is_name_char(c) {
                        break;
                    }
                    self.pos += c.len_utf8();
                }
            }
            _ => {}
        }
        Err(self.error_at("Missing ';' of entity reference", ref_start))
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.source.char_at(self.pos) {
            if !chars::is_whitespace(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn skip_name_chars(&mut self) {
        while let Some(c) = self.source.char_at(self.pos) {
            if !chars::is_name_char(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }
}
