//! DTD tokenizer
//!
//! Pull scanner for the `<!DOCTYPE ...>` grammar: markup declarations,
//! quoted literals, parameter-entity references, content-model groups and
//! the internal subset brackets. The main tokenizer seeds it at the offset
//! of `<!DOCTYPE` and resumes plain XML tokenization at [`DtdTokenizer::offset`]
//! once [`DtdTokenizer::next`] reports the end of the declaration.
//!
//! Nesting is tracked as an explicit little state machine (markup depth,
//! group depth, subset flag) instead of one signed counter, so the comment
//! branch is its own transition and never has to correct the bookkeeping.

use crate::core::chars::{self, CharValidator};
use crate::core::source::Source;
use crate::core::token::{Token, TokenKind};
use crate::error::XmlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Positioned at `<!DOCTYPE`, nothing emitted yet
    Start,
    /// Inside the declaration
    Open,
    /// The outer `>` has been consumed
    Closed,
}

/// Pull scanner over the `<!DOCTYPE ...>` grammar
pub struct DtdTokenizer<'a, 's> {
    source: &'a Source<'s>,
    pos: usize,
    validator: CharValidator,
    state: State,
    /// Open markup declarations, the DOCTYPE itself included
    markup_depth: u32,
    /// Open `(` groups
    group_depth: u32,
    in_subset: bool,
}

impl<'a, 's> DtdTokenizer<'a, 's> {
    /// Create a tokenizer seeded at the offset of `<!DOCTYPE`
    pub fn new(source: &'a Source<'s>, start: usize, validator: CharValidator) -> Self {
        DtdTokenizer {
            source,
            pos: start,
            validator,
            state: State::Start,
            markup_depth: 0,
            group_depth: 0,
            in_subset: false,
        }
    }

    /// The offset the main tokenizer resumes at
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Whether the outer `<!DOCTYPE ...>` has fully closed
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// The next DTD token, or `Ok(None)` once the declaration has closed or
    /// the source is exhausted
    pub fn next(&mut self) -> Result<Option<Token>, XmlError> {
        match self.state {
            State::Closed => return Ok(None),
            State::Start => return self.scan_doctype_start().map(Some),
            State::Open => {}
        }
        if self.pos >= self.source.len() {
            return Ok(None);
        }

        let c = match self.source.char_at(self.pos) {
            Some(c) => c,
            None => return Ok(None),
        };

        let token = match c {
            c if chars::is_whitespace(c) => self.scan_whitespace(),
            '[' => {
                if self.in_subset {
                    return Err(self.error_at("Unexpected '[' in DOCTYPE", self.pos));
                }
                self.in_subset = true;
                self.single(TokenKind::DoctypeBeginSubset)
            }
            ']' => {
                if !self.in_subset {
                    return Err(self.error_at("Unexpected ']' in DOCTYPE", self.pos));
                }
                self.in_subset = false;
                self.single(TokenKind::DoctypeEndSubset)
            }
            '(' => {
                self.group_depth += 1;
                self.single(TokenKind::DoctypeBeginGroup)
            }
            ')' => {
                if self.group_depth == 0 {
                    return Err(self.error_at("Unexpected ')' in DOCTYPE", self.pos));
                }
                self.group_depth -= 1;
                self.single(TokenKind::DoctypeEndGroup)
            }
            '>' => {
                // At subset level the closing `>` may only follow `]`
                if self.in_subset && self.markup_depth == 1 {
                    return Err(self.error_at("Unexpected '>' in DOCTYPE", self.pos));
                }
                self.markup_depth -= 1;
                if self.markup_depth == 0 {
                    self.state = State::Closed;
                }
                self.single(TokenKind::DoctypeEnd)
            }
            '?' => self.single(TokenKind::DoctypeOptional),
            '*' => self.single(TokenKind::DoctypeZeroOrMore),
            '+' => self.single(TokenKind::DoctypeOneOrMore),
            '|' => self.single(TokenKind::DoctypeAlternative),
            ',' => self.single(TokenKind::DoctypeSequence),
            '%' => self.single(TokenKind::DoctypeParameterEntity),
            ';' => self.single(TokenKind::DoctypeParameterEntityEnd),
            '"' | '\'' => self.scan_quoted(c)?,
            '#' => self.scan_hash_keyword()?,
            '<' => self.scan_markup_open()?,
            c if chars::is_name_char(c) => self.scan_name(),
            c => {
                return Err(self.error_at(
                    format!("Unexpected character '{c}' in DOCTYPE"),
                    self.pos,
                ))
            }
        };
        Ok(Some(token))
    }

    fn error_at(&self, message: impl Into<String>, offset: usize) -> XmlError {
        XmlError::at(message, self.source, offset)
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let start = self.pos;
        self.pos += 1;
        Token::new(kind, start, self.pos)
    }

    fn scan_doctype_start(&mut self) -> Result<Token, XmlError> {
        let start = self.pos;
        if !self.source.starts_with(start, "<!DOCTYPE") {
            return Err(self.error_at("Expected \"<!DOCTYPE\"", start));
        }
        self.pos = start + "<!DOCTYPE".len();
        self.state = State::Open;
        self.markup_depth = 1;
        Ok(Token::new(TokenKind::DocType, start, self.pos))
    }

    fn scan_whitespace(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.source.char_at(self.pos) {
            if !chars::is_whitespace(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        Token::new(TokenKind::DtdWhitespace, start, self.pos)
    }

    /// A name, keyword or nmtoken; `SYSTEM`/`PUBLIC`/`NDATA` are re-tagged
    /// by exact case-sensitive match
    fn scan_name(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.source.char_at(self.pos) {
            if !chars::is_name_char(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        let kind = match self.source.substring(start, self.pos) {
            "SYSTEM" => TokenKind::DoctypeSystem,
            "PUBLIC" => TokenKind::DoctypePublic,
            "NDATA" => TokenKind::DoctypeNdata,
            _ => TokenKind::DtdText,
        };
        Token::new(kind, start, self.pos).with_name(start..self.pos)
    }

    /// A quoted literal; embedded `&...;` references are checked for
    /// well-formedness but not expanded
    fn scan_quoted(&mut self, quote: char) -> Result<Token, XmlError> {
        let start = self.pos;
        self.pos += 1;
        let value_start = self.pos;
        loop {
            let c = match self.source.char_at(self.pos) {
                Some(c) => c,
                None => {
                    return Err(
                        self.error_at("Unexpected end-of-file while parsing quoted text", start)
                    )
                }
            };
            if c == quote {
                let value_end = self.pos;
                self.pos += 1;
                return Ok(Token::new(TokenKind::DoctypeQuotedText, start, self.pos)
                    .with_value(value_start..value_end));
            }
            if let Some(msg) = self.validator.check_char(self.source, self.pos) {
                return Err(self.error_at(
                    format!("Illegal character found in quoted text. {msg}"),
                    self.pos,
                ));
            }
            if c == '&' {
                self.check_embedded_reference(quote)?;
                continue;
            }
            self.pos += c.len_utf8();
        }
    }

    /// Validate an `&...;` reference inside a quoted literal, leaving the
    /// cursor just past its `;`
    fn check_embedded_reference(&mut self, quote: char) -> Result<(), XmlError> {
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
                    if c == quote || !c.is_ascii_alphanumeric() {
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
        Err(self.error_at("Missing ';' of entity reference in quoted text", ref_start))
    }

    /// `#PCDATA`, `#IMPLIED`, `#REQUIRED` or `#FIXED`, matched
    /// case-insensitively; anything else names expected and found text
    fn scan_hash_keyword(&mut self) -> Result<Token, XmlError> {
        let start = self.pos;
        self.pos += 1;
        let word_start = self.pos;
        while let Some(c) = self.source.char_at(self.pos) {
            if !chars::is_name_char(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        let found = self.source.substring(word_start, self.pos);

        let (expected, kind) = match found.chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('P') => ("PCDATA", TokenKind::DoctypePcdata),
            Some('I') => ("IMPLIED", TokenKind::DoctypeImplied),
            Some('R') => ("REQUIRED", TokenKind::DoctypeRequired),
            Some('F') => ("FIXED", TokenKind::DoctypeFixed),
            _ => {
                return Err(self.error_at(
                    format!(
                        "Expected '#IMPLIED', '#PCDATA', '#REQUIRED' or '#FIXED' but found '#{found}'"
                    ),
                    start,
                ))
            }
        };
        if !found.eq_ignore_ascii_case(expected) {
            return Err(self.error_at(
                format!("Expected '#{expected}' but found '#{found}'"),
                start,
            ));
        }
        Ok(Token::new(kind, start, self.pos))
    }

    /// `<!--` comment or a `<!ELEMENT`/`<!ATTLIST`/`<!ENTITY`/`<!NOTATION`
    /// markup declaration opener
    fn scan_markup_open(&mut self) -> Result<Token, XmlError> {
        let start = self.pos;
        if self.source.starts_with(start, "<!--") {
            return self.scan_comment();
        }
        if !self.source.starts_with(start, "<!") {
            return Err(self.error_at("Unexpected '<' in DOCTYPE", start));
        }

        self.pos = start + 2;
        let word_start = self.pos;
        while let Some(c) = self.source.char_at(self.pos) {
            if !chars::is_name_char(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        let kind = match self.source.substring(word_start, self.pos) {
            "ELEMENT" => TokenKind::DoctypeElement,
            "ATTLIST" => TokenKind::DoctypeAttList,
            "ENTITY" => TokenKind::DoctypeEntity,
            "NOTATION" => TokenKind::DoctypeNotation,
            found => {
                return Err(self.error_at(
                    format!(
                        "Expected '<!ELEMENT', '<!ATTLIST', '<!ENTITY' or '<!NOTATION' but found '<!{found}'"
                    ),
                    start,
                ))
            }
        };
        self.markup_depth += 1;
        Ok(Token::new(kind, start, self.pos))
    }

    /// A full `<!--...-->` comment; does not touch the depth bookkeeping
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
                    let token = Token::new(TokenKind::DoctypeComment, start, self.pos + 3)
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
}
