//! Offset-annotated tokens
//!
//! Tokens are ephemeral: produced by the tokenizers, consumed by the parser.
//! A token never owns text; its literal is always
//! `source.substring(start, end)`, which is what makes byte-exact
//! round-tripping possible.

use crate::core::source::Source;
use std::ops::Range;

/// Kind of token produced by the main and DTD tokenizers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Main XML grammar
    /// Character data between markup
    Text,
    /// `<name` of a start tag
    BeginElement,
    /// `>` or `/>` closing a start tag (with any preceding whitespace)
    BeginElementEnd,
    /// `</name >` end tag
    EndElement,
    /// One attribute inside a start tag, including its leading whitespace
    Attribute,
    /// `<!--...-->`
    Comment,
    /// `<![CDATA[...]]>`
    CData,
    /// `<?target ...?>`
    ProcessingInstruction,
    /// `&name;`, `&#N;` or `&#xN;`
    Entity,
    /// `<!DOCTYPE` (the DTD tokenizer produces the rest)
    DocType,

    // DTD grammar
    /// `<!ELEMENT`
    DoctypeElement,
    /// `<!ATTLIST`
    DoctypeAttList,
    /// `<!ENTITY`
    DoctypeEntity,
    /// `<!NOTATION`
    DoctypeNotation,
    /// `[` opening the internal subset
    DoctypeBeginSubset,
    /// `]` closing the internal subset
    DoctypeEndSubset,
    /// `(`
    DoctypeBeginGroup,
    /// `)`
    DoctypeEndGroup,
    /// `,`
    DoctypeSequence,
    /// `|`
    DoctypeAlternative,
    /// `?`
    DoctypeOptional,
    /// `*`
    DoctypeZeroOrMore,
    /// `+`
    DoctypeOneOrMore,
    /// `#PCDATA`
    DoctypePcdata,
    /// `#IMPLIED`
    DoctypeImplied,
    /// `#REQUIRED`
    DoctypeRequired,
    /// `#FIXED`
    DoctypeFixed,
    /// Quoted literal, quotes included
    DoctypeQuotedText,
    /// `<!--...-->` inside the DTD
    DoctypeComment,
    /// `%` starting a parameter-entity reference or declaration
    DoctypeParameterEntity,
    /// `;` ending a parameter-entity reference
    DoctypeParameterEntityEnd,
    /// The keyword `SYSTEM`
    DoctypeSystem,
    /// The keyword `PUBLIC`
    DoctypePublic,
    /// The keyword `NDATA`
    DoctypeNdata,
    /// A name or keyword bounded by name-character rules
    DtdText,
    /// Whitespace run inside the DTD
    DtdWhitespace,
    /// `>` closing a markup declaration or the DOCTYPE itself
    DoctypeEnd,
}

impl TokenKind {
    /// Short description used in error messages
    pub fn description(&self) -> &'static str {
        match self {
            TokenKind::Text => "text",
            TokenKind::BeginElement => "start tag",
            TokenKind::BeginElementEnd => "end of start tag",
            TokenKind::EndElement => "end tag",
            TokenKind::Attribute => "attribute",
            TokenKind::Comment => "comment",
            TokenKind::CData => "CDATA",
            TokenKind::ProcessingInstruction => "processing instruction",
            TokenKind::Entity => "entity reference",
            TokenKind::DocType => "DOCTYPE",
            TokenKind::DoctypeElement => "ELEMENT declaration",
            TokenKind::DoctypeAttList => "ATTLIST declaration",
            TokenKind::DoctypeEntity => "ENTITY declaration",
            TokenKind::DoctypeNotation => "NOTATION declaration",
            TokenKind::DoctypeQuotedText => "quoted text",
            TokenKind::DoctypeComment => "comment",
            TokenKind::DtdWhitespace => "whitespace",
            _ => "DOCTYPE token",
        }
    }
}

/// Maximum literal length quoted in token error messages
const PREVIEW_LEN: usize = 20;

/// A token over a source span
///
/// Invariant: `start <= end <= source.len()`. `name` and `value` are
/// sub-spans (element/attribute/target name, attribute value inside its
/// quotes) recorded so the parser never has to re-scan the literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub name: Option<Range<usize>>,
    pub value: Option<Range<usize>>,
    /// For `BeginElementEnd`: true when the tag closed with `/>`
    pub empty: bool,
}

impl Token {
    pub fn new(kind: TokenKind, start: usize, end: usize) -> Self {
        Token {
            kind,
            start,
            end,
            name: None,
            value: None,
            empty: false,
        }
    }

    pub fn with_name(mut self, name: Range<usize>) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_value(mut self, value: Range<usize>) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_empty(mut self, empty: bool) -> Self {
        self.empty = empty;
        self
    }

    /// The literal text of this token
    pub fn text<'a>(&self, source: &'a Source<'_>) -> &'a str {
        source.substring(self.start, self.end)
    }

    /// The name sub-span text, if recorded
    pub fn name_text<'a>(&self, source: &'a Source<'_>) -> Option<&'a str> {
        self.name
            .as_ref()
            .map(|r| source.substring(r.start, r.end))
    }

    /// The value sub-span text, if recorded
    pub fn value_text<'a>(&self, source: &'a Source<'_>) -> Option<&'a str> {
        self.value
            .as_ref()
            .map(|r| source.substring(r.start, r.end))
    }

    /// Kind plus a bounded preview of the literal, for error messages
    pub fn describe(&self, source: &Source<'_>) -> String {
        let text = self.text(source);
        let preview: String = text.chars().take(PREVIEW_LEN).collect();
        if preview.len() < text.len() {
            format!("{} \"{}...\"", self.kind.description(), preview)
        } else {
            format!("{} \"{}\"", self.kind.description(), preview)
        }
    }
}
