//! Error types
//!
//! All parse failures are a single error kind, [`XmlError`], carrying a
//! message and (when raised during tokenization or parsing) a resolved
//! source location. Message text is part of the external contract: callers
//! match on exact wording, so each distinct grammar violation has its own
//! fixed template.
//!
//! Entity and character-reference failures evaluated outside of a parse
//! context are the lightweight [`EntityError`]; during a parse they are
//! promoted to located `XmlError`s.

use crate::core::source::Source;
use crate::location::Location;
use std::fmt;
use thiserror::Error;

/// A well-formedness or grammar violation
///
/// Parsing is fail-fast: the first violation aborts the parse.
#[derive(Debug, Clone, Error)]
pub struct XmlError {
    message: String,
    location: Option<Location>,
}

impl XmlError {
    /// Create an error without a source location
    pub fn new(message: impl Into<String>) -> Self {
        XmlError {
            message: message.into(),
            location: None,
        }
    }

    /// Create an error at an already-resolved location
    pub fn with_location(message: impl Into<String>, location: Location) -> Self {
        XmlError {
            message: message.into(),
            location: Some(location),
        }
    }

    /// Create an error at a byte offset, resolving line and column
    pub fn at(message: impl Into<String>, source: &Source<'_>, offset: usize) -> Self {
        Self::with_location(message, Location::of(source, offset))
    }

    /// The message without the location prefix
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The resolved location, if the error was raised during a parse
    pub fn location(&self) -> Option<Location> {
        self.location
    }
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{}: {}", loc, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Entity and character-reference failures
///
/// Raised by [`crate::core::entities::EntityResolver`] for ad hoc
/// `resolve`/`expand` calls. Each variant has its own literal message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("Entity \"{0}\" is not defined")]
    NotDefined(String),

    #[error("Missing ';' in entity reference \"{0}\"")]
    MissingSemicolon(String),

    #[error("Missing number in character reference \"{0}\"")]
    MissingNumber(String),

    #[error("Unable to parse number in character reference \"{0}\"")]
    MalformedNumber(String),

    #[error("Character value must not be negative: \"{0}\"")]
    NegativeValue(String),

    #[error("Character value is out of range: \"{0}\"")]
    OutOfRange(String),

    #[error("Character 0x{0:X} is not allowed in XML documents")]
    ForbiddenCharacter(u32),

    #[error("Circular reference while expanding entity \"{0}\"")]
    CircularReference(String),
}

impl EntityError {
    /// Promote to a located parse error
    pub fn into_xml_error(self, source: &Source<'_>, offset: usize) -> XmlError {
        XmlError::at(self.to_string(), source, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_location() {
        let err = XmlError::new("Missing '>' of start tag");
        assert_eq!(err.to_string(), "Missing '>' of start tag");
        assert!(err.location().is_none());
    }

    #[test]
    fn test_display_with_location() {
        let source = Source::from("abc\ndef");
        let err = XmlError::at("boom", &source, 5);
        assert_eq!(err.to_string(), "line 2, column 2: boom");
    }

    #[test]
    fn test_entity_error_messages() {
        assert_eq!(
            EntityError::NotDefined("foo".into()).to_string(),
            "Entity \"foo\" is not defined"
        );
        assert_eq!(
            EntityError::NegativeValue("-1".into()).to_string(),
            "Character value must not be negative: \"-1\""
        );
        assert_eq!(
            EntityError::ForbiddenCharacter(0xD800).to_string(),
            "Character 0xD800 is not allowed in XML documents"
        );
    }
}
