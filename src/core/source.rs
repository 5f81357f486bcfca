//! Random-access character content
//!
//! A [`Source`] is an immutable, 0-indexed character buffer of known length.
//! All offsets in this crate are byte offsets into the UTF-8 text; `char_at`
//! decodes the character starting at an offset in O(1), `substring` is an
//! O(1) slice. The buffer can be borrowed from a `&str`, own a `String`, or
//! be pre-slurped from any reader; the tokenizers never perform I/O or
//! encoding detection themselves.

use std::borrow::Cow;
use std::io::{self, Read};

/// Immutable character content with random access
#[derive(Debug, Clone)]
pub struct Source<'a> {
    text: Cow<'a, str>,
}

impl<'a> Source<'a> {
    /// Read all content from a reader up front
    pub fn from_reader(mut reader: impl Read) -> io::Result<Source<'static>> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(Source {
            text: Cow::Owned(text),
        })
    }

    /// The full text
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The character starting at a byte offset, or None at end of input
    #[inline]
    pub fn char_at(&self, offset: usize) -> Option<char> {
        self.text.get(offset..)?.chars().next()
    }

    /// The byte at an offset (fast path for ASCII dispatch)
    #[inline]
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.text.as_bytes().get(offset).copied()
    }

    /// The literal text between two byte offsets
    ///
    /// Offsets must lie on character boundaries; tokens produced by this
    /// crate always do.
    #[inline]
    pub fn substring(&self, start: usize, end: usize) -> &str {
        &self.text[start..end]
    }

    /// Check whether the text at `offset` starts with `needle`
    #[inline]
    pub fn starts_with(&self, offset: usize, needle: &str) -> bool {
        self.text
            .get(offset..)
            .is_some_and(|rest| rest.starts_with(needle))
    }
}

impl<'a> From<&'a str> for Source<'a> {
    fn from(text: &'a str) -> Self {
        Source {
            text: Cow::Borrowed(text),
        }
    }
}

impl From<String> for Source<'static> {
    fn from(text: String) -> Self {
        Source {
            text: Cow::Owned(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_at() {
        let source = Source::from("a<b>");
        assert_eq!(source.char_at(0), Some('a'));
        assert_eq!(source.char_at(1), Some('<'));
        assert_eq!(source.char_at(4), None);
    }

    #[test]
    fn test_char_at_multibyte() {
        let source = Source::from("aä€");
        assert_eq!(source.char_at(1), Some('ä'));
        assert_eq!(source.char_at(3), Some('€'));
    }

    #[test]
    fn test_substring() {
        let source = Source::from("<a>text</a>");
        assert_eq!(source.substring(3, 7), "text");
        assert_eq!(source.substring(0, 0), "");
    }

    #[test]
    fn test_starts_with() {
        let source = Source::from("<!DOCTYPE r>");
        assert!(source.starts_with(0, "<!DOCTYPE"));
        assert!(source.starts_with(2, "DOCTYPE"));
        assert!(!source.starts_with(11, "DOCTYPE"));
    }

    #[test]
    fn test_from_reader() {
        let source = Source::from_reader("<x/>".as_bytes()).unwrap();
        assert_eq!(source.text(), "<x/>");
        assert_eq!(source.len(), 4);
    }
}
