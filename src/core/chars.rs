//! XML character and name classification
//!
//! Pure functions over the XML 1.0 character grammar:
//! - Char production (§2.2), including the supplementary planes
//! - NameStartChar / NameChar
//! - whitespace
//!
//! [`CharValidator`] packages the per-offset check used by both tokenizers.
//! It is an explicit value injected into tokenizer and resolver construction
//! rather than ambient shared state, and can be switched to a lenient mode
//! that skips the XML range restrictions.

use crate::core::source::Source;

/// XML 1.0 Char production
///
/// Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
#[inline]
pub fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// XML whitespace: space, tab, carriage return, line feed
#[inline]
pub fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// XML NameStartChar production (letters, `_`, `:` and the Unicode ranges)
#[inline]
pub fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | '_' | 'A'..='Z' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

/// XML NameChar production (NameStartChar plus digits, `-`, `.` and the
/// combining/extender ranges)
#[inline]
pub fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}'
            | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// Character validation policy for a parse
///
/// Checking is on by default. With checking off, only values outside the
/// Unicode scalar range are rejected (numeric character references may then
/// produce control characters and noncharacters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharValidator {
    checking: bool,
}

impl Default for CharValidator {
    fn default() -> Self {
        CharValidator { checking: true }
    }
}

impl CharValidator {
    /// A validator that enforces the XML 1.0 Char production
    pub fn new() -> Self {
        Self::default()
    }

    /// A validator that accepts any Unicode scalar value
    pub fn lenient() -> Self {
        CharValidator { checking: false }
    }

    /// Whether XML range checking is enabled
    #[inline]
    pub fn is_checking(&self) -> bool {
        self.checking
    }

    /// Check the logical character at `offset`
    ///
    /// Returns `None` on success, or a diagnostic naming the violated rule
    /// and the offending code point in hex. Callers wrap the diagnostic with
    /// the name of the enclosing construct.
    pub fn check_char(&self, source: &Source<'_>, offset: usize) -> Option<String> {
        if !self.checking {
            return None;
        }
        let c = source.char_at(offset)?;
        self.check_scalar(c as u32)
    }

    /// Check a raw code point value (used for numeric character references)
    pub fn check_scalar(&self, value: u32) -> Option<String> {
        if !self.checking {
            return None;
        }
        match value {
            0x9 | 0xA | 0xD => None,
            0x0..=0x1F => Some(format!(
                "Control character 0x{value:X} is not allowed in XML documents"
            )),
            0xD800..=0xDFFF => Some(format!(
                "Character value 0x{value:X} is in the surrogate range"
            )),
            0xFFFE | 0xFFFF => Some(format!(
                "Character 0x{value:X} is not a valid XML character"
            )),
            v if v > 0x10FFFF => Some(format!(
                "Character 0x{value:X} is not a valid XML character"
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_char_ranges() {
        assert!(is_xml_char('\t'));
        assert!(is_xml_char('\n'));
        assert!(is_xml_char(' '));
        assert!(is_xml_char('ä'));
        assert!(is_xml_char('\u{10000}'));
        assert!(!is_xml_char('\u{0}'));
        assert!(!is_xml_char('\u{B}'));
        assert!(!is_xml_char('\u{FFFE}'));
        assert!(!is_xml_char('\u{FFFF}'));
    }

    #[test]
    fn test_name_chars() {
        assert!(is_name_start_char('a'));
        assert!(is_name_start_char('_'));
        assert!(is_name_start_char(':'));
        assert!(is_name_start_char('ü'));
        assert!(!is_name_start_char('-'));
        assert!(!is_name_start_char('1'));

        assert!(is_name_char('-'));
        assert!(is_name_char('.'));
        assert!(is_name_char('5'));
        assert!(!is_name_char(' '));
        assert!(!is_name_char('<'));
    }

    #[test]
    fn test_check_char_ok() {
        let validator = CharValidator::new();
        let source = Source::from("ok");
        assert_eq!(validator.check_char(&source, 0), None);
        // Past the end of input there is nothing to check
        assert_eq!(validator.check_char(&source, 2), None);
    }

    #[test]
    fn test_check_char_control() {
        let validator = CharValidator::new();
        let source = Source::from("a\u{1}b");
        let msg = validator.check_char(&source, 1).unwrap();
        assert_eq!(msg, "Control character 0x1 is not allowed in XML documents");
    }

    #[test]
    fn test_check_scalar_distinguishes_rules() {
        let validator = CharValidator::new();
        assert_eq!(
            validator.check_scalar(0xD800).unwrap(),
            "Character value 0xD800 is in the surrogate range"
        );
        assert_eq!(
            validator.check_scalar(0xFFFE).unwrap(),
            "Character 0xFFFE is not a valid XML character"
        );
        assert_eq!(
            validator.check_scalar(0x110000).unwrap(),
            "Character 0x110000 is not a valid XML character"
        );
        assert_eq!(validator.check_scalar(0x41), None);
    }

    #[test]
    fn test_lenient_skips_checks() {
        let validator = CharValidator::lenient();
        assert_eq!(validator.check_scalar(0x1), None);
        assert_eq!(validator.check_scalar(0xFFFE), None);
        let source = Source::from("\u{1}");
        assert_eq!(validator.check_char(&source, 0), None);
    }
}
