//! Offset to line/column mapping for diagnostics
//!
//! Resolves a byte offset into a 1-based line and column by scanning the
//! source for line breaks. All four line break conventions are supported:
//! `\n`, `\r`, `\r\n` and `\n\r`. A tab-expanded column (tabs advance to the
//! next multiple-of-8 column) is tracked alongside the plain column for
//! display purposes.

use crate::core::source::Source;
use std::fmt;

/// A resolved position in a source document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Byte offset into the source
    pub offset: usize,
    /// 1-based line number
    pub line: u32,
    /// 1-based column number (one per character)
    pub column: u32,
    /// 1-based column with tabs expanded to the next multiple of 8
    pub tab_column: u32,
}

impl Location {
    /// Resolve a byte offset against a source
    pub fn of(source: &Source<'_>, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let mut line = 1u32;
        let mut column = 1u32;
        let mut tab_column = 1u32;
        // Second half of a two-character line break, to be skipped
        let mut pair: Option<char> = None;

        for (pos, c) in source.text().char_indices() {
            if pos >= offset {
                break;
            }
            if pair.take() == Some(c) {
                continue;
            }
            match c {
                '\n' | '\r' => {
                    line += 1;
                    column = 1;
                    tab_column = 1;
                    pair = Some(if c == '\n' { '\r' } else { '\n' });
                }
                '\t' => {
                    column += 1;
                    tab_column = ((tab_column - 1) / 8 + 1) * 8 + 1;
                }
                _ => {
                    column += 1;
                    tab_column += 1;
                }
            }
        }

        Location {
            offset,
            line,
            column,
            tab_column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locate(text: &str, offset: usize) -> Location {
        Location::of(&Source::from(text), offset)
    }

    #[test]
    fn test_first_line() {
        let loc = locate("hello", 3);
        assert_eq!(loc.line, 1);
        assert_eq!(loc.column, 4);
        assert_eq!(loc.tab_column, 4);
    }

    #[test]
    fn test_lf_breaks() {
        let loc = locate("a\nb\nc", 4);
        assert_eq!(loc.line, 3);
        assert_eq!(loc.column, 1);
    }

    #[test]
    fn test_crlf_is_one_break() {
        let loc = locate("a\r\nb", 3);
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 1);
    }

    #[test]
    fn test_lfcr_is_one_break() {
        let loc = locate("a\n\rb", 3);
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 1);
    }

    #[test]
    fn test_bare_cr_breaks() {
        let loc = locate("a\rb\rc", 4);
        assert_eq!(loc.line, 3);
        assert_eq!(loc.column, 1);
    }

    #[test]
    fn test_double_lf_is_two_breaks() {
        let loc = locate("a\n\nb", 3);
        assert_eq!(loc.line, 3);
        assert_eq!(loc.column, 1);
    }

    #[test]
    fn test_tab_column() {
        // Tab at column 1 advances the display column to 9
        let loc = locate("\tx", 1);
        assert_eq!(loc.column, 2);
        assert_eq!(loc.tab_column, 9);

        let loc = locate("ab\tx", 3);
        assert_eq!(loc.column, 4);
        assert_eq!(loc.tab_column, 9);
    }

    #[test]
    fn test_display() {
        let loc = locate("a\nbb", 3);
        assert_eq!(loc.to_string(), "line 2, column 2");
    }
}
