//! Error types for binlayout.
//!
//! Parsers never surface these past the parse boundary: a [`ParseError`] is
//! rendered into `ParsedFile::error` and the partial region forest is kept.
//! Search failures propagate to the caller as a single [`SearchError`].

use thiserror::Error;

/// Problems a structural parser can run into while walking a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Bad magic or signature at the start of a structure.
    #[error("{message} at offset {offset:#x}")]
    Structural { offset: u64, message: String },

    /// A declared length or count runs past the end of the buffer.
    #[error("Truncated {structure} at offset {offset:#x}: need {needed} bytes, {available} available")]
    Truncated {
        structure: &'static str,
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// An enum or type code with no known meaning.
    #[error("Unsupported {field} value {value:#x}")]
    UnsupportedVariant { field: &'static str, value: u64 },
}

impl ParseError {
    pub fn structural(offset: u64, message: impl Into<String>) -> Self {
        Self::Structural {
            offset,
            message: message.into(),
        }
    }

    pub fn truncated(structure: &'static str, offset: u64, needed: u64, data_len: usize) -> Self {
        Self::Truncated {
            structure,
            offset,
            needed,
            available: (data_len as u64).saturating_sub(offset),
        }
    }
}

/// Errors raised by the search engine.
///
/// Everything except `Cancelled` and `TimedOut` describes bad input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("Search query is empty")]
    EmptyQuery,

    #[error("Invalid hex query: {0}")]
    InvalidHex(String),

    #[error("Character {0:?} cannot be searched as a single byte")]
    UnrepresentableChar(char),

    #[error("Regex search is limited to {limit} bytes, buffer has {size}")]
    RegexTooLarge { size: u64, limit: u64 },

    #[error("Regex search is not supported in unicode mode")]
    UnicodeRegexUnsupported,

    #[error("Invalid regular expression: {0}")]
    InvalidRegex(String),

    #[error("Search cancelled")]
    Cancelled,

    #[error("Search exceeded its time budget")]
    TimedOut,
}

impl SearchError {
    /// True for errors caused by the query or buffer rather than by the caller aborting.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError::structural(0x80, "Invalid PE signature");
        assert_eq!(err.to_string(), "Invalid PE signature at offset 0x80");

        let err = ParseError::truncated("DOS header", 0, 64, 10);
        assert_eq!(
            err.to_string(),
            "Truncated DOS header at offset 0x0: need 64 bytes, 10 available"
        );

        let err = ParseError::UnsupportedVariant {
            field: "ELF class",
            value: 7,
        };
        assert_eq!(err.to_string(), "Unsupported ELF class value 0x7");
    }

    #[test]
    fn test_truncated_available_saturates() {
        let err = ParseError::truncated("section table", 0x200, 40, 0x100);
        assert!(matches!(err, ParseError::Truncated { available: 0, .. }));
    }

    #[test]
    fn test_search_error_classification() {
        assert!(SearchError::InvalidHex("zz".into()).is_input_error());
        assert!(SearchError::UnicodeRegexUnsupported.is_input_error());
        assert!(!SearchError::Cancelled.is_input_error());
        assert!(!SearchError::TimedOut.is_input_error());
    }
}
