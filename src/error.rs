//! Error types for env file parsing
//!
//! Every problem found while parsing is reported as a [`ParseError`] carrying
//! the line it came from, the raw text of that line, a human readable message
//! and a [`ParseErrorKind`]. The same value is used in both error modes: it is
//! collected into a [`ParseResult`](crate::ParseResult) in accumulate mode and
//! returned through [`EnvError::Parse`] in fail-fast mode.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Main error type returned by fail-fast operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    /// First error encountered while parsing or interpolating
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// The destination store refused a value
    #[error("Failed to store '{key}': {message}")]
    Store { key: String, message: String },
}

impl EnvError {
    /// Returns the underlying parse error, if any
    pub fn as_parse_error(&self) -> Option<&ParseError> {
        match self {
            EnvError::Parse(err) => Some(err),
            EnvError::Store { .. } => None,
        }
    }

    /// Returns the kind of the underlying parse error, if any
    pub fn kind(&self) -> Option<ParseErrorKind> {
        self.as_parse_error().map(|err| err.kind)
    }
}

/// Classification of a [`ParseError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseErrorKind {
    /// A quoted value was still open when input ended
    UnterminatedQuote,
    /// The text before `=` is not a valid identifier
    InvalidKey,
    /// A non-comment line without `=`
    MalformedLine,
    /// `${...}` references form a cycle
    CircularReference,
    /// A source could not be read
    FileReadError,
}

impl ParseErrorKind {
    /// Stable upper snake case name of the kind
    pub fn as_str(self) -> &'static str {
        match self {
            ParseErrorKind::UnterminatedQuote => "UNTERMINATED_QUOTE",
            ParseErrorKind::InvalidKey => "INVALID_KEY",
            ParseErrorKind::MalformedLine => "MALFORMED_LINE",
            ParseErrorKind::CircularReference => "CIRCULAR_REFERENCE",
            ParseErrorKind::FileReadError => "FILE_READ_ERROR",
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single problem found in env file content
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("Line {line_number}: {message}")]
pub struct ParseError {
    /// Line number (1-based); 0 when the error concerns a whole source
    pub line_number: usize,
    /// The offending line as it appeared in the input
    pub raw_content: String,
    /// Human readable description
    pub message: String,
    /// Error classification
    pub kind: ParseErrorKind,
}

impl ParseError {
    /// Creates a new parse error
    pub fn new(
        kind: ParseErrorKind,
        line_number: usize,
        raw_content: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line_number,
            raw_content: raw_content.into(),
            message: message.into(),
            kind,
        }
    }

    /// Line without an `=` separator
    pub fn malformed_line(line_number: usize, raw_content: &str) -> Self {
        Self::new(
            ParseErrorKind::MalformedLine,
            line_number,
            raw_content,
            "Missing '=' in assignment",
        )
    }

    /// Key that does not match `^[a-zA-Z_][a-zA-Z0-9_]*$`
    pub fn invalid_key(line_number: usize, raw_content: &str, key: &str) -> Self {
        Self::new(
            ParseErrorKind::InvalidKey,
            line_number,
            raw_content,
            format!(
                "Invalid key '{}': keys must start with a letter or underscore and contain only letters, digits and underscores",
                key
            ),
        )
    }

    /// Quoted value whose closing delimiter never appeared
    pub fn unterminated_quote(
        line_number: usize,
        raw_content: &str,
        key: &str,
        quote: char,
    ) -> Self {
        Self::new(
            ParseErrorKind::UnterminatedQuote,
            line_number,
            raw_content,
            format!(
                "Unterminated quote ({}) for key '{}' starting at line {}",
                quote, key, line_number
            ),
        )
    }

    /// Cycle in `${...}` references; `chain` lists the names in visit order
    /// and ends with the name that closed the cycle
    pub fn circular_reference(line_number: usize, raw_content: &str, chain: &[String]) -> Self {
        Self::new(
            ParseErrorKind::CircularReference,
            line_number,
            raw_content,
            format!("Circular reference detected: {}", chain.join(" -> ")),
        )
    }

    /// Reference chain nested deeper than the resolver allows. Reported under
    /// the circular-reference kind: the chain never bottoms out in a value.
    pub fn reference_too_deep(
        line_number: usize,
        raw_content: &str,
        max_depth: usize,
        chain: &[String],
    ) -> Self {
        let head = chain.iter().take(3).cloned().collect::<Vec<_>>().join(" -> ");
        Self::new(
            ParseErrorKind::CircularReference,
            line_number,
            raw_content,
            format!(
                "Maximum interpolation depth ({}) exceeded: {} -> ...",
                max_depth, head
            ),
        )
    }

    /// Source that exists but could not be read
    pub fn file_read(path: &str, source: &std::io::Error) -> Self {
        Self::new(
            ParseErrorKind::FileReadError,
            0,
            path,
            format!("Failed to read '{}': {}", path, source),
        )
    }
}
