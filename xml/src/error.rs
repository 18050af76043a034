use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Source location in the decoded character stream. `line` and `column` are
/// 1-based, `byte` counts UTF-8 bytes from the start of the document.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TextPosition {
    pub byte: usize,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// The ways a scan can fail on malformed input.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnterminatedComment,
    UnterminatedPi,
    UnterminatedCdata,
    MalformedTag,
    MalformedDecl,
    UnmatchedEndTag,
    DuplicateAttribute,
    UnsupportedVersion,
    IllegalChar,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::UnterminatedComment => "unterminated comment",
            Self::UnterminatedPi => "unterminated processing instruction",
            Self::UnterminatedCdata => "unterminated CDATA section",
            Self::MalformedTag => "malformed tag",
            Self::MalformedDecl => "malformed declaration",
            Self::UnmatchedEndTag => "unmatched end tag",
            Self::DuplicateAttribute => "duplicate attribute",
            Self::UnsupportedVersion => "unsupported XML version",
            Self::IllegalChar => "character not allowed here",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Decode failures are fatal; the BOM probe only ever selects UTF-8 or
    /// UTF-16, everything else is assumed UTF-8.
    #[error("{path}: {cause} at byte {position}")]
    Encoding {
        path: PathBuf,
        position: usize,
        cause: String,
    },

    #[error("{kind} at {position}")]
    Parse {
        kind: ParseErrorKind,
        position: TextPosition,
    },

    /// The event stream did not describe a single well-formed tree.
    #[error("document structure error: {0}")]
    Structural(String),

    /// Raised by a content handler to cancel the parse; the scanner releases
    /// the reader and propagates the cause.
    #[error("parse aborted: {0}")]
    Aborted(String),
}

impl XmlError {
    pub fn parse(kind: ParseErrorKind, position: TextPosition) -> Self {
        Self::Parse { kind, position }
    }

    pub fn parse_kind(&self) -> Option<ParseErrorKind> {
        match self {
            Self::Parse { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
