//! Error types for the template pipeline
//!
//! Lexical and structural failures abort the template they occur in; callers
//! that process many templates use `parse_template_or_empty` to degrade a
//! failure into an empty node list instead.

use thiserror::Error;

/// Malformed literal text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated string starting at offset {start}")]
    UnterminatedString { start: usize },

    #[error("unterminated comment starting at offset {start}")]
    UnterminatedComment { start: usize },

    #[error("invalid character {found:?} at offset {offset}")]
    InvalidCharacter { found: char, offset: usize },
}

/// Token stream that violates the grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected {expected}, found {found} at offset {offset}")]
pub struct StructuralError {
    pub expected: &'static str,
    pub found: String,
    pub offset: usize,
}

impl StructuralError {
    /// Keep whichever of two failures got further into the input
    pub fn furthest(self, other: StructuralError) -> StructuralError {
        if other.offset > self.offset {
            other
        } else {
            self
        }
    }
}

/// Terminal failure while turning tokens into nodes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("lexical error: {0}")]
    Lexical(#[from] LexError),

    #[error("syntax error: {0}")]
    Structural(#[from] StructuralError),
}

/// Vendor prefix table does not fit its per-depth value capacity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("prefix table depth {depth} needs {needed} value slots but only {capacity} fit")]
pub struct BuildCapacityError {
    pub depth: usize,
    pub needed: usize,
    pub capacity: usize,
}

/// Malformed binary ISTF buffer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    #[error("unknown node kind {0}")]
    UnknownKind(u8),

    #[error("string id {0} is not in the string table")]
    MissingString(u32),

    #[error("string table entry is not valid UTF-8")]
    InvalidUtf8,
}

/// Crate-level error for the template entry points
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IstfError {
    #[error("template has {chunks} chunks for {interpolations} interpolations; expected interpolations + 1")]
    ChunkCount { chunks: usize, interpolations: usize },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl From<LexError> for IstfError {
    fn from(err: LexError) -> Self {
        IstfError::Parse(ParseError::Lexical(err))
    }
}
