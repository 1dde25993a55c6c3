//! Error types for CMP container operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type for CMP operations
pub type Result<T> = std::result::Result<T, Error>;

/// CMP error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Base container file missing
    #[error("base file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Truncation before the required bytes could be read
    #[error("short read at offset {offset}: wanted {wanted} bytes, {available} available")]
    ShortRead {
        offset: u64,
        wanted: usize,
        available: u64,
    },

    /// File header failed plausibility scoring in both byte orders
    #[error("header not recognized in either byte order (BE score {be_score}, LE score {le_score})")]
    BadMagic { be_score: i32, le_score: i32 },

    /// Positional header invariants violated
    #[error("inconsistent header: {0}")]
    InconsistentHeader(String),

    /// Address or segment coordinate outside the valid range
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Offset-table entry is zero
    #[error("segment ({0}, {1}, {2}) is empty")]
    EmptySegment(i32, i32, i32),

    /// No Huffman-table candidate passed detection
    #[error(
        "no Huffman table found in record at offset {offset} (best partial score {best_score})"
    )]
    TableNotFound { offset: u64, best_score: i32 },

    /// Code lengths failed the Kraft inequality
    #[error("code lengths violate the Kraft inequality")]
    KraftViolation,

    /// Decoding reached a dead trie branch
    #[error("invalid Huffman code: reached a dead branch")]
    InvalidCode,

    /// Bit cursor ran out in the middle of a symbol
    #[error("bitstream ended in the middle of a symbol")]
    UnexpectedEnd,

    /// Payload assembly ended short of the required bit count
    #[error("payload truncated: assembled {got_bits} of {required_bits} bits")]
    Truncated { required_bits: u64, got_bits: u64 },
}
