//! Reader for the CMP compressed-segment container format
//!
//! A CMP file holds a 1024-byte file header, a data header, an offset table
//! and a 3D grid of fixed 8192-byte segment records, each carrying a
//! canonical Huffman table and a bitstream that may continue into the
//! physically following records. No published description of the format is
//! fully trusted, so the reader recovers the ambiguous parts itself: byte
//! order and the offset-table base by plausibility scoring, the Huffman
//! table position by exhaustive candidate search, and the bit orientation of
//! payloads by probing short decodes.
//!
//! Overflow files (`name00001.ext`, `name00002.ext`, ...) are stitched into
//! one virtual address space; see [`extent::ExtentSet`].

pub mod bits;
pub mod endian;
pub mod error;
pub mod extent;
pub mod header;
pub mod huffman;
pub mod offset_table;
pub mod payload;
pub mod reader;
pub mod record;
pub mod sanity;

pub use bits::{BitConfig, BitOrder, BitReader};
pub use endian::Endian;
pub use error::{Error, Result};
pub use extent::ExtentSet;
pub use header::{DataHeader, FileHeader};
pub use huffman::{CanonicalDecoder, SymbolStream, TieBreak};
pub use offset_table::OffsetTable;
pub use payload::AssembledPayload;
pub use reader::{CmpReader, HeaderOffsets};
pub use record::{
    HuffmanTable, LensEncoding, SegmentMetadata, SegmentRecord, TableLayout, RECORD_SIZE,
};
pub use sanity::{SanityCheck, SanityReport};
