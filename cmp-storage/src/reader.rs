//! CMP reader facade
//!
//! [`CmpReader::open`] wires the pieces together: extent discovery, header
//! detection, offset-table base selection and table loading. Everything after
//! `open` borrows the reader immutably; dropping it releases every extent.

use crate::bits::{BitConfig, BitReader};
use crate::endian::Endian;
use crate::error::{Error, Result};
use crate::extent::ExtentSet;
use crate::header::{self, DataHeader, FileHeader, FILE_HEADER_SIZE};
use crate::huffman::SymbolStream;
use crate::offset_table::OffsetTable;
use crate::payload::{self, AssembledPayload};
use crate::record::{SegmentRecord, RECORD_SIZE};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Resolved file layout, for inspection.
#[derive(Debug, Clone, Copy)]
pub struct HeaderOffsets {
    pub ot_pos: u64,
    pub hdr_pos: u64,
    pub rec_pos_0: u64,
    pub rec_pos_1: u64,
    /// Chosen offset-table base: `ot_pos`, or `ot_pos + 8` with a lead-in.
    pub table_base: u64,
}

/// Open CMP container.
#[derive(Debug)]
pub struct CmpReader {
    extents: ExtentSet,
    endian: Endian,
    file_header: FileHeader,
    data_header: Option<DataHeader>,
    table_base: u64,
    offset_table: OffsetTable,
}

impl CmpReader {
    /// Open a container: detect the byte order, validate the header, open
    /// every extent up to `rec_pos_1` and load the offset table.
    pub fn open(path: impl AsRef<Path>) -> Result<CmpReader> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }

        let mut file = File::open(path)?;
        let base_size = file.metadata()?.len();
        let mut head = vec![0u8; FILE_HEADER_SIZE];
        file.read_exact(&mut head).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::ShortRead {
                    offset: 0,
                    wanted: FILE_HEADER_SIZE,
                    available: base_size,
                }
            } else {
                Error::Io(e)
            }
        })?;
        drop(file);

        let (file_header, endian) = header::detect(&head, base_size)?;
        let extents = ExtentSet::open(path, file_header.rec_pos_1)?;

        let (n1, n2, n3) = file_header
            .seg_counts()
            .ok_or_else(|| Error::InconsistentHeader("segment grid ranges are invalid".into()))?;
        let total = file_header
            .total_segments()
            .ok_or_else(|| Error::InconsistentHeader("segment grid overflows".into()))?;
        if total >= 1_000_000_000 {
            return Err(Error::InconsistentHeader(format!(
                "implausible segment count {total}"
            )));
        }
        let table_base = header::choose_table_base(&extents, &file_header, endian)?;
        let mut raw = vec![0u8; total as usize * 8];
        extents.read_fully(table_base, &mut raw)?;
        let entries: Vec<u64> = raw.chunks_exact(8).map(|c| endian.read_u64(c)).collect();
        let overflowing = entries
            .iter()
            .filter(|&&entry| entry > 0 && entry + RECORD_SIZE as u64 > extents.total_size())
            .count();
        if overflowing > 0 {
            warn!("{overflowing} offset-table entries run past the address space");
        }
        let offset_table = OffsetTable::new(
            (file_header.min_1, file_header.min_2, file_header.min_3),
            (n1 as usize, n2 as usize, n3 as usize),
            entries,
        );

        let data_header = match extents.slice(file_header.hdr_pos, file_header.hdr_len as usize) {
            Ok(buf) => DataHeader::parse(&buf, endian),
            Err(e) => {
                warn!("data header unreadable: {e}");
                None
            }
        };

        debug!(
            "opened {} ({}, {} extents, {} segments, table base {table_base})",
            path.display(),
            endian,
            extents.extent_count(),
            offset_table.len()
        );
        Ok(CmpReader {
            extents,
            endian,
            file_header,
            data_header,
            table_base,
            offset_table,
        })
    }

    /// Detected byte order.
    pub fn byte_order(&self) -> Endian {
        self.endian
    }

    /// The validated file header.
    pub fn file_header(&self) -> &FileHeader {
        &self.file_header
    }

    /// The data header, when it was present and long enough to decode.
    pub fn data_header(&self) -> Option<&DataHeader> {
        self.data_header.as_ref()
    }

    /// The loaded offset table.
    pub fn offset_table(&self) -> &OffsetTable {
        &self.offset_table
    }

    /// The underlying address space.
    pub fn extents(&self) -> &ExtentSet {
        &self.extents
    }

    /// Inclusive coordinate ranges of the segment grid.
    pub fn dimensions(&self) -> ((i32, i32), (i32, i32), (i32, i32)) {
        let h = &self.file_header;
        (
            (h.min_1, h.max_1),
            (h.min_2, h.max_2),
            (h.min_3, h.max_3),
        )
    }

    /// Resolved header offsets, including the chosen table base.
    pub fn header_offsets(&self) -> HeaderOffsets {
        HeaderOffsets {
            ot_pos: self.file_header.ot_pos,
            hdr_pos: self.file_header.hdr_pos,
            rec_pos_0: self.file_header.rec_pos_0,
            rec_pos_1: self.file_header.rec_pos_1,
            table_base: self.table_base,
        }
    }

    /// First coordinate with a non-empty segment, in linear order.
    pub fn find_first_non_empty(&self) -> Option<(i32, i32, i32)> {
        self.offset_table.first_non_empty()
    }

    /// Every coordinate with a non-empty segment, in linear order.
    pub fn list_non_empty_segments(&self) -> Vec<(i32, i32, i32)> {
        self.offset_table
            .iter_non_empty()
            .map(|(coord, _)| coord)
            .collect()
    }

    /// Record offset for a coordinate, rejecting out-of-grid coordinates and
    /// empty segments.
    pub fn segment_offset(&self, s1: i32, s2: i32, s3: i32) -> Result<u64> {
        let entry = self
            .offset_table
            .get(s1, s2, s3)
            .ok_or_else(|| Error::OutOfRange(format!("segment ({s1}, {s2}, {s3})")))?;
        if entry == 0 {
            return Err(Error::EmptySegment(s1, s2, s3));
        }
        if entry + RECORD_SIZE as u64 > self.extents.total_size() {
            return Err(Error::OutOfRange(format!(
                "record at {entry} runs past the address space ({} bytes)",
                self.extents.total_size()
            )));
        }
        Ok(entry)
    }

    /// Read and parse the segment record at a coordinate.
    pub fn read_segment(&self, s1: i32, s2: i32, s3: i32) -> Result<SegmentRecord> {
        let offset = self.segment_offset(s1, s2, s3)?;
        let buf = self.extents.slice(offset, RECORD_SIZE)?;
        SegmentRecord::parse(&buf, offset, self.endian)
    }

    /// Collect the record's full bitstream (see [`crate::payload`]).
    pub fn assemble_payload(&self, record: &SegmentRecord) -> Result<AssembledPayload> {
        payload::assemble(&self.extents, record)
    }

    /// Lazy symbol stream over an assembled payload under one bit
    /// configuration. Candidates come from `record.probe_configs`.
    pub fn decode_symbols<'a>(
        &self,
        record: &SegmentRecord,
        assembled: &'a AssembledPayload,
        config: BitConfig,
    ) -> Result<SymbolStream<'a>> {
        let decoder = record.huffman.decoder()?;
        let reader = BitReader::with_limit(&assembled.bytes, config, assembled.available_bits());
        Ok(decoder.into_stream(reader))
    }
}
