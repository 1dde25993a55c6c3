//! Multi-record payload assembly
//!
//! A segment's bitstream starts at its record's payload offset and, when the
//! required bit count does not fit, continues at byte 0 of each physically
//! following record. The continuation records are consumed raw, without
//! parsing: their metadata and table regions belong to the stream.

use crate::error::{Error, Result};
use crate::extent::ExtentSet;
use crate::record::{SegmentRecord, RECORD_SIZE};
use tracing::warn;

/// The collected bitstream of one segment.
#[derive(Debug, Clone)]
pub struct AssembledPayload {
    /// Exactly `ceil(required_bits / 8)` bytes, fewer when truncated.
    pub bytes: Vec<u8>,
    /// Bits the segment declared it needs.
    pub required_bits: u64,
    /// The address space ended before `required_bits` were collected.
    pub truncated: bool,
}

impl AssembledPayload {
    /// Bits actually available for decoding.
    pub fn available_bits(&self) -> u64 {
        self.required_bits.min(self.bytes.len() as u64 * 8)
    }

    /// Fail with [`Error::Truncated`] when the stream came up short.
    /// Whether a short stream is fatal is the caller's call.
    pub fn require_complete(&self) -> Result<()> {
        if self.truncated {
            Err(Error::Truncated {
                required_bits: self.required_bits,
                got_bits: self.bytes.len() as u64 * 8,
            })
        } else {
            Ok(())
        }
    }
}

/// Assemble the bitstream for `record` using its refined bit count.
pub fn assemble(extents: &ExtentSet, record: &SegmentRecord) -> Result<AssembledPayload> {
    assemble_with_bits(extents, record, record.required_bits)
}

/// Assemble `required_bits` worth of payload: this record's payload slice,
/// then whole 8192-byte records at `start + k * 8192`, truncated to exactly
/// `ceil(required_bits / 8)` bytes.
pub fn assemble_with_bits(
    extents: &ExtentSet,
    record: &SegmentRecord,
    required_bits: u64,
) -> Result<AssembledPayload> {
    let required_bytes = required_bits.div_ceil(8) as usize;
    let mut bytes = Vec::with_capacity(required_bytes);
    bytes.extend_from_slice(&record.payload);

    let mut k = 1u64;
    let mut truncated = false;
    while bytes.len() < required_bytes {
        let start = record.start_offset + k * RECORD_SIZE as u64;
        if start + RECORD_SIZE as u64 > extents.total_size() {
            warn!(
                "payload for record at {} truncated: {} of {} bytes collected",
                record.start_offset,
                bytes.len().min(required_bytes),
                required_bytes
            );
            truncated = true;
            break;
        }
        let mut next = vec![0u8; RECORD_SIZE];
        extents.read_fully(start, &mut next)?;
        bytes.extend_from_slice(&next);
        k += 1;
    }

    bytes.truncate(required_bytes);
    Ok(AssembledPayload {
        bytes,
        required_bits,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitConfig;
    use crate::endian::Endian;
    use crate::record::{HuffmanTable, LensEncoding, SegmentMetadata, TableLayout};
    use std::fs;

    /// Synthetic parsed record: payload `[512, 8192)` of a record filled with
    /// `fill`, positioned at `start_offset`.
    fn stub_record(start_offset: u64, fill: u8, required_bits: u64) -> SegmentRecord {
        SegmentRecord {
            start_offset,
            endian: Endian::Big,
            metadata: SegmentMetadata {
                min_delta: 0.0,
                max_delta: 0.0,
                quant_deltas: [0; 64],
                block_size_bits: [0; 64],
            },
            huffman: HuffmanTable {
                base: 272,
                symbols: vec![1, 2],
                lengths: vec![1, 1],
                layout: TableLayout::SymLen,
                lens_encoding: LensEncoding::NibbleHiLo,
                max_len: 1,
                non_zero: 2,
            },
            payload_start_byte: 512,
            payload: vec![fill; RECORD_SIZE - 512],
            required_bits,
            probe_configs: vec![BitConfig::DEFAULT],
        }
    }

    fn three_record_file() -> (tempfile::TempDir, ExtentSet) {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("seg.cmp");
        let mut data = Vec::new();
        data.extend(std::iter::repeat(0xA1).take(RECORD_SIZE));
        data.extend(std::iter::repeat(0xB2).take(RECORD_SIZE));
        data.extend(std::iter::repeat(0xC3).take(RECORD_SIZE));
        fs::write(&base, &data).unwrap();
        let set = ExtentSet::open(&base, 0).unwrap();
        (dir, set)
    }

    #[test]
    fn multi_record_assembly_crosses_into_the_next_record() {
        let (_dir, set) = three_record_file();
        let record = stub_record(0, 0xA1, 90_000);

        let assembled = assemble(&set, &record).unwrap();
        assert!(!assembled.truncated);
        // ceil(90000 / 8) = 11250 = 7680 from this record + 3570 from the next.
        assert_eq!(assembled.bytes.len(), 11_250);
        assert!(assembled.bytes[..7680].iter().all(|&b| b == 0xA1));
        assert!(assembled.bytes[7680..].iter().all(|&b| b == 0xB2));
        assert!(assembled.require_complete().is_ok());
    }

    #[test]
    fn assembly_reaching_the_third_record_takes_its_prefix() {
        let (_dir, set) = three_record_file();
        // 7680 + 8192 = 15872 from records 0 and 1; ask for a bit more.
        let record = stub_record(0, 0xA1, (15_872 + 100) * 8);

        let assembled = assemble(&set, &record).unwrap();
        assert!(!assembled.truncated);
        assert_eq!(assembled.bytes.len(), 15_972);
        assert!(assembled.bytes[15_872..].iter().all(|&b| b == 0xC3));
    }

    #[test]
    fn assembly_is_prefix_stable() {
        let (_dir, set) = three_record_file();
        let record = stub_record(0, 0xA1, 0);

        let long = assemble_with_bits(&set, &record, 100_000).unwrap();
        let short = assemble_with_bits(&set, &record, 63_000).unwrap();
        assert_eq!(short.bytes[..], long.bytes[..short.bytes.len()]);
    }

    #[test]
    fn running_out_of_records_sets_the_truncated_flag() {
        let (_dir, set) = three_record_file();
        // Start at the last record: nothing follows it.
        let record = stub_record(2 * RECORD_SIZE as u64, 0xC3, 90_000);

        let assembled = assemble(&set, &record).unwrap();
        assert!(assembled.truncated);
        assert_eq!(assembled.bytes.len(), RECORD_SIZE - 512);
        assert!(matches!(
            assembled.require_complete(),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn single_record_payload_is_cut_to_the_required_bytes() {
        let (_dir, set) = three_record_file();
        let record = stub_record(0, 0xA1, 1000 * 8);

        let assembled = assemble(&set, &record).unwrap();
        assert!(!assembled.truncated);
        assert_eq!(assembled.bytes.len(), 1000);
    }
}
