//! CMP file and data header parsing
//!
//! Nothing in a CMP header states its byte order and old producers disagree
//! about whether the offset table carries an 8-byte lead-in. Both are
//! recovered here: the header is parsed in each order and scored for
//! plausibility, and the table base is picked by sampling entries at the two
//! candidate positions.

use crate::endian::Endian;
use crate::error::{Error, Result};
use crate::extent::ExtentSet;
use crate::record::RECORD_SIZE;
use tracing::debug;

/// Size of the file header at offset 0.
pub const FILE_HEADER_SIZE: usize = 1024;

/// Nominal size of the data header at `hdr_pos`.
pub const DATA_HEADER_NOMINAL_SIZE: usize = 4120;

/// Ceiling on the virtual address space a header may claim. Anything larger
/// is treated as a mis-parse during scoring.
const MAX_VIRTUAL_SIZE: u64 = 1 << 46;

/// Tolerance when matching `rec_pos_0` against the computed layout.
const REC0_TOLERANCE: u64 = 32;

/// 1024-byte file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub dirty: u32,
    pub ident: u32,
    pub version: u32,
    pub ot_pos: u64,
    pub hdr_pos: u64,
    pub rec_pos_0: u64,
    pub rec_pos_1: u64,
    pub hdr_len: u32,
    pub rec_len: u32,
    pub min_1: i32,
    pub max_1: i32,
    pub min_2: i32,
    pub max_2: i32,
    pub min_3: i32,
    pub max_3: i32,
    /// Dimension-ordering hints; parsed but unused by the reader.
    pub fast: i32,
    pub middle: i32,
    pub slow: i32,
}

impl FileHeader {
    /// Raw field parse in the given order. No validation.
    pub fn parse(buf: &[u8], endian: Endian) -> FileHeader {
        FileHeader {
            dirty: endian.read_u32(&buf[0..4]),
            ident: endian.read_u32(&buf[4..8]),
            version: endian.read_u32(&buf[8..12]),
            ot_pos: endian.read_u64(&buf[12..20]),
            hdr_pos: endian.read_u64(&buf[20..28]),
            rec_pos_0: endian.read_u64(&buf[28..36]),
            rec_pos_1: endian.read_u64(&buf[36..44]),
            hdr_len: endian.read_u32(&buf[44..48]),
            rec_len: endian.read_u32(&buf[48..52]),
            min_1: endian.read_i32(&buf[52..56]),
            max_1: endian.read_i32(&buf[56..60]),
            min_2: endian.read_i32(&buf[60..64]),
            max_2: endian.read_i32(&buf[64..68]),
            min_3: endian.read_i32(&buf[68..72]),
            max_3: endian.read_i32(&buf[72..76]),
            fast: endian.read_i32(&buf[76..80]),
            middle: endian.read_i32(&buf[80..84]),
            slow: endian.read_i32(&buf[84..88]),
        }
    }

    /// Segment counts along each axis, if all are positive.
    pub fn seg_counts(&self) -> Option<(u64, u64, u64)> {
        let n1 = i64::from(self.max_1) - i64::from(self.min_1) + 1;
        let n2 = i64::from(self.max_2) - i64::from(self.min_2) + 1;
        let n3 = i64::from(self.max_3) - i64::from(self.min_3) + 1;
        if n1 > 0 && n2 > 0 && n3 > 0 {
            Some((n1 as u64, n2 as u64, n3 as u64))
        } else {
            None
        }
    }

    /// Total number of grid cells, if the ranges are sane.
    pub fn total_segments(&self) -> Option<u64> {
        let (n1, n2, n3) = self.seg_counts()?;
        n1.checked_mul(n2)?.checked_mul(n3)
    }

    /// Plausibility score of this parse against the base file size. Each
    /// criterion that holds adds its weight; a parse in the wrong byte order
    /// scatters the offsets and scores near zero.
    fn plausibility(&self, file_size: u64) -> i32 {
        let mut score = 0;
        if self.ot_pos >= FILE_HEADER_SIZE as u64 && self.ot_pos < file_size {
            score += 2;
        }
        if self.hdr_pos > self.ot_pos && self.hdr_pos < file_size {
            score += 2;
        }
        if self.rec_pos_0 > 0 && self.rec_pos_0 >= self.hdr_pos && self.rec_pos_0 < file_size {
            score += 2;
        }
        if self.rec_pos_1 > self.rec_pos_0 && self.rec_pos_1 <= MAX_VIRTUAL_SIZE {
            score += 2;
        }
        if self.rec_len == RECORD_SIZE as u32 {
            score += 2;
        }
        if (1024..=65536).contains(&self.hdr_len) {
            score += 1;
        }
        if let Some(n) = self.total_segments() {
            if n > 0 && n < 1_000_000_000 {
                score += 2;
            }
            let expected = n
                .checked_mul(8)
                .and_then(|t| t.checked_add(self.ot_pos))
                .and_then(|t| t.checked_add(u64::from(self.hdr_len)));
            if let Some(expected) = expected {
                if self.rec_pos_0.abs_diff(expected) <= REC0_TOLERANCE
                    || self.rec_pos_0.abs_diff(expected + 8) <= REC0_TOLERANCE
                {
                    score += 3;
                }
            }
        }
        score
    }

    /// Enforce the positional invariants after a byte order has been picked.
    pub fn validate(&self) -> Result<()> {
        if self.ot_pos < FILE_HEADER_SIZE as u64 {
            return Err(Error::InconsistentHeader(format!(
                "offset table at {} overlaps the file header",
                self.ot_pos
            )));
        }
        if self.hdr_pos <= self.ot_pos {
            return Err(Error::InconsistentHeader(format!(
                "data header at {} does not follow the offset table at {}",
                self.hdr_pos, self.ot_pos
            )));
        }
        if self.rec_pos_0 < self.hdr_pos {
            return Err(Error::InconsistentHeader(format!(
                "records start at {} before the data header at {}",
                self.rec_pos_0, self.hdr_pos
            )));
        }
        if self.rec_pos_1 <= self.rec_pos_0 {
            return Err(Error::InconsistentHeader(format!(
                "record region [{}, {}) is empty or inverted",
                self.rec_pos_0, self.rec_pos_1
            )));
        }
        if self.total_segments().is_none() {
            return Err(Error::InconsistentHeader(
                "segment grid ranges are empty or inverted".into(),
            ));
        }
        Ok(())
    }
}

/// Parse the first 1024 bytes in both byte orders and keep the plausible one
/// (ties go to big-endian). `rec_len` stored as zero is normalized to 8192.
pub fn detect(buf: &[u8], file_size: u64) -> Result<(FileHeader, Endian)> {
    let be = FileHeader::parse(buf, Endian::Big);
    let le = FileHeader::parse(buf, Endian::Little);
    let be_score = be.plausibility(file_size);
    let le_score = le.plausibility(file_size);
    debug!("header plausibility: BE {be_score}, LE {le_score}");

    if be_score <= 0 && le_score <= 0 {
        return Err(Error::BadMagic { be_score, le_score });
    }
    let (mut header, endian) = if le_score > be_score {
        (le, Endian::Little)
    } else {
        (be, Endian::Big)
    };
    header.validate()?;
    if header.rec_len == 0 {
        debug!("rec_len stored as zero, normalizing to {RECORD_SIZE}");
        header.rec_len = RECORD_SIZE as u32;
    }
    Ok((header, endian))
}

/// Pick the offset-table base: `ot_pos` or `ot_pos + 8` (8-byte lead-in).
///
/// Samples the first and last 16 entries at each candidate and counts values
/// that look like record offsets (zero, or below `rec_pos_1`). The lead-in
/// base wins only on a strictly higher count; afterwards the choice is
/// cross-checked against where `rec_pos_0` says the table must end.
pub fn choose_table_base(
    extents: &ExtentSet,
    header: &FileHeader,
    endian: Endian,
) -> Result<u64> {
    let n = header
        .total_segments()
        .ok_or_else(|| Error::InconsistentHeader("segment grid ranges are invalid".into()))?;

    let sample_score = |base: u64| -> u32 {
        let head = n.min(16);
        let mut indices: Vec<u64> = (0..head).collect();
        indices.extend((n.saturating_sub(16)..n).filter(|&i| i >= head));

        let mut plausible = 0u32;
        for idx in indices {
            let mut raw = [0u8; 8];
            if extents.read_fully(base + idx * 8, &mut raw).is_err() {
                continue;
            }
            let value = endian.read_u64(&raw);
            if value == 0 || value < header.rec_pos_1 {
                plausible += 1;
            }
        }
        plausible
    };

    let plain = sample_score(header.ot_pos);
    let lead_in = sample_score(header.ot_pos + 8);
    debug!("offset-table base probe: {plain} plausible at ot_pos, {lead_in} at ot_pos+8");

    let mut base = if lead_in > plain {
        header.ot_pos + 8
    } else {
        header.ot_pos
    };

    // The table, data header and first record must not overlap: if rec_pos_0
    // sits before the end implied by this base, the other base was right.
    let table_end = base + n * 8 + u64::from(header.hdr_len);
    if header.rec_pos_0 < table_end.saturating_sub(64) {
        let flipped = if base == header.ot_pos {
            header.ot_pos + 8
        } else {
            header.ot_pos
        };
        debug!(
            "rec_pos_0 {} inconsistent with table base {base}, flipping to {flipped}",
            header.rec_pos_0
        );
        base = flipped;
    }
    Ok(base)
}

/// Data header at `hdr_pos`. Opaque to the reader; decoded for inspection
/// only.
#[derive(Debug, Clone)]
pub struct DataHeader {
    pub ident: i32,
    pub version: i32,
    pub cmp_method: i32,
    pub hpos: i32,
    pub hlen: i32,
    pub distortion: i32,
    pub null_value: f32,
    pub min_1: i32,
    pub max_1: i32,
    pub min_2: i32,
    pub max_2: i32,
    pub min_3: i32,
    pub max_3: i32,
    pub amin_1: i32,
    pub amax_1: i32,
    pub amin_2: i32,
    pub amax_2: i32,
    pub amin_3: i32,
    pub amax_3: i32,
    /// 256-entry symbol-frequency dictionary, when the header is long enough
    /// to carry it.
    pub huffman_dict: Vec<f64>,
    /// 256-entry metering dictionary, same condition.
    pub metered_dict: Vec<f64>,
}

impl DataHeader {
    const SCALARS_SIZE: usize = 76;
    const DICT_LEN: usize = 256;

    /// Decode the scalar fields, plus the two dictionaries when `buf` has
    /// room for them. Returns `None` when even the scalars do not fit.
    pub fn parse(buf: &[u8], endian: Endian) -> Option<DataHeader> {
        if buf.len() < Self::SCALARS_SIZE {
            return None;
        }
        let int = |at: usize| endian.read_i32(&buf[at..at + 4]);

        let mut header = DataHeader {
            ident: int(0),
            version: int(4),
            cmp_method: int(8),
            hpos: int(12),
            hlen: int(16),
            distortion: int(20),
            null_value: endian.read_f32(&buf[24..28]),
            min_1: int(28),
            max_1: int(32),
            min_2: int(36),
            max_2: int(40),
            min_3: int(44),
            max_3: int(48),
            amin_1: int(52),
            amax_1: int(56),
            amin_2: int(60),
            amax_2: int(64),
            amin_3: int(68),
            amax_3: int(72),
            huffman_dict: Vec::new(),
            metered_dict: Vec::new(),
        };

        let dicts_size = 2 * Self::DICT_LEN * 8;
        if buf.len() >= Self::SCALARS_SIZE + dicts_size {
            let mut at = Self::SCALARS_SIZE;
            for dict in [&mut header.huffman_dict, &mut header.metered_dict] {
                dict.reserve(Self::DICT_LEN);
                for _ in 0..Self::DICT_LEN {
                    dict.push(endian.read_f64(&buf[at..at + 8]));
                    at += 8;
                }
            }
        } else {
            debug!(
                "data header too short for dictionaries ({} bytes), scalars only",
                buf.len()
            );
        }
        Some(header)
    }
}
