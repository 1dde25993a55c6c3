//! Container sanity checks
//!
//! A quick pass over an open container: header coherence, the first
//! non-empty segment's table, payload alignment and a short decode preview.
//! Failures are collected in the report, never raised; the caller decides
//! what is fatal.

use crate::bits::BitConfig;
use crate::reader::CmpReader;
use crate::record::RECORD_SIZE;
use tracing::debug;

/// Outcome of one check.
#[derive(Debug, Clone)]
pub struct SanityCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Collected results of [`run`].
#[derive(Debug, Clone, Default)]
pub struct SanityReport {
    pub checks: Vec<SanityCheck>,
}

impl SanityReport {
    fn push(&mut self, name: &'static str, passed: bool, detail: String) {
        debug!("sanity {name}: {} ({detail})", if passed { "ok" } else { "FAIL" });
        self.checks.push(SanityCheck {
            name,
            passed,
            detail,
        });
    }

    /// True when every check passed.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// The checks that failed.
    pub fn failures(&self) -> impl Iterator<Item = &SanityCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Run the stage-one checks against an open reader.
pub fn run(reader: &CmpReader) -> SanityReport {
    let mut report = SanityReport::default();
    let header = reader.file_header();
    let offsets = reader.header_offsets();

    report.push(
        "header-order",
        offsets.ot_pos >= 1024
            && offsets.hdr_pos > offsets.ot_pos
            && offsets.rec_pos_0 >= offsets.hdr_pos,
        format!(
            "ot={} hdr={} rec0={} rec1={}",
            offsets.ot_pos, offsets.hdr_pos, offsets.rec_pos_0, offsets.rec_pos_1
        ),
    );

    let n = header.total_segments().unwrap_or(0);
    report.push(
        "segment-grid",
        n > 0 && (1024..=65536).contains(&header.hdr_len),
        format!("{n} segments, hdr_len={}", header.hdr_len),
    );

    // rec_pos_0 should land where table + data header end, give or take.
    let expected = offsets.table_base + n * 8 + u64::from(header.hdr_len);
    let delta = offsets.rec_pos_0.abs_diff(expected);
    report.push(
        "record-region",
        delta <= 64,
        format!("rec_pos_0 off by {delta} bytes from table base {}", offsets.table_base),
    );

    let first = match reader.find_first_non_empty() {
        Some(coord) => coord,
        None => {
            report.push(
                "first-segment",
                false,
                "no non-empty segment in the offset table".into(),
            );
            return report;
        }
    };
    report.push(
        "first-segment",
        true,
        format!("({}, {}, {})", first.0, first.1, first.2),
    );

    let record = match reader.read_segment(first.0, first.1, first.2) {
        Ok(record) => record,
        Err(e) => {
            report.push("segment-parse", false, e.to_string());
            return report;
        }
    };
    let mut histogram = [0usize; 16];
    for &len in &record.huffman.lengths {
        histogram[len as usize] += 1;
    }
    let histogram: Vec<String> = histogram
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .map(|(len, count)| format!("{len}:{count}"))
        .collect();
    report.push(
        "segment-parse",
        record.huffman.n() >= 2,
        format!(
            "N={} base={} maxLen={} lengths {}",
            record.huffman.n(),
            record.huffman.base,
            record.huffman.max_len,
            histogram.join(" ")
        ),
    );

    report.push(
        "payload-alignment",
        record.payload_start_byte >= 512
            && record.payload_start_byte % 16 == 0
            && record.payload_start_byte < RECORD_SIZE,
        format!("payload starts at {}", record.payload_start_byte),
    );

    report.push(
        "bit-budget",
        record.required_bits > 0 && record.metadata.total_bits() > 0,
        format!(
            "required={} metadata declares {}",
            record.required_bits,
            record.metadata.total_bits()
        ),
    );

    match reader.assemble_payload(&record) {
        Ok(assembled) => {
            report.push(
                "assembly",
                !assembled.truncated,
                format!(
                    "{} bytes for {} bits",
                    assembled.bytes.len(),
                    assembled.required_bits
                ),
            );

            let config = record
                .probe_configs
                .first()
                .copied()
                .unwrap_or(BitConfig::DEFAULT);
            match reader.decode_symbols(&record, &assembled, config) {
                Ok(stream) => {
                    let decoded = stream.take(64).take_while(|s| s.is_ok()).count();
                    report.push(
                        "decode-preview",
                        decoded >= 8,
                        format!("{decoded} symbols under {config}"),
                    );
                }
                Err(e) => report.push("decode-preview", false, e.to_string()),
            }
        }
        Err(e) => report.push("assembly", false, e.to_string()),
    }

    report
}
