//! End-to-end open/detection scenarios over synthetic CMP files.

mod common;

use cmp_storage::{CmpReader, Endian, Error, RECORD_SIZE};
use common::*;
use std::fs;

fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn big_endian_file_without_lead_in() {
    let (symbols, lengths) = table_39();
    let rec = build_record(460, &symbols, &lengths, Endian::Big, None);
    // Linear indices 1 = (1,0,0) and 6 = (0,0,1).
    let (image, layout) = build_file(Endian::Big, false, &[(1, &rec), (6, &rec)]);

    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "run.cmp", &image);
    let reader = CmpReader::open(&path).unwrap();

    assert_eq!(reader.byte_order(), Endian::Big);
    let offsets = reader.header_offsets();
    assert_eq!(offsets.table_base, layout.ot_pos);
    assert_eq!(offsets.rec_pos_0, layout.rec_pos_0);
    assert_eq!(reader.offset_table().len(), SEGMENTS);
    assert_eq!(reader.dimensions(), ((0, 1), (0, 2), (0, 3)));

    assert_eq!(reader.find_first_non_empty(), Some((1, 0, 0)));
    assert_eq!(
        reader.list_non_empty_segments(),
        vec![(1, 0, 0), (0, 0, 1)]
    );
}

#[test]
fn little_endian_file_with_lead_in() {
    let (symbols, lengths) = table_39();
    let rec = build_record(460, &symbols, &lengths, Endian::Little, None);
    let (image, layout) = build_file(Endian::Little, true, &[(0, &rec)]);

    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "run.cmp", &image);
    let reader = CmpReader::open(&path).unwrap();

    assert_eq!(reader.byte_order(), Endian::Little);
    assert_eq!(reader.header_offsets().table_base, layout.ot_pos + 8);
    assert_eq!(reader.find_first_non_empty(), Some((0, 0, 0)));

    // The record itself parses under the detected order.
    let record = reader.read_segment(0, 0, 0).unwrap();
    assert_eq!(record.huffman.n(), 39);
    assert_eq!(record.metadata.total_bits(), 64 * 1406);
}

#[test]
fn data_header_scalars_are_exposed() {
    let (symbols, lengths) = table_39();
    let rec = build_record(460, &symbols, &lengths, Endian::Big, None);
    let (image, _) = build_file(Endian::Big, false, &[(0, &rec)]);

    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "run.cmp", &image);
    let reader = CmpReader::open(&path).unwrap();

    let data_header = reader.data_header().unwrap();
    assert_eq!(data_header.ident, 7);
    assert_eq!(data_header.version, 1000);
}

#[test]
fn multi_extent_file_is_stitched_together() {
    let (symbols, lengths) = table_39();
    let rec = build_record(460, &symbols, &lengths, Endian::Big, None);
    let (image, layout) = build_file(Endian::Big, false, &[(1, &rec), (6, &rec)]);

    // Split mid-record: the base file ends 1000 bytes into the first record.
    let split = (layout.rec_pos_0 + 1000) as usize;
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "run.cmp", &image[..split]);
    write_file(&dir, "run00001.cmp", &image[split..]);

    let reader = CmpReader::open(&path).unwrap();
    assert_eq!(reader.extents().extent_count(), 2);
    assert_eq!(reader.extents().total_size(), image.len() as u64);

    // Reading a record that crosses the extent boundary works.
    let record = reader.read_segment(1, 0, 0).unwrap();
    assert_eq!(record.huffman.base, 460);
    assert_eq!(record.payload_start_byte, 528);
}

#[test]
fn missing_base_file_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = CmpReader::open(dir.path().join("absent.cmp")).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn short_file_reports_short_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "tiny.cmp", &[0u8; 100]);
    let err = CmpReader::open(&path).unwrap_err();
    assert!(matches!(
        err,
        Error::ShortRead {
            available: 100,
            ..
        }
    ));
}

#[test]
fn implausible_header_in_both_orders_is_bad_magic() {
    // Inverted grid ranges and zeroed offsets score nothing either way.
    let mut head = vec![0u8; 2048];
    put_u32(&mut head, 52, 5, Endian::Big); // min_1
    put_u32(&mut head, 56, 2, Endian::Big); // max_1 < min_1

    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "junk.cmp", &head);
    let err = CmpReader::open(&path).unwrap_err();
    assert!(matches!(err, Error::BadMagic { .. }));
}

#[test]
fn header_with_data_header_before_table_is_inconsistent() {
    let (symbols, lengths) = table_39();
    let rec = build_record(460, &symbols, &lengths, Endian::Big, None);
    let (mut image, _) = build_file(Endian::Big, false, &[(0, &rec)]);
    // hdr_pos below ot_pos violates the positional invariants.
    put_u64(&mut image, 20, 512, Endian::Big);

    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "run.cmp", &image);
    let err = CmpReader::open(&path).unwrap_err();
    assert!(matches!(err, Error::InconsistentHeader(_)));
}

#[test]
fn last_record_is_readable_but_one_byte_more_is_not() {
    let (symbols, lengths) = table_39();
    let rec = build_record(460, &symbols, &lengths, Endian::Big, None);
    let (mut image, layout) = build_file(Endian::Big, false, &[(0, &rec), (1, &rec)]);

    let total = image.len() as u64;
    // Entry 0 repointed at the very last record: still in bounds.
    put_u64(
        &mut image,
        layout.table_base as usize,
        total - RECORD_SIZE as u64,
        Endian::Big,
    );
    // Entry 1 one byte past that: out of range.
    put_u64(
        &mut image,
        layout.table_base as usize + 8,
        total - RECORD_SIZE as u64 + 1,
        Endian::Big,
    );

    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "run.cmp", &image);
    let reader = CmpReader::open(&path).unwrap();

    let record = reader.read_segment(0, 0, 0).unwrap();
    assert_eq!(record.start_offset, total - RECORD_SIZE as u64);
    assert!(matches!(
        reader.read_segment(1, 0, 0),
        Err(Error::OutOfRange(_))
    ));
}

#[test]
fn empty_and_out_of_grid_segments_are_distinguished() {
    let (symbols, lengths) = table_39();
    let rec = build_record(460, &symbols, &lengths, Endian::Big, None);
    let (image, _) = build_file(Endian::Big, false, &[(0, &rec)]);

    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "run.cmp", &image);
    let reader = CmpReader::open(&path).unwrap();

    assert!(matches!(
        reader.read_segment(0, 1, 0),
        Err(Error::EmptySegment(0, 1, 0))
    ));
    assert!(matches!(
        reader.read_segment(2, 0, 0),
        Err(Error::OutOfRange(_))
    ));
    assert!(matches!(
        reader.read_segment(0, 0, 4),
        Err(Error::OutOfRange(_))
    ));
}
