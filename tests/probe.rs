use std::fs;

use csv_remedy::descriptor::{self, FileDescriptor, FileFormat};
use tempfile::tempdir;

#[test]
fn probe_builds_descriptor_from_file() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("people.csv");
    fs::write(&input, "name,age,city\nAda,36,London\nLin,29,Taipei\n").expect("write input");

    let descriptor = descriptor::probe(&input, None, 1024).expect("probe");
    assert_eq!(descriptor.format(), FileFormat::Csv);
    assert_eq!(descriptor.delimiter(), b',');
    assert_eq!(descriptor.encoding_label(), "UTF-8");
    assert_eq!(descriptor.confidence(), 1.0);
    assert_eq!(
        descriptor.columns(),
        &["name".to_string(), "age".to_string(), "city".to_string()]
    );
    assert!(descriptor.byte_size() > 0);
    // Sample covers the whole file, so the estimate is the exact line count.
    assert_eq!(descriptor.estimated_rows(), 3);
    assert_eq!(
        descriptor.converted_path(),
        dir.path().join("people_converted_utf-8.csv")
    );
}

#[test]
fn probe_missing_file_fails_without_descriptor() {
    let dir = tempdir().expect("temp dir");
    let missing = dir.path().join("absent.csv");
    let err = descriptor::probe(&missing, None, 1024).expect_err("must fail");
    let typed = err
        .downcast_ref::<csv_remedy::errors::PipelineError>()
        .expect("typed error");
    assert!(matches!(
        typed,
        csv_remedy::errors::PipelineError::FileAccess { .. }
    ));
}

#[test]
fn descriptor_round_trips_through_meta_file() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("data.tsv");
    fs::write(&input, "a\tb\n1\t2\n").expect("write input");
    let meta = dir.path().join("data.meta");

    let descriptor = descriptor::probe(&input, None, 1024).expect("probe");
    descriptor.save(&meta).expect("save");

    let loaded = FileDescriptor::load(&meta).expect("load");
    assert_eq!(loaded.format(), FileFormat::Tsv);
    assert_eq!(loaded.delimiter(), b'\t');
    assert_eq!(loaded.columns(), descriptor.columns());
    assert_eq!(loaded.byte_size(), descriptor.byte_size());
}

#[test]
fn probe_decodes_headers_in_wide_encodings() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("utf16.csv");
    let mut bytes = vec![0xFF, 0xFE];
    for unit in "name,age\nAda,36\n".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    fs::write(&input, &bytes).expect("write input");

    let descriptor = descriptor::probe(&input, None, 1024).expect("probe");
    assert_eq!(descriptor.encoding_label(), "UTF-16LE");
    // Two-byte code units must not leak into the column names.
    assert_eq!(
        descriptor.columns(),
        &["name".to_string(), "age".to_string()]
    );
}

#[test]
fn probe_estimates_rows_from_sample_ratio() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("wide.csv");
    let mut contents = String::from("id,value\n");
    for i in 0..500 {
        contents.push_str(&format!("{i},{}\n", i * 3));
    }
    fs::write(&input, &contents).expect("write input");

    // A 1 KiB sample sees only part of the file; the estimate should land
    // in the right order of magnitude, not be exact.
    let descriptor = descriptor::probe(&input, None, 1024).expect("probe");
    let estimate = descriptor.estimated_rows();
    assert!(estimate > 250, "estimate too low: {estimate}");
    assert!(estimate < 1000, "estimate too high: {estimate}");
}
