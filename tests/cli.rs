//! End-to-end CLI flows through the csv-remedy binary.

use std::fs;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::tempdir;

fn bin() -> Command {
    Command::cargo_bin("csv-remedy").expect("binary exists")
}

#[test]
fn probe_prints_descriptor_and_writes_meta() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("people.csv");
    fs::write(&input, "name,age\nAda,36\nLin,29\n").expect("write input");
    let meta = dir.path().join("people.meta");

    bin()
        .args([
            "probe",
            "-i",
            input.to_str().unwrap(),
            "-m",
            meta.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("UTF-8"))
        .stdout(contains("name,age"));

    let saved = fs::read_to_string(&meta).expect("meta file");
    assert!(saved.contains("\"encoding_label\""));
}

#[test]
fn probe_missing_file_fails_with_diagnostic() {
    bin()
        .args(["probe", "-i", "/nonexistent/input.csv"])
        .assert()
        .failure()
        .stderr(contains("error: Probing"));
}

#[test]
fn convert_is_a_no_op_for_utf8_input() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("clean.csv");
    fs::write(&input, "a,b\n1,2\n").expect("write input");

    bin()
        .args(["convert", "-i", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("clean.csv"));

    assert!(!dir.path().join("clean_converted_utf-8.csv").exists());
}

#[test]
fn convert_writes_artifact_for_legacy_encoding() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("legacy.csv");
    fs::write(&input, b"word\nma\xF1ana\n").expect("write input");

    bin()
        .args(["convert", "-i", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("legacy_converted_utf-8.csv"));

    let artifact = dir.path().join("legacy_converted_utf-8.csv");
    let converted = fs::read_to_string(&artifact).expect("artifact");
    assert!(converted.contains("mañana"));
}

#[test]
fn report_shows_repaired_rows_and_missingness() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("messy.csv");
    fs::write(&input, "name,score\nA,1\nB,2\nC,,3\n").expect("write input");

    bin()
        .args([
            "report",
            "-i",
            input.to_str().unwrap(),
            "--batch-size",
            "2",
        ])
        .assert()
        .success()
        .stdout(contains("Batch summary"))
        .stdout(contains("Repaired rows"))
        .stdout(contains("Missing values per batch"));
}

#[test]
fn report_emits_json_when_requested() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("data.csv");
    fs::write(&input, "a,b\n1,\n2,x\n").expect("write input");

    let output = bin()
        .args(["report", "-i", input.to_str().unwrap(), "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(parsed["row_count"], 2);
    assert_eq!(parsed["missing"][0]["column"], "b");
    assert_eq!(parsed["missing"][0]["null_percentage"], 50.0);
}

#[test]
fn remediate_drop_writes_clean_output_and_audit() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("holes.csv");
    fs::write(&input, "a,b\n1,x\n,y\n3,\n4,w\n").expect("write input");
    let output = dir.path().join("fixed.csv");

    bin()
        .args([
            "remediate",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--method",
            "drop",
        ])
        .assert()
        .success()
        .stdout(contains("Remediation audit"))
        .stdout(contains("drop"));

    let written = fs::read_to_string(&output).expect("output file");
    let data_lines = written.lines().skip(1).collect::<Vec<_>>();
    assert_eq!(data_lines.len(), 2);
    assert!(written.contains("\"1\""));
    assert!(written.contains("\"4\""));
}

#[test]
fn remediate_fill_mode_fills_targeted_column() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("scores.csv");
    fs::write(&input, "id,v\n1,7\n2,\n3,7\n4,9\n").expect("write input");
    let output = dir.path().join("filled.csv");

    bin()
        .args([
            "remediate",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--method",
            "fill",
            "--fill-with",
            "mode",
            "-C",
            "v",
        ])
        .assert()
        .success();

    let written = fs::read_to_string(&output).expect("output file");
    let second_row = written.lines().nth(2).expect("row");
    assert_eq!(second_row, "\"2\",\"7\"");
}

#[test]
fn remediate_rejects_unknown_method() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("data.csv");
    fs::write(&input, "a\n1\n").expect("write input");
    let output = dir.path().join("out.csv");

    bin()
        .args([
            "remediate",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--method",
            "interpolate",
        ])
        .assert()
        .failure()
        .stderr(contains("Applying remediation 'interpolate'"));

    assert!(!output.exists(), "no output may be written on failure");
}
