//! Source-file identity: format tag, immutable descriptor, and probing.
//!
//! A [`FileDescriptor`] is assembled once, in a single atomic step, by
//! [`FileDescriptorBuilder`] and is read-only afterwards. There are no
//! setters, so "immutable after first set" holds by construction. The
//! [`probe()`] operation produces one from a file on disk: size, detected
//! encoding, header columns, estimated row count, and the derived converted
//! path.

use std::{
    fs::{self, File},
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::UTF_8;
use encoding_rs_io::DecodeReaderBytesBuilder;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{encoding, errors::PipelineError, io_utils};

/// Closed set of supported source formats. Resolved once at construction
/// from a name lookup; stored as an immutable tag on the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Tsv,
    Json,
    Xml,
}

const FORMAT_TABLE: &[(&str, FileFormat)] = &[
    ("csv", FileFormat::Csv),
    ("tsv", FileFormat::Tsv),
    ("json", FileFormat::Json),
    ("xml", FileFormat::Xml),
];

impl FileFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        FORMAT_TABLE
            .iter()
            .find(|(label, _)| *label == lowered)
            .map(|(_, format)| *format)
            .ok_or_else(|| anyhow!("Unsupported file format '{name}'"))
    }

    pub fn name(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Tsv => "tsv",
            FileFormat::Json => "json",
            FileFormat::Xml => "xml",
        }
    }

    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => FileFormat::Tsv,
            _ => FileFormat::Csv,
        }
    }
}

/// Immutable identity of a source file. Owned by the pipeline session that
/// created it; read-only input to every downstream stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    path: PathBuf,
    format: FileFormat,
    delimiter: u8,
    encoding_label: String,
    confidence: f64,
    byte_size: u64,
    estimated_rows: u64,
    columns: Vec<String>,
    converted_path: PathBuf,
}

impl FileDescriptor {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn encoding_label(&self) -> &str {
        &self.encoding_label
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn estimated_rows(&self) -> u64 {
        self.estimated_rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn converted_path(&self) -> &Path {
        &self.converted_path
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating meta file {path:?}"))?;
        serde_json::to_writer_pretty(file, self).context("Writing descriptor JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening meta file {path:?}"))?;
        let reader = BufReader::new(file);
        let descriptor = serde_json::from_reader(reader).context("Parsing descriptor JSON")?;
        Ok(descriptor)
    }
}

/// Assembles a [`FileDescriptor`] in one step. Encoding and columns have no
/// sensible defaults and must be supplied before `build()`.
pub struct FileDescriptorBuilder {
    path: PathBuf,
    format: Option<FileFormat>,
    delimiter: Option<u8>,
    encoding: Option<(String, f64)>,
    byte_size: u64,
    estimated_rows: u64,
    columns: Option<Vec<String>>,
}

impl FileDescriptorBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
            delimiter: None,
            encoding: None,
            byte_size: 0,
            estimated_rows: 0,
            columns: None,
        }
    }

    pub fn format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn encoding(mut self, label: impl Into<String>, confidence: f64) -> Self {
        self.encoding = Some((label.into(), confidence.clamp(0.0, 1.0)));
        self
    }

    pub fn byte_size(mut self, byte_size: u64) -> Self {
        self.byte_size = byte_size;
        self
    }

    pub fn estimated_rows(mut self, estimated_rows: u64) -> Self {
        self.estimated_rows = estimated_rows;
        self
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn build(self) -> Result<FileDescriptor> {
        let (encoding_label, confidence) = self
            .encoding
            .ok_or_else(|| anyhow!("Descriptor for {:?} is missing an encoding", self.path))?;
        let columns = self
            .columns
            .ok_or_else(|| anyhow!("Descriptor for {:?} is missing column names", self.path))?;
        let converted_path = derive_converted_path(&self.path);
        let delimiter = io_utils::resolve_input_delimiter(&self.path, self.delimiter);
        Ok(FileDescriptor {
            format: self.format.unwrap_or_else(|| FileFormat::from_path(&self.path)),
            path: self.path,
            delimiter,
            encoding_label,
            confidence,
            byte_size: self.byte_size,
            estimated_rows: self.estimated_rows,
            columns,
            converted_path,
        })
    }
}

/// `<stem>_converted_utf-8.csv`, placed beside the original.
fn derive_converted_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input");
    path.with_file_name(format!("{stem}_converted_utf-8.csv"))
}

/// Stats, samples, and header-reads `path` into an immutable descriptor.
/// Fails with [`PipelineError::FileAccess`] when the file cannot be opened;
/// in that case no descriptor is produced.
pub fn probe(
    path: &Path,
    delimiter: Option<u8>,
    sample_size: usize,
) -> Result<FileDescriptor> {
    let byte_size = fs::metadata(path)
        .map_err(|source| PipelineError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    let detection = encoding::detect(path, sample_size)?;
    let delimiter = io_utils::resolve_input_delimiter(path, delimiter);

    // Decode before CSV framing; a raw byte reader would mis-frame any
    // encoding where the delimiter is wider than one byte (UTF-16).
    let read_encoding = io_utils::resolve_encoding(Some(&detection.label)).unwrap_or(UTF_8);
    let file = File::open(path).map_err(|source| PipelineError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    let decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(read_encoding))
        .build(BufReader::new(file));
    let mut reader = io_utils::open_csv_reader(decoder, delimiter, true, false);
    let columns = io_utils::reader_headers(&mut reader, UTF_8)
        .with_context(|| format!("Reading header row of {path:?}"))?;
    drop(reader);

    let estimated_rows = estimate_row_count(path, sample_size, byte_size)
        .map_err(|source| PipelineError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;

    let descriptor = FileDescriptorBuilder::new(path)
        .delimiter(delimiter)
        .encoding(detection.label, detection.confidence)
        .byte_size(byte_size)
        .estimated_rows(estimated_rows)
        .columns(columns)
        .build()?;
    info!(
        "Probed {:?}: encoding {} (confidence {:.2}), {} byte(s), ~{} row(s), {} column(s)",
        descriptor.path(),
        descriptor.encoding_label(),
        descriptor.confidence(),
        descriptor.byte_size(),
        descriptor.estimated_rows(),
        descriptor.column_count()
    );
    Ok(descriptor)
}

/// Extrapolates the line count of a leading sample to the whole file by the
/// sample-to-file-size ratio. An estimate only; the header line is not
/// discounted.
fn estimate_row_count(path: &Path, sample_size: usize, byte_size: u64) -> std::io::Result<u64> {
    let mut file = File::open(path)?;
    let mut sample = vec![0u8; sample_size.max(1)];
    let mut read = 0;
    while read < sample.len() {
        match file.read(&mut sample[read..])? {
            0 => break,
            n => read += n,
        }
    }
    sample.truncate(read);
    if sample.is_empty() {
        return Ok(0);
    }
    let newlines = sample.iter().filter(|b| **b == b'\n').count() as u64;
    let ratio = byte_size as f64 / sample.len() as f64;
    Ok((newlines as f64 * ratio).round() as u64)
}
