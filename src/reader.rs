//! Chunked record reading with in-place bad-row repair.
//!
//! A [`ChunkedRecordReader`] turns a canonical-encoding delimited file into
//! either one resident [`DataTable`] or a lazy, forward-only sequence of
//! [`RecordBatch`] values. Streams are not resumable: every call to
//! [`ChunkedRecordReader::batches`] re-opens the source, re-parses from
//! offset zero, and renumbers from batch 1. The restart cost is part of the
//! API contract, not a hidden side effect.
//!
//! The bad-row policy is the load-bearing edge case: a row whose field count
//! disagrees with the declared schema is repaired in place (extra trailing
//! fields dropped, missing fields null-padded), logged, recorded as a
//! [`BadRow`], and kept in the output so downstream row counts stay
//! predictable.

use std::{fs::File, io::BufReader, ops::Range, path::PathBuf};

use anyhow::{Context, Result, anyhow};
use csv::ByteRecord;
use encoding_rs::{Encoding, UTF_8};
use log::{info, warn};
use serde::Serialize;

use crate::{
    descriptor::FileDescriptor,
    errors::PipelineError,
    io_utils,
    table::{DataTable, cell_from_field},
    validate::{self, SchemaDelta},
};

#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Overrides the descriptor's delimiter when set.
    pub delimiter: Option<u8>,
    /// Whether the source carries a header row. When it does, the row is
    /// consumed and checked against the descriptor's declared columns.
    pub has_headers: bool,
    /// Restricts output to these columns, in the given order. Empty means
    /// all declared columns.
    pub columns: Vec<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            has_headers: true,
            columns: Vec::new(),
        }
    }
}

/// A malformed row, recorded after repair. `fields` holds the full-width
/// repaired values so a consumer preferring quarantine over repair can still
/// reconstruct and exclude the row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BadRow {
    pub batch_index: usize,
    /// 0-based position within the owning batch.
    pub row_index: usize,
    pub observed_fields: usize,
    pub fields: Vec<Option<String>>,
}

/// One bounded step of the stream. Ordered by file position; covers the
/// half-open logical row range `row_range` within the dataset.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    /// 1-based sequence index within the current traversal.
    pub index: usize,
    pub rows: Vec<Vec<Option<String>>>,
    pub column_count: usize,
    pub row_range: Range<usize>,
    pub bad_rows: Vec<BadRow>,
    /// Present when the batch's dominant observed shape disagrees with the
    /// declared schema. Annotation only; the batch is still yielded.
    pub drift: Option<SchemaDelta>,
}

impl RecordBatch {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            index: self.index,
            row_count: self.row_count(),
            column_count: self.column_count,
            bad_rows: self.bad_rows.len(),
            drifted: self.drift.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub index: usize,
    pub row_count: usize,
    pub column_count: usize,
    pub bad_rows: usize,
    pub drifted: bool,
}

pub struct ChunkedRecordReader<'a> {
    descriptor: &'a FileDescriptor,
    source: PathBuf,
    options: ReadOptions,
}

impl<'a> ChunkedRecordReader<'a> {
    /// `source` is the path to read: normally the converted artifact, or
    /// the original path when conversion degraded to best-effort mode.
    pub fn new(
        descriptor: &'a FileDescriptor,
        source: impl Into<PathBuf>,
        options: ReadOptions,
    ) -> Self {
        Self {
            descriptor,
            source: source.into(),
            options,
        }
    }

    /// Reads the whole file into one resident table, applying the same
    /// bad-row repair policy as the batch stream. Returns the table plus
    /// the repaired-row records.
    pub fn read_table(&self) -> Result<(DataTable, Vec<BadRow>)> {
        let mut stream = self.open_stream(None)?;
        let batch = match stream.next() {
            Some(result) => result?,
            None => unreachable!("single-batch mode always yields one batch"),
        };
        let table = DataTable::new(stream.headers().to_vec(), batch.rows);
        info!(
            "Read {:?}: {} row(s), {} column(s), {} repaired row(s)",
            self.source,
            table.row_count(),
            table.column_count(),
            batch.bad_rows.len()
        );
        Ok((table, batch.bad_rows))
    }

    /// Opens a fresh, lazy batch stream. Each invocation restarts from the
    /// beginning of the file and numbers batches from 1; the returned stream
    /// is single-consumer and forward-only.
    pub fn batches(&self, batch_size: usize) -> Result<BatchStream> {
        if batch_size == 0 {
            return Err(anyhow!("Batch size must be at least 1"));
        }
        self.open_stream(Some(batch_size))
    }

    fn open_stream(&self, batch_size: Option<usize>) -> Result<BatchStream> {
        let delimiter = self
            .options
            .delimiter
            .unwrap_or_else(|| self.descriptor.delimiter());
        let mut reader = io_utils::open_csv_reader_from_path(
            &self.source,
            delimiter,
            self.options.has_headers,
            true,
        )?;
        let encoding = UTF_8;

        let source_headers = if self.options.has_headers {
            let headers = io_utils::reader_headers(&mut reader, encoding)
                .with_context(|| format!("Reading header row of {:?}", self.source))?;
            let delta = validate::compare_columns(&headers, self.descriptor.columns());
            if !delta.matches {
                warn!(
                    "Header drift in {:?}: expected {} column(s), observed {} (missing {:?}, unexpected {:?})",
                    self.source,
                    delta.expected_columns,
                    delta.observed_columns,
                    delta.missing,
                    delta.unexpected
                );
            }
            headers
        } else {
            self.descriptor.columns().to_vec()
        };

        let projection = resolve_projection(&self.options.columns, &source_headers)?;
        let headers = match &projection {
            Some(indices) => indices
                .iter()
                .map(|&idx| source_headers[idx].clone())
                .collect(),
            None => source_headers,
        };
        // The projection may reach past the declared width when the file's
        // own header carries extra columns (stale descriptor); rows are
        // repaired wide enough for every projected index.
        let row_width = projection
            .iter()
            .flatten()
            .copied()
            .max()
            .map_or(0, |max| max + 1)
            .max(self.descriptor.column_count());

        Ok(BatchStream {
            source: self.source.clone(),
            declared: self.descriptor.columns().to_vec(),
            headers,
            row_width,
            projection,
            delimiter,
            has_headers: self.options.has_headers,
            encoding,
            reader,
            batch_size,
            next_index: 1,
            row_offset: 0,
            permissive: false,
            done: false,
        })
    }
}

fn resolve_projection(requested: &[String], headers: &[String]) -> Result<Option<Vec<usize>>> {
    if requested.is_empty() {
        return Ok(None);
    }
    requested
        .iter()
        .map(|name| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| anyhow!("Column '{name}' not found in input"))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Lazy, single-consumer batch sequence. Owns the file handle for the
/// duration of the traversal; dropping the stream releases it.
pub struct BatchStream {
    source: PathBuf,
    declared: Vec<String>,
    headers: Vec<String>,
    /// Repair width: declared column count, widened to cover the projection.
    row_width: usize,
    projection: Option<Vec<usize>>,
    delimiter: u8,
    has_headers: bool,
    encoding: &'static Encoding,
    reader: csv::Reader<BufReader<File>>,
    /// `None` means single-batch mode (whole file in one batch).
    batch_size: Option<usize>,
    next_index: usize,
    row_offset: usize,
    permissive: bool,
    done: bool,
}

impl BatchStream {
    /// Effective output columns (after projection).
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn repair(&self, mut fields: Vec<String>) -> (Vec<Option<String>>, usize) {
        let observed = fields.len();
        fields.truncate(self.row_width);
        let mut row = fields.into_iter().map(cell_from_field).collect::<Vec<_>>();
        row.resize(self.row_width, None);
        (row, observed)
    }

    fn project(&self, row: Vec<Option<String>>) -> Vec<Option<String>> {
        match &self.projection {
            Some(indices) => indices.iter().map(|&idx| row[idx].clone()).collect(),
            None => row,
        }
    }

    /// Re-opens the source with quoting disabled and fast-forwards past the
    /// rows already delivered. Internal recovery only; batch numbering and
    /// row ranges are unaffected.
    fn restart_permissive(&mut self, consumed: usize) -> std::io::Result<()> {
        let file = File::open(&self.source)?;
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(self.has_headers)
            .delimiter(self.delimiter)
            .quoting(false)
            .flexible(true);
        let mut reader = builder.from_reader(BufReader::new(file));
        let mut record = ByteRecord::new();
        let mut skipped = 0;
        while skipped < consumed {
            match reader.read_byte_record(&mut record) {
                Ok(true) => skipped += 1,
                Ok(false) => break,
                // Without quoting the parser cannot fail structurally, but
                // count a skip regardless to avoid spinning.
                Err(_) => skipped += 1,
            }
        }
        self.reader = reader;
        self.permissive = true;
        Ok(())
    }

    /// Reads one record. The strict pass decodes through `StringRecord`, so
    /// undecodable text surfaces as a parse failure; the permissive pass
    /// reads raw bytes and decodes lossily.
    fn read_fields(
        &mut self,
        string_record: &mut csv::StringRecord,
        byte_record: &mut ByteRecord,
    ) -> Result<Option<Vec<String>>, csv::Error> {
        if self.permissive {
            if self.reader.read_byte_record(byte_record)? {
                Ok(Some(io_utils::decode_record(byte_record, self.encoding)))
            } else {
                Ok(None)
            }
        } else if self.reader.read_record(string_record)? {
            Ok(Some(string_record.iter().map(str::to_string).collect()))
        } else {
            Ok(None)
        }
    }

    fn fill_batch(&mut self) -> Result<RecordBatch, PipelineError> {
        let batch_index = self.next_index;
        let mut rows: Vec<Vec<Option<String>>> = Vec::new();
        let mut bad_rows: Vec<BadRow> = Vec::new();
        let mut width_counts: Vec<(usize, usize)> = Vec::new();
        let mut string_record = csv::StringRecord::new();
        let mut byte_record = ByteRecord::new();

        loop {
            if let Some(limit) = self.batch_size
                && rows.len() >= limit
            {
                break;
            }
            match self.read_fields(&mut string_record, &mut byte_record) {
                Ok(Some(fields)) => {
                    let (repaired, observed) = self.repair(fields);
                    if observed != self.declared.len() {
                        let bad = BadRow {
                            batch_index,
                            row_index: rows.len(),
                            observed_fields: observed,
                            fields: repaired.clone(),
                        };
                        warn!(
                            "Repaired malformed row {} in batch {} of {:?}: observed {} field(s), expected {}",
                            bad.row_index, batch_index, self.source, observed, self.declared.len()
                        );
                        bad_rows.push(bad);
                    }
                    bump_width(&mut width_counts, observed);
                    rows.push(self.project(repaired));
                }
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(err) if !self.permissive => {
                    warn!(
                        "Parse failure in {:?} (batch {}): {}; retrying with permissive quoting and lossy decode",
                        self.source, batch_index, err
                    );
                    let consumed = self.row_offset + rows.len();
                    if let Err(io_err) = self.restart_permissive(consumed) {
                        self.done = true;
                        return Err(PipelineError::Parse {
                            batch: batch_index,
                            message: format!("permissive retry failed to reopen source: {io_err}"),
                        });
                    }
                }
                Err(err) => {
                    self.done = true;
                    return Err(PipelineError::Parse {
                        batch: batch_index,
                        message: err.to_string(),
                    });
                }
            }
        }

        let start = self.row_offset;
        self.row_offset += rows.len();
        self.next_index += 1;

        let drift = dominant_width(&width_counts)
            .filter(|width| *width != self.declared.len())
            .map(|width| validate::compare_counts(width, &self.declared));
        if let Some(delta) = &drift {
            warn!(
                "Schema drift in batch {} of {:?}: expected {} column(s), observed {}",
                batch_index, self.source, delta.expected_columns, delta.observed_columns
            );
        }

        let row_count = rows.len();
        Ok(RecordBatch {
            index: batch_index,
            rows,
            column_count: self.headers.len(),
            row_range: start..start + row_count,
            bad_rows,
            drift,
        })
    }
}

fn bump_width(counts: &mut Vec<(usize, usize)>, width: usize) {
    match counts.iter_mut().find(|(w, _)| *w == width) {
        Some((_, count)) => *count += 1,
        None => counts.push((width, 1)),
    }
}

/// Most common observed width; ties break toward the width seen first.
fn dominant_width(counts: &[(usize, usize)]) -> Option<usize> {
    counts
        .iter()
        .max_by_key(|(_, count)| *count)
        .map(|(width, _)| *width)
}

impl Iterator for BatchStream {
    type Item = Result<RecordBatch, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done && self.batch_size.is_some() {
            return None;
        }
        if self.done && self.batch_size.is_none() && self.next_index > 1 {
            return None;
        }
        let batch = match self.fill_batch() {
            Ok(batch) => batch,
            Err(err) => return Some(Err(err)),
        };
        // Batched mode never yields a trailing empty batch; single-batch
        // mode yields exactly one batch even for an empty file.
        if batch.rows.is_empty() && self.batch_size.is_some() {
            return None;
        }
        Some(Ok(batch))
    }
}
