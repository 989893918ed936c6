//! Resident table representation.
//!
//! Rows are `Vec<Option<String>>` with `None` as the null marker; empty CSV
//! fields parse to `None`. The boolean missingness matrix exposed here is
//! the interface consumed by external visualization collaborators.

use std::path::Path;

use anyhow::{Context, Result};

use crate::io_utils;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl DataTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Vec<Option<String>>> {
        &mut self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn column_values(&self, index: usize) -> impl Iterator<Item = Option<&str>> {
        self.rows
            .iter()
            .map(move |row| row.get(index).and_then(|cell| cell.as_deref()))
    }

    pub fn null_count(&self, index: usize) -> usize {
        self.column_values(index)
            .filter(|value| value.is_none())
            .count()
    }

    /// One boolean per cell, `true` where the value is missing. Row-major,
    /// same ordering as `rows()`.
    pub fn missingness(&self) -> Vec<Vec<bool>> {
        self.rows
            .iter()
            .map(|row| {
                (0..self.headers.len())
                    .map(|idx| row.get(idx).is_none_or(|cell| cell.is_none()))
                    .collect()
            })
            .collect()
    }

    /// Writes the table as UTF-8 CSV, rendering nulls as empty fields.
    pub fn write_csv(&self, path: &Path, delimiter: u8) -> Result<()> {
        let mut writer = io_utils::open_csv_writer(path, delimiter)?;
        writer
            .write_record(self.headers.iter())
            .context("Writing output headers")?;
        for (idx, row) in self.rows.iter().enumerate() {
            let record = row
                .iter()
                .map(|cell| cell.as_deref().unwrap_or(""))
                .collect::<Vec<_>>();
            writer
                .write_record(&record)
                .with_context(|| format!("Writing output row {}", idx + 2))?;
        }
        writer.flush().context("Flushing output writer")?;
        Ok(())
    }
}

/// Empty fields are the null marker throughout the pipeline.
pub fn cell_from_field(field: String) -> Option<String> {
    if field.is_empty() { None } else { Some(field) }
}
