//! In-memory report rendering.
//!
//! The pipeline's reports (batch summaries, bad-row detail, missingness,
//! audit log) are structured values consumed programmatically; this module
//! renders them for terminal display as width-aligned ASCII tables and, on
//! request, serializes them as JSON. Nothing here is persisted by the core.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    analyze::ColumnMissingReport,
    reader::{BadRow, BatchSummary},
    remediate::AuditEntry,
};

/// Aggregate view of one batched traversal, serialized for `--json` output.
#[derive(Debug, Serialize)]
pub struct StreamReport {
    pub batches: Vec<BatchSummary>,
    pub bad_rows: Vec<BadRow>,
    pub missing_by_batch: BTreeMap<usize, Vec<ColumnMissingReport>>,
}

/// Aggregate view of one whole-file read.
#[derive(Debug, Serialize)]
pub struct TableReport {
    pub row_count: usize,
    pub column_count: usize,
    pub bad_rows: Vec<BadRow>,
    pub missing: Vec<ColumnMissingReport>,
}

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    let mut line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let padding = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

pub fn render_batch_summaries(summaries: &[BatchSummary]) -> String {
    let rows = summaries
        .iter()
        .map(|summary| {
            vec![
                summary.index.to_string(),
                summary.row_count.to_string(),
                summary.column_count.to_string(),
                summary.bad_rows.to_string(),
                if summary.drifted { "yes" } else { "" }.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&["batch", "rows", "columns", "bad_rows", "drift"], &rows)
}

pub fn render_bad_rows(bad_rows: &[BadRow]) -> String {
    let rows = bad_rows
        .iter()
        .map(|bad| {
            vec![
                bad.batch_index.to_string(),
                bad.row_index.to_string(),
                bad.observed_fields.to_string(),
                bad.fields
                    .iter()
                    .map(|cell| cell.as_deref().unwrap_or("<null>"))
                    .collect::<Vec<_>>()
                    .join("|"),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&["batch", "row", "observed", "repaired_values"], &rows)
}

pub fn render_missingness(reports: &[ColumnMissingReport]) -> String {
    let rows = reports
        .iter()
        .map(|report| {
            vec![
                report.column.clone(),
                report.null_count.to_string(),
                format!("{:.2}", report.null_percentage),
                report.data_type.to_string(),
                report.most_frequent.clone().unwrap_or_default(),
                report.frequency.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(
        &["column", "nulls", "percent", "type", "most_frequent", "frequency"],
        &rows,
    )
}

/// One section per batch, keyed by batch index, in index order.
pub fn render_batch_missingness(reports: &BTreeMap<usize, Vec<ColumnMissingReport>>) -> String {
    let mut output = String::new();
    for (index, batch_reports) in reports {
        let _ = writeln!(output, "Batch {index}");
        if batch_reports.is_empty() {
            let _ = writeln!(output, "  no missing values");
        } else {
            output.push_str(&render_missingness(batch_reports));
        }
        output.push('\n');
    }
    output
}

pub fn render_audit(entries: &[AuditEntry]) -> String {
    let rows = entries
        .iter()
        .map(|entry| {
            vec![
                entry.columns.join(","),
                entry.method.clone(),
                format_counts(&entry.before),
                format_counts(&entry.after),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&["columns", "method", "before", "after"], &rows)
}

fn format_counts(counts: &[(String, usize)]) -> String {
    counts
        .iter()
        .map(|(name, count)| format!("{name}={count}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Serializing report to JSON")
}
