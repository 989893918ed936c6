//! Per-column missingness analysis.
//!
//! This is a *missingness* report, not a full profiling report: columns with
//! zero nulls are excluded by policy. Reports are computed fresh on every
//! call and never cached across mutations. Per-batch reports are keyed by
//! batch index and never merged automatically; cross-batch aggregation is
//! the caller's responsibility.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use itertools::Itertools;
use serde::Serialize;

use crate::{errors::PipelineError, reader::RecordBatch, table::DataTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMissingReport {
    pub column: String,
    pub null_count: usize,
    /// `null_count / unit_row_count * 100`, in [0, 100].
    pub null_percentage: f64,
    pub data_type: ColumnType,
    /// Most frequent non-null value. Ties break toward the
    /// lexicographically smallest value so reports are reproducible.
    pub most_frequent: Option<String>,
    pub frequency: usize,
}

/// Analyzes a resident table. One report per column that has at least one
/// null, in declared column order.
pub fn analyze_table(table: &DataTable) -> Vec<ColumnMissingReport> {
    analyze_rows(table.headers(), table.rows())
}

/// Analyzes a single batch against the stream's effective headers.
/// Percentages are relative to the batch's own row count.
pub fn analyze_batch(headers: &[String], batch: &RecordBatch) -> Vec<ColumnMissingReport> {
    analyze_rows(headers, &batch.rows)
}

/// Analyzes a batch stream, producing one report set per batch keyed by the
/// 1-based batch index. Reports are never merged across batches; that
/// aggregation belongs to the caller. Stops with the typed error if the
/// stream fails.
pub fn analyze_batches<I>(
    headers: &[String],
    batches: I,
) -> Result<BTreeMap<usize, Vec<ColumnMissingReport>>, PipelineError>
where
    I: IntoIterator<Item = Result<RecordBatch, PipelineError>>,
{
    let mut reports = BTreeMap::new();
    for batch in batches {
        let batch = batch?;
        reports.insert(batch.index, analyze_batch(headers, &batch));
    }
    Ok(reports)
}

fn analyze_rows(headers: &[String], rows: &[Vec<Option<String>>]) -> Vec<ColumnMissingReport> {
    let total = rows.len();
    if total == 0 {
        return Vec::new();
    }
    let mut reports = Vec::new();
    for (idx, column) in headers.iter().enumerate() {
        let values = rows
            .iter()
            .map(|row| row.get(idx).and_then(|cell| cell.as_deref()));
        let null_count = values.clone().filter(|value| value.is_none()).count();
        if null_count == 0 {
            continue;
        }
        let non_null = values.flatten();
        let (most_frequent, frequency) = mode(non_null.clone());
        reports.push(ColumnMissingReport {
            column: column.clone(),
            null_count,
            null_percentage: null_count as f64 / total as f64 * 100.0,
            data_type: infer_type(non_null),
            most_frequent,
            frequency,
        });
    }
    reports
}

/// Most frequent value with its count. Ties: highest count first, then the
/// lexicographically smallest value.
fn mode<'a>(values: impl Iterator<Item = &'a str>) -> (Option<String>, usize) {
    values
        .counts()
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(value, count)| (Some(value.to_string()), count))
        .unwrap_or((None, 0))
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    possible_integer: bool,
    possible_float: bool,
    possible_boolean: bool,
    possible_date: bool,
    possible_datetime: bool,
    saw_value: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            possible_integer: true,
            possible_float: true,
            possible_boolean: true,
            possible_date: true,
            possible_datetime: true,
            saw_value: false,
        }
    }

    fn observe(&mut self, value: &str) {
        self.saw_value = true;
        if self.possible_boolean
            && !matches!(
                value.to_ascii_lowercase().as_str(),
                "true" | "false" | "t" | "f" | "yes" | "no" | "y" | "n"
            )
        {
            self.possible_boolean = false;
        }
        if self.possible_integer && value.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && value.parse::<f64>().is_err() {
            self.possible_float = false;
        }
        if self.possible_date && parse_naive_date(value).is_none() {
            self.possible_date = false;
        }
        if self.possible_datetime && parse_naive_datetime(value).is_none() {
            self.possible_datetime = false;
        }
    }

    fn decide(&self) -> ColumnType {
        if !self.saw_value {
            ColumnType::String
        } else if self.possible_boolean {
            ColumnType::Boolean
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else if self.possible_date {
            ColumnType::Date
        } else if self.possible_datetime {
            ColumnType::DateTime
        } else {
            ColumnType::String
        }
    }
}

fn infer_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut candidate = TypeCandidate::new();
    for value in values {
        candidate.observe(value);
    }
    candidate.decide()
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[Option<&str>]]) -> DataTable {
        DataTable::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| {
                    row.iter()
                        .map(|cell| cell.map(|v| v.to_string()))
                        .collect()
                })
                .collect(),
        )
    }

    #[test]
    fn reports_cover_only_columns_with_nulls() {
        let table = table(
            &["id", "score"],
            &[
                &[Some("1"), Some("10")],
                &[Some("2"), None],
                &[Some("3"), Some("10")],
            ],
        );
        let reports = analyze_table(&table);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].column, "score");
    }

    #[test]
    fn null_percentage_and_mode_match_contract() {
        // Column [1, null, 1, 2, null]: 2 nulls, 40%, mode 1 with frequency 2.
        let table = table(
            &["v"],
            &[&[Some("1")], &[None], &[Some("1")], &[Some("2")], &[None]],
        );
        let reports = analyze_table(&table);
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.null_count, 2);
        assert_eq!(report.null_percentage, 40.0);
        assert_eq!(report.data_type, ColumnType::Integer);
        assert_eq!(report.most_frequent.as_deref(), Some("1"));
        assert_eq!(report.frequency, 2);
    }

    #[test]
    fn mode_ties_break_lexicographically() {
        let (value, count) = mode(["b", "a", "b", "a"].into_iter());
        assert_eq!(value.as_deref(), Some("a"));
        assert_eq!(count, 2);
    }

    #[test]
    fn all_null_column_reports_string_type_without_mode() {
        let table = table(&["v"], &[&[None], &[None]]);
        let reports = analyze_table(&table);
        assert_eq!(reports[0].null_percentage, 100.0);
        assert_eq!(reports[0].data_type, ColumnType::String);
        assert_eq!(reports[0].most_frequent, None);
        assert_eq!(reports[0].frequency, 0);
    }

    #[test]
    fn type_inference_eliminates_candidates() {
        assert_eq!(infer_type(["yes", "no"].into_iter()), ColumnType::Boolean);
        assert_eq!(infer_type(["1", "2"].into_iter()), ColumnType::Integer);
        assert_eq!(infer_type(["1.5", "2"].into_iter()), ColumnType::Float);
        assert_eq!(
            infer_type(["2024-05-06", "2024-05-07"].into_iter()),
            ColumnType::Date
        );
        assert_eq!(
            infer_type(["2024-05-06 14:30", "2024-05-07T01:02:03"].into_iter()),
            ColumnType::DateTime
        );
        assert_eq!(infer_type(["abc", "1"].into_iter()), ColumnType::String);
    }

    #[test]
    fn empty_table_yields_no_reports() {
        let table = table(&["a"], &[]);
        assert!(analyze_table(&table).is_empty());
    }
}
