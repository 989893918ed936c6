//! Missing-value remediation with an auditable trail.
//!
//! Strategies operate in place on a resident [`DataTable`]; the column
//! subset narrows which columns are evaluated and mutated, defaulting to all
//! columns. Every successful call appends exactly one [`AuditEntry`] with
//! before/after null counts; failed calls append nothing, and prior entries
//! are never rolled back.

use anyhow::{Result, anyhow};
use log::info;
use serde::Serialize;

use crate::{errors::PipelineError, table::DataTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMethod {
    /// Fill with the column's most frequent non-null value, computed fresh
    /// at application time.
    Mode,
    /// Propagate the nearest preceding non-null value down the row order.
    Ffill,
    /// Propagate the nearest following non-null value up the row order.
    Bfill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Remove rows containing nulls in the targeted columns.
    Drop,
    Fill(FillMethod),
}

impl Method {
    /// Resolves a method name (and fill sub-strategy) from strings. The
    /// fill strategies are accepted both as sub-strategies of `fill` and as
    /// bare names.
    pub fn parse(name: &str, fill: Option<&str>) -> Result<Self, PipelineError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Method::Drop),
            "fill" => match fill.map(|f| f.trim().to_ascii_lowercase()) {
                Some(sub) => match sub.as_str() {
                    "mode" => Ok(Method::Fill(FillMethod::Mode)),
                    "ffill" => Ok(Method::Fill(FillMethod::Ffill)),
                    "bfill" => Ok(Method::Fill(FillMethod::Bfill)),
                    other => Err(PipelineError::InvalidMethod(format!("fill:{other}"))),
                },
                None => Err(PipelineError::InvalidMethod(
                    "fill (missing sub-strategy)".to_string(),
                )),
            },
            "mode" => Ok(Method::Fill(FillMethod::Mode)),
            "ffill" => Ok(Method::Fill(FillMethod::Ffill)),
            "bfill" => Ok(Method::Fill(FillMethod::Bfill)),
            other => Err(PipelineError::InvalidMethod(other.to_string())),
        }
    }

    fn label(&self) -> String {
        match self {
            Method::Drop => "drop".to_string(),
            Method::Fill(FillMethod::Mode) => "fill:mode".to_string(),
            Method::Fill(FillMethod::Ffill) => "fill:ffill".to_string(),
            Method::Fill(FillMethod::Bfill) => "fill:bfill".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub columns: Vec<String>,
    pub method: String,
    /// (column, null count) pairs captured before the strategy ran.
    pub before: Vec<(String, usize)>,
    /// Same columns, captured after.
    pub after: Vec<(String, usize)>,
}

/// Append-only log of remediation calls. Entries are only ever added, one
/// per successful call; the session owning the remediator outlives the
/// batches it was built from.
#[derive(Debug, Clone, Default)]
pub struct RemediationAudit {
    entries: Vec<AuditEntry>,
}

impl RemediationAudit {
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct Remediator {
    table: DataTable,
    audit: RemediationAudit,
}

impl Remediator {
    pub fn new(table: DataTable) -> Self {
        Self {
            table,
            audit: RemediationAudit::default(),
        }
    }

    pub fn table(&self) -> &DataTable {
        &self.table
    }

    pub fn audit(&self) -> &RemediationAudit {
        &self.audit
    }

    pub fn into_parts(self) -> (DataTable, RemediationAudit) {
        (self.table, self.audit)
    }

    /// Parses and applies a method by name. An unrecognized name fails with
    /// [`PipelineError::InvalidMethod`] before anything is touched.
    pub fn handle(
        &mut self,
        method: &str,
        fill: Option<&str>,
        columns: &[String],
    ) -> Result<&AuditEntry> {
        let parsed = Method::parse(method, fill)?;
        self.apply(parsed, columns)
    }

    /// Applies a strategy to the targeted columns (all columns when the
    /// subset is empty). Appends one audit entry on success.
    pub fn apply(&mut self, method: Method, columns: &[String]) -> Result<&AuditEntry> {
        let targets = self.resolve_targets(columns)?;
        let before = self.null_counts(&targets);

        match method {
            Method::Drop => self.drop_rows(&targets),
            Method::Fill(FillMethod::Mode) => self.fill_mode(&targets),
            Method::Fill(FillMethod::Ffill) => self.fill_forward(&targets),
            Method::Fill(FillMethod::Bfill) => self.fill_backward(&targets),
        }

        Ok(self.record(method.label(), targets, before))
    }

    /// Applies a caller-supplied transform to each targeted column in turn.
    /// The transform receives the column's cells in row order and may
    /// rewrite them freely, but must preserve the row count.
    pub fn apply_custom<F>(&mut self, columns: &[String], mut transform: F) -> Result<&AuditEntry>
    where
        F: FnMut(&mut Vec<Option<String>>),
    {
        let targets = self.resolve_targets(columns)?;
        let before = self.null_counts(&targets);
        let row_count = self.table.row_count();

        // Stage every column before writing any back, so a transform that
        // fails validation on a later column leaves the table untouched.
        let mut staged = Vec::with_capacity(targets.len());
        for &(idx, _) in &targets {
            let mut cells = self
                .table
                .rows()
                .iter()
                .map(|row| row[idx].clone())
                .collect::<Vec<_>>();
            transform(&mut cells);
            if cells.len() != row_count {
                return Err(anyhow!(
                    "Custom transform changed the row count ({} -> {})",
                    row_count,
                    cells.len()
                ));
            }
            staged.push((idx, cells));
        }
        for (idx, cells) in staged {
            for (row, cell) in self.table.rows_mut().iter_mut().zip(cells) {
                row[idx] = cell;
            }
        }

        Ok(self.record("custom".to_string(), targets, before))
    }

    fn resolve_targets(&self, columns: &[String]) -> Result<Vec<(usize, String)>> {
        if columns.is_empty() {
            return Ok(self
                .table
                .headers()
                .iter()
                .enumerate()
                .map(|(idx, name)| (idx, name.clone()))
                .collect());
        }
        columns
            .iter()
            .map(|name| {
                self.table
                    .column_index(name)
                    .map(|idx| (idx, name.clone()))
                    .ok_or_else(|| anyhow!("Column '{name}' not found in table"))
            })
            .collect()
    }

    fn null_counts(&self, targets: &[(usize, String)]) -> Vec<(String, usize)> {
        targets
            .iter()
            .map(|(idx, name)| (name.clone(), self.table.null_count(*idx)))
            .collect()
    }

    fn record(
        &mut self,
        method: String,
        targets: Vec<(usize, String)>,
        before: Vec<(String, usize)>,
    ) -> &AuditEntry {
        let after = self.null_counts(&targets);
        let filled: usize = before
            .iter()
            .zip(&after)
            .map(|((_, b), (_, a))| b.saturating_sub(*a))
            .sum();
        info!(
            "Remediation '{}' on {} column(s): {} null(s) resolved, {} row(s) remain",
            method,
            targets.len(),
            filled,
            self.table.row_count()
        );
        self.audit.entries.push(AuditEntry {
            columns: targets.into_iter().map(|(_, name)| name).collect(),
            method,
            before,
            after,
        });
        self.audit.entries.last().expect("entry just appended")
    }

    fn drop_rows(&mut self, targets: &[(usize, String)]) {
        let indices = targets.iter().map(|(idx, _)| *idx).collect::<Vec<_>>();
        self.table
            .rows_mut()
            .retain(|row| indices.iter().all(|&idx| row[idx].is_some()));
    }

    fn fill_mode(&mut self, targets: &[(usize, String)]) {
        for &(idx, _) in targets {
            // Fresh mode per column; ties break toward the smaller value.
            let mode = column_mode(&self.table, idx);
            if let Some(value) = mode {
                for row in self.table.rows_mut() {
                    if row[idx].is_none() {
                        row[idx] = Some(value.clone());
                    }
                }
            }
        }
    }

    fn fill_forward(&mut self, targets: &[(usize, String)]) {
        for &(idx, _) in targets {
            let mut last: Option<String> = None;
            for row in self.table.rows_mut() {
                match &row[idx] {
                    Some(value) => last = Some(value.clone()),
                    None => row[idx] = last.clone(),
                }
            }
        }
    }

    fn fill_backward(&mut self, targets: &[(usize, String)]) {
        for &(idx, _) in targets {
            let mut next: Option<String> = None;
            for row in self.table.rows_mut().iter_mut().rev() {
                match &row[idx] {
                    Some(value) => next = Some(value.clone()),
                    None => row[idx] = next.clone(),
                }
            }
        }
    }
}

fn column_mode(table: &DataTable, idx: usize) -> Option<String> {
    use itertools::Itertools;
    table
        .column_values(idx)
        .flatten()
        .counts()
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(value, _)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DataTable {
        DataTable::new(
            vec!["a".to_string(), "b".to_string()],
            vec![
                vec![Some("1".to_string()), Some("x".to_string())],
                vec![None, Some("y".to_string())],
                vec![Some("1".to_string()), None],
                vec![Some("2".to_string()), Some("x".to_string())],
            ],
        )
    }

    #[test]
    fn drop_removes_rows_and_audits_zero_after() {
        let mut remediator = Remediator::new(table());
        let entry = remediator
            .apply(Method::Drop, &["a".to_string(), "b".to_string()])
            .expect("drop")
            .clone();

        assert_eq!(remediator.table().row_count(), 2);
        assert_eq!(remediator.table().null_count(0), 0);
        assert_eq!(remediator.table().null_count(1), 0);
        assert_eq!(entry.before, vec![("a".to_string(), 1), ("b".to_string(), 1)]);
        assert_eq!(entry.after, vec![("a".to_string(), 0), ("b".to_string(), 0)]);
    }

    #[test]
    fn fill_mode_uses_fresh_per_column_mode() {
        let mut remediator = Remediator::new(table());
        remediator
            .apply(Method::Fill(FillMethod::Mode), &[])
            .expect("fill");

        // Mode of a is "1" (x2), mode of b is "x" (x2).
        assert_eq!(
            remediator.table().rows()[1][0],
            Some("1".to_string())
        );
        assert_eq!(remediator.table().rows()[2][1], Some("x".to_string()));
        assert_eq!(remediator.audit().len(), 1);
    }

    #[test]
    fn ffill_and_bfill_propagate_along_row_order() {
        let base = DataTable::new(
            vec!["v".to_string()],
            vec![
                vec![None],
                vec![Some("a".to_string())],
                vec![None],
                vec![Some("b".to_string())],
                vec![None],
            ],
        );

        let mut forward = Remediator::new(base.clone());
        forward
            .apply(Method::Fill(FillMethod::Ffill), &[])
            .expect("ffill");
        let cells = forward
            .table()
            .rows()
            .iter()
            .map(|row| row[0].as_deref().map(|s| s.to_string()))
            .collect::<Vec<_>>();
        // Leading null has no donor and stays null.
        assert_eq!(
            cells,
            vec![
                None,
                Some("a".to_string()),
                Some("a".to_string()),
                Some("b".to_string()),
                Some("b".to_string()),
            ]
        );

        let mut backward = Remediator::new(base);
        backward
            .apply(Method::Fill(FillMethod::Bfill), &[])
            .expect("bfill");
        let cells = backward
            .table()
            .rows()
            .iter()
            .map(|row| row[0].clone())
            .collect::<Vec<_>>();
        assert_eq!(
            cells,
            vec![
                Some("a".to_string()),
                Some("a".to_string()),
                Some("b".to_string()),
                Some("b".to_string()),
                None,
            ]
        );
    }

    #[test]
    fn unrecognized_method_is_typed_and_audit_stays_empty() {
        let mut remediator = Remediator::new(table());
        let err = remediator
            .handle("interpolate", None, &[])
            .expect_err("must fail");
        let typed = err
            .downcast_ref::<PipelineError>()
            .expect("typed pipeline error");
        assert!(matches!(typed, PipelineError::InvalidMethod(_)));
        assert!(remediator.audit().is_empty());
    }

    #[test]
    fn failed_call_leaves_prior_entries_intact() {
        let mut remediator = Remediator::new(table());
        remediator.handle("drop", None, &[]).expect("drop");
        assert_eq!(remediator.audit().len(), 1);

        assert!(remediator.handle("nonsense", None, &[]).is_err());
        assert_eq!(remediator.audit().len(), 1);
    }

    #[test]
    fn custom_transform_is_audited() {
        let mut remediator = Remediator::new(table());
        let entry = remediator
            .apply_custom(&["a".to_string()], |cells| {
                for cell in cells.iter_mut() {
                    if cell.is_none() {
                        *cell = Some("0".to_string());
                    }
                }
            })
            .expect("custom")
            .clone();

        assert_eq!(entry.method, "custom");
        assert_eq!(entry.before, vec![("a".to_string(), 1)]);
        assert_eq!(entry.after, vec![("a".to_string(), 0)]);
        assert_eq!(remediator.table().rows()[1][0], Some("0".to_string()));
    }

    #[test]
    fn custom_transform_must_preserve_row_count() {
        let mut remediator = Remediator::new(table());
        let result = remediator.apply_custom(&["a".to_string()], |cells| {
            cells.pop();
        });
        assert!(result.is_err());
        assert!(remediator.audit().is_empty());
    }

    #[test]
    fn failed_custom_transform_writes_nothing_back() {
        let mut remediator = Remediator::new(table());
        let mut calls = 0;
        // Valid transform on the first column, invalid on the second; the
        // first column's result must be discarded along with the call.
        let result = remediator.apply_custom(&["a".to_string(), "b".to_string()], |cells| {
            calls += 1;
            if calls == 1 {
                for cell in cells.iter_mut() {
                    if cell.is_none() {
                        *cell = Some("0".to_string());
                    }
                }
            } else {
                cells.pop();
            }
        });

        assert!(result.is_err());
        assert_eq!(remediator.table().rows()[1][0], None);
        assert!(remediator.audit().is_empty());
    }

    #[test]
    fn fill_parse_requires_sub_strategy() {
        assert!(Method::parse("fill", None).is_err());
        assert_eq!(
            Method::parse("fill", Some("bfill")).unwrap(),
            Method::Fill(FillMethod::Bfill)
        );
        assert_eq!(Method::parse("DROP", None).unwrap(), Method::Drop);
    }
}
