//! Pure schema comparison.
//!
//! Compares an observed column shape against the declared reference columns
//! and reports the deltas. No I/O and no side effects; the reader uses the
//! result to annotate batches, never to reject them.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDelta {
    pub matches: bool,
    pub expected_columns: usize,
    pub observed_columns: usize,
    /// Declared names absent from the observed shape, in declared order.
    pub missing: Vec<String>,
    /// Observed names that are not declared, in observed order.
    pub unexpected: Vec<String>,
}

pub fn compare_columns(observed: &[String], reference: &[String]) -> SchemaDelta {
    let missing = reference
        .iter()
        .filter(|name| !observed.contains(name))
        .cloned()
        .collect::<Vec<_>>();
    let unexpected = observed
        .iter()
        .filter(|name| !reference.contains(name))
        .cloned()
        .collect::<Vec<_>>();
    let matches = observed.len() == reference.len() && missing.is_empty() && unexpected.is_empty();
    SchemaDelta {
        matches,
        expected_columns: reference.len(),
        observed_columns: observed.len(),
        missing,
        unexpected,
    }
}

/// Shape-only variant for batches, where only the column count is observable.
pub fn compare_counts(observed: usize, reference: &[String]) -> SchemaDelta {
    SchemaDelta {
        matches: observed == reference.len(),
        expected_columns: reference.len(),
        observed_columns: observed,
        missing: Vec::new(),
        unexpected: Vec::new(),
    }
}
