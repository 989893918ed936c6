//! Typed failures for the ingestion pipeline.
//!
//! Recoverable anomalies (bad-row repairs, schema drift, low-confidence
//! encoding detection) are reported as log diagnostics and annotations, not
//! errors. This enum covers only the conditions the pipeline contracts treat
//! as typed failures.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source file could not be opened or stat'ed. Fatal: no descriptor
    /// is produced.
    #[error("cannot access input file {path:?}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O failed while writing the converted artifact. Callers of
    /// `convert_to_utf8` never see this directly; conversion degrades to the
    /// original path instead.
    #[error("conversion to UTF-8 failed for {path:?}: {source}")]
    Conversion {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The parser could not recover even with the permissive retry. Fatal
    /// for the read operation that produced it.
    #[error("unrecoverable parse failure in batch {batch}: {message}")]
    Parse { batch: usize, message: String },

    /// The remediation method name was not recognized. Local to the call;
    /// the audit log is left untouched.
    #[error("unrecognized remediation method '{0}' (expected drop, fill, or custom)")]
    InvalidMethod(String),
}
