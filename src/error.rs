//! Error types for the surveyload import pipeline.
//!
//! The hierarchy mirrors the pipeline stages:
//!
//! - [`CsvError`] - file-level CSV reading errors
//! - [`SchemaError`] - malformed rule descriptions (rejected at construction)
//! - [`StoreError`] - bulk-write storage errors
//! - [`ImportError`] - top-level job orchestration errors
//!
//! Cell-level data problems are NOT errors in this sense: they are collected
//! as [`crate::validate::CellError`] values and returned as data, so one bad
//! cell in a 50k-row file never aborts the run. Only I/O failures, malformed
//! schemas and storage failures surface through these types.
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// CSV Reading Errors
// =============================================================================

/// Errors while reading a CSV file from disk.
///
/// Tokenizing never fails and an empty file is not an error (it yields zero
/// records), so the only failure mode at this layer is the file itself.
#[derive(Debug, Error)]
pub enum CsvError {
    /// The file could not be opened or read.
    #[error("cannot read CSV file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors while building an [`crate::schema::ImportSchema`] from a JSON
/// description. All of these are raised before any row is processed.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The description is not a JSON object.
    #[error("schema description must be a JSON object")]
    NotAnObject,

    /// The description failed the embedded meta-schema check.
    #[error("invalid schema description: {}", errors.join("; "))]
    Invalid { errors: Vec<String> },

    /// A single column rule is malformed.
    #[error("column '{column}': {message}")]
    BadRule { column: String, message: String },
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors from a [`crate::store::ResponseStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded for storage.
    #[error("cannot encode record: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Import Errors (top-level)
// =============================================================================

/// Top-level errors for one import job run.
///
/// Any of these marks the job `failed`; the variant message becomes the
/// job's `error_message`.
#[derive(Debug, Error)]
pub enum ImportError {
    /// CSV reading error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Malformed schema description.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Storage error during the bulk write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Strict policy: the file had validation errors.
    #[error("validation failed with {0} cell error(s)")]
    ValidationFailed(usize),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV reading.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for schema construction.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for import orchestration.
pub type ImportResult<T> = Result<T, ImportError>;
