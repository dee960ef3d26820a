//! # Surveyload - bulk survey-response CSV import
//!
//! Surveyload ingests survey-response CSV exports (up to ~100k rows),
//! validates and converts every cell against a per-column rule set, and
//! bulk-writes the converted records behind a signal-suppression gate so
//! cache invalidation happens once per import instead of once per row.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Validator  │────▶│ Coordinator │
//! │ (ISO/UTF8)  │     │ (tokenizer) │     │ (rule set)  │     │ (bulk write)│
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                               │                    │
//!                                          cell errors          job status
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use serde_json::json;
//! use surveyload::{read_and_validate, ImportSchema};
//!
//! let schema = ImportSchema::from_json(&json!({
//!     "Edad": { "type": "number" },
//!     "Satisfaccion": { "type": "scale", "min": 0, "max": 10 },
//! }))?;
//!
//! let out = read_and_validate("responses.csv", &schema, ',')?;
//! println!("{} records, {} cell errors", out.data.len(), out.errors.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`parser`] - Quote-aware tokenizer and table reader
//! - [`schema`] - Per-column validation rules
//! - [`validate`] - Rule-driven conversion and cell errors
//! - [`store`] - Pluggable bulk-write storage
//! - [`signals`] - Suppression gate and stats cache
//! - [`models`] - Import job lifecycle and registry
//! - [`import`] - Bulk import coordinator and job runner
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Validation
pub mod schema;
pub mod validate;

// Storage and bulk-write coordination
pub mod import;
pub mod signals;
pub mod store;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CsvError, CsvResult, ImportError, ImportResult, SchemaError, SchemaResult, StoreError,
    StoreResult,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes, read_records, read_rows,
    records_from_str, rows_from_str, tokenize, ParseResult,
};

// =============================================================================
// Re-exports - Schema and Validation
// =============================================================================

pub use schema::{ImportSchema, Rule, DEFAULT_SCALE_MAX, DEFAULT_SCALE_MIN};
pub use validate::{read_and_validate, validate, CellError, Validated};

// =============================================================================
// Re-exports - Storage
// =============================================================================

pub use store::{JsonlStore, MemoryStore, ResponseStore, DEFAULT_DATA_DIR};

// =============================================================================
// Re-exports - Signals
// =============================================================================

pub use signals::{ResponseCache, SignalGate, SuppressionScope, TableStats};

// =============================================================================
// Re-exports - Jobs and Coordination
// =============================================================================

pub use import::{ImportCoordinator, ImportOutcome, JobRunner, TokioRunner, INSERT_CHUNK_SIZE};
pub use models::{ErrorPolicy, ImportJob, JobRegistry, JobStatus, MAX_RETAINED_ERRORS};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, ImportSubmitted, JobView, TableView};

// Server
pub mod server {
    pub use crate::api::server::{start_server, AppState};
}
