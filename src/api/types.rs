//! REST API types for frontend integration.
//!
//! The job views deliberately omit server-side details (upload path, raw
//! schema document); the frontend polls for status and counters only.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{ImportJob, JobStatus};
use crate::signals::TableStats;
use crate::validate::CellError;

/// Response to a successful upload: the job was accepted and queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSubmitted {
    pub job_id: String,
    pub status: JobStatus,
    pub table: String,
    /// Where to poll for progress.
    pub status_url: String,
}

impl From<&ImportJob> for ImportSubmitted {
    fn from(job: &ImportJob) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            table: job.table.clone(),
            status_url: format!("/api/jobs/{}", job.id),
        }
    }
}

/// Polled view of one import job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: String,
    pub table: String,
    pub status: JobStatus,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub error_count: usize,
    /// Truncated cell error list (see `errorCount` for the real total).
    pub errors: Vec<CellError>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ImportJob> for JobView {
    fn from(job: ImportJob) -> Self {
        Self {
            job_id: job.id.to_string(),
            table: job.table,
            status: job.status,
            total_rows: job.total_rows,
            processed_rows: job.processed_rows,
            error_count: job.error_count,
            errors: job.errors,
            error_message: job.error_message,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// Row-count view of one stored table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView {
    pub table: String,
    pub rows: usize,
    pub refreshed_at: String,
    /// True when the numbers came from the cache rather than the store.
    pub cached: bool,
}

impl TableView {
    pub fn new(table: &str, stats: &TableStats, cached: bool) -> Self {
        Self {
            table: table.to_string(),
            rows: stats.rows,
            refreshed_at: stats.refreshed_at.to_rfc3339(),
            cached,
        }
    }
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}
