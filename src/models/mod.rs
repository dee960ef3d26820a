//! Import job lifecycle: status, counters and the in-memory registry.
//!
//! A job is created `Pending` when a file is accepted, moves to
//! `Processing` when a worker picks it up, and ends `Completed` or
//! `Failed`. The job record is what the frontend polls, so it carries the
//! counters and a truncated slice of the cell errors - enough for a human
//! to find and fix the offending rows without shipping 50k error entries
//! over the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::RwLock;
use uuid::Uuid;

use crate::validate::CellError;

/// How many cell errors a job retains; the rest are summarized by
/// `error_count`.
pub const MAX_RETAINED_ERRORS: usize = 100;

// =============================================================================
// Status and policy
// =============================================================================

/// Lifecycle state of an import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What to do when a file has cell errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Fail the whole job if any cell error was collected.
    #[default]
    Strict,
    /// Import every row (invalid cells are null) and surface the error
    /// count to the user.
    Partial,
}

// =============================================================================
// Import job
// =============================================================================

/// One bulk import of one file into one table.
#[derive(Debug, Clone, Serialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub table: String,
    pub file_path: PathBuf,
    /// Delimiter fixed at submission; `None` means the default comma.
    pub delimiter: Option<char>,
    /// Raw rule description; parsed into an `ImportSchema` when the job runs.
    pub schema: Value,
    pub policy: ErrorPolicy,
    pub status: JobStatus,
    pub total_rows: usize,
    /// Rows actually written to the store, not rows read.
    pub processed_rows: usize,
    pub error_count: usize,
    /// First [`MAX_RETAINED_ERRORS`] cell errors.
    pub errors: Vec<CellError>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportJob {
    pub fn new(
        table: impl Into<String>,
        file_path: PathBuf,
        delimiter: Option<char>,
        schema: Value,
        policy: ErrorPolicy,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            table: table.into(),
            file_path,
            delimiter,
            schema,
            policy,
            status: JobStatus::Pending,
            total_rows: 0,
            processed_rows: 0,
            error_count: 0,
            errors: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the validation outcome, keeping at most
    /// [`MAX_RETAINED_ERRORS`] individual errors.
    pub fn record_errors(&mut self, errors: &[CellError]) {
        self.error_count = errors.len();
        self.errors = errors.iter().take(MAX_RETAINED_ERRORS).cloned().collect();
    }
}

// =============================================================================
// Registry
// =============================================================================

/// In-memory job registry shared between the HTTP surface and the workers.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, ImportJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly built job and return a snapshot of it.
    pub fn create(&self, job: ImportJob) -> ImportJob {
        let snapshot = job.clone();
        self.write().insert(job.id, job);
        snapshot
    }

    /// Snapshot of a job by id.
    pub fn get(&self, id: Uuid) -> Option<ImportJob> {
        self.read().get(&id).cloned()
    }

    /// Apply a mutation to a job, bumping `updated_at`. Returns false if
    /// the id is unknown.
    pub fn update<F>(&self, id: Uuid, mutate: F) -> bool
    where
        F: FnOnce(&mut ImportJob),
    {
        let mut jobs = self.write();
        match jobs.get_mut(&id) {
            Some(job) => {
                mutate(job);
                job.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, ImportJob>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, ImportJob>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
