//! Bulk import coordination: job execution off the request path.
//!
//! One job = one file = one worker slot. The coordinator reads the job's
//! file, validates it against the job's schema, applies the error policy,
//! and writes the converted records through the store in chunks, all
//! inside a signal-suppression scope so the cache is invalidated once at
//! the end instead of once per chunk. Every outcome - success or any
//! failure - lands on the job record for the frontend to poll.
//!
//! The parse/validate phase is CPU-bound, so [`TokioRunner`] executes the
//! whole job on a blocking worker thread rather than on the async workers.

use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::error::{ImportError, ImportResult, StoreResult};
use crate::models::{ErrorPolicy, ImportJob, JobRegistry, JobStatus};
use crate::parser;
use crate::schema::ImportSchema;
use crate::signals::ResponseCache;
use crate::store::ResponseStore;
use crate::validate;

/// Records per `bulk_insert` call.
pub const INSERT_CHUNK_SIZE: usize = 1000;

/// Maximum length of the human-readable failure message kept on a job.
const MAX_ERROR_MESSAGE: usize = 200;

/// Result of one successful import run.
#[derive(Debug, Clone, Copy)]
pub struct ImportOutcome {
    /// Data rows read from the file.
    pub total_rows: usize,
    /// Rows actually written to the store.
    pub written: usize,
    /// Cell errors collected during validation.
    pub error_count: usize,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Owns the collaborators one import or mass delete needs.
pub struct ImportCoordinator {
    store: Arc<dyn ResponseStore>,
    cache: Arc<ResponseCache>,
    jobs: Arc<JobRegistry>,
}

impl ImportCoordinator {
    pub fn new(
        store: Arc<dyn ResponseStore>,
        cache: Arc<ResponseCache>,
        jobs: Arc<JobRegistry>,
    ) -> Self {
        Self { store, cache, jobs }
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    pub fn store(&self) -> &Arc<dyn ResponseStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Execute one job to completion, recording the outcome on the job.
    ///
    /// Never returns an error to the caller: a job runner has nobody to
    /// hand it to. All failures become the job's `failed` state.
    pub fn run_import(&self, job_id: Uuid) {
        let Some(job) = self.jobs.get(job_id) else {
            log_error(format!("import job {job_id} not found in registry"));
            return;
        };

        self.jobs.update(job_id, |j| j.status = JobStatus::Processing);
        log_info(format!(
            "import job {job_id} started for table '{}'",
            job.table
        ));

        match self.execute(&job) {
            Ok(outcome) => {
                self.jobs.update(job_id, |j| {
                    j.status = JobStatus::Completed;
                    j.total_rows = outcome.total_rows;
                    j.processed_rows = outcome.written;
                });
                log_success(format!(
                    "import job {job_id} completed: {} rows read, {} written, {} cell errors",
                    outcome.total_rows, outcome.written, outcome.error_count
                ));
            }
            Err(err) => {
                // char-wise cap, messages can carry multibyte file names
                let message: String = err.to_string().chars().take(MAX_ERROR_MESSAGE).collect();
                self.jobs.update(job_id, |j| {
                    j.status = JobStatus::Failed;
                    j.error_message = Some(message.clone());
                });
                log_error(format!("import job {job_id} failed: {err}"));
            }
        }
    }

    fn execute(&self, job: &ImportJob) -> ImportResult<ImportOutcome> {
        // structural schema problems fail before any row is touched
        let schema = ImportSchema::from_json(&job.schema)?;
        let delimiter = job.delimiter.unwrap_or(',');

        let records = parser::read_records(&job.file_path, delimiter)?;
        let total_rows = records.len();
        log_info(format!("read {total_rows} rows from {}", job.file_path.display()));

        let validated = validate::validate(&records, &schema);
        let error_count = validated.errors.len();
        if error_count > 0 {
            log_warning(format!("{error_count} cell errors in {total_rows} rows"));
        }

        // keep the errors on the job either way, so a strict failure still
        // tells the user which cells to fix
        self.jobs.update(job.id, |j| {
            j.total_rows = total_rows;
            j.record_errors(&validated.errors);
        });

        if job.policy == ErrorPolicy::Strict && error_count > 0 {
            return Err(ImportError::ValidationFailed(error_count));
        }

        let written = self.bulk_write(&job.table, &validated.data)?;

        Ok(ImportOutcome {
            total_rows,
            written,
            error_count,
        })
    }

    /// Chunked bulk write under the suppression gate, with the single
    /// manual invalidation afterward.
    fn bulk_write(&self, table: &str, data: &[Value]) -> StoreResult<usize> {
        let mut written = 0;
        {
            let _scope = self.cache.gate().suppress();
            for chunk in data.chunks(INSERT_CHUNK_SIZE) {
                written += self.store.bulk_insert(table, chunk)?;
                // reactive hook a normal write path would trigger; a no-op
                // here because the scope holds the gate
                self.cache.on_bulk_change(table);
            }
        }
        self.cache.invalidate(table);
        Ok(written)
    }

    /// Mass delete for a table, under the same gate as imports.
    pub fn delete_table(&self, table: &str) -> StoreResult<usize> {
        let removed = {
            let _scope = self.cache.gate().suppress();
            let removed = self.store.delete_table(table)?;
            self.cache.on_bulk_change(table);
            removed
        };
        self.cache.invalidate(table);
        log_info(format!("deleted {removed} rows from table '{table}'"));
        Ok(removed)
    }
}

// =============================================================================
// Job runner
// =============================================================================

/// Fire-and-forget background execution of created jobs.
pub trait JobRunner: Send + Sync {
    /// Enqueue a job for execution. Returns immediately; progress is
    /// observed through the job registry.
    fn submit(&self, job_id: Uuid);
}

/// Runs jobs on the tokio blocking pool.
pub struct TokioRunner {
    coordinator: Arc<ImportCoordinator>,
}

impl TokioRunner {
    pub fn new(coordinator: Arc<ImportCoordinator>) -> Self {
        Self { coordinator }
    }
}

impl JobRunner for TokioRunner {
    fn submit(&self, job_id: Uuid) {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(async move {
            let result =
                tokio::task::spawn_blocking(move || coordinator.run_import(job_id)).await;
            if let Err(err) = result {
                log_error(format!("import job {job_id} worker crashed: {err}"));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImportJob;
    use crate::signals::SignalGate;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::io::Write;
    use std::path::PathBuf;

    struct Harness {
        coordinator: ImportCoordinator,
        store: Arc<MemoryStore>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(ResponseCache::new(SignalGate::new()));
        let jobs = Arc::new(JobRegistry::new());
        Harness {
            coordinator: ImportCoordinator::new(store.clone(), cache, jobs),
            store,
        }
    }

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    fn submit(h: &Harness, path: PathBuf, schema: Value, policy: ErrorPolicy) -> Uuid {
        let job = h.coordinator.jobs().create(ImportJob::new(
            "respuestas",
            path,
            None,
            schema,
            policy,
        ));
        job.id
    }

    #[test]
    fn test_clean_import_completes() {
        let h = harness();
        let file = write_csv("Edad,Depto\n34,Ventas\n28,IT\n");
        let id = submit(
            &h,
            file.path().to_path_buf(),
            json!({ "Edad": { "type": "number" } }),
            ErrorPolicy::Strict,
        );

        h.coordinator.run_import(id);

        let job = h.coordinator.jobs().get(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_rows, 2);
        assert_eq!(job.processed_rows, 2);
        assert_eq!(job.error_count, 0);

        let stored = h.store.records("respuestas");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0]["Edad"], json!(34.0));
        assert_eq!(stored[1]["Depto"], "IT");
    }

    #[test]
    fn test_strict_policy_fails_job_and_writes_nothing() {
        let h = harness();
        let file = write_csv("Edad\ntreinta\n");
        let id = submit(
            &h,
            file.path().to_path_buf(),
            json!({ "Edad": { "type": "number" } }),
            ErrorPolicy::Strict,
        );

        h.coordinator.run_import(id);

        let job = h.coordinator.jobs().get(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.processed_rows, 0);
        assert_eq!(job.error_count, 1);
        assert_eq!(job.errors[0].column, "Edad");
        assert!(job.error_message.as_deref().unwrap().contains("1 cell error"));
        assert_eq!(h.store.count("respuestas").unwrap(), 0);
    }

    #[test]
    fn test_partial_policy_imports_everything() {
        let h = harness();
        let file = write_csv("Edad\n34\ntreinta\n28\n");
        let id = submit(
            &h,
            file.path().to_path_buf(),
            json!({ "Edad": { "type": "number" } }),
            ErrorPolicy::Partial,
        );

        h.coordinator.run_import(id);

        let job = h.coordinator.jobs().get(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_rows, 3);
        assert_eq!(job.processed_rows, 3);
        assert_eq!(job.error_count, 1);

        let stored = h.store.records("respuestas");
        assert_eq!(stored[1]["Edad"], Value::Null);
    }

    #[test]
    fn test_missing_file_fails_job() {
        let h = harness();
        let id = submit(
            &h,
            PathBuf::from("/no/such/upload.csv"),
            json!({}),
            ErrorPolicy::Strict,
        );

        h.coordinator.run_import(id);

        let job = h.coordinator.jobs().get(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.as_deref().unwrap().contains("upload.csv"));
    }

    #[test]
    fn test_malformed_schema_fails_before_rows() {
        let h = harness();
        let file = write_csv("Edad\n34\n");
        let id = submit(
            &h,
            file.path().to_path_buf(),
            json!({ "Edad": { "type": "scale", "min": "cero" } }),
            ErrorPolicy::Strict,
        );

        h.coordinator.run_import(id);

        let job = h.coordinator.jobs().get(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.total_rows, 0);
        assert_eq!(h.store.count("respuestas").unwrap(), 0);
    }

    #[test]
    fn test_gate_released_after_import() {
        let h = harness();
        let file = write_csv("Edad\n34\n");
        let id = submit(
            &h,
            file.path().to_path_buf(),
            json!({}),
            ErrorPolicy::Strict,
        );

        h.coordinator.run_import(id);
        assert!(!h.coordinator.cache().gate().is_suppressed());
    }

    #[test]
    fn test_delete_table_under_gate() {
        let h = harness();
        h.store
            .bulk_insert("respuestas", &[json!({"x": 1}), json!({"x": 2})])
            .unwrap();

        let removed = h.coordinator.delete_table("respuestas").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(h.store.count("respuestas").unwrap(), 0);
        assert!(!h.coordinator.cache().gate().is_suppressed());
    }
}
