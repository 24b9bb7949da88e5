//! Background ingestion jobs.
//!
//! When `server.background_ingest` is on, an upload is acknowledged with
//! `202` and ingested in a tokio task. [`IngestJobs`] tracks one job per
//! source id: its status can be polled and a running job can be aborted.
//! Uploading the same file again replaces (and aborts) the previous job.

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::ingest::ingest_pdf;
use crate::services::Services;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done { chunks: usize },
    Failed { error: String },
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Done { .. } | JobStatus::Failed { .. } | JobStatus::Cancelled
        )
    }
}

struct JobEntry {
    id: u64,
    status: JobStatus,
    handle: Option<AbortHandle>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    jobs: HashMap<String, JobEntry>,
}

#[derive(Clone, Default)]
pub struct IngestJobs {
    inner: Arc<Mutex<Registry>>,
}

impl IngestJobs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue ingestion of `path` under `source_id` and return immediately.
    pub fn spawn(&self, services: Services, path: PathBuf, source_id: String) {
        let id = {
            let mut registry = self.lock();
            registry.next_id += 1;
            let id = registry.next_id;
            let previous = registry.jobs.insert(
                source_id.clone(),
                JobEntry {
                    id,
                    status: JobStatus::Queued,
                    handle: None,
                },
            );
            if let Some(handle) = previous.and_then(|p| p.handle) {
                handle.abort();
            }
            id
        };

        let jobs = self.clone();
        let sid = source_id.clone();
        let task = tokio::spawn(async move {
            jobs.update(&sid, id, JobStatus::Running);
            let status = match ingest_pdf(&services, &path).await {
                Ok(report) => {
                    info!(source_id = %sid, chunks = report.chunks, "background ingest done");
                    JobStatus::Done {
                        chunks: report.chunks,
                    }
                }
                Err(e) => {
                    warn!(source_id = %sid, error = %e, "background ingest failed");
                    JobStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            jobs.update(&sid, id, status);
        });

        let mut registry = self.lock();
        match registry.jobs.get_mut(&source_id) {
            Some(entry) if entry.id == id => entry.handle = Some(task.abort_handle()),
            _ => task.abort(),
        }
    }

    /// Only the job that owns the entry may change its status.
    fn update(&self, source_id: &str, id: u64, status: JobStatus) {
        let mut registry = self.lock();
        if let Some(entry) = registry.jobs.get_mut(source_id) {
            if entry.id == id && entry.status != JobStatus::Cancelled {
                if status.is_finished() {
                    entry.handle = None;
                }
                entry.status = status;
            }
        }
    }

    pub fn status(&self, source_id: &str) -> Option<JobStatus> {
        self.lock().jobs.get(source_id).map(|e| e.status.clone())
    }

    /// Abort a queued or running job. Returns `false` when there is
    /// nothing to cancel.
    pub fn cancel(&self, source_id: &str) -> bool {
        let mut registry = self.lock();
        match registry.jobs.get_mut(source_id) {
            Some(entry) if !entry.status.is_finished() => {
                if let Some(handle) = entry.handle.take() {
                    handle.abort();
                }
                entry.status = JobStatus::Cancelled;
                info!(source_id, "background ingest cancelled");
                true
            }
            _ => false,
        }
    }
}
