//! Persistence seams: the job-record store and the artifact store.
//!
//! Durable storage is owned by the surrounding service; the pipeline only
//! needs these two narrow traits. The in-memory and local-filesystem
//! implementations back the CLI and the tests.

use crate::error::StoreError;
use crate::job::{Job, JobId, JobUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Persists job status transitions. Each job record is addressed
/// independently; implementations need no cross-job locking.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist one transition and its fields for `id`.
    async fn persist(
        &self,
        id: &JobId,
        update: &JobUpdate,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Stores compiled artifacts and returns their location.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, job_id: &JobId, name: &str, bytes: Vec<u8>)
        -> Result<String, StoreError>;
}

/// Job store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    /// Admit a job record.
    pub fn insert(&self, job: Job) {
        self.lock().insert(job.id.clone(), job);
    }

    /// Snapshot of a job record.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.lock().get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, Job>> {
        // a poisoned map is still structurally valid
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn persist(
        &self,
        id: &JobId,
        update: &JobUpdate,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        job.apply(update, at);
        Ok(())
    }
}

/// Writes artifacts under `<root>/<job_id>/<name>`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    /// Atomic write: temp file in the same directory, then rename.
    async fn put(
        &self,
        job_id: &JobId,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StoreError> {
        let dir = self.root.join(job_id.as_str());
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(name);
        let tmp_path = dir.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(job_id = %job_id, "stored {} ({} bytes)", path.display(), bytes.len());
        Ok(path.to_string_lossy().into_owned())
    }
}
