//! In-process job registry
//!
//! Single source of truth for job status and progress. All mutation goes
//! through [`JobStore::update`], which applies the caller's closure under the
//! registry lock and commits all-or-nothing, so concurrent callers can never
//! interleave a read-modify-write.

use crate::error::{BannerError, Result};
use crate::types::{Job, JobId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new job record
    pub async fn create(&self, job: Job) -> JobId {
        let id = job.id;
        let mut jobs = self.jobs.write().await;
        jobs.insert(id, job);
        log::debug!("Registered job {}", id);
        id
    }

    /// Snapshot of a job record
    pub async fn get(&self, id: JobId) -> Result<Job> {
        let jobs = self.jobs.read().await;
        jobs.get(&id)
            .cloned()
            .ok_or_else(|| BannerError::NotFound(format!("Job {} not found", id)))
    }

    /// Apply a mutation atomically. The closure runs against a working copy;
    /// the record is committed (and `updated_at` bumped) only when the
    /// closure succeeds, so a guarded transition that fails leaves the job
    /// byte-for-byte unchanged.
    pub async fn update<T, F>(&self, id: JobId, mutation: F) -> Result<T>
    where
        F: FnOnce(&mut Job) -> Result<T>,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| BannerError::NotFound(format!("Job {} not found", id)))?;

        let mut working = job.clone();
        let out = mutation(&mut working)?;
        working.updated_at = Utc::now();
        *job = working;
        Ok(out)
    }

    /// All jobs not yet in a terminal state
    pub async fn list_active(&self) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        jobs.values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Remove a single job record (explicit discard)
    pub async fn remove(&self, id: JobId) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        jobs.remove(&id)
            .ok_or_else(|| BannerError::NotFound(format!("Job {} not found", id)))
    }

    /// Drop every job whose last update is older than the retention TTL,
    /// regardless of status, and return the removed records so the caller
    /// can delete their artifacts in the same pass.
    pub async fn sweep(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<Job> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| now - job.updated_at > ttl)
            .map(|job| job.id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                let removed = jobs.remove(&id);
                if removed.is_some() {
                    log::info!("Swept expired job {}", id);
                }
                removed
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
