//! File-backed artifact storage
//!
//! One directory per job. Writes go to a temp file first and are renamed
//! into place, so a failed write never leaves a retrievable-but-corrupt
//! artifact. The store has no expiry of its own: deletion is driven by the
//! job sweep or an explicit discard, keeping job metadata and bytes on the
//! same lifecycle.

use crate::error::{BannerError, Result};
use crate::types::{ArtifactHandle, ArtifactKey, JobId};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    fn extension_for(content_type: &str) -> &'static str {
        match content_type {
            "image/png" => "png",
            "application/pdf" => "pdf",
            _ => "bin",
        }
    }

    /// Store bytes for a job artifact, replacing any previous version.
    pub fn put(
        &self,
        job_id: JobId,
        key: &ArtifactKey,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<ArtifactHandle> {
        let dir = self.job_dir(job_id);
        fs::create_dir_all(&dir)?;

        let final_path = dir.join(format!("{}.{}", key, Self::extension_for(content_type)));
        let tmp_path = dir.join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4()));

        fs::write(&tmp_path, bytes)?;
        if let Err(e) = fs::rename(&tmp_path, &final_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        log::debug!(
            "Stored artifact {} for job {} ({} bytes)",
            key,
            job_id,
            bytes.len()
        );

        Ok(ArtifactHandle {
            path: final_path,
            content_type: content_type.to_string(),
            created_at: Utc::now(),
        })
    }

    pub fn get(&self, handle: &ArtifactHandle) -> Result<Vec<u8>> {
        fs::read(&handle.path).map_err(|_| {
            BannerError::NotFound(format!("Artifact not found: {}", handle.path.display()))
        })
    }

    pub fn delete(&self, handle: &ArtifactHandle) -> Result<()> {
        if handle.path.exists() {
            fs::remove_file(&handle.path)?;
        }
        Ok(())
    }

    /// Remove every artifact belonging to a job
    pub fn delete_job(&self, job_id: JobId) -> Result<()> {
        let dir = self.job_dir(job_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            log::debug!("Deleted artifact directory for job {}", job_id);
        }
        Ok(())
    }
}
