//! Banner job orchestration
//!
//! [`BannerService`] is the single entry point for callers: submit a job,
//! poll its status, request single-letter edits, approve, download, cancel,
//! discard. All job mutation funnels through the store's atomic `update`
//! and the expensive generation phase is gated by the admission controller.

use crate::admission::AdmissionController;
use crate::config::{BannerConfig, JobConfig, LayoutConfig};
use crate::error::{BannerError, Result};
use crate::layout;
use crate::palette::PaletteCatalog;
use crate::providers::{ImageProvider, ProviderRegistry};
use crate::store::{ArtifactStore, JobStore};
use crate::types::{
    ArtifactHandle, ArtifactKey, BannerRequest, Job, JobId, JobStatus, JobStatusReport, LetterSpec,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone)]
pub struct BannerService {
    store: Arc<JobStore>,
    artifacts: Arc<ArtifactStore>,
    admission: Arc<AdmissionController>,
    providers: Arc<ProviderRegistry>,
    palettes: PaletteCatalog,
    jobs_cfg: JobConfig,
    layout_cfg: LayoutConfig,
}

impl BannerService {
    pub fn new(
        config: &BannerConfig,
        providers: ProviderRegistry,
        palettes: PaletteCatalog,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            store: Arc::new(JobStore::new()),
            artifacts: Arc::new(artifacts),
            admission: Arc::new(AdmissionController::new(config.jobs.concurrent_generations)),
            providers: Arc::new(providers),
            palettes,
            jobs_cfg: config.jobs.clone(),
            layout_cfg: config.layout.clone(),
        }
    }

    fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.jobs_cfg.adapter_timeout_secs)
    }

    /// Validate a submission and spawn its generation task. Returns as soon
    /// as the job record exists; callers poll [`BannerService::status`].
    pub async fn submit(&self, request: BannerRequest) -> Result<JobId> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(BannerError::Validation("Name must not be empty".to_string()));
        }
        if request.letters.is_empty() {
            return Err(BannerError::Validation(
                "A banner needs at least one letter".to_string(),
            ));
        }
        if request.letters.len() > self.jobs_cfg.max_letters {
            return Err(BannerError::Validation(format!(
                "At most {} letters per banner, got {}",
                self.jobs_cfg.max_letters,
                request.letters.len()
            )));
        }

        let mut letters = Vec::with_capacity(request.letters.len());
        for spec in &request.letters {
            if !spec.glyph.is_ascii_alphabetic() {
                return Err(BannerError::Validation(format!(
                    "Letter '{}' is not in A-Z",
                    spec.glyph
                )));
            }
            if spec.theme.trim().is_empty() {
                return Err(BannerError::Validation(format!(
                    "Letter '{}' has an empty theme",
                    spec.glyph
                )));
            }
            letters.push(LetterSpec::new(
                spec.glyph.to_ascii_uppercase(),
                spec.theme.trim(),
            ));
        }

        let name_glyphs: Vec<char> = name
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let letter_glyphs: Vec<char> = letters.iter().map(|l| l.glyph).collect();
        if name_glyphs != letter_glyphs {
            return Err(BannerError::Validation(format!(
                "Letters {:?} do not spell the name '{}'",
                letter_glyphs, name
            )));
        }

        // Resolve palette and provider up front so bad names fail the
        // submission instead of the background task
        let palette = self.palettes.resolve(&request.color_palette)?;
        let provider = self.providers.resolve(&request.provider)?;

        let job = Job::new(name, letters, palette, request.provider.clone());
        let job_id = self.store.create(job).await;
        log::info!(
            "Submitted job {} ({} letters, palette '{}', provider '{}')",
            job_id,
            request.letters.len(),
            request.color_palette,
            request.provider
        );

        let service = self.clone();
        tokio::spawn(async move {
            service.run_generation(job_id, provider).await;
        });

        Ok(job_id)
    }

    /// Generation phase: one admission permit for the whole job, letters
    /// produced sequentially, first failure marks the job failed.
    async fn run_generation(&self, job_id: JobId, provider: Arc<dyn ImageProvider>) {
        let _permit = self.admission.acquire().await;

        // The job may have been cancelled or swept while queued
        let started = self
            .store
            .update(job_id, |job| {
                if job.status != JobStatus::Queued {
                    return Ok(false);
                }
                job.status = JobStatus::Generating;
                job.current_step = "Starting letter generation".to_string();
                Ok(true)
            })
            .await;
        match started {
            Ok(true) => {}
            Ok(false) => {
                log::info!("Job {} left queued state before admission, skipping", job_id);
                return;
            }
            Err(_) => return,
        }

        let (letters, palette) = match self.store.get(job_id).await {
            Ok(job) => (job.letters, job.palette),
            Err(_) => return,
        };
        let total = letters.len();

        for (index, spec) in letters.iter().enumerate() {
            let step = format!(
                "Generating letter {} of {} ('{}' as {})",
                index + 1,
                total,
                spec.glyph,
                spec.theme
            );
            let announced = self
                .store
                .update(job_id, |job| {
                    if job.status != JobStatus::Generating {
                        return Ok(false);
                    }
                    job.current_step = step.clone();
                    Ok(true)
                })
                .await;
            if !matches!(announced, Ok(true)) {
                log::info!("Job {} no longer generating, stopping", job_id);
                return;
            }

            let result = timeout(
                self.adapter_timeout(),
                provider.generate(spec.glyph, &spec.theme, &palette),
            )
            .await;

            let image = match result {
                Ok(Ok(image)) => image,
                Ok(Err(e)) => {
                    log::error!("Job {}: letter {} failed: {}", job_id, index + 1, e);
                    let _ = self
                        .store
                        .update(job_id, |job| {
                            if !job.status.is_terminal() {
                                job.mark_failed(format!("Letter {} failed: {}", index + 1, e));
                            }
                            Ok(())
                        })
                        .await;
                    return;
                }
                Err(_) => {
                    log::error!("Job {}: letter {} timed out", job_id, index + 1);
                    let _ = self
                        .store
                        .update(job_id, |job| {
                            if !job.status.is_terminal() {
                                job.mark_failed(format!(
                                    "Letter {} timed out after {}s",
                                    index + 1,
                                    self.jobs_cfg.adapter_timeout_secs
                                ));
                            }
                            Ok(())
                        })
                        .await;
                    return;
                }
            };

            let key = ArtifactKey::Letter(index);
            let handle = match self
                .artifacts
                .put(job_id, &key, &image.bytes, &image.content_type)
            {
                Ok(handle) => handle,
                Err(e) => {
                    let _ = self
                        .store
                        .update(job_id, |job| {
                            if !job.status.is_terminal() {
                                job.mark_failed(format!("Failed to store letter {}: {}", index + 1, e));
                            }
                            Ok(())
                        })
                        .await;
                    return;
                }
            };

            // Commit the artifact only if the job is still live. A file
            // written for a cancelled job stays on disk until the sweep.
            let committed = self
                .store
                .update(job_id, |job| {
                    if job.status != JobStatus::Generating {
                        return Ok(false);
                    }
                    job.record_letter_artifact(index, handle.clone());
                    job.cost.record_generation(image.cost_usd);
                    Ok(true)
                })
                .await;
            if !matches!(committed, Ok(true)) {
                log::info!("Job {} cancelled mid-generation, discarding results", job_id);
                return;
            }
            log::info!("Job {}: letter {}/{} complete", job_id, index + 1, total);
        }

        let _ = self
            .store
            .update(job_id, |job| {
                if job.status != JobStatus::Generating {
                    return Ok(());
                }
                job.status = JobStatus::ReadyForReview;
                job.current_step = "All letters generated, waiting for review".to_string();
                Ok(())
            })
            .await;
        log::info!("Job {} ready for review", job_id);
    }

    pub async fn status(&self, job_id: JobId) -> Result<JobStatusReport> {
        Ok(self.store.get(job_id).await?.status_report())
    }

    /// Fetch one stored artifact as (bytes, content type)
    pub async fn download(&self, job_id: JobId, key: &ArtifactKey) -> Result<(Vec<u8>, String)> {
        let job = self.store.get(job_id).await?;
        let handle = job.artifacts.get(key).ok_or_else(|| {
            BannerError::NotFound(format!("Job {} has no '{}' artifact", job_id, key))
        })?;
        let bytes = self.artifacts.get(handle)?;
        Ok((bytes, handle.content_type.clone()))
    }

    /// Re-generate a single letter with a free-text instruction. Only valid
    /// while the job is in review; a failed edit leaves the existing
    /// artifact untouched.
    pub async fn edit_letter(
        &self,
        job_id: JobId,
        index: usize,
        instruction: &str,
    ) -> Result<JobStatusReport> {
        if instruction.trim().is_empty() {
            return Err(BannerError::Validation(
                "Edit instruction must not be empty".to_string(),
            ));
        }

        // Reserve the index so two edits cannot race on one artifact
        let (provider_name, handle) = self
            .store
            .update(job_id, |job| {
                if job.status != JobStatus::ReadyForReview {
                    return Err(BannerError::Validation(format!(
                        "Job {} is {}, edits require ready-for-review",
                        job.id,
                        job.status.as_str()
                    )));
                }
                if index >= job.total_letters() {
                    return Err(BannerError::Validation(format!(
                        "Letter index {} out of range, job has {} letters",
                        index,
                        job.total_letters()
                    )));
                }
                if !job.pending_edits.insert(index) {
                    return Err(BannerError::Validation(format!(
                        "Letter {} already has an edit in flight",
                        index
                    )));
                }
                let handle = job
                    .artifacts
                    .get(&ArtifactKey::Letter(index))
                    .cloned()
                    .ok_or_else(|| {
                        BannerError::NotFound(format!("Job {} has no letter {} artifact", job.id, index))
                    })?;
                job.current_step = format!("Editing letter {}", index + 1);
                Ok((job.provider.clone(), handle))
            })
            .await?;

        let result = self
            .run_edit(job_id, index, instruction, &provider_name, &handle)
            .await;

        // Always release the reservation, success or not
        let release = self
            .store
            .update(job_id, |job| {
                job.pending_edits.remove(&index);
                if result.is_err() && job.status == JobStatus::ReadyForReview {
                    job.current_step =
                        "All letters generated, waiting for review".to_string();
                }
                Ok(())
            })
            .await;
        if let Err(e) = release {
            log::warn!("Job {} vanished while releasing edit slot: {}", job_id, e);
        }

        result?;
        self.status(job_id).await
    }

    async fn run_edit(
        &self,
        job_id: JobId,
        index: usize,
        instruction: &str,
        provider_name: &str,
        handle: &ArtifactHandle,
    ) -> Result<()> {
        let provider = self.providers.resolve(provider_name)?;
        let current = self.artifacts.get(handle)?;

        let _permit = self.admission.acquire().await;
        let image = timeout(
            self.adapter_timeout(),
            provider.edit(&current, &handle.content_type, instruction),
        )
        .await
        .map_err(|_| {
            BannerError::Adapter(format!(
                "Edit timed out after {}s",
                self.jobs_cfg.adapter_timeout_secs
            ))
        })??;

        let key = ArtifactKey::Letter(index);
        let new_handle = self
            .artifacts
            .put(job_id, &key, &image.bytes, &image.content_type)?;

        self.store
            .update(job_id, |job| {
                if job.status != JobStatus::ReadyForReview {
                    return Err(BannerError::Validation(format!(
                        "Job {} left review during edit",
                        job.id
                    )));
                }
                job.artifacts.insert(key, new_handle.clone());
                job.cost.record_edit(image.cost_usd);
                job.current_step =
                    "All letters generated, waiting for review".to_string();
                Ok(())
            })
            .await?;

        log::info!("Job {}: letter {} re-edited", job_id, index + 1);
        Ok(())
    }

    /// Approve a reviewed job: compose the banner and the print document,
    /// then mark it completed. Runs the layout to completion before
    /// returning; pollers observe the compositing state in between.
    pub async fn approve(&self, job_id: JobId) -> Result<JobStatusReport> {
        let job = self
            .store
            .update(job_id, |job| {
                if job.status != JobStatus::ReadyForReview {
                    return Err(BannerError::Validation(format!(
                        "Job {} is {}, approval requires ready-for-review",
                        job.id,
                        job.status.as_str()
                    )));
                }
                if !job.pending_edits.is_empty() {
                    return Err(BannerError::Validation(
                        "Cannot approve while edits are in flight".to_string(),
                    ));
                }
                job.status = JobStatus::Compositing;
                job.current_step = "Composing banner and document".to_string();
                Ok(job.clone())
            })
            .await?;

        match self.run_compositing(&job).await {
            Ok(()) => self.status(job_id).await,
            Err(e) => {
                log::error!("Job {}: compositing failed: {}", job_id, e);
                let _ = self
                    .store
                    .update(job_id, |job| {
                        job.mark_failed(format!("Compositing failed: {}", e));
                        Ok(())
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn run_compositing(&self, job: &Job) -> Result<()> {
        let mut letter_bytes = Vec::with_capacity(job.total_letters());
        for index in 0..job.total_letters() {
            let handle = job
                .artifacts
                .get(&ArtifactKey::Letter(index))
                .ok_or_else(|| {
                    BannerError::Layout(format!("Letter {} artifact missing", index))
                })?;
            letter_bytes.push(self.artifacts.get(handle)?);
        }

        // CPU-bound; keep it off the async workers
        let palette = job.palette.clone();
        let layout_cfg = self.layout_cfg.clone();
        let name = job.name.clone();
        let (banner_png, document_pdf) = tokio::task::spawn_blocking(move || {
            let banner = layout::compose_banner(&letter_bytes, &palette, &layout_cfg)?;
            let document = layout::compose_document(&name, &letter_bytes, &banner)?;
            Ok::<_, BannerError>((banner, document))
        })
        .await
        .map_err(|e| BannerError::Layout(format!("Compositing task panicked: {}", e)))??;

        let banner_handle =
            self.artifacts
                .put(job.id, &ArtifactKey::Banner, &banner_png, "image/png")?;
        let document_handle = self.artifacts.put(
            job.id,
            &ArtifactKey::Document,
            &document_pdf,
            "application/pdf",
        )?;

        self.store
            .update(job.id, |job| {
                job.artifacts.insert(ArtifactKey::Banner, banner_handle.clone());
                job.artifacts
                    .insert(ArtifactKey::Document, document_handle.clone());
                job.status = JobStatus::Completed;
                job.current_step = "Banner and document ready".to_string();
                Ok(())
            })
            .await?;

        log::info!("Job {} completed", job.id);
        Ok(())
    }

    /// Mark a job cancelled. Cooperative: an in-flight adapter call finishes
    /// but its result is discarded.
    pub async fn cancel(&self, job_id: JobId) -> Result<()> {
        self.store
            .update(job_id, |job| {
                if job.status.is_terminal() {
                    return Err(BannerError::Validation(format!(
                        "Job {} already finished ({})",
                        job.id,
                        job.status.as_str()
                    )));
                }
                job.mark_cancelled();
                Ok(())
            })
            .await?;
        log::info!("Job {} cancelled", job_id);
        Ok(())
    }

    /// Drop a job and every artifact it owns
    pub async fn discard(&self, job_id: JobId) -> Result<()> {
        self.store.remove(job_id).await?;
        self.artifacts.delete_job(job_id)?;
        log::info!("Job {} discarded", job_id);
        Ok(())
    }

    /// Delete jobs whose last update is older than the retention TTL,
    /// artifacts included. Returns how many were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let ttl = ChronoDuration::hours(self.jobs_cfg.retention_hours as i64);
        let removed = self.store.sweep(now, ttl).await;
        for job in &removed {
            if let Err(e) = self.artifacts.delete_job(job.id) {
                log::warn!("Failed to delete artifacts for swept job {}: {}", job.id, e);
            }
        }
        if !removed.is_empty() {
            log::info!("Retention sweep removed {} jobs", removed.len());
        }
        removed.len()
    }

    /// Ask a provider for per-letter theme variations of one overarching
    /// theme, ready to drop into a submission
    pub async fn suggest_themes(
        &self,
        provider_name: &str,
        name: &str,
        theme: &str,
    ) -> Result<Vec<LetterSpec>> {
        if name.trim().is_empty() || theme.trim().is_empty() {
            return Err(BannerError::Validation(
                "Theme suggestions need a name and a theme".to_string(),
            ));
        }
        let provider = self.providers.resolve(provider_name)?;
        timeout(
            self.adapter_timeout(),
            provider.suggest_themes(name.trim(), theme.trim()),
        )
        .await
        .map_err(|_| {
            BannerError::Adapter(format!(
                "Theme suggestion timed out after {}s",
                self.jobs_cfg.adapter_timeout_secs
            ))
        })?
    }

    pub fn palette_names(&self) -> Vec<&str> {
        self.palettes.names()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.names()
    }
}
