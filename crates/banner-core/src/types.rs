//! Common types used throughout the banner service
//! Strongly typed ids and states - no string-based state management

use crate::palette::Palette;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Strongly typed JobId
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(uuid::Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid JobId format: {}", e))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One letter of the banner: the glyph to draw and the theme that decorates it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterSpec {
    pub glyph: char,
    pub theme: String,
}

impl LetterSpec {
    pub fn new(glyph: char, theme: impl Into<String>) -> Self {
        Self {
            glyph,
            theme: theme.into(),
        }
    }
}

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Queued,
    Generating,
    ReadyForReview,
    Compositing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Generating => "generating",
            Self::ReadyForReview => "ready-for-review",
            Self::Compositing => "compositing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key identifying one artifact within a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ArtifactKey {
    Letter(usize),
    Banner,
    Document,
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Letter(index) => write!(f, "letter_{}", index),
            Self::Banner => f.write_str("banner"),
            Self::Document => f.write_str("document"),
        }
    }
}

impl From<ArtifactKey> for String {
    fn from(key: ArtifactKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for ArtifactKey {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "banner" => Ok(Self::Banner),
            "document" => Ok(Self::Document),
            other => other
                .strip_prefix("letter_")
                .and_then(|idx| idx.parse::<usize>().ok())
                .map(Self::Letter)
                .ok_or_else(|| format!("Invalid artifact key: {}", other)),
        }
    }
}

impl std::str::FromStr for ArtifactKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

/// Handle to a stored artifact: where the bytes live and what they are
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub path: PathBuf,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

/// Per-job provider cost accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostInfo {
    pub provider: String,
    pub generation_calls: u32,
    pub edit_calls: u32,
    pub total_usd: f64,
}

impl CostInfo {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            generation_calls: 0,
            edit_calls: 0,
            total_usd: 0.0,
        }
    }

    pub fn record_generation(&mut self, cost_usd: f64) {
        self.generation_calls += 1;
        self.total_usd += cost_usd;
    }

    pub fn record_edit(&mut self, cost_usd: f64) {
        self.edit_calls += 1;
        self.total_usd += cost_usd;
    }
}

/// Banner job submission input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerRequest {
    pub name: String,
    pub letters: Vec<LetterSpec>,
    pub color_palette: String,
    pub provider: String,
}

/// One end-to-end banner generation job with its lifecycle and artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub letters: Vec<LetterSpec>,
    pub palette: Palette,
    pub provider: String,
    pub progress: u8,
    pub current_step: String,
    pub completed_letters: usize,
    pub artifacts: BTreeMap<ArtifactKey, ArtifactHandle>,
    /// Letter indices with an in-flight edit call. Guards against two
    /// concurrent edits racing on the same artifact.
    pub pending_edits: BTreeSet<usize>,
    pub error: Option<String>,
    pub cost: CostInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(name: String, letters: Vec<LetterSpec>, palette: Palette, provider: String) -> Self {
        let now = Utc::now();
        let cost = CostInfo::new(provider.clone());
        Self {
            id: JobId::new(),
            name,
            status: JobStatus::Queued,
            letters,
            palette,
            provider,
            progress: 0,
            current_step: "Waiting for a generation slot".to_string(),
            completed_letters: 0,
            artifacts: BTreeMap::new(),
            pending_edits: BTreeSet::new(),
            error: None,
            cost,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_letters(&self) -> usize {
        self.letters.len()
    }

    /// Record a finished letter artifact and advance progress.
    /// Progress is round(100 * completed / total) and never decreases.
    pub fn record_letter_artifact(&mut self, index: usize, handle: ArtifactHandle) {
        self.artifacts.insert(ArtifactKey::Letter(index), handle);
        self.completed_letters = self
            .artifacts
            .keys()
            .filter(|key| matches!(key, ArtifactKey::Letter(_)))
            .count();
        let total = self.total_letters().max(1);
        let rounded = ((self.completed_letters * 100 + total / 2) / total) as u8;
        self.progress = self.progress.max(rounded.min(100));
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.status = JobStatus::Failed;
        self.current_step = format!("Generation failed: {}", reason);
        self.error = Some(reason);
    }

    pub fn mark_cancelled(&mut self) {
        self.status = JobStatus::Cancelled;
        self.current_step = "Cancelled by caller".to_string();
    }

    pub fn status_report(&self) -> JobStatusReport {
        let files = self
            .artifacts
            .iter()
            .map(|(key, handle)| (key.to_string(), handle.clone()))
            .collect();
        JobStatusReport {
            job_id: self.id,
            status: self.status,
            progress: self.progress,
            current_step: self.current_step.clone(),
            total_letters: self.total_letters(),
            completed_letters: self.completed_letters,
            files,
            error_message: self.error.clone(),
            cost_info: self.cost.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Status query output, shaped for polling callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    pub total_letters: usize,
    pub completed_letters: usize,
    pub files: BTreeMap<String, ArtifactHandle>,
    pub error_message: Option<String>,
    pub cost_info: CostInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{Palette, PaletteColor};

    fn test_palette() -> Palette {
        Palette {
            name: "test".to_string(),
            description: "test palette".to_string(),
            mood: "plain".to_string(),
            colors: vec![PaletteColor {
                name: "crisp white".to_string(),
                rgb: [255, 255, 255],
            }],
        }
    }

    #[test]
    fn test_job_status_serializes_kebab_case() {
        let json = serde_json::to_string(&JobStatus::ReadyForReview).unwrap();
        assert_eq!(json, "\"ready-for-review\"");

        let parsed: JobStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, JobStatus::Completed);
    }

    #[test]
    fn test_artifact_key_roundtrip() {
        for key in [ArtifactKey::Letter(0), ArtifactKey::Letter(12), ArtifactKey::Banner, ArtifactKey::Document] {
            let s = key.to_string();
            let parsed: ArtifactKey = s.parse().unwrap();
            assert_eq!(parsed, key);
        }
        assert_eq!(ArtifactKey::Letter(3).to_string(), "letter_3");
        assert!("letter_x".parse::<ArtifactKey>().is_err());
        assert!("preview".parse::<ArtifactKey>().is_err());
    }

    #[test]
    fn test_progress_rounding_and_monotonicity() {
        let letters = vec![
            LetterSpec::new('L', "lighthouse"),
            LetterSpec::new('O', "octopus"),
            LetterSpec::new('L', "seashell"),
        ];
        let mut job = Job::new("LOL".to_string(), letters, test_palette(), "mock".to_string());

        let handle = ArtifactHandle {
            path: PathBuf::from("/tmp/a.png"),
            content_type: "image/png".to_string(),
            created_at: Utc::now(),
        };

        job.record_letter_artifact(0, handle.clone());
        assert_eq!(job.progress, 33);
        assert_eq!(job.completed_letters, 1);

        job.record_letter_artifact(1, handle.clone());
        assert_eq!(job.progress, 67);

        // Replacing an existing artifact does not move progress backwards
        job.record_letter_artifact(1, handle.clone());
        assert_eq!(job.progress, 67);
        assert_eq!(job.completed_letters, 2);

        job.record_letter_artifact(2, handle);
        assert_eq!(job.progress, 100);
        assert_eq!(job.completed_letters, 3);
    }

    #[test]
    fn test_mark_failed_sets_error() {
        let mut job = Job::new(
            "A".to_string(),
            vec![LetterSpec::new('A', "anchor")],
            test_palette(),
            "mock".to_string(),
        );
        job.mark_failed("provider rejected the request");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("provider rejected the request"));
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_cost_info_accumulates() {
        let mut cost = CostInfo::new("openai");
        cost.record_generation(0.04);
        cost.record_generation(0.04);
        cost.record_edit(0.02);
        assert_eq!(cost.generation_calls, 2);
        assert_eq!(cost.edit_calls, 1);
        assert!((cost.total_usd - 0.10).abs() < 1e-9);
    }
}
