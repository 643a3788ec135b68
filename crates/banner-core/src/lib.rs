//! Banner Core Library
//!
//! Job orchestration and composition engine for AI-generated letter
//! banners. Contains the job store, admission control, provider adapters,
//! the layout engine, and the orchestrating service.

pub mod admission;
pub mod config;
pub mod error;
pub mod layout;
pub mod orchestrator;
pub mod palette;
pub mod providers;
pub mod store;
pub mod types;

// Re-export main types for easy access
pub use config::BannerConfig;
pub use error::{BannerError, Result};
pub use orchestrator::BannerService;

pub use admission::{AdmissionController, AdmissionPermit};
pub use palette::{Palette, PaletteCatalog, PaletteColor};
pub use providers::{
    GeminiProvider, ImageProvider, OpenAIProvider, ProviderImage, ProviderRegistry,
};
pub use store::{ArtifactStore, JobStore};
pub use types::{
    ArtifactHandle, ArtifactKey, BannerRequest, CostInfo, Job, JobId, JobStatus, JobStatusReport,
    LetterSpec,
};
