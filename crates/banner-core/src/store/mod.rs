//! Stateful stores: job registry and artifact storage

pub mod artifact_store;
pub mod job_store;

pub use artifact_store::ArtifactStore;
pub use job_store::JobStore;
