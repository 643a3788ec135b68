//! Error types for the banner service

use thiserror::Error;

/// Main error type for all banner operations
#[derive(Error, Debug)]
pub enum BannerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Image provider error: {0}")]
    Adapter(String),

    #[error("Layout error: {0}")]
    Layout(String),
}

/// Result type for banner operations
pub type Result<T> = std::result::Result<T, BannerError>;
