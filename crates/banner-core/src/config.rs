//! Configuration management for the banner service

use crate::error::{BannerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerConfig {
    #[serde(default)]
    pub openai: OpenAIConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub jobs: JobConfig,

    #[serde(default)]
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_openai_model")]
    pub model: String,

    #[serde(default = "default_openai_pricing")]
    pub pricing: ProviderPricing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    #[serde(default = "default_gemini_model")]
    pub model: String,

    #[serde(default = "default_gemini_pricing")]
    pub pricing: ProviderPricing,
}

/// Static per-call pricing, keyed by provider in the config file.
/// Injected into the adapters; orchestration logic never hardcodes prices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProviderPricing {
    pub generation_usd: f64,
    pub edit_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Maximum letters per banner
    #[serde(default = "default_max_letters")]
    pub max_letters: usize,

    /// How many jobs may generate images at once
    #[serde(default = "default_concurrent_generations")]
    pub concurrent_generations: usize,

    /// Jobs older than this (by last update) are swept, artifacts included
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Bounded wait for one provider call
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,

    /// Interval for the background retention sweeper
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Print canvas constants: 8.5x11 inches at 300 dpi, portrait
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,

    #[serde(default = "default_canvas_height")]
    pub canvas_height: u32,

    /// Minimum margin around the banner grid, in pixels
    #[serde(default = "default_margin_px")]
    pub margin_px: u32,

    /// Fixed letters per row; auto-calculated from the letter count if unset
    #[serde(default)]
    pub letters_per_row: Option<usize>,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-image-1".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-3-pro-image-preview".to_string()
}

fn default_openai_pricing() -> ProviderPricing {
    ProviderPricing {
        generation_usd: 0.04,
        edit_usd: 0.04,
    }
}

fn default_gemini_pricing() -> ProviderPricing {
    ProviderPricing {
        generation_usd: 0.03,
        edit_usd: 0.03,
    }
}

fn default_max_letters() -> usize {
    20
}

fn default_concurrent_generations() -> usize {
    2
}

fn default_retention_hours() -> u64 {
    24
}

fn default_adapter_timeout_secs() -> u64 {
    120
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_canvas_width() -> u32 {
    2550
}

fn default_canvas_height() -> u32 {
    3300
}

fn default_margin_px() -> u32 {
    100
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            pricing: default_openai_pricing(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            pricing: default_gemini_pricing(),
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_letters: default_max_letters(),
            concurrent_generations: default_concurrent_generations(),
            retention_hours: default_retention_hours(),
            adapter_timeout_secs: default_adapter_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
            margin_px: default_margin_px(),
            letters_per_row: None,
        }
    }
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            openai: OpenAIConfig::default(),
            gemini: GeminiConfig::default(),
            jobs: JobConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl BannerConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BannerError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json_str(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: BannerConfig = serde_json::from_str(json)
            .map_err(|e| BannerError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.openai.api_key.is_empty() && self.gemini.api_key.is_empty() {
            return Err(BannerError::Config(
                "At least one image provider API key is required".to_string(),
            ));
        }

        if self.jobs.max_letters == 0 {
            return Err(BannerError::Config(
                "jobs.max_letters must be at least 1".to_string(),
            ));
        }

        if self.jobs.concurrent_generations == 0 {
            return Err(BannerError::Config(
                "jobs.concurrent_generations must be at least 1".to_string(),
            ));
        }

        if self.layout.canvas_width == 0 || self.layout.canvas_height == 0 {
            return Err(BannerError::Config(
                "layout canvas dimensions must be positive".to_string(),
            ));
        }

        if let Some(per_row) = self.layout.letters_per_row {
            if per_row == 0 {
                return Err(BannerError::Config(
                    "layout.letters_per_row must be at least 1 when set".to_string(),
                ));
            }
        }

        Ok(())
    }
}
