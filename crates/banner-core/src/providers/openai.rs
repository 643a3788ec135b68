//! OpenAI image client (gpt-image-1)

use crate::config::OpenAIConfig;
use crate::error::{BannerError, Result};
use crate::palette::Palette;
use crate::providers::{
    generation_prompt, parse_theme_variations, theme_variation_prompt, ImageProvider,
    ProviderImage,
};
use crate::types::LetterSpec;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use log::{debug, info, warn};
use reqwest::multipart;
use reqwest::Client as HttpClient;

pub struct OpenAIProvider {
    config: OpenAIConfig,
    http_client: HttpClient,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Self {
        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(180))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            http_client,
        }
    }

    /// Pull the first base64 image payload out of an images API response
    fn decode_image_response(&self, body: &serde_json::Value) -> Result<Vec<u8>> {
        let b64 = body["data"][0]["b64_json"].as_str().ok_or_else(|| {
            BannerError::Adapter("OpenAI response contained no image data".to_string())
        })?;
        general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| BannerError::Adapter(format!("Invalid base64 image from OpenAI: {}", e)))
    }

}

#[async_trait]
impl ImageProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, glyph: char, theme: &str, palette: &Palette) -> Result<ProviderImage> {
        let url = format!("{}/images/generations", self.config.base_url);
        let prompt = generation_prompt(glyph, theme, palette);
        debug!("OpenAI generation prompt: {}", prompt);

        let request_body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
            "background": "transparent",
            "output_format": "png"
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("OpenAI API error ({}): {}", status, error_text);
            return Err(BannerError::Adapter(format!(
                "OpenAI returned {}: {}",
                status, error_text
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let bytes = self.decode_image_response(&body)?;
        info!("Generated letter '{}' via OpenAI", glyph.to_ascii_uppercase());

        Ok(ProviderImage {
            bytes,
            content_type: "image/png".to_string(),
            cost_usd: self.config.pricing.generation_usd,
        })
    }

    async fn edit(
        &self,
        image: &[u8],
        content_type: &str,
        instruction: &str,
    ) -> Result<ProviderImage> {
        let url = format!("{}/images/edits", self.config.base_url);
        info!("Requesting OpenAI image edit: {}", instruction);

        let part = multipart::Part::bytes(image.to_vec())
            .file_name("letter.png")
            .mime_str(content_type)
            .map_err(|e| BannerError::Adapter(format!("Invalid image content type: {}", e)))?;
        let form = multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("prompt", instruction.to_string())
            .text("n", "1")
            .text("size", "1024x1024")
            .part("image", part);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("OpenAI API error ({}): {}", status, error_text);
            return Err(BannerError::Adapter(format!(
                "OpenAI returned {}: {}",
                status, error_text
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let bytes = self.decode_image_response(&body)?;

        Ok(ProviderImage {
            bytes,
            content_type: "image/png".to_string(),
            cost_usd: self.config.pricing.edit_usd,
        })
    }

    async fn suggest_themes(&self, name: &str, theme: &str) -> Result<Vec<LetterSpec>> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let letters: Vec<char> = name.chars().map(|c| c.to_ascii_uppercase()).collect();
        let prompt = theme_variation_prompt(&letters, theme);

        let request_body = serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.9
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BannerError::Adapter(format!(
                "OpenAI returned {}: {}",
                status, error_text
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                BannerError::Adapter("OpenAI chat response contained no text".to_string())
            })?;

        parse_theme_variations(text)
    }
}
