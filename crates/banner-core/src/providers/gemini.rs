//! Google Gemini image client (gemini-3-pro-image-preview)

use crate::config::GeminiConfig;
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
use reqwest::Client as HttpClient;

pub struct GeminiProvider {
    config: GeminiConfig,
    http_client: HttpClient,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Self {
        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(180))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            http_client,
        }
    }

    fn generate_content_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }

    async fn call_generate_content(
        &self,
        request_body: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let response = self
            .http_client
            .post(self.generate_content_url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Gemini API error ({}): {}", status, error_text);
            return Err(BannerError::Adapter(format!(
                "Gemini returned {}: {}",
                status, error_text
            )));
        }

        Ok(response.json().await?)
    }

    /// Walk the candidate parts and decode the first inline image
    fn extract_inline_image(&self, body: &serde_json::Value) -> Result<(Vec<u8>, String)> {
        let parts = body["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| {
                BannerError::Adapter("Gemini response contained no candidates".to_string())
            })?;

        for part in parts {
            if let Some(data) = part["inlineData"]["data"].as_str() {
                let mime_type = part["inlineData"]["mimeType"]
                    .as_str()
                    .unwrap_or("image/png")
                    .to_string();
                let bytes = general_purpose::STANDARD.decode(data).map_err(|e| {
                    BannerError::Adapter(format!("Invalid base64 image from Gemini: {}", e))
                })?;
                return Ok((bytes, mime_type));
            }
            if let Some(text) = part["text"].as_str() {
                debug!("Gemini text response: {}", text);
            }
        }

        Err(BannerError::Adapter(
            "Gemini response contained no image data".to_string(),
        ))
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, glyph: char, theme: &str, palette: &Palette) -> Result<ProviderImage> {
        let prompt = generation_prompt(glyph, theme, palette);
        debug!("Gemini generation prompt: {}", prompt);

        let request_body = serde_json::json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {
                    "aspectRatio": "1:1",
                    "imageSize": "1K"
                }
            }
        });

        let body = self.call_generate_content(request_body).await?;
        let (bytes, content_type) = self.extract_inline_image(&body)?;
        info!("Generated letter '{}' via Gemini", glyph.to_ascii_uppercase());

        Ok(ProviderImage {
            bytes,
            content_type,
            cost_usd: self.config.pricing.generation_usd,
        })
    }

    async fn edit(
        &self,
        image: &[u8],
        content_type: &str,
        instruction: &str,
    ) -> Result<ProviderImage> {
        info!("Requesting Gemini image edit: {}", instruction);
        let prompt = format!(
            "Edit this letter image: {}. Keep the letter clearly recognizable and keep \
             the background completely transparent.",
            instruction
        );

        let request_body = serde_json::json!({
            "contents": [{
                "parts": [
                    {"text": prompt},
                    {"inlineData": {
                        "mimeType": content_type,
                        "data": general_purpose::STANDARD.encode(image)
                    }}
                ]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {
                    "aspectRatio": "1:1",
                    "imageSize": "1K"
                }
            }
        });

        let body = self.call_generate_content(request_body).await?;
        let (bytes, mime_type) = self.extract_inline_image(&body)?;

        Ok(ProviderImage {
            bytes,
            content_type: mime_type,
            cost_usd: self.config.pricing.edit_usd,
        })
    }

    async fn suggest_themes(&self, name: &str, theme: &str) -> Result<Vec<LetterSpec>> {
        let letters: Vec<char> = name.chars().map(|c| c.to_ascii_uppercase()).collect();
        let prompt = theme_variation_prompt(&letters, theme);

        let request_body = serde_json::json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "responseModalities": ["TEXT"]
            }
        });

        let body = self.call_generate_content(request_body).await?;
        let parts = body["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| {
                BannerError::Adapter("Gemini response contained no candidates".to_string())
            })?;
        let text = parts
            .iter()
            .find_map(|part| part["text"].as_str())
            .ok_or_else(|| {
                BannerError::Adapter("Gemini response contained no text".to_string())
            })?;

        parse_theme_variations(text)
    }
}
