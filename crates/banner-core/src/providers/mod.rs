//! Image provider adapters
//!
//! Uniform capability interface over heterogeneous generation backends. The
//! orchestrator only sees [`ImageProvider`]; the concrete clients translate
//! to each vendor's HTTP API and report the per-call cost from injected
//! pricing config.

pub mod gemini;
pub mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;

use crate::error::{BannerError, Result};
use crate::palette::Palette;
use crate::types::LetterSpec;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One generated or edited image, with the provider-reported call cost
#[derive(Debug, Clone)]
pub struct ProviderImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub cost_usd: f64,
}

/// Capability contract for a generation/edit backend.
///
/// Both calls are potentially slow and fallible; the orchestrator wraps them
/// in a bounded timeout and treats elapse like any other adapter error.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Produce one stylized letter image for `(glyph, theme, palette)`
    async fn generate(&self, glyph: char, theme: &str, palette: &Palette) -> Result<ProviderImage>;

    /// Rework an existing image according to a free-text instruction
    async fn edit(
        &self,
        image: &[u8],
        content_type: &str,
        instruction: &str,
    ) -> Result<ProviderImage>;

    /// Suggest a per-letter theme variation for each letter of a name,
    /// derived from one overarching theme
    async fn suggest_themes(&self, name: &str, theme: &str) -> Result<Vec<LetterSpec>>;
}

/// Registry resolving adapter names chosen at job submission
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ImageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn ImageProvider>) {
        self.providers
            .insert(provider.name().to_string(), provider);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ImageProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| BannerError::NotFound(format!("Unknown image provider: {}", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(|k| k.as_str()).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Color guidance clause appended to generation prompts
fn color_guidance(palette: &Palette) -> String {
    format!(
        " Use this specific color palette: {}. Style it with {}.",
        palette.color_names(),
        palette.mood
    )
}

/// Prompt for one stylized letter. The letter must stay recognizable and
/// float on a transparent background so the layout engine can composite it
/// onto any palette background.
pub(crate) fn generation_prompt(glyph: char, theme: &str, palette: &Palette) -> String {
    format!(
        "Create ONLY the letter '{glyph}' as a decorative design inspired by {theme}. \
         The letter should be clearly recognizable as '{glyph}' with artistic decorations, \
         patterns, and motifs that represent {theme}.{guidance} \
         CRITICAL: The background must be completely transparent. Do not include any \
         background colors, shapes, frames, borders, or environmental elements. Only \
         generate the letter itself with decorative elements integrated into the letter \
         shape, suitable for cutting out and placing on any surface.",
        glyph = glyph.to_ascii_uppercase(),
        theme = theme,
        guidance = color_guidance(palette),
    )
}

/// Prompt asking for per-letter theme variations of an overarching theme.
/// Variations must not start with their own letter; models otherwise
/// gravitate to alliterations ("H is for Hobbit").
pub(crate) fn theme_variation_prompt(letters: &[char], theme: &str) -> String {
    let letter_list = letters
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "For the letters {letters}, generate creative and specific theme variations based \
         on the overarching theme '{theme}'. Each letter should get a unique object, \
         concept, or element related to {theme}; make them diverse, interesting, and \
         visually distinctive. Deliberately choose variations that do NOT start with the \
         letter they are assigned to. Return ONLY a valid JSON array of objects with \
         \"letter\" and \"theme\" keys, in the same order as the letters, for example: \
         [{{\"letter\": \"A\", \"theme\": \"coral reef\"}}, {{\"letter\": \"B\", \"theme\": \"treasure chest\"}}]",
        letters = letter_list,
        theme = theme,
    )
}

#[derive(Debug, Deserialize)]
struct ThemeVariation {
    letter: String,
    theme: String,
}

/// Parse a model's theme-variation reply, tolerating markdown code fences
pub(crate) fn parse_theme_variations(response_text: &str) -> Result<Vec<LetterSpec>> {
    let mut text = response_text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }

    let variations: Vec<ThemeVariation> = serde_json::from_str(text.trim()).map_err(|e| {
        BannerError::Adapter(format!("Provider returned malformed theme variations: {}", e))
    })?;

    variations
        .into_iter()
        .map(|v| {
            let glyph = v
                .letter
                .trim()
                .chars()
                .next()
                .map(|c| c.to_ascii_uppercase())
                .ok_or_else(|| {
                    BannerError::Adapter("Theme variation with empty letter".to_string())
                })?;
            Ok(LetterSpec::new(glyph, v.theme))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::PaletteColor;

    fn palette() -> Palette {
        Palette {
            name: "Ocean Breeze".to_string(),
            description: String::new(),
            mood: "coastal, fresh, maritime style".to_string(),
            colors: vec![
                PaletteColor {
                    name: "deep navy blue".to_string(),
                    rgb: [22, 43, 82],
                },
                PaletteColor {
                    name: "coral pink".to_string(),
                    rgb: [242, 133, 123],
                },
            ],
        }
    }

    #[test]
    fn test_generation_prompt_mentions_glyph_theme_and_palette() {
        let prompt = generation_prompt('l', "lighthouse", &palette());
        assert!(prompt.contains("letter 'L'"));
        assert!(prompt.contains("lighthouse"));
        assert!(prompt.contains("deep navy blue, coral pink"));
        assert!(prompt.contains("coastal, fresh, maritime style"));
        assert!(prompt.contains("transparent"));
    }

    #[test]
    fn test_parse_theme_variations_plain_json() {
        let specs = parse_theme_variations(
            r#"[{"letter": "A", "theme": "coral reef"}, {"letter": "b", "theme": "treasure chest"}]"#,
        )
        .unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0], LetterSpec::new('A', "coral reef"));
        assert_eq!(specs[1], LetterSpec::new('B', "treasure chest"));
    }

    #[test]
    fn test_parse_theme_variations_strips_code_fences() {
        let specs = parse_theme_variations(
            "```json\n[{\"letter\": \"C\", \"theme\": \"whale tail\"}]\n```",
        )
        .unwrap();
        assert_eq!(specs, vec![LetterSpec::new('C', "whale tail")]);
    }

    #[test]
    fn test_parse_theme_variations_rejects_garbage() {
        assert!(matches!(
            parse_theme_variations("no json here"),
            Err(BannerError::Adapter(_))
        ));
    }

    #[test]
    fn test_registry_resolves_by_name() {
        struct Stub;
        #[async_trait]
        impl ImageProvider for Stub {
            fn name(&self) -> &str {
                "stub"
            }
            async fn generate(
                &self,
                _glyph: char,
                _theme: &str,
                _palette: &Palette,
            ) -> Result<ProviderImage> {
                unimplemented!()
            }
            async fn edit(
                &self,
                _image: &[u8],
                _content_type: &str,
                _instruction: &str,
            ) -> Result<ProviderImage> {
                unimplemented!()
            }
            async fn suggest_themes(&self, _name: &str, _theme: &str) -> Result<Vec<LetterSpec>> {
                unimplemented!()
            }
        }

        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Stub));
        assert!(registry.resolve("stub").is_ok());
        assert!(matches!(
            registry.resolve("unknown"),
            Err(BannerError::NotFound(_))
        ));
        assert_eq!(registry.names(), vec!["stub"]);
    }
}
