//! Read-only color palette catalog
//!
//! Palettes theme the generated imagery (prompt color guidance) and the
//! banner background. They are external data: resolved once at job creation
//! and never mutated afterwards.

use crate::error::{BannerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Built-in catalog data shipped with the crate
const BUILTIN_PALETTES: &str = include_str!("../data/palettes.json");

/// One named color: prose name for prompt guidance, RGB for compositing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteColor {
    pub name: String,
    pub rgb: [u8; 3],
}

/// Immutable named ordered list of colors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub name: String,
    pub description: String,
    pub mood: String,
    pub colors: Vec<PaletteColor>,
}

impl Palette {
    /// Comma-joined color names, as fed into provider prompts
    pub fn color_names(&self) -> String {
        self.colors
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// First color of the palette - the banner background fill
    pub fn background(&self) -> [u8; 3] {
        self.colors.first().map(|c| c.rgb).unwrap_or([255, 255, 255])
    }
}

/// Palette catalog with lookup by key
#[derive(Debug, Clone)]
pub struct PaletteCatalog {
    palettes: BTreeMap<String, Palette>,
}

impl PaletteCatalog {
    /// Catalog of the palettes shipped with the crate
    pub fn builtin() -> Self {
        // The embedded data is validated by tests; a parse failure here is a
        // packaging defect, not a runtime condition.
        let palettes = serde_json::from_str(BUILTIN_PALETTES)
            .unwrap_or_else(|e| panic!("built-in palette data is invalid: {}", e));
        Self { palettes }
    }

    /// Load a catalog from an external JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BannerError::Config(format!(
                "Failed to read palette catalog {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let palettes: BTreeMap<String, Palette> = serde_json::from_str(&content)
            .map_err(|e| BannerError::Config(format!("Failed to parse palette catalog: {}", e)))?;
        if palettes.is_empty() {
            return Err(BannerError::Config(
                "Palette catalog contains no palettes".to_string(),
            ));
        }
        Ok(Self { palettes })
    }

    pub fn resolve(&self, name: &str) -> Result<Palette> {
        self.palettes
            .get(name)
            .cloned()
            .ok_or_else(|| BannerError::NotFound(format!("Unknown color palette: {}", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.palettes.keys().map(|k| k.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = PaletteCatalog::builtin();
        assert_eq!(catalog.names().len(), 7);
        assert!(catalog.names().contains(&"earthy_vintage"));
    }

    #[test]
    fn test_resolve_known_palette() {
        let catalog = PaletteCatalog::builtin();
        let palette = catalog.resolve("ocean_breeze").unwrap();
        assert_eq!(palette.name, "Ocean Breeze");
        assert_eq!(palette.colors.len(), 5);
        assert_eq!(palette.background(), [22, 43, 82]);
        assert!(palette.color_names().contains("seafoam green"));
    }

    #[test]
    fn test_resolve_unknown_palette_is_not_found() {
        let catalog = PaletteCatalog::builtin();
        let err = catalog.resolve("neon_void").unwrap_err();
        assert!(matches!(err, BannerError::NotFound(_)));
    }

    #[test]
    fn test_catalog_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("palettes.json");
        std::fs::write(
            &path,
            r#"{"mono": {"name": "Mono", "description": "black on white", "mood": "stark", "colors": [{"name": "black", "rgb": [0, 0, 0]}]}}"#,
        )
        .unwrap();

        let catalog = PaletteCatalog::from_file(&path).unwrap();
        let palette = catalog.resolve("mono").unwrap();
        assert_eq!(palette.background(), [0, 0, 0]);
    }
}
