//! Scan configuration.
//!
//! The only tunable of the core is the set of filename extensions treated
//! as images. The default list mirrors what existing collections contain;
//! it can be overridden through `SIDECAR_STORE_EXTENSIONS` or a CLI flag,
//! with the flag winning.

use std::env;

/// Extensions recognized as image files when none are configured.
pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Environment variable holding a comma-separated extension list.
pub const EXTENSIONS_ENV: &str = "SIDECAR_STORE_EXTENSIONS";

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Lowercase extensions (no leading dot) recognized as images.
    pub image_extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            image_extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl ScanConfig {
    /// Build a config from the environment, falling back to the defaults.
    pub fn from_env() -> Self {
        match env::var(EXTENSIONS_ENV) {
            Ok(spec) => Self::from_list(&spec),
            Err(_) => Self::default(),
        }
    }

    /// Parse a comma-separated extension list like `png,jpg,.webp`.
    ///
    /// Entries are lowercased and stripped of a leading dot; a list with no
    /// usable entries falls back to the defaults.
    pub fn from_list(spec: &str) -> Self {
        let extensions: Vec<String> = spec
            .split(',')
            .map(|entry| entry.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|entry| !entry.is_empty())
            .collect();

        if extensions.is_empty() {
            Self::default()
        } else {
            Self {
                image_extensions: extensions,
            }
        }
    }

    /// True when `ext` (without dot, any case) is a recognized image extension.
    pub fn matches(&self, ext: &str) -> bool {
        self.image_extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(ext))
    }
}
