use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use wishbone_core::common::error::{PipelineError, Result};

/// One storefront entry in the source registry file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RegistryFile {
    sources: Vec<SourceConfig>,
}

/// Registry of configured storefront sources, loaded from TOML.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| PipelineError::Api {
            message: format!("Failed to read source registry {}: {e}", path.display()),
        })?;

        let file: RegistryFile = toml::from_str(&content).map_err(|e| PipelineError::Api {
            message: format!("Invalid source registry {}: {e}", path.display()),
        })?;

        Ok(Self {
            sources: file.sources,
        })
    }

    /// Every storefront enabled, in the default extraction order.
    pub fn all_enabled() -> Self {
        Self {
            sources: ["gog", "steam", "epic"]
                .into_iter()
                .map(|source_id| SourceConfig {
                    source_id: source_id.to_string(),
                    enabled: true,
                })
                .collect(),
        }
    }

    pub fn enabled_source_ids(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.source_id.clone())
            .collect()
    }

    pub fn is_enabled(&self, source_id: &str) -> bool {
        self.sources
            .iter()
            .any(|s| s.enabled && s.source_id == source_id)
    }
}
