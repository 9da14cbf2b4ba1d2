//! Config store for loading and saving skiff.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{HOST_ENV, SkiffConfig, parser};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store at `~/.config/skiff/skiff.toml`.
    pub fn from_default_dir() -> anyhow::Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("skiff");
        Ok(Self::from_path(dir.join("skiff.toml")))
    }

    pub fn from_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the file, or defaults when it does not exist.
    pub fn load(&self) -> anyhow::Result<SkiffConfig> {
        if !self.config_path.exists() {
            return Ok(SkiffConfig::new());
        }
        parser::parse_skiff_toml(&self.config_path)
    }

    /// Load and apply the `SKIFF_HOST` override.
    pub fn load_with_env(&self) -> anyhow::Result<SkiffConfig> {
        let mut config = self.load()?;
        config.apply_host_override(std::env::var(HOST_ENV).ok());
        Ok(config)
    }

    pub fn save(&self, config: &SkiffConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}
