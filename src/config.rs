use anyhow::{bail, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::matcher::MatchOptions;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "haydon-xref.toml";

/// Main configuration structure loaded from haydon-xref.toml
#[derive(Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub matching: MatchOptions,
    pub preview: PreviewConfig,
    pub server: ServerConfig,
}

/// Where the tables come from
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// CSV export of the "Export" sheet
    pub catalog_csv: PathBuf,
    /// CSV export of the "Image" sheet
    pub reference_csv: PathBuf,
    /// SQLite store written by `import`
    pub database: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            catalog_csv: PathBuf::from("data/export.csv"),
            reference_csv: PathBuf::from("data/image.csv"),
            database: PathBuf::from("data/xref.db"),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PreviewConfig {
    pub enabled: bool,
    /// Page fetched with the url-encoded part number appended
    pub search_url: String,
    pub timeout_secs: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        PreviewConfig {
            enabled: false,
            search_url: "https://www.bing.com/images/search?q=".to_string(),
            timeout_secs: 10,
        }
    }
}

impl PreviewConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Config {
    /// Load config from file, or return default if no config exists.
    /// An explicit path (--config) MUST exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("Config file not found: {}", p.display());
                }
                p
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    default_path
                } else {
                    return Ok(Config::default());
                }
            }
        };

        let contents = fs::read_to_string(config_path)?;
        Self::from_toml_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", config_path.display(), e))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.preview.enabled && self.preview.search_url.trim().is_empty() {
            bail!("preview.search_url must be set when preview.enabled = true");
        }
        if self.preview.timeout_secs == 0 {
            bail!("preview.timeout_secs must be greater than 0");
        }
        Ok(())
    }
}
