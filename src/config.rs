use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::CacheMode;
use crate::logging::{LogFormat, LEVELS};
use crate::storage::default_cache_dir;

/// Complete stepcache configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StepcacheConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Snapshot cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheConfig {
    /// Cache directory path. Defaults to the platform cache directory.
    pub dir: Option<String>,

    /// Run every step live without reading or writing the cache
    #[serde(default)]
    pub disable: bool,

    /// Skip cache reads but still write fresh entries
    #[serde(default)]
    pub ignore: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// pretty, compact or json
    pub format: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl StepcacheConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: StepcacheConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.cache.dir {
            if dir.trim().is_empty() {
                anyhow::bail!("cache.dir must not be empty");
            }
        }

        if !LEVELS.contains(&self.log.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "log.level must be one of: {}, got '{}'",
                LEVELS.join(", "),
                self.log.level
            );
        }

        if let Some(format) = &self.log.format {
            if LogFormat::parse(format).is_none() {
                anyhow::bail!(
                    "log.format must be one of: pretty, compact, json, got '{}'",
                    format
                );
            }
        }

        Ok(())
    }

    /// Cache directory, falling back to the platform default
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir)
    }

    pub fn cache_mode(&self) -> CacheMode {
        CacheMode {
            disable: self.cache.disable,
            ignore: self.cache.ignore,
        }
    }
}
