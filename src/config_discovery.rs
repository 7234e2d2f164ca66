use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::StepcacheConfig;

pub const CONFIG_FILE_NAME: &str = "stepcache.toml";

/// Discovers stepcache configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Ok(Some(config_path));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    // Fallback to global config
    if let Some(home) = dirs::home_dir() {
        let global_config = home.join(".config/stepcache/config.toml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path.
/// Otherwise, auto-discovers config by traversing up directory tree from cwd.
/// Without any config file the built-in defaults are returned.
pub fn load_config_with_discovery(explicit_path: Option<&Path>) -> Result<StepcacheConfig> {
    let path = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let current_dir = std::env::current_dir()
                .context("Failed to get current directory for config discovery")?;
            discover_config(&current_dir)?
        }
    };

    let config = match path {
        Some(path) => {
            tracing::debug!(config = %path.display(), "loading configuration");
            StepcacheConfig::from_file(&path)?
        }
        None => StepcacheConfig::default(),
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_config_finds_nearest() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        let subdir = project.join("pipelines").join("daily");
        fs::create_dir_all(&subdir).unwrap();

        let config_path = project.join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[log]\nlevel = \"debug\"\n").unwrap();

        let found = discover_config(&subdir).unwrap();
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_explicit_path_is_validated() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        fs::write(&path, "[log]\nlevel = \"loud\"\n").unwrap();

        assert!(load_config_with_discovery(Some(&path)).is_err());

        fs::write(&path, "[cache]\ndisable = true\n").unwrap();
        let config = load_config_with_discovery(Some(&path)).unwrap();
        assert!(config.cache.disable);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = load_config_with_discovery(Some(&temp.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
