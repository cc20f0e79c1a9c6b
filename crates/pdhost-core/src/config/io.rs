//! YAML configuration I/O
//!
//! Two loading flavours: [`load_config`] falls back to defaults for
//! long-running hosts, [`read_config`] fails loudly for one-shot tools
//! where a typo in the file should stop the run.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration, using `T::default()` when the file is missing or invalid
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("Config {:?} not found, using defaults", path);
        return T::default();
    }

    match read_config(path) {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("{:#}; using defaults", e);
            T::default()
        }
    }
}

/// Read and parse a configuration file, reporting any failure
pub fn read_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse config {:?}", path))
}

/// Save configuration as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config file {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: HostConfig = load_config(Path::new("/nonexistent/path/host.yaml"));
        assert_eq!(config, HostConfig::default());
    }

    #[test]
    fn test_invalid_file_falls_back_but_read_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.yaml");
        std::fs::write(&path, "default_inputs: [not, a, number]\n").unwrap();

        let config: HostConfig = load_config(&path);
        assert_eq!(config, HostConfig::default());
        assert!(read_config::<HostConfig>(&path).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("host.yaml");

        let config = HostConfig {
            default_inputs: 1,
            search_paths: vec![dir.path().to_path_buf()],
            ..Default::default()
        };

        save_config(&config, &path).unwrap();
        let loaded: HostConfig = load_config(&path);
        assert_eq!(loaded, config);
    }
}
