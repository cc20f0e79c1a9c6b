//! Host configuration
//!
//! Describes how a [`PdHost`](crate::pd::PdHost) creates its instances:
//! which engine backend, the default channel layout and the search paths
//! every new instance receives.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::pd::{Backend, InstanceConfig};
use crate::types::DEFAULT_SAMPLE_RATE;

/// Configuration for a multi-instance PD host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Engine backend for new instances
    pub backend: Backend,

    /// Input channels when an instance is created without explicit layout
    pub default_inputs: usize,

    /// Output channels when an instance is created without explicit layout
    pub default_outputs: usize,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Directories searched for patches and abstractions
    pub search_paths: Vec<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            default_inputs: 2,
            default_outputs: 2,
            sample_rate: DEFAULT_SAMPLE_RATE,
            search_paths: Vec::new(),
        }
    }
}

impl HostConfig {
    /// Instance layout used by [`PdHost::create_instance`](crate::pd::PdHost::create_instance)
    pub fn instance_config(&self) -> InstanceConfig {
        InstanceConfig {
            inputs: self.default_inputs,
            outputs: self.default_outputs,
            sample_rate: self.sample_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: HostConfig = serde_yaml::from_str("sample_rate: 48000\n").unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.default_inputs, 2);
        assert_eq!(config.backend, Backend::Reference);
    }

    #[test]
    fn test_backend_names() {
        let config: HostConfig = serde_yaml::from_str("backend: reference\n").unwrap();
        assert_eq!(config.backend, Backend::Reference);
        assert!(serde_yaml::from_str::<HostConfig>("backend: csound\n").is_err());
    }
}
