//! PdHost - creates and tracks isolated PD instances
//!
//! This is the main entry point for applications hosting several engine
//! contexts in one process. It handles:
//! - Creating instances with the configured engine backend
//! - Giving every new instance the configured search paths
//! - Disposing whatever is still alive on shutdown
//!
//! Instances never see each other's receivers, arrays, MIDI or DSP state;
//! the host only keeps handles so it can tear them down.

use std::path::Path;

use crate::config::HostConfig;

use super::engine::{EngineFactory, InstanceConfig};
use super::error::PdResult;
use super::instance::PdInstance;

/// Owner of a set of independent PD instances
pub struct PdHost {
    config: HostConfig,
    factory: Box<dyn EngineFactory>,
    instances: Vec<PdInstance>,
}

impl PdHost {
    /// Create a host using the backend named in `config`
    pub fn new(config: HostConfig) -> Self {
        let factory = config.backend.factory();
        Self::with_factory(config, factory)
    }

    /// Create a host with an explicit engine factory
    pub fn with_factory(config: HostConfig, factory: Box<dyn EngineFactory>) -> Self {
        for path in &config.search_paths {
            if !path.is_dir() {
                log::warn!("Search path {} is not a directory", path.display());
            }
        }

        log::info!(
            "PdHost initialized: {} backend, {} search path(s)",
            factory.name(),
            config.search_paths.len()
        );

        Self {
            config,
            factory,
            instances: Vec::new(),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Create an instance with the configured default layout
    pub fn create_instance(&mut self) -> PdResult<PdInstance> {
        let layout = self.config.instance_config();
        self.create_instance_with(layout)
    }

    /// Create an instance with an explicit channel layout
    pub fn create_instance_with(&mut self, layout: InstanceConfig) -> PdResult<PdInstance> {
        let instance = PdInstance::with_factory(self.factory.as_ref(), layout)?;

        for path in &self.config.search_paths {
            if let Err(e) = instance.add_search_path(path) {
                // Instance is unusable without its search paths
                if let Err(dispose_err) = instance.dispose() {
                    log::warn!("Failed to dispose half-created instance: {}", dispose_err);
                }
                return Err(e);
            }
        }

        self.prune();
        self.instances.push(instance.clone());
        Ok(instance)
    }

    /// Add a search path for all future instances
    pub fn add_search_path(&mut self, path: &Path) {
        if !self.config.search_paths.iter().any(|p| p == path) {
            self.config.search_paths.push(path.to_path_buf());
        }
    }

    /// Forget instances that were disposed directly
    fn prune(&mut self) {
        self.instances.retain(|i| !i.is_disposed());
    }

    /// Instances that have not been disposed yet
    pub fn live_instances(&mut self) -> &[PdInstance] {
        self.prune();
        &self.instances
    }

    /// Look up a live instance by id
    pub fn instance(&mut self, id: u32) -> Option<PdInstance> {
        self.prune();
        self.instances.iter().find(|i| i.id() == id).cloned()
    }

    /// Dispose every live instance; returns how many were disposed
    pub fn shutdown(&mut self) -> usize {
        let mut disposed = 0;
        for instance in self.instances.drain(..) {
            match instance.dispose() {
                Ok(()) => disposed += 1,
                // Disposed by its owner in the meantime
                Err(e) if e.is_use_after_dispose() => {}
                Err(e) => log::warn!("Failed to dispose instance {}: {}", instance.id(), e),
            }
        }
        if disposed > 0 {
            log::info!("PdHost shut down {} instance(s)", disposed);
        }
        disposed
    }
}

impl Drop for PdHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup_patch_dir(temp_dir: &TempDir) -> PathBuf {
        let dir = temp_dir.path().join("patches");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("thru.pd"),
            r#"#N canvas 0 0 450 300 12;
#X obj 50 50 adc~;
#X obj 50 200 dac~;
#X connect 0 0 1 0;
#X connect 0 1 1 1;
"#,
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_instances_get_search_paths() {
        let temp_dir = TempDir::new().unwrap();
        let dir = setup_patch_dir(&temp_dir);

        let mut host = PdHost::new(HostConfig {
            search_paths: vec![dir],
            ..Default::default()
        });
        let pd = host.create_instance().unwrap();
        let patch = pd.open_patch("thru.pd").unwrap();
        assert!(patch.is_open());
    }

    #[test]
    fn test_live_instances_and_shutdown() {
        let mut host = PdHost::new(HostConfig::default());
        let a = host.create_instance().unwrap();
        let b = host.create_instance().unwrap();
        assert_eq!(host.live_instances().len(), 2);
        assert!(host.instance(b.id()).is_some());

        a.dispose().unwrap();
        assert_eq!(host.live_instances().len(), 1);
        assert!(host.instance(a.id()).is_none());

        assert_eq!(host.shutdown(), 1);
        assert!(b.is_disposed());
        assert_eq!(host.live_instances().len(), 0);
    }

    #[test]
    fn test_explicit_layout() {
        let mut host = PdHost::new(HostConfig::default());
        let pd = host
            .create_instance_with(InstanceConfig {
                inputs: 1,
                outputs: 4,
                sample_rate: 48000,
            })
            .unwrap();
        assert_eq!(pd.inputs(), 1);
        assert_eq!(pd.outputs(), 4);
        assert_eq!(pd.sample_rate(), 48000);
    }
}
