//! Configuration for pdhost applications
//!
//! - Generic YAML config loading/saving
//! - [`HostConfig`] describing how instances are created
//!
//! # Usage
//!
//! ```ignore
//! use pdhost_core::config::{load_config, save_config, HostConfig};
//!
//! let config: HostConfig = load_config(&config_path);
//! save_config(&config, &config_path)?;
//! ```

mod host;
mod io;

pub use host::HostConfig;
pub use io::{load_config, read_config, save_config};
