//! The native engine seam
//!
//! An [`Engine`] is one native PD context. It knows nothing about other
//! contexts: the instance layer owns exactly one engine and serializes
//! every call into it. Backends:
//!
//! - [`ReferenceEngine`]: in-process engine for pass-through patches
//! - `LibPdEngine` (feature `libpd`): libpd via libpd-rs

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::PdResult;
use super::message::{EngineEvent, Message, MidiEvent};

mod patch_file;
mod reference;

#[cfg(feature = "libpd")]
mod libpd;

pub use patch_file::{ArrayDecl, Canvas, Connection, MidiThru, PatchFile, PatchObject};
pub use reference::{ReferenceEngine, ReferenceEngineFactory};

#[cfg(feature = "libpd")]
pub use libpd::{LibPdEngine, LibPdEngineFactory};

/// libpd's fixed DSP block size in frames
pub const PD_BLOCK_SIZE: usize = 64;

/// Identifier of an open patch, unique within one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchId(pub u32);

/// Result of opening a patch
#[derive(Debug, Clone, Copy)]
pub struct OpenedPatch {
    pub id: PatchId,
    /// The $0 value for instance-scoped receives
    pub dollar_zero: i32,
}

/// Audio configuration an engine is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub inputs: usize,
    pub outputs: usize,
    pub sample_rate: u32,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            inputs: 2,
            outputs: 2,
            sample_rate: crate::types::DEFAULT_SAMPLE_RATE,
        }
    }
}

/// One native engine context
///
/// Calls are never made concurrently on the same engine; the owning
/// instance holds its lock for the duration of each call.
pub trait Engine: Send {
    /// Frames per DSP tick
    fn block_size(&self) -> usize;

    fn add_search_path(&mut self, path: &Path) -> PdResult<()>;

    fn open_patch(&mut self, path: &Path) -> PdResult<OpenedPatch>;

    fn close_patch(&mut self, id: PatchId) -> PdResult<()>;

    /// Subscribe the host to messages sent to `receiver`
    fn bind(&mut self, receiver: &str) -> PdResult<()>;

    fn unbind(&mut self, receiver: &str) -> PdResult<()>;

    fn send(&mut self, receiver: &str, message: &Message) -> PdResult<()>;

    fn send_midi(&mut self, event: &MidiEvent) -> PdResult<()>;

    /// Size of the named array, `None` if no such array exists
    fn array_size(&mut self, name: &str) -> PdResult<Option<usize>>;

    fn resize_array(&mut self, name: &str, size: usize) -> PdResult<()>;

    /// Read `dest.len()` values starting at `offset` (bounds already checked)
    fn read_array(&mut self, name: &str, offset: usize, dest: &mut [f32]) -> PdResult<()>;

    /// Write `values` starting at `offset` (bounds already checked)
    fn write_array(&mut self, name: &str, offset: usize, values: &[f32]) -> PdResult<()>;

    fn set_dsp(&mut self, on: bool) -> PdResult<()>;

    /// Run `ticks` DSP blocks over interleaved buffers of the exact size
    fn process(&mut self, ticks: usize, input: &[f32], output: &mut [f32]) -> PdResult<()>;

    /// Move everything the engine emitted since the last call into `out`
    fn drain_events(&mut self, out: &mut Vec<EngineEvent>);

    /// Release the native context; no other call follows
    fn shutdown(&mut self);
}

/// Creates engines for new instances
pub trait EngineFactory: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &'static str;

    fn create(&self, config: &InstanceConfig) -> PdResult<Box<dyn Engine>>;
}

/// Which backend a host should create engines with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Reference,
    #[cfg(feature = "libpd")]
    Libpd,
}

impl Backend {
    pub fn factory(self) -> Box<dyn EngineFactory> {
        match self {
            Backend::Reference => Box::new(ReferenceEngineFactory),
            #[cfg(feature = "libpd")]
            Backend::Libpd => Box::new(LibPdEngineFactory),
        }
    }
}
