//! Error types for the multi-instance PD host
//!
//! Every failure of an instance, patch, array or audio call is reported
//! through [`PdError`]. Errors raised by one instance never touch the
//! state of another instance.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during PD operations
#[derive(Debug, Error)]
pub enum PdError {
    /// Operation on an instance or patch that has already been disposed
    #[error("{what} has already been disposed")]
    UseAfterDispose { what: String },

    /// `process` called while the instance's DSP is stopped
    #[error("Instance {instance} is not running (call start() first)")]
    NotRunning { instance: u32 },

    /// Array access outside the array's current bounds
    #[error("Array '{array}' access out of range: offset {offset} + count {count} exceeds size {size}")]
    OutOfRange {
        array: String,
        offset: usize,
        count: usize,
        size: usize,
    },

    /// Empty or otherwise illegal receiver/array name
    #[error("Invalid name '{0}'")]
    InvalidName(String),

    /// No array with this name exists in the instance
    #[error("Array '{0}' not found")]
    ArrayNotFound(String),

    /// Patch file not found
    #[error("Patch file not found: {0}")]
    PatchNotFound(PathBuf),

    /// Patch file could not be understood by the engine
    #[error("Failed to parse patch '{path}' line {line}: {reason}")]
    PatchParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Failed to open a PD patch file
    #[error("Failed to open patch '{path}': {reason}")]
    PatchOpenFailed { path: PathBuf, reason: String },

    /// Failed to close a PD patch
    #[error("Failed to close patch: {0}")]
    PatchCloseFailed(String),

    /// Failed to initialize the engine
    #[error("Failed to initialize engine: {0}")]
    InitializationFailed(String),

    /// Failed to configure engine audio
    #[error("Failed to configure audio: {inputs} in / {outputs} out @ {sample_rate}Hz - {reason}")]
    AudioConfigFailed {
        inputs: usize,
        outputs: usize,
        sample_rate: u32,
        reason: String,
    },

    /// Failed to send message to PD
    #[error("Failed to send {msg_type} to receiver '{receiver}': {reason}")]
    SendFailed {
        msg_type: String,
        receiver: String,
        reason: String,
    },

    /// MIDI event with a field outside its legal range
    #[error("Invalid MIDI {field}: {value} (expected {min}..={max})")]
    InvalidMidi {
        field: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    /// Audio buffer too small for the requested number of ticks
    #[error("{direction} buffer holds {actual} samples, {expected} required")]
    BufferSize {
        direction: &'static str,
        expected: usize,
        actual: usize,
    },

    /// IO error while reading patches
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PdError {
    pub(crate) fn disposed(what: impl Into<String>) -> Self {
        PdError::UseAfterDispose { what: what.into() }
    }

    /// Whether this error reports use of a disposed instance or patch
    pub fn is_use_after_dispose(&self) -> bool {
        matches!(self, PdError::UseAfterDispose { .. })
    }
}

/// Result type for PD operations
pub type PdResult<T> = Result<T, PdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PdError::PatchNotFound(PathBuf::from("/foo/bar.pd"));
        assert!(err.to_string().contains("/foo/bar.pd"));

        let err = PdError::OutOfRange {
            array: "array1".to_string(),
            offset: 120,
            count: 16,
            size: 128,
        };
        let msg = err.to_string();
        assert!(msg.contains("array1"));
        assert!(msg.contains("128"));
    }

    #[test]
    fn test_use_after_dispose_predicate() {
        assert!(PdError::disposed("Instance 1").is_use_after_dispose());
        assert!(!PdError::NotRunning { instance: 1 }.is_use_after_dispose());
    }
}
