//! Named float arrays of one instance
//!
//! Every access is bounds-checked against the array's current size;
//! reads and writes past the end fail with `OutOfRange` instead of
//! being clipped or zero-filled.

use std::fmt;
use std::sync::Arc;

use super::error::{PdError, PdResult};
use super::instance::Shared;

/// Handle to a named array inside one instance
#[derive(Clone)]
pub struct PdArray {
    shared: Arc<Shared>,
    name: String,
}

impl PdArray {
    pub(crate) fn new(shared: Arc<Shared>, name: String) -> Self {
        Self { shared, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn current_size(&self, engine: &mut dyn super::engine::Engine) -> PdResult<usize> {
        engine
            .array_size(&self.name)?
            .ok_or_else(|| PdError::ArrayNotFound(self.name.clone()))
    }

    fn check_range(&self, offset: usize, count: usize, size: usize) -> PdResult<()> {
        match offset.checked_add(count) {
            Some(end) if end <= size => Ok(()),
            _ => Err(PdError::OutOfRange {
                array: self.name.clone(),
                offset,
                count,
                size,
            }),
        }
    }

    /// Current number of elements
    pub fn size(&self) -> PdResult<usize> {
        self.shared.call(|engine, _| self.current_size(engine))
    }

    /// Resize this instance's array; new elements are zero
    pub fn resize(&self, size: usize) -> PdResult<()> {
        if size == 0 {
            return Err(PdError::OutOfRange {
                array: self.name.clone(),
                offset: 0,
                count: 0,
                size: 0,
            });
        }
        self.shared.call(|engine, _| {
            self.current_size(engine)?;
            engine.resize_array(&self.name, size)
        })?;
        log::debug!(
            "Instance {}: resized array '{}' to {}",
            self.shared.id(),
            self.name,
            size
        );
        Ok(())
    }

    /// Read `count` values starting at `offset`
    pub fn read(&self, offset: usize, count: usize) -> PdResult<Vec<f32>> {
        let mut values = vec![0.0; count];
        self.read_into(offset, &mut values)?;
        Ok(values)
    }

    /// Fill `dest` with values starting at `offset`
    pub fn read_into(&self, offset: usize, dest: &mut [f32]) -> PdResult<()> {
        self.shared.call(|engine, _| {
            let size = self.current_size(engine)?;
            self.check_range(offset, dest.len(), size)?;
            engine.read_array(&self.name, offset, dest)
        })
    }

    /// Write `values` starting at `offset`
    pub fn write(&self, offset: usize, values: &[f32]) -> PdResult<()> {
        self.shared.call(|engine, _| {
            let size = self.current_size(engine)?;
            self.check_range(offset, values.len(), size)?;
            engine.write_array(&self.name, offset, values)
        })
    }

    /// Set every element to `value`
    pub fn fill(&self, value: f32) -> PdResult<()> {
        self.shared.call(|engine, _| {
            let size = self.current_size(engine)?;
            engine.write_array(&self.name, 0, &vec![value; size])
        })
    }
}

impl fmt::Debug for PdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdArray")
            .field("instance", &self.shared.id())
            .field("name", &self.name)
            .finish()
    }
}
