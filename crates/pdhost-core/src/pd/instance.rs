//! PdInstance - one isolated engine context
//!
//! Each instance owns exactly one [`Engine`] together with its patches,
//! receiver bindings, arrays, listeners and DSP state. Nothing is shared
//! between instances: every call takes the instance's own lock, runs the
//! engine, collects whatever the engine emitted, releases the lock and
//! only then invokes that instance's listeners.
//!
//! Instances are torn down with [`PdInstance::dispose`]. Any call made
//! afterwards, through the instance or through a [`Patch`] or
//! [`PdArray`] obtained from it, fails with `UseAfterDispose`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::array::PdArray;
use super::engine::{Engine, EngineFactory, InstanceConfig, PatchId, ReferenceEngineFactory};
use super::error::{PdError, PdResult};
use super::listeners::Registry;
use super::message::{EngineEvent, MessageEvent, MidiEvent};
use super::messaging::Messaging;
use super::midi::Midi;
use super::patch::Patch;

static NEXT_INSTANCE_ID: AtomicU32 = AtomicU32::new(1);

/// Route an engine console line to the matching log level
fn log_print(instance: u32, msg: &str) {
    let msg = msg.trim();
    if msg.is_empty() {
        return;
    }

    if msg.contains("error") || msg.contains("can't") || msg.contains("couldn't") {
        log::error!("[PD {}] {}", instance, msg);
    } else if msg.contains("warning") || msg.contains("deprecated") {
        log::warn!("[PD {}] {}", instance, msg);
    } else {
        log::info!("[PD {}] {}", instance, msg);
    }
}

/// Names must be non-empty PD symbols without separators
pub(crate) fn validate_name(name: &str) -> PdResult<()> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ';' || c == ',') {
        return Err(PdError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub(crate) struct PatchRecord {
    pub(crate) path: PathBuf,
    pub(crate) dollar_zero: i32,
}

/// Bookkeeping the isolation layer keeps next to the engine
#[derive(Default)]
pub(crate) struct Book {
    pub(crate) patches: BTreeMap<PatchId, PatchRecord>,
    pub(crate) bound: BTreeSet<String>,
    pub(crate) running: bool,
}

pub(crate) struct State {
    /// `None` once disposed
    engine: Option<Box<dyn Engine>>,
    book: Book,
}

pub(crate) struct Listeners {
    pub(crate) messages: Registry<MessageEvent>,
    pub(crate) midi: Registry<MidiEvent>,
}

/// State shared by an instance and every handle derived from it
pub(crate) struct Shared {
    id: u32,
    config: InstanceConfig,
    block_size: usize,
    backend: &'static str,
    state: Mutex<State>,
    listeners: Mutex<Listeners>,
}

impl Shared {
    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        // A panicking listener never holds this lock, and engine calls
        // leave the book consistent, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Touch the listener registries of a live instance
    ///
    /// Disposal is checked with the listener lock held, so a registration
    /// either fails here or is cleared by `dispose`.
    pub(crate) fn with_listeners<R>(&self, f: impl FnOnce(&mut Listeners) -> R) -> PdResult<R> {
        let mut listeners = self.lock_listeners();
        if self.is_disposed() {
            return Err(PdError::disposed(format!("Instance {}", self.id)));
        }
        Ok(f(&mut listeners))
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.lock_state().engine.is_none()
    }

    /// Read the bookkeeping of a live instance
    pub(crate) fn with_book<R>(&self, f: impl FnOnce(&Book) -> R) -> PdResult<R> {
        let state = self.lock_state();
        if state.engine.is_none() {
            return Err(PdError::disposed(format!("Instance {}", self.id)));
        }
        Ok(f(&state.book))
    }

    /// Run one engine call, then deliver what it emitted
    pub(crate) fn call<R>(
        &self,
        f: impl FnOnce(&mut dyn Engine, &mut Book) -> PdResult<R>,
    ) -> PdResult<R> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.lock_state();
            let State { engine, book } = &mut *state;
            let engine = engine
                .as_mut()
                .ok_or_else(|| PdError::disposed(format!("Instance {}", self.id)))?;
            let result = f(&mut **engine, book);
            engine.drain_events(&mut events);
            result
        };
        self.dispatch(events);
        result
    }

    fn dispatch(&self, events: Vec<EngineEvent>) {
        if events.is_empty() {
            return;
        }

        let mut messages = Vec::new();
        let mut midi = Vec::new();
        for event in events {
            match event {
                EngineEvent::Message(m) => messages.push(m),
                EngineEvent::Midi(m) => midi.push(m),
                EngineEvent::Print(line) => log_print(self.id, &line),
            }
        }

        let (message_callbacks, midi_callbacks) = {
            let mut listeners = self.lock_listeners();
            (
                listeners.messages.prepare(&messages),
                listeners.midi.prepare(&midi),
            )
        };

        for event in &messages {
            for cb in &message_callbacks {
                cb(event);
            }
        }
        for event in &midi {
            for cb in &midi_callbacks {
                cb(event);
            }
        }
    }

    fn dispose(&self) -> PdResult<()> {
        let mut state = self.lock_state();
        let mut engine = state
            .engine
            .take()
            .ok_or_else(|| PdError::disposed(format!("Instance {}", self.id)))?;
        let book = std::mem::take(&mut state.book);
        drop(state);

        teardown(self.id, &mut *engine, book);

        let mut listeners = self.lock_listeners();
        log::debug!(
            "Instance {}: dropping {} message and {} MIDI listener(s)",
            self.id,
            listeners.messages.len(),
            listeners.midi.len()
        );
        listeners.messages.clear();
        listeners.midi.clear();
        Ok(())
    }
}

/// Release everything an engine still holds; failures are logged only
fn teardown(id: u32, engine: &mut dyn Engine, book: Book) {
    if book.running {
        if let Err(e) = engine.set_dsp(false) {
            log::warn!("Instance {}: failed to stop DSP during dispose: {}", id, e);
        }
    }
    for (patch, record) in book.patches {
        if let Err(e) = engine.close_patch(patch) {
            log::warn!(
                "Instance {}: failed to close {} ($0={}) during dispose: {}",
                id,
                record.path.display(),
                record.dollar_zero,
                e
            );
        }
    }
    for receiver in book.bound {
        if let Err(e) = engine.unbind(&receiver) {
            log::warn!("Instance {}: failed to unbind '{}': {}", id, receiver, e);
        }
    }
    engine.shutdown();
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(mut engine) = state.engine.take() {
            log::warn!(
                "Instance {} dropped without dispose(); releasing engine",
                self.id
            );
            let book = std::mem::take(&mut state.book);
            teardown(self.id, &mut *engine, book);
        }
    }
}

/// Handle to one engine instance
///
/// Cloning the handle does not create a new instance; all clones refer
/// to the same engine context.
#[derive(Clone)]
pub struct PdInstance {
    shared: Arc<Shared>,
}

impl PdInstance {
    /// Create an instance on the in-process reference engine
    pub fn new(inputs: usize, outputs: usize, sample_rate: u32) -> PdResult<Self> {
        Self::with_factory(
            &ReferenceEngineFactory,
            InstanceConfig {
                inputs,
                outputs,
                sample_rate,
            },
        )
    }

    /// Create an instance using the given engine backend
    pub fn with_factory(factory: &dyn EngineFactory, config: InstanceConfig) -> PdResult<Self> {
        let engine = factory.create(&config)?;
        let block_size = engine.block_size();
        let id = NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed);

        log::info!(
            "PdInstance {} created ({} backend, {} in / {} out @ {}Hz, block {})",
            id,
            factory.name(),
            config.inputs,
            config.outputs,
            config.sample_rate,
            block_size
        );

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                config,
                block_size,
                backend: factory.name(),
                state: Mutex::new(State {
                    engine: Some(engine),
                    book: Book::default(),
                }),
                listeners: Mutex::new(Listeners {
                    messages: Registry::new(),
                    midi: Registry::new(),
                }),
            }),
        })
    }

    /// Process-unique instance id
    pub fn id(&self) -> u32 {
        self.shared.id
    }

    pub fn inputs(&self) -> usize {
        self.shared.config.inputs
    }

    pub fn outputs(&self) -> usize {
        self.shared.config.outputs
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.config.sample_rate
    }

    /// Frames per DSP tick
    pub fn block_size(&self) -> usize {
        self.shared.block_size
    }

    pub fn backend(&self) -> &'static str {
        self.shared.backend
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Add a search path for patches, abstractions and externals
    pub fn add_search_path(&self, path: &Path) -> PdResult<()> {
        self.shared.call(|engine, _| engine.add_search_path(path))?;
        log::debug!(
            "Instance {}: added search path {}",
            self.shared.id,
            path.display()
        );
        Ok(())
    }

    /// Open a patch file in this instance
    pub fn open_patch(&self, path: impl AsRef<Path>) -> PdResult<Patch> {
        let path = path.as_ref();
        let opened = self.shared.call(|engine, book| {
            let opened = engine.open_patch(path)?;
            book.patches.insert(
                opened.id,
                PatchRecord {
                    path: path.to_path_buf(),
                    dollar_zero: opened.dollar_zero,
                },
            );
            Ok(opened)
        })?;

        log::info!(
            "Instance {}: opened patch {} ($0={})",
            self.shared.id,
            path.display(),
            opened.dollar_zero
        );

        Ok(Patch::new(
            Arc::clone(&self.shared),
            opened.id,
            opened.dollar_zero,
            path.to_path_buf(),
        ))
    }

    /// Number of patches currently open
    pub fn open_patches(&self) -> PdResult<usize> {
        self.shared.with_book(|book| book.patches.len())
    }

    /// Receiver bindings and message sending
    pub fn messaging(&self) -> Messaging<'_> {
        Messaging::new(&self.shared)
    }

    /// MIDI sending and listeners
    pub fn midi(&self) -> Midi<'_> {
        Midi::new(&self.shared)
    }

    /// Look up a named array of this instance
    pub fn array(&self, name: &str) -> PdResult<PdArray> {
        validate_name(name)?;
        let size = self.shared.call(|engine, _| engine.array_size(name))?;
        if size.is_none() {
            return Err(PdError::ArrayNotFound(name.to_string()));
        }
        Ok(PdArray::new(Arc::clone(&self.shared), name.to_string()))
    }

    /// Turn DSP on; `process` is valid until [`stop`](Self::stop)
    pub fn start(&self) -> PdResult<()> {
        self.shared.call(|engine, book| {
            if !book.running {
                engine.set_dsp(true)?;
                book.running = true;
            }
            Ok(())
        })?;
        log::debug!("Instance {}: DSP started", self.shared.id);
        Ok(())
    }

    pub fn stop(&self) -> PdResult<()> {
        self.shared.call(|engine, book| {
            if book.running {
                engine.set_dsp(false)?;
                book.running = false;
            }
            Ok(())
        })?;
        log::debug!("Instance {}: DSP stopped", self.shared.id);
        Ok(())
    }

    pub fn is_running(&self) -> PdResult<bool> {
        self.shared.with_book(|book| book.running)
    }

    /// Ticks needed to cover `frames` frames, rounded down
    pub fn calculate_ticks(&self, frames: usize) -> usize {
        frames / self.shared.block_size
    }

    /// Run `ticks` DSP blocks over interleaved buffers
    ///
    /// Consumes `ticks * block_size * inputs` samples from `input` and
    /// writes `ticks * block_size * outputs` samples to `output`.
    /// Samples beyond those counts are left untouched.
    pub fn process(&self, ticks: usize, input: &[f32], output: &mut [f32]) -> PdResult<()> {
        let frames = ticks.checked_mul(self.shared.block_size);
        let needed_in = required_samples(frames, self.shared.config.inputs, "Input", input.len())?;
        let needed_out =
            required_samples(frames, self.shared.config.outputs, "Output", output.len())?;

        let id = self.shared.id;
        self.shared.call(|engine, book| {
            if !book.running {
                return Err(PdError::NotRunning { instance: id });
            }
            if ticks == 0 {
                return Ok(());
            }
            engine.process(ticks, &input[..needed_in], &mut output[..needed_out])
        })
    }

    /// Release the engine and everything this instance owns
    ///
    /// Patches still open are closed here; patches already disposed are
    /// skipped. Calling this twice fails with `UseAfterDispose`.
    pub fn dispose(&self) -> PdResult<()> {
        self.shared.dispose()?;
        log::info!("PdInstance {} disposed", self.shared.id);
        Ok(())
    }

    /// Whether two handles refer to the same instance
    pub fn same_instance(&self, other: &PdInstance) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

/// Samples `frames` frames of `channels` take, checked against `actual`
///
/// A count that does not fit in `usize` is reported as `usize::MAX`.
fn required_samples(
    frames: Option<usize>,
    channels: usize,
    direction: &'static str,
    actual: usize,
) -> PdResult<usize> {
    match frames.and_then(|f| f.checked_mul(channels)) {
        Some(needed) if needed <= actual => Ok(needed),
        needed => Err(PdError::BufferSize {
            direction,
            expected: needed.unwrap_or(usize::MAX),
            actual,
        }),
    }
}

impl fmt::Debug for PdInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdInstance")
            .field("id", &self.shared.id)
            .field("backend", &self.shared.backend)
            .field("config", &self.shared.config)
            .finish()
    }
}
