//! LibPdEngine - libpd-rs backed engine
//!
//! libpd keeps a process-wide "current instance" pointer that every C
//! call acts on. All calls below run under [`NATIVE_LOCK`] after making
//! this engine's instance current, so switching instances is atomic
//! with respect to other threads.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use libpd_rs::functions::patch::PatchFileHandle;
use libpd_rs::functions::receive::ReceiverHandle;
use libpd_rs::functions::{array, patch, receive, send};
use libpd_rs::types::Atom as PdAtom;
use libpd_rs::{Pd, PdAudioContext};

use super::super::error::{PdError, PdResult};
use super::super::message::{Atom, EngineEvent, Message, MessageEvent, MidiEvent, NoteOn};
use super::{Engine, EngineFactory, InstanceConfig, OpenedPatch, PatchId, PD_BLOCK_SIZE};

static NATIVE_LOCK: Mutex<()> = Mutex::new(());

fn native_lock() -> MutexGuard<'static, ()> {
    NATIVE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_pd_atoms(atoms: &[Atom]) -> Vec<PdAtom> {
    atoms
        .iter()
        .map(|a| match a {
            Atom::Float(v) => PdAtom::Float(*v as f64),
            Atom::Symbol(s) => PdAtom::Symbol(s.clone()),
        })
        .collect()
}

fn from_pd_atoms(atoms: &[PdAtom]) -> Vec<Atom> {
    atoms
        .iter()
        .map(|a| match a {
            PdAtom::Float(v) => Atom::Float(*v as f32),
            PdAtom::Symbol(s) => Atom::Symbol(s.clone()),
        })
        .collect()
}

/// One libpd instance
pub struct LibPdEngine {
    pd: Option<Pd>,
    ctx: PdAudioContext,
    patches: HashMap<PatchId, PatchFileHandle>,
    receivers: HashMap<String, ReceiverHandle>,
    /// Filled by the hooks registered on this instance
    events: Arc<Mutex<Vec<EngineEvent>>>,
    next_patch: u32,
}

// SAFETY: the libpd handles are only touched while NATIVE_LOCK is held
// and this instance has been made current, so moving the engine between
// threads cannot race another thread's use of the same native state.
unsafe impl Send for LibPdEngine {}

impl LibPdEngine {
    pub fn new(config: &InstanceConfig) -> PdResult<Self> {
        let _guard = native_lock();

        let pd = Pd::init_and_configure(
            config.inputs as i32,
            config.outputs as i32,
            config.sample_rate as i32,
        )
        .map_err(|e| PdError::AudioConfigFailed {
            inputs: config.inputs,
            outputs: config.outputs,
            sample_rate: config.sample_rate,
            reason: e.to_string(),
        })?;
        pd.set_as_current();
        let ctx = pd.audio_context();

        let events: Arc<Mutex<Vec<EngineEvent>>> = Arc::new(Mutex::new(Vec::new()));
        Self::register_hooks(&events);

        Ok(Self {
            pd: Some(pd),
            ctx,
            patches: HashMap::new(),
            receivers: HashMap::new(),
            events,
            next_patch: 1,
        })
    }

    /// Hooks are stored per libpd instance; must run while it is current
    fn register_hooks(events: &Arc<Mutex<Vec<EngineEvent>>>) {
        let push = |events: &Arc<Mutex<Vec<EngineEvent>>>| {
            let events = Arc::clone(events);
            move |event: EngineEvent| {
                events
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(event);
            }
        };

        let emit = push(events);
        receive::on_print(move |msg: &str| emit(EngineEvent::Print(msg.to_string())));

        let emit = push(events);
        receive::on_bang(move |source: &str| {
            emit(EngineEvent::Message(MessageEvent {
                receiver: source.to_string(),
                message: Message::Bang,
            }))
        });

        let emit = push(events);
        receive::on_float(move |source: &str, value: f32| {
            emit(EngineEvent::Message(MessageEvent {
                receiver: source.to_string(),
                message: Message::Float(value),
            }))
        });

        let emit = push(events);
        receive::on_symbol(move |source: &str, value: &str| {
            emit(EngineEvent::Message(MessageEvent {
                receiver: source.to_string(),
                message: Message::Symbol(value.to_string()),
            }))
        });

        let emit = push(events);
        receive::on_list(move |source: &str, atoms: &[PdAtom]| {
            emit(EngineEvent::Message(MessageEvent {
                receiver: source.to_string(),
                message: Message::List(from_pd_atoms(atoms)),
            }))
        });

        let emit = push(events);
        receive::on_message(move |source: &str, selector: &str, atoms: &[PdAtom]| {
            emit(EngineEvent::Message(MessageEvent {
                receiver: source.to_string(),
                message: Message::Typed {
                    selector: selector.to_string(),
                    args: from_pd_atoms(atoms),
                },
            }))
        });

        let emit = push(events);
        receive::on_midi_note_on(move |channel: i32, pitch: i32, velocity: i32| {
            emit(EngineEvent::Midi(MidiEvent::NoteOn(NoteOn {
                channel,
                pitch,
                velocity,
            })))
        });

        let emit = push(events);
        receive::on_midi_control_change(move |channel: i32, controller: i32, value: i32| {
            emit(EngineEvent::Midi(MidiEvent::ControlChange {
                channel,
                controller,
                value,
            }))
        });

        let emit = push(events);
        receive::on_midi_program_change(move |channel: i32, program: i32| {
            emit(EngineEvent::Midi(MidiEvent::ProgramChange { channel, program }))
        });

        let emit = push(events);
        receive::on_midi_pitch_bend(move |channel: i32, value: i32| {
            emit(EngineEvent::Midi(MidiEvent::PitchBend { channel, value }))
        });

        let emit = push(events);
        receive::on_midi_after_touch(move |channel: i32, value: i32| {
            emit(EngineEvent::Midi(MidiEvent::Aftertouch { channel, value }))
        });

        let emit = push(events);
        receive::on_midi_poly_after_touch(move |channel: i32, pitch: i32, value: i32| {
            emit(EngineEvent::Midi(MidiEvent::PolyAftertouch {
                channel,
                pitch,
                value,
            }))
        });
    }

    /// Take the native lock and make this instance current
    fn enter(&self) -> PdResult<MutexGuard<'static, ()>> {
        let guard = native_lock();
        let pd = self
            .pd
            .as_ref()
            .ok_or_else(|| PdError::disposed("libpd instance"))?;
        pd.set_as_current();
        Ok(guard)
    }

    fn send_failed(kind: &str, receiver: &str, reason: impl ToString) -> PdError {
        PdError::SendFailed {
            msg_type: kind.to_string(),
            receiver: receiver.to_string(),
            reason: reason.to_string(),
        }
    }

    fn flush_queues() {
        receive::receive_messages_from_pd();
        receive::receive_midi_messages_from_pd();
    }
}

impl Engine for LibPdEngine {
    fn block_size(&self) -> usize {
        PD_BLOCK_SIZE
    }

    fn add_search_path(&mut self, path: &Path) -> PdResult<()> {
        let _guard = self.enter()?;
        if let Some(pd) = self.pd.as_mut() {
            pd.add_path_to_search_paths(path).map_err(|e| {
                PdError::InitializationFailed(format!("Failed to add search path: {}", e))
            })?;
        }
        Ok(())
    }

    fn open_patch(&mut self, path: &Path) -> PdResult<OpenedPatch> {
        if !path.exists() {
            return Err(PdError::PatchNotFound(path.to_path_buf()));
        }
        let _guard = self.enter()?;

        let handle = patch::open_patch(path).map_err(|e| PdError::PatchOpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let dollar_zero = patch::get_dollar_zero(&handle).map_err(|e| PdError::PatchOpenFailed {
            path: path.to_path_buf(),
            reason: format!("Failed to get $0: {}", e),
        })?;

        let id = PatchId(self.next_patch);
        self.next_patch += 1;
        self.patches.insert(id, handle);
        Self::flush_queues();

        Ok(OpenedPatch { id, dollar_zero })
    }

    fn close_patch(&mut self, id: PatchId) -> PdResult<()> {
        let _guard = self.enter()?;
        let handle = self
            .patches
            .remove(&id)
            .ok_or_else(|| PdError::disposed(format!("Patch {}", id.0)))?;
        patch::close_patch(handle).map_err(|e| PdError::PatchCloseFailed(e.to_string()))
    }

    fn bind(&mut self, receiver: &str) -> PdResult<()> {
        if self.receivers.contains_key(receiver) {
            return Ok(());
        }
        let _guard = self.enter()?;
        let handle = receive::start_listening_from(receiver)
            .map_err(|e| Self::send_failed("bind", receiver, e))?;
        self.receivers.insert(receiver.to_string(), handle);
        Ok(())
    }

    fn unbind(&mut self, receiver: &str) -> PdResult<()> {
        if let Some(handle) = self.receivers.remove(receiver) {
            let _guard = self.enter()?;
            receive::stop_listening_from(handle);
        }
        Ok(())
    }

    fn send(&mut self, receiver: &str, message: &Message) -> PdResult<()> {
        let _guard = self.enter()?;
        let result = match message {
            Message::Bang => send::send_bang_to(receiver),
            Message::Float(v) => send::send_float_to(receiver, *v),
            Message::Symbol(s) => send::send_symbol_to(receiver, s),
            Message::List(atoms) => send::send_list_to(receiver, &to_pd_atoms(atoms)),
            Message::Typed { selector, args } => {
                send::send_message_to(receiver, selector, &to_pd_atoms(args))
            }
        };
        result.map_err(|e| Self::send_failed(message.kind(), receiver, e))?;
        Self::flush_queues();
        Ok(())
    }

    fn send_midi(&mut self, event: &MidiEvent) -> PdResult<()> {
        let _guard = self.enter()?;
        let result = match *event {
            MidiEvent::NoteOn(n) => send::send_note_on(n.channel, n.pitch, n.velocity),
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => send::send_control_change(channel, controller, value),
            MidiEvent::ProgramChange { channel, program } => {
                send::send_program_change(channel, program)
            }
            MidiEvent::PitchBend { channel, value } => send::send_pitch_bend(channel, value),
            MidiEvent::Aftertouch { channel, value } => send::send_after_touch(channel, value),
            MidiEvent::PolyAftertouch {
                channel,
                pitch,
                value,
            } => send::send_poly_after_touch(channel, pitch, value),
        };
        result.map_err(|e| Self::send_failed("midi", "midi", e))?;
        Self::flush_queues();
        Ok(())
    }

    fn array_size(&mut self, name: &str) -> PdResult<Option<usize>> {
        let _guard = self.enter()?;
        Ok(array::array_size(name).ok().map(|size| size as usize))
    }

    fn resize_array(&mut self, name: &str, size: usize) -> PdResult<()> {
        let _guard = self.enter()?;
        array::resize_array(name, size as i32)
            .map_err(|_| PdError::ArrayNotFound(name.to_string()))
    }

    fn read_array(&mut self, name: &str, offset: usize, dest: &mut [f32]) -> PdResult<()> {
        let _guard = self.enter()?;
        let count = dest.len() as i32;
        array::read_float_array_from(name, offset as i32, dest, count)
            .map_err(|_| PdError::ArrayNotFound(name.to_string()))
    }

    fn write_array(&mut self, name: &str, offset: usize, values: &[f32]) -> PdResult<()> {
        let _guard = self.enter()?;
        array::write_float_array_to(name, offset as i32, values, values.len() as i32)
            .map_err(|_| PdError::ArrayNotFound(name.to_string()))
    }

    fn set_dsp(&mut self, on: bool) -> PdResult<()> {
        let _guard = self.enter()?;
        if let Some(pd) = self.pd.as_mut() {
            pd.activate_audio(on).map_err(|e| {
                PdError::InitializationFailed(format!("Failed to set audio active: {}", e))
            })?;
        }
        Ok(())
    }

    fn process(&mut self, ticks: usize, input: &[f32], output: &mut [f32]) -> PdResult<()> {
        let _guard = self.enter()?;
        self.ctx.process_float(ticks as i32, input, output);
        Self::flush_queues();
        Ok(())
    }

    fn drain_events(&mut self, out: &mut Vec<EngineEvent>) {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        out.append(&mut events);
    }

    fn shutdown(&mut self) {
        let _guard = native_lock();
        if let Some(mut pd) = self.pd.take() {
            pd.set_as_current();
            if let Err(e) = pd.activate_audio(false) {
                log::warn!("Failed to stop DSP during shutdown: {}", e);
            }
            for (_, handle) in self.patches.drain() {
                if let Err(e) = patch::close_patch(handle) {
                    log::warn!("Failed to close patch during shutdown: {}", e);
                }
            }
            for (_, handle) in self.receivers.drain() {
                receive::stop_listening_from(handle);
            }
            drop(pd);
        }
    }
}

impl Drop for LibPdEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Factory for [`LibPdEngine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LibPdEngineFactory;

impl EngineFactory for LibPdEngineFactory {
    fn name(&self) -> &'static str {
        "libpd"
    }

    fn create(&self, config: &InstanceConfig) -> PdResult<Box<dyn Engine>> {
        Ok(Box::new(LibPdEngine::new(config)?))
    }
}
