//! Instance-scoped MIDI
//!
//! Events sent here enter only the owning instance's patches, and
//! events the patches emit reach only this instance's listeners.

use std::sync::Arc;

use crossbeam::channel::Receiver;

use super::error::PdResult;
use super::instance::Shared;
use super::listeners::ListenerId;
use super::message::{MidiEvent, NoteOn};

/// MIDI port of one instance, obtained from
/// [`PdInstance::midi`](super::PdInstance::midi)
pub struct Midi<'a> {
    shared: &'a Arc<Shared>,
}

impl<'a> Midi<'a> {
    pub(crate) fn new(shared: &'a Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Validate and send an event into the instance
    pub fn send(&self, event: MidiEvent) -> PdResult<()> {
        event.validate()?;
        self.shared.call(|engine, _| engine.send_midi(&event))
    }

    pub fn send_note_on(&self, channel: i32, pitch: i32, velocity: i32) -> PdResult<()> {
        self.send(MidiEvent::note_on(channel, pitch, velocity))
    }

    pub fn send_control_change(&self, channel: i32, controller: i32, value: i32) -> PdResult<()> {
        self.send(MidiEvent::ControlChange {
            channel,
            controller,
            value,
        })
    }

    pub fn send_program_change(&self, channel: i32, program: i32) -> PdResult<()> {
        self.send(MidiEvent::ProgramChange { channel, program })
    }

    pub fn send_pitch_bend(&self, channel: i32, value: i32) -> PdResult<()> {
        self.send(MidiEvent::PitchBend { channel, value })
    }

    pub fn send_aftertouch(&self, channel: i32, value: i32) -> PdResult<()> {
        self.send(MidiEvent::Aftertouch { channel, value })
    }

    pub fn send_poly_aftertouch(&self, channel: i32, pitch: i32, value: i32) -> PdResult<()> {
        self.send(MidiEvent::PolyAftertouch {
            channel,
            pitch,
            value,
        })
    }

    /// Register a callback for every MIDI event this instance emits
    pub fn add_listener<F>(&self, listener: F) -> PdResult<ListenerId>
    where
        F: Fn(&MidiEvent) + Send + Sync + 'static,
    {
        self.shared.with_listeners(|l| l.midi.add(Arc::new(listener)))
    }

    /// Register a callback for note-on events only
    pub fn on_note_on<F>(&self, listener: F) -> PdResult<ListenerId>
    where
        F: Fn(NoteOn) + Send + Sync + 'static,
    {
        self.add_listener(move |event| {
            if let MidiEvent::NoteOn(note) = event {
                listener(*note);
            }
        })
    }

    pub fn remove_listener(&self, id: ListenerId) -> PdResult<bool> {
        self.shared.with_listeners(|l| l.midi.remove(id))
    }

    /// Channel receiving every MIDI event this instance emits
    pub fn subscribe(&self) -> PdResult<Receiver<MidiEvent>> {
        self.shared.with_listeners(|l| l.midi.subscribe())
    }
}
