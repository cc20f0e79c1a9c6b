//! Message and MIDI types exchanged with an engine instance
//!
//! These mirror the atoms PD passes between objects: floats, symbols,
//! lists and typed messages, plus the channel voice MIDI events libpd
//! exposes to its host.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{PdError, PdResult};

/// A single PD atom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Atom {
    Float(f32),
    Symbol(String),
}

impl From<f32> for Atom {
    fn from(value: f32) -> Self {
        Atom::Float(value)
    }
}

impl From<&str> for Atom {
    fn from(value: &str) -> Self {
        Atom::Symbol(value.to_string())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Float(v) => write!(f, "{}", v),
            Atom::Symbol(s) => write!(f, "{}", s),
        }
    }
}

/// A message sent to, or received from, a named receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Bang,
    Float(f32),
    Symbol(String),
    List(Vec<Atom>),
    /// Message with an explicit selector, e.g. `set 1 2`
    Typed { selector: String, args: Vec<Atom> },
}

impl Message {
    /// Short type name used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Bang => "bang",
            Message::Float(_) => "float",
            Message::Symbol(_) => "symbol",
            Message::List(_) => "list",
            Message::Typed { .. } => "message",
        }
    }

    /// The float payload, if this is a float message
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Message::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f32> for Message {
    fn from(value: f32) -> Self {
        Message::Float(value)
    }
}

/// PD floats are single precision; the value is narrowed
impl From<f64> for Message {
    fn from(value: f64) -> Self {
        Message::Float(value as f32)
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Message::Symbol(value.to_string())
    }
}

/// A message delivered to a bound receiver
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Name of the receiver the message was sent to
    pub receiver: String,
    pub message: Message,
}

/// Note-on payload, as delivered to note-on listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteOn {
    pub channel: i32,
    pub pitch: i32,
    pub velocity: i32,
}

/// MIDI channel voice events understood by the engine
///
/// Channels are zero-based; libpd addresses ports by `channel / 16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn(NoteOn),
    ControlChange { channel: i32, controller: i32, value: i32 },
    ProgramChange { channel: i32, program: i32 },
    PitchBend { channel: i32, value: i32 },
    Aftertouch { channel: i32, value: i32 },
    PolyAftertouch { channel: i32, pitch: i32, value: i32 },
}

/// Highest channel number accepted (16 ports x 16 channels)
pub const MAX_MIDI_CHANNEL: i32 = 255;

fn check(field: &'static str, value: i32, min: i32, max: i32) -> PdResult<()> {
    if value < min || value > max {
        return Err(PdError::InvalidMidi {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl MidiEvent {
    pub fn note_on(channel: i32, pitch: i32, velocity: i32) -> Self {
        MidiEvent::NoteOn(NoteOn {
            channel,
            pitch,
            velocity,
        })
    }

    /// Channel the event is addressed to
    pub fn channel(&self) -> i32 {
        match *self {
            MidiEvent::NoteOn(n) => n.channel,
            MidiEvent::ControlChange { channel, .. }
            | MidiEvent::ProgramChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. }
            | MidiEvent::Aftertouch { channel, .. }
            | MidiEvent::PolyAftertouch { channel, .. } => channel,
        }
    }

    /// Check every field against its MIDI range
    pub fn validate(&self) -> PdResult<()> {
        check("channel", self.channel(), 0, MAX_MIDI_CHANNEL)?;
        match *self {
            MidiEvent::NoteOn(n) => {
                check("pitch", n.pitch, 0, 127)?;
                check("velocity", n.velocity, 0, 127)
            }
            MidiEvent::ControlChange {
                controller, value, ..
            } => {
                check("controller", controller, 0, 127)?;
                check("value", value, 0, 127)
            }
            MidiEvent::ProgramChange { program, .. } => check("program", program, 0, 127),
            MidiEvent::PitchBend { value, .. } => check("bend", value, -8192, 8191),
            MidiEvent::Aftertouch { value, .. } => check("value", value, 0, 127),
            MidiEvent::PolyAftertouch { pitch, value, .. } => {
                check("pitch", pitch, 0, 127)?;
                check("value", value, 0, 127)
            }
        }
    }
}

/// Output produced by an engine during a call, drained by the instance
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Message(MessageEvent),
    Midi(MidiEvent),
    Print(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_validation() {
        assert!(MidiEvent::note_on(1, 64, 32).validate().is_ok());
        assert!(MidiEvent::note_on(0, 128, 32).validate().is_err());
        assert!(MidiEvent::note_on(-1, 64, 32).validate().is_err());
        assert!(MidiEvent::note_on(MAX_MIDI_CHANNEL + 1, 64, 32)
            .validate()
            .is_err());
    }

    #[test]
    fn test_pitch_bend_range() {
        let ok = MidiEvent::PitchBend {
            channel: 0,
            value: -8192,
        };
        assert!(ok.validate().is_ok());

        let err = MidiEvent::PitchBend {
            channel: 0,
            value: 8192,
        }
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("bend"));
    }

    #[test]
    fn test_message_kind_and_payload() {
        assert_eq!(Message::from(42.0).kind(), "float");
        assert_eq!(Message::from(42.0).as_float(), Some(42.0));
        assert_eq!(Message::Bang.as_float(), None);
        assert_eq!(Message::from("spam"), Message::Symbol("spam".to_string()));
    }
}
