//! Isolated multi-instance hosting of a Pure Data engine
//!
//! Several engine contexts can live in one process without seeing each
//! other's state:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         PdHost                              │
//! │  - Creates instances with the configured engine backend     │
//! │  - Hands out search paths, disposes leftovers on shutdown   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌──────────────────┼──────────────────┐
//!          ▼                  ▼                  ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │   PdInstance    │ │   PdInstance    │ │   PdInstance    │
//! │  Engine (own)   │ │  Engine (own)   │ │  Engine (own)   │
//! │  receivers      │ │  receivers      │ │  receivers      │
//! │  arrays, MIDI   │ │  arrays, MIDI   │ │  arrays, MIDI   │
//! │  DSP state      │ │  DSP state      │ │  DSP state      │
//! │  ┌───────────┐  │ │  ┌───────────┐  │ │  ┌───────────┐  │
//! │  │  Patch    │  │ │  │  Patch    │  │ │  │  Patch    │  │
//! │  └───────────┘  │ │  └───────────┘  │ │  └───────────┘  │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! # Lifetimes
//!
//! Instances and patches are released explicitly with `dispose()`. Any
//! order is safe: disposing an instance closes only the patches that are
//! still open, and every later use of a disposed instance or patch fails
//! with [`PdError::UseAfterDispose`].
//!
//! # Example
//!
//! ```ignore
//! use pdhost_core::pd::PdInstance;
//!
//! let pd = PdInstance::new(2, 2, 44100)?;
//! let patch = pd.open_patch("thru.pd")?;
//!
//! pd.messaging().bind("spam")?;
//! pd.messaging().on_receiver("spam", |msg| println!("got {:?}", msg))?;
//! pd.messaging().send("spam", 42.0)?;
//!
//! pd.start()?;
//! pd.process(1, &input, &mut output)?;
//! pd.stop()?;
//!
//! patch.dispose()?;
//! pd.dispose()?;
//! ```

mod array;
mod engine;
mod error;
mod host;
mod instance;
mod listeners;
mod message;
mod messaging;
mod midi;
mod patch;

pub use array::PdArray;
pub use engine::{
    ArrayDecl, Backend, Canvas, Connection, Engine, EngineFactory, InstanceConfig, MidiThru,
    OpenedPatch, PatchFile, PatchId, PatchObject, ReferenceEngine, ReferenceEngineFactory,
    PD_BLOCK_SIZE,
};
#[cfg(feature = "libpd")]
pub use engine::{LibPdEngine, LibPdEngineFactory};
pub use error::{PdError, PdResult};
pub use host::PdHost;
pub use instance::PdInstance;
pub use listeners::ListenerId;
pub use message::{Atom, EngineEvent, Message, MessageEvent, MidiEvent, NoteOn, MAX_MIDI_CHANNEL};
pub use messaging::Messaging;
pub use midi::Midi;
pub use patch::Patch;
