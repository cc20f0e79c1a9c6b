//! ReferenceEngine - in-process engine for pass-through patches
//!
//! Hosts patches without linking libpd. It honours the structure of a
//! patch rather than running its objects:
//!
//! - `#X array` declarations become named arrays (`$0` is expanded)
//! - `adc~ -> dac~` wires copy input channels to output channels
//! - MIDI in/out pairs (`notein -> noteout`, ...) echo incoming MIDI
//! - messages sent to a bound receiver come straight back to the host
//!
//! All state lives in the engine value itself, so two engines never
//! share anything.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::super::error::{PdError, PdResult};
use super::super::message::{EngineEvent, Message, MessageEvent, MidiEvent};
use super::patch_file::{MidiThru, PatchFile};
use super::{Engine, EngineFactory, InstanceConfig, OpenedPatch, PatchId, PD_BLOCK_SIZE};

/// First $0 handed out, matching PD's numbering
const FIRST_DOLLAR_ZERO: i32 = 1001;

struct LoadedPatch {
    dollar_zero: i32,
    /// Names of the arrays this patch declared, shared ones included
    arrays: Vec<String>,
    routes: Vec<(usize, usize)>,
    midi_thru: MidiThru,
}

/// In-process engine context
pub struct ReferenceEngine {
    config: InstanceConfig,
    search_paths: Vec<PathBuf>,
    patches: BTreeMap<PatchId, LoadedPatch>,
    arrays: HashMap<String, Vec<f32>>,
    bound: HashSet<String>,
    events: Vec<EngineEvent>,
    dsp: bool,
    next_patch: u32,
    next_dollar_zero: i32,
    shut_down: bool,
}

impl ReferenceEngine {
    pub fn new(config: InstanceConfig) -> PdResult<Self> {
        if config.sample_rate == 0 {
            return Err(PdError::AudioConfigFailed {
                inputs: config.inputs,
                outputs: config.outputs,
                sample_rate: config.sample_rate,
                reason: "sample rate must be positive".to_string(),
            });
        }

        Ok(Self {
            config,
            search_paths: Vec::new(),
            patches: BTreeMap::new(),
            arrays: HashMap::new(),
            bound: HashSet::new(),
            events: Vec::new(),
            dsp: false,
            next_patch: 1,
            next_dollar_zero: FIRST_DOLLAR_ZERO,
            shut_down: false,
        })
    }

    /// Resolve relative patch paths against the search paths
    fn resolve(&self, path: &Path) -> Option<PathBuf> {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        if path.is_absolute() {
            return None;
        }
        self.search_paths
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.exists())
    }

    fn midi_thru(&self) -> MidiThru {
        self.patches.values().fold(MidiThru::default(), |acc, p| MidiThru {
            note: acc.note || p.midi_thru.note,
            control: acc.control || p.midi_thru.control,
            program: acc.program || p.midi_thru.program,
            bend: acc.bend || p.midi_thru.bend,
            touch: acc.touch || p.midi_thru.touch,
            poly_touch: acc.poly_touch || p.midi_thru.poly_touch,
        })
    }

    fn array_mut(&mut self, name: &str) -> PdResult<&mut Vec<f32>> {
        self.arrays
            .get_mut(name)
            .ok_or_else(|| PdError::ArrayNotFound(name.to_string()))
    }
}

impl Engine for ReferenceEngine {
    fn block_size(&self) -> usize {
        PD_BLOCK_SIZE
    }

    fn add_search_path(&mut self, path: &Path) -> PdResult<()> {
        if !self.search_paths.iter().any(|p| p == path) {
            self.search_paths.push(path.to_path_buf());
        }
        Ok(())
    }

    fn open_patch(&mut self, path: &Path) -> PdResult<OpenedPatch> {
        let resolved = self
            .resolve(path)
            .ok_or_else(|| PdError::PatchNotFound(path.to_path_buf()))?;
        let file = PatchFile::load(&resolved)?;

        let dollar_zero = self.next_dollar_zero;
        let mut arrays = Vec::new();
        for decl in file.arrays() {
            let name = decl.name.replace("$0", &dollar_zero.to_string());
            if self.arrays.contains_key(&name) {
                // PD warns and keeps the first definition
                log::warn!("[PD] warning: array {}: multiply defined", name);
            } else {
                self.arrays.insert(name.clone(), vec![0.0; decl.size]);
            }
            arrays.push(name);
        }

        let id = PatchId(self.next_patch);
        self.next_patch += 1;
        self.next_dollar_zero += 1;
        self.patches.insert(
            id,
            LoadedPatch {
                dollar_zero,
                arrays,
                routes: file.audio_routes(self.config.inputs, self.config.outputs),
                midi_thru: file.midi_thru(),
            },
        );

        Ok(OpenedPatch { id, dollar_zero })
    }

    fn close_patch(&mut self, id: PatchId) -> PdResult<()> {
        let patch = self.patches.remove(&id).ok_or_else(|| {
            PdError::disposed(format!("Patch {}", id.0))
        })?;
        // An array lives as long as some open patch still declares it
        for name in patch.arrays {
            let declared_elsewhere = self.patches.values().any(|p| p.arrays.contains(&name));
            if !declared_elsewhere {
                self.arrays.remove(&name);
            }
        }
        log::trace!("reference engine closed patch $0={}", patch.dollar_zero);
        Ok(())
    }

    fn bind(&mut self, receiver: &str) -> PdResult<()> {
        self.bound.insert(receiver.to_string());
        Ok(())
    }

    fn unbind(&mut self, receiver: &str) -> PdResult<()> {
        self.bound.remove(receiver);
        Ok(())
    }

    fn send(&mut self, receiver: &str, message: &Message) -> PdResult<()> {
        if self.bound.contains(receiver) {
            self.events.push(EngineEvent::Message(MessageEvent {
                receiver: receiver.to_string(),
                message: message.clone(),
            }));
        }
        Ok(())
    }

    fn send_midi(&mut self, event: &MidiEvent) -> PdResult<()> {
        let thru = self.midi_thru();
        let echoed = match event {
            MidiEvent::NoteOn(_) => thru.note,
            MidiEvent::ControlChange { .. } => thru.control,
            MidiEvent::ProgramChange { .. } => thru.program,
            MidiEvent::PitchBend { .. } => thru.bend,
            MidiEvent::Aftertouch { .. } => thru.touch,
            MidiEvent::PolyAftertouch { .. } => thru.poly_touch,
        };
        if echoed {
            self.events.push(EngineEvent::Midi(*event));
        }
        Ok(())
    }

    fn array_size(&mut self, name: &str) -> PdResult<Option<usize>> {
        Ok(self.arrays.get(name).map(Vec::len))
    }

    fn resize_array(&mut self, name: &str, size: usize) -> PdResult<()> {
        self.array_mut(name)?.resize(size, 0.0);
        Ok(())
    }

    fn read_array(&mut self, name: &str, offset: usize, dest: &mut [f32]) -> PdResult<()> {
        let array = self.array_mut(name)?;
        dest.copy_from_slice(&array[offset..offset + dest.len()]);
        Ok(())
    }

    fn write_array(&mut self, name: &str, offset: usize, values: &[f32]) -> PdResult<()> {
        let array = self.array_mut(name)?;
        array[offset..offset + values.len()].copy_from_slice(values);
        Ok(())
    }

    fn set_dsp(&mut self, on: bool) -> PdResult<()> {
        self.dsp = on;
        Ok(())
    }

    fn process(&mut self, ticks: usize, input: &[f32], output: &mut [f32]) -> PdResult<()> {
        let inputs = self.config.inputs;
        let outputs = self.config.outputs;
        output.fill(0.0);
        if !self.dsp || outputs == 0 {
            return Ok(());
        }

        let frames = ticks * PD_BLOCK_SIZE;
        for patch in self.patches.values() {
            for &(in_ch, out_ch) in &patch.routes {
                for frame in 0..frames {
                    output[frame * outputs + out_ch] += input[frame * inputs + in_ch];
                }
            }
        }
        Ok(())
    }

    fn drain_events(&mut self, out: &mut Vec<EngineEvent>) {
        out.append(&mut self.events);
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.dsp = false;
        self.patches.clear();
        self.arrays.clear();
        self.bound.clear();
        self.events.clear();
    }
}

/// Factory for [`ReferenceEngine`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceEngineFactory;

impl EngineFactory for ReferenceEngineFactory {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn create(&self, config: &InstanceConfig) -> PdResult<Box<dyn Engine>> {
        Ok(Box::new(ReferenceEngine::new(*config)?))
    }
}
