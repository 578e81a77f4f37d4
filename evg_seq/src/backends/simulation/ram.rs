//! Simulated Sequence RAM.
//!
//! `SimSeqRam` is a cloneable handle to one software register block. The
//! backend keeps one clone to drive playback from `poll_interrupts()`, the
//! hardware slot owns another through `SeqRamRegisters`. Tests keep a third
//! to inspect registers and force hardware conditions.

use evg_common::consts::RAM_ENTRIES;
use evg_common::seq::registers::{ControlStrobe, RamStatus, SeqRamRegisters};
use evg_common::seq::types::{EventEntry, RunMode, TriggerSource};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

use crate::backend::IrqKind;

#[derive(Debug)]
struct RamState {
    timestamps: Vec<u32>,
    codes: Vec<u8>,
    masks: Vec<u8>,
    /// Trigger-source-select field, raw encoding.
    trigger_raw: u32,
    run_mode: RunMode,
    enabled: bool,
    running: bool,
    /// Polls left before the running pass reaches EOS.
    remaining_polls: u32,
    playback_polls: u32,
    /// SOS raised by a software trigger, not yet reported.
    sos_pending: bool,
    writes_while_running: u64,
    corrupt_index: Option<usize>,
}

impl RamState {
    fn trigger_source(&self) -> TriggerSource {
        TriggerSource::from_raw(self.trigger_raw).unwrap_or_default()
    }

    fn start(&mut self) {
        self.running = true;
        self.remaining_polls = self.playback_polls;
    }

    fn note_array_write(&mut self, index: usize) {
        if self.running {
            self.writes_while_running += 1;
            warn!(index, "sequence RAM array written while running");
        }
    }
}

/// Software Sequence RAM.
#[derive(Debug, Clone)]
pub struct SimSeqRam {
    state: Arc<Mutex<RamState>>,
}

impl SimSeqRam {
    /// Create a RAM of `capacity` entries, idle and disarmed.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RamState {
                timestamps: vec![0; capacity],
                codes: vec![0; capacity],
                masks: vec![0; capacity],
                trigger_raw: TriggerSource::None.to_raw(),
                run_mode: RunMode::Normal,
                enabled: false,
                running: false,
                remaining_polls: 0,
                playback_polls: 1,
                sos_pending: false,
                writes_while_running: 0,
                corrupt_index: None,
            })),
        }
    }

    /// Set how many polls one pass lasts (minimum 1).
    pub fn with_playback_polls(self, polls: u32) -> Self {
        self.state.lock().playback_polls = polls.max(1);
        self
    }

    /// First `len` entries as stored.
    pub fn entries(&self, len: usize) -> Vec<EventEntry> {
        let state = self.state.lock();
        (0..len.min(state.codes.len()))
            .map(|i| EventEntry::new(state.timestamps[i], state.codes[i], state.masks[i]))
            .collect()
    }

    /// Trigger source in the select field.
    pub fn trigger_source(&self) -> TriggerSource {
        self.state.lock().trigger_source()
    }

    /// Run-mode bits.
    pub fn run_mode(&self) -> RunMode {
        self.state.lock().run_mode
    }

    /// Enabled with a connected trigger source.
    pub fn is_armed(&self) -> bool {
        let state = self.state.lock();
        state.enabled && state.trigger_source() != TriggerSource::None
    }

    /// Enable bit.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Playback in progress.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Force the running bit, as if a trigger had started playback.
    pub fn force_running(&self, running: bool) {
        let mut state = self.state.lock();
        state.running = running;
        state.remaining_polls = if running { state.playback_polls } else { 0 };
    }

    /// Array writes that landed while the RAM was playing.
    pub fn writes_while_running(&self) -> u64 {
        self.state.lock().writes_while_running
    }

    /// Make readback of entry `index` disagree with what was written.
    pub fn corrupt_readback(&self, index: usize) {
        self.state.lock().corrupt_index = Some(index);
    }

    /// Remove any injected readback fault.
    pub fn clear_faults(&self) {
        self.state.lock().corrupt_index = None;
    }

    /// Deliver a hardware trigger edge on `source`. Returns true if
    /// playback started (SOS).
    pub fn hardware_trigger(&self, source: TriggerSource) -> bool {
        let mut state = self.state.lock();
        let selected = state.trigger_source();
        if !state.enabled
            || state.running
            || selected != source
            || matches!(source, TriggerSource::None | TriggerSource::Software)
        {
            return false;
        }
        state.start();
        true
    }

    /// End the running pass now. Returns false if nothing was playing.
    pub fn finish_playback(&self) -> bool {
        let mut state = self.state.lock();
        if !state.running {
            return false;
        }
        state.remaining_polls = 0;
        Self::end_pass(&mut state);
        true
    }

    /// Advance playback by one poll and report the interrupts raised.
    /// `external` delivers a trigger edge on every hardware input.
    pub(crate) fn step(&self, external: bool, irqs: &mut Vec<IrqKind>) {
        let mut state = self.state.lock();

        if state.sos_pending {
            state.sos_pending = false;
            irqs.push(IrqKind::Sos);
        }

        if state.running {
            state.remaining_polls = state.remaining_polls.saturating_sub(1);
            if state.remaining_polls == 0 {
                let restarted = Self::end_pass(&mut state);
                irqs.push(IrqKind::Eos);
                if restarted {
                    irqs.push(IrqKind::Sos);
                }
            }
            return;
        }

        let source = state.trigger_source();
        if external
            && state.enabled
            && !matches!(source, TriggerSource::None | TriggerSource::Software)
        {
            state.start();
            irqs.push(IrqKind::Sos);
        }
    }

    /// Apply the run-mode action at EOS. Returns true if Auto restarted.
    fn end_pass(state: &mut RamState) -> bool {
        state.running = false;
        match state.run_mode {
            RunMode::Single => {
                state.enabled = false;
                false
            }
            RunMode::Auto if state.enabled && state.trigger_source() != TriggerSource::None => {
                state.start();
                true
            }
            RunMode::Auto | RunMode::Normal => false,
        }
    }
}

impl Default for SimSeqRam {
    fn default() -> Self {
        Self::new(RAM_ENTRIES)
    }
}

impl SeqRamRegisters for SimSeqRam {
    fn capacity(&self) -> usize {
        self.state.lock().codes.len()
    }

    fn write_timestamp(&mut self, index: usize, delta: u32) {
        let mut state = self.state.lock();
        state.note_array_write(index);
        if let Some(slot) = state.timestamps.get_mut(index) {
            *slot = delta;
        }
    }

    fn write_event_code(&mut self, index: usize, code: u8) {
        let mut state = self.state.lock();
        state.note_array_write(index);
        if let Some(slot) = state.codes.get_mut(index) {
            *slot = code;
        }
    }

    fn write_mask(&mut self, index: usize, mask: u8) {
        let mut state = self.state.lock();
        state.note_array_write(index);
        if let Some(slot) = state.masks.get_mut(index) {
            *slot = mask;
        }
    }

    fn read_timestamp(&self, index: usize) -> u32 {
        self.state.lock().timestamps.get(index).copied().unwrap_or(0)
    }

    fn read_event_code(&self, index: usize) -> u8 {
        let state = self.state.lock();
        let code = state.codes.get(index).copied().unwrap_or(0);
        if state.corrupt_index == Some(index) {
            code ^ 0xFF
        } else {
            code
        }
    }

    fn read_mask(&self, index: usize) -> u8 {
        self.state.lock().masks.get(index).copied().unwrap_or(0)
    }

    fn write_trigger_source(&mut self, source: TriggerSource) {
        self.state.lock().trigger_raw = source.to_raw();
    }

    fn read_trigger_source(&self) -> TriggerSource {
        self.state.lock().trigger_source()
    }

    fn write_run_mode(&mut self, mode: RunMode) {
        self.state.lock().run_mode = mode;
    }

    fn read_run_mode(&self) -> RunMode {
        self.state.lock().run_mode
    }

    fn strobe(&mut self, bits: ControlStrobe) {
        let mut state = self.state.lock();
        if bits.contains(ControlStrobe::RESET) {
            state.running = false;
            state.enabled = false;
            state.remaining_polls = 0;
            state.sos_pending = false;
            return;
        }
        if bits.contains(ControlStrobe::DISABLE) {
            state.enabled = false;
        }
        if bits.contains(ControlStrobe::ENABLE) {
            state.enabled = true;
        }
        if bits.contains(ControlStrobe::SW_TRIGGER)
            && state.enabled
            && !state.running
            && state.trigger_source() == TriggerSource::Software
        {
            state.start();
            state.sos_pending = true;
        }
    }

    fn status(&self) -> RamStatus {
        let state = self.state.lock();
        let mut status = RamStatus::empty();
        status.set(RamStatus::ENABLED, state.enabled);
        status.set(RamStatus::RUNNING, state.running);
        status
    }
}
