//! Hardware slot: one physical Sequence RAM.
//!
//! A `HardwareSlot` wraps the register block of one Sequence RAM together
//! with the back-pointer to the sequence that owns it. Both live behind a
//! single short-held mutex, which is the critical section excluding the
//! interrupt path: `process_eos()` reads the owner while `unload()` on the
//! calling thread may be clearing it.
//!
//! Lock order is definition → slot. The interrupt entry points read the
//! owner under the slot lock and drop it before entering the definition.

use crate::definition::SequenceDefinition;
use evg_common::seq::error::SequenceError;
use evg_common::seq::registers::{ControlStrobe, RamStatus, SeqRamRegisters};
use evg_common::seq::types::{EventEntry, RunMode, TriggerSource};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

struct SlotInner {
    regs: Box<dyn SeqRamRegisters>,
    owner: Option<Weak<SequenceDefinition>>,
}

/// One physical Sequence RAM.
pub struct HardwareSlot {
    id: u8,
    inner: Mutex<SlotInner>,
}

impl fmt::Debug for HardwareSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareSlot")
            .field("id", &self.id)
            .field("allocated", &self.is_allocated())
            .finish()
    }
}

impl HardwareSlot {
    /// Wrap the register block of slot `id`.
    pub fn new(id: u8, regs: Box<dyn SeqRamRegisters>) -> Self {
        Self {
            id,
            inner: Mutex::new(SlotInner { regs, owner: None }),
        }
    }

    /// Slot id.
    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Physical entries including the terminal slot.
    pub fn capacity(&self) -> usize {
        self.inner.lock().regs.capacity()
    }

    // ─── Raw register writes ────────────────────────────────────────

    /// Write the event code of entry `index`. Slot must not be playing.
    pub fn set_event_code(&self, index: usize, code: u8) {
        trace!(slot = self.id, index, code, "write event code");
        self.inner.lock().regs.write_event_code(index, code);
    }

    /// Write the delta-ticks of entry `index`. Slot must not be playing.
    pub fn set_timestamp(&self, index: usize, delta: u32) {
        trace!(slot = self.id, index, delta, "write timestamp");
        self.inner.lock().regs.write_timestamp(index, delta);
    }

    /// Write the mask of entry `index`. Slot must not be playing.
    pub fn set_mask(&self, index: usize, mask: u8) {
        trace!(slot = self.id, index, mask, "write mask");
        self.inner.lock().regs.write_mask(index, mask);
    }

    /// Write the trigger-source-select field.
    pub fn set_trig_src(&self, source: TriggerSource) {
        trace!(slot = self.id, ?source, "write trigger source");
        self.inner.lock().regs.write_trigger_source(source);
    }

    /// Write the run-mode bits.
    pub fn set_run_mode(&self, mode: RunMode) {
        trace!(slot = self.id, ?mode, "write run mode");
        self.inner.lock().regs.write_run_mode(mode);
    }

    // ─── Control strobes ────────────────────────────────────────────

    /// Arm the slot.
    pub fn enable(&self) {
        self.inner.lock().regs.strobe(ControlStrobe::ENABLE);
    }

    /// Disarm the slot.
    pub fn disable(&self) {
        self.inner.lock().regs.strobe(ControlStrobe::DISABLE);
    }

    /// Stop playback immediately. Raises no EOS.
    pub fn reset(&self) {
        self.inner.lock().regs.strobe(ControlStrobe::RESET);
    }

    /// Fire the software trigger.
    pub fn soft_trig(&self) {
        self.inner.lock().regs.strobe(ControlStrobe::SW_TRIGGER);
    }

    // ─── Status ─────────────────────────────────────────────────────

    /// Playback in progress.
    pub fn is_running(&self) -> bool {
        self.inner.lock().regs.status().contains(RamStatus::RUNNING)
    }

    /// Slot is armed.
    pub fn is_enabled(&self) -> bool {
        self.inner.lock().regs.status().contains(RamStatus::ENABLED)
    }

    /// Slot has an owner.
    pub fn is_allocated(&self) -> bool {
        self.inner.lock().owner.is_some()
    }

    /// Trigger source currently in hardware.
    pub fn trigger_source(&self) -> TriggerSource {
        self.inner.lock().regs.read_trigger_source()
    }

    /// Run mode currently in hardware.
    pub fn run_mode(&self) -> RunMode {
        self.inner.lock().regs.read_run_mode()
    }

    // ─── Composite operations (one critical section each) ───────────

    /// Block new arming: trigger source None, run mode Single.
    pub fn quiesce(&self) {
        let mut inner = self.inner.lock();
        inner.regs.write_trigger_source(TriggerSource::None);
        inner.regs.write_run_mode(RunMode::Single);
    }

    /// Quiesce and disarm.
    pub fn quiesce_and_disable(&self) {
        let mut inner = self.inner.lock();
        inner.regs.write_trigger_source(TriggerSource::None);
        inner.regs.write_run_mode(RunMode::Single);
        inner.regs.strobe(ControlStrobe::DISABLE);
    }

    /// Stop playback regardless of state and block re-arming.
    pub fn force_stop(&self) {
        let mut inner = self.inner.lock();
        inner.regs.write_run_mode(RunMode::Single);
        inner.regs.write_trigger_source(TriggerSource::None);
        inner.regs.strobe(ControlStrobe::RESET);
    }

    /// Write trigger source and run mode, then arm or disarm the slot.
    ///
    /// The enable bit is always driven: a previous owner may have left it
    /// set, and a slot must never be armed for a disabled sequence.
    pub fn configure(&self, source: TriggerSource, mode: RunMode, arm: bool) {
        let mut inner = self.inner.lock();
        inner.regs.write_trigger_source(source);
        inner.regs.write_run_mode(mode);
        let strobe = if arm {
            ControlStrobe::ENABLE
        } else {
            ControlStrobe::DISABLE
        };
        inner.regs.strobe(strobe);
    }

    /// Write every entry of a compiled sequence. Slot must not be playing.
    pub fn write_entries(&self, entries: &[EventEntry]) {
        let mut inner = self.inner.lock();
        for (index, entry) in entries.iter().enumerate() {
            inner.regs.write_timestamp(index, entry.delta);
            inner.regs.write_event_code(index, entry.code);
            inner.regs.write_mask(index, entry.mask);
        }
        debug!(slot = self.id, entries = entries.len(), "sequence RAM written");
    }

    /// Read back `entries.len()` entries and compare.
    ///
    /// # Errors
    /// `SequenceError::HardwareInconsistency` naming the first mismatch.
    pub fn verify_entries(&self, entries: &[EventEntry]) -> Result<(), SequenceError> {
        let inner = self.inner.lock();
        for (index, expected) in entries.iter().enumerate() {
            let actual = EventEntry::new(
                inner.regs.read_timestamp(index),
                inner.regs.read_event_code(index),
                inner.regs.read_mask(index),
            );
            if actual != *expected {
                return Err(SequenceError::HardwareInconsistency {
                    slot: self.id,
                    detail: format!("entry {index} reads {actual}, wrote {expected}"),
                });
            }
        }
        Ok(())
    }

    // ─── Ownership (SlotManager only) ───────────────────────────────

    /// Claim the slot for `owner` if it is free. Returns true on success.
    pub(crate) fn try_claim(&self, owner: Weak<SequenceDefinition>) -> bool {
        let mut inner = self.inner.lock();
        let free = match &inner.owner {
            None => true,
            // Owner dropped without unloading.
            Some(existing) => existing.strong_count() == 0,
        };
        if free {
            inner.owner = Some(owner);
        }
        free
    }

    /// Clear the owner link.
    pub(crate) fn clear_owner(&self) {
        self.inner.lock().owner = None;
    }

    /// Current owner, if it is still alive.
    pub fn owner(&self) -> Option<Arc<SequenceDefinition>> {
        self.inner.lock().owner.as_ref().and_then(Weak::upgrade)
    }

    /// Disarm the slot if hardware reports it armed or running while no
    /// live owner holds it. Returns the offending status.
    pub(crate) fn disarm_if_orphaned(&self) -> Option<RamStatus> {
        let mut inner = self.inner.lock();
        let owned = inner
            .owner
            .as_ref()
            .is_some_and(|owner| owner.strong_count() > 0);
        let status = inner.regs.status();
        if owned || !status.intersects(RamStatus::ENABLED | RamStatus::RUNNING) {
            return None;
        }
        inner.regs.write_trigger_source(TriggerSource::None);
        inner.regs.write_run_mode(RunMode::Single);
        inner.regs.strobe(ControlStrobe::DISABLE);
        Some(status)
    }

    // ─── Interrupt entry points ─────────────────────────────────────

    /// Start-Of-Sequence delivered by the interrupt front-end.
    pub fn process_sos(&self) {
        match self.owner() {
            Some(owner) => owner.process_sos(self),
            None => debug!(slot = self.id, "SOS on unowned sequence RAM"),
        }
    }

    /// End-Of-Sequence delivered by the interrupt front-end.
    pub fn process_eos(&self) {
        match self.owner() {
            Some(owner) => owner.process_eos(self),
            None => debug!(slot = self.id, "EOS on unowned sequence RAM"),
        }
    }
}
