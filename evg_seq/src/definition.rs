//! Sequence definition: the user-facing sequence.
//!
//! A `SequenceDefinition` holds the mutable working arrays, the validated
//! committed snapshot and the enable/load state. Setters only touch the
//! working copy; `commit()` compiles it; `load()` claims a Sequence RAM;
//! the [`SyncEngine`] moves the committed snapshot into hardware.
//!
//! No operation blocks on hardware. When the owned slot is mid-playback
//! the register write is deferred to the EOS interrupt, which enters
//! through [`SequenceDefinition::process_eos`].

use crate::compiler::{self, CompileLimits, WorkingSequence};
use crate::hw_slot::HardwareSlot;
use crate::scan::{ScanChannels, ScanKind};
use crate::slot_manager::SlotManager;
use crate::sync::{EosOutcome, SyncEngine, SyncOutcome, SyncState};
use evg_common::seq::error::SequenceError;
use evg_common::seq::types::{EventEntry, RunMode, TriggerSource};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Validated, hardware-ready form of a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedSequence {
    /// Entries exactly as written to Sequence RAM, EOS last.
    pub entries: Vec<EventEntry>,
    /// Committed trigger source.
    pub trigger_source: TriggerSource,
    /// Committed run mode.
    pub run_mode: RunMode,
}

impl Default for CommittedSequence {
    fn default() -> Self {
        Self {
            entries: vec![EventEntry::eos(0)],
            trigger_source: TriggerSource::None,
            run_mode: RunMode::Normal,
        }
    }
}

impl CommittedSequence {
    /// Event codes of the real entries (continuations skipped).
    pub fn event_codes(&self) -> Vec<u8> {
        self.real_entries().map(|e| e.code).collect()
    }

    /// Masks of the real entries (continuations skipped).
    pub fn masks(&self) -> Vec<u8> {
        self.real_entries().map(|e| e.mask).collect()
    }

    /// Absolute timestamps of the real entries.
    pub fn timestamps(&self) -> Vec<u64> {
        compiler::absolute_timestamps(&self.entries)
    }

    fn real_entries(&self) -> impl Iterator<Item = &EventEntry> {
        self.entries.iter().filter(|e| !e.is_continuation())
    }
}

#[derive(Debug, Default)]
struct Working {
    timestamps: Vec<u64>,
    event_codes: Vec<u8>,
    masks: Vec<u8>,
    trigger_source: TriggerSource,
    run_mode: RunMode,
}

#[derive(Debug, Default)]
struct DefinitionState {
    description: String,
    working: Working,
    committed: CommittedSequence,
    is_committed: bool,
    is_enabled: bool,
    ever_loaded: bool,
    slot: Option<Arc<HardwareSlot>>,
    engine: SyncEngine,
}

impl DefinitionState {
    fn owns(&self, slot: &HardwareSlot) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|own| std::ptr::eq(Arc::as_ptr(own), slot))
    }
}

/// User-facing sequence bound to one card.
pub struct SequenceDefinition {
    id: u32,
    slots: Arc<SlotManager>,
    limits: CompileLimits,
    state: Mutex<DefinitionState>,
    scan: ScanChannels,
}

impl fmt::Debug for SequenceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceDefinition")
            .field("id", &self.id)
            .field("loaded", &self.slot_id())
            .field("committed", &self.is_committed())
            .field("sync", &self.sync_state())
            .finish()
    }
}

impl SequenceDefinition {
    /// Create a sequence bound to the slot pool of one card.
    pub fn new(
        id: u32,
        description: impl Into<String>,
        slots: Arc<SlotManager>,
        limits: CompileLimits,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            slots,
            limits,
            state: Mutex::new(DefinitionState {
                description: description.into(),
                ..DefinitionState::default()
            }),
            scan: ScanChannels::new(),
        })
    }

    /// Sequence id.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Scan channels for the monitoring layer.
    pub fn scan(&self) -> &ScanChannels {
        &self.scan
    }

    /// Largest accepted working array.
    pub fn max_events(&self) -> usize {
        self.limits.capacity.saturating_sub(1)
    }

    // ─── Setters (working copy only) ────────────────────────────────

    /// Replace the description.
    pub fn set_description(&self, description: impl Into<String>) {
        self.state.lock().description = description.into();
        self.scan.request(ScanKind::Changed);
    }

    /// Replace the working event codes.
    ///
    /// # Errors
    /// `SequenceError::ArrayTooLong` above the data capacity.
    pub fn set_event_codes(&self, codes: &[u8]) -> Result<(), SequenceError> {
        self.check_len("event_codes", codes.len())?;
        self.mutate(|w| w.event_codes = codes.to_vec());
        Ok(())
    }

    /// Replace the working timestamps (absolute ticks).
    pub fn set_timestamps(&self, ticks: &[u64]) -> Result<(), SequenceError> {
        self.check_len("timestamps", ticks.len())?;
        self.mutate(|w| w.timestamps = ticks.to_vec());
        Ok(())
    }

    /// Replace the working timestamps from seconds, rounded to ticks of an
    /// event clock running at `event_clock_hz`.
    ///
    /// # Errors
    /// `SequenceError::InvalidTimestamp` for negative, non-finite or
    /// out-of-range values; the working copy is left untouched.
    pub fn set_timestamps_seconds(
        &self,
        seconds: &[f64],
        event_clock_hz: f64,
    ) -> Result<(), SequenceError> {
        self.check_len("timestamps", seconds.len())?;
        let ticks = seconds
            .iter()
            .enumerate()
            .map(|(index, s)| {
                let t = (s * event_clock_hz).round();
                if t.is_finite() && t >= 0.0 && t < u64::MAX as f64 {
                    Ok(t as u64)
                } else {
                    Err(SequenceError::InvalidTimestamp { index })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.mutate(|w| w.timestamps = ticks);
        Ok(())
    }

    /// Replace the working masks.
    pub fn set_masks(&self, masks: &[u8]) -> Result<(), SequenceError> {
        self.check_len("masks", masks.len())?;
        self.mutate(|w| w.masks = masks.to_vec());
        Ok(())
    }

    /// Set the working trigger source. No-op if unchanged.
    pub fn set_trigger_source(&self, source: TriggerSource) {
        let changed = {
            let mut st = self.state.lock();
            if st.working.trigger_source == source {
                false
            } else {
                st.working.trigger_source = source;
                st.is_committed = false;
                true
            }
        };
        if changed {
            self.scan.request(ScanKind::Changed);
        }
    }

    /// Set the working run mode. No-op if unchanged.
    pub fn set_run_mode(&self, mode: RunMode) {
        let changed = {
            let mut st = self.state.lock();
            if st.working.run_mode == mode {
                false
            } else {
                st.working.run_mode = mode;
                st.is_committed = false;
                true
            }
        };
        if changed {
            self.scan.request(ScanKind::Changed);
        }
    }

    fn check_len(&self, field: &'static str, len: usize) -> Result<(), SequenceError> {
        let max = self.max_events();
        if len > max {
            return Err(SequenceError::ArrayTooLong { field, len, max });
        }
        Ok(())
    }

    fn mutate(&self, f: impl FnOnce(&mut Working)) {
        {
            let mut st = self.state.lock();
            f(&mut st.working);
            st.is_committed = false;
        }
        self.scan.request(ScanKind::Changed);
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Validate and compile the working copy into the committed snapshot.
    ///
    /// No-op if nothing changed since the last commit. If loaded, the new
    /// snapshot is synced into hardware (possibly deferred to EOS).
    ///
    /// # Errors
    /// Validation errors from the compiler; the previous snapshot stays.
    pub fn commit(&self) -> Result<(), SequenceError> {
        let mut st = self.state.lock();
        if st.is_committed {
            return Ok(());
        }

        let compiled = compiler::compile(
            WorkingSequence {
                timestamps: &st.working.timestamps,
                event_codes: &st.working.event_codes,
                masks: &st.working.masks,
            },
            self.limits,
        );
        let entries = match compiled {
            Ok(entries) => entries,
            Err(err) => {
                drop(st);
                warn!(sequence = self.id, "commit rejected: {err}");
                self.scan.raise_error(err.to_string());
                return Err(err);
            }
        };

        st.committed = CommittedSequence {
            entries,
            trigger_source: st.working.trigger_source,
            run_mode: st.working.run_mode,
        };
        st.is_committed = true;
        st.engine.invalidate();
        info!(
            sequence = self.id,
            entries = st.committed.entries.len(),
            "sequence committed"
        );

        let outcome = Self::sync_locked(&mut st);
        drop(st);
        self.report_sync(outcome);
        self.scan.request(ScanKind::Changed);
        Ok(())
    }

    /// Claim a Sequence RAM and sync the committed snapshot into it.
    ///
    /// # Errors
    /// `SequenceError::NoFreeSlot` when the pool is exhausted; retry later.
    pub fn load(self: &Arc<Self>) -> Result<(), SequenceError> {
        let mut st = self.state.lock();
        if st.slot.is_some() {
            return Ok(());
        }

        let slot = match self.slots.allocate(self) {
            Ok(slot) => slot,
            Err(err) => {
                drop(st);
                warn!(sequence = self.id, "load failed: {err}");
                self.scan.raise_error(err.to_string());
                return Err(err);
            }
        };

        info!(sequence = self.id, slot = slot.id(), "sequence loaded");
        st.slot = Some(slot);
        st.ever_loaded = true;
        st.engine.invalidate();

        let outcome = Self::sync_locked(&mut st);
        drop(st);
        self.report_sync(outcome);
        self.scan.request(ScanKind::Changed);
        Ok(())
    }

    /// Disarm the Sequence RAM and return it to the pool. A pass already
    /// playing runs to its end but is never restarted.
    pub fn unload(&self) {
        let slot = {
            let mut st = self.state.lock();
            let Some(slot) = st.slot.take() else {
                return;
            };
            slot.quiesce_and_disable();
            self.slots.release(&slot);
            st.engine.invalidate();
            slot
        };
        info!(sequence = self.id, slot = slot.id(), "sequence unloaded");
        self.scan.request(ScanKind::Changed);
    }

    /// Arm the sequence.
    ///
    /// If loaded and synced, the committed trigger source and run mode are
    /// re-pushed first since hardware reverts Single mode on its own. An
    /// unsynced slot is reconciled through a fresh sync.
    pub fn enable(&self) {
        let outcome = {
            let mut st = self.state.lock();
            st.is_enabled = true;
            match (st.slot.clone(), st.engine.state()) {
                (Some(slot), SyncState::Synced) => {
                    slot.configure(st.committed.trigger_source, st.committed.run_mode, true);
                    None
                }
                (Some(_), SyncState::Unsynced) => Self::sync_locked(&mut st),
                _ => None,
            }
        };
        debug!(sequence = self.id, "sequence enabled");
        self.report_sync(outcome);
        self.scan.request(ScanKind::Changed);
    }

    /// Disarm the sequence and block any further autonomous run.
    ///
    /// # Errors
    /// `SequenceError::NeverLoaded` on a sequence never loaded.
    pub fn disable(&self) -> Result<(), SequenceError> {
        {
            let mut st = self.state.lock();
            if !st.ever_loaded {
                return Err(SequenceError::NeverLoaded {
                    sequence: self.id,
                    operation: "disable",
                });
            }
            st.is_enabled = false;
            if let Some(slot) = &st.slot {
                slot.quiesce_and_disable();
            }
        }
        debug!(sequence = self.id, "sequence disabled");
        self.scan.request(ScanKind::Changed);
        Ok(())
    }

    /// Disarm the Sequence RAM but keep it, the snapshot and the sync
    /// state. Trigger source and run mode are left as they are.
    ///
    /// # Errors
    /// `SequenceError::NotLoaded` if no slot is held.
    pub fn pause(&self) -> Result<(), SequenceError> {
        {
            let mut st = self.state.lock();
            let slot = st.slot.clone().ok_or(SequenceError::NotLoaded {
                sequence: self.id,
                operation: "pause",
            })?;
            slot.disable();
            st.is_enabled = false;
        }
        debug!(sequence = self.id, "sequence paused");
        self.scan.request(ScanKind::Changed);
        Ok(())
    }

    /// Stop the slot immediately and complete as if EOS had arrived.
    ///
    /// Resetting a running slot raises no EOS, so the completion is
    /// synthesized here: a pending sync finishes and the run counter moves.
    /// The sequence is left disabled.
    ///
    /// # Errors
    /// `SequenceError::NotLoaded` if no slot is held.
    pub fn abort(&self) -> Result<(), SequenceError> {
        let outcome = {
            let mut st = self.state.lock();
            let slot = st.slot.clone().ok_or(SequenceError::NotLoaded {
                sequence: self.id,
                operation: "abort",
            })?;
            slot.force_stop();
            st.is_enabled = false;
            Self::eos_locked(&mut st, &slot)
        };
        info!(sequence = self.id, run = outcome.run, "sequence aborted");
        self.report_eos(outcome);
        Ok(())
    }

    /// Fire the slot's software trigger.
    ///
    /// # Errors
    /// `SequenceError::NotLoaded` if no slot is held.
    pub fn soft_trigger(&self) -> Result<(), SequenceError> {
        let st = self.state.lock();
        let slot = st.slot.as_ref().ok_or(SequenceError::NotLoaded {
            sequence: self.id,
            operation: "soft_trigger",
        })?;
        slot.soft_trig();
        Ok(())
    }

    /// Explicitly (re)sync the committed snapshot. No-op if unloaded or
    /// already synced.
    pub fn sync(&self) {
        let outcome = {
            let mut st = self.state.lock();
            Self::sync_locked(&mut st)
        };
        self.report_sync(outcome);
    }

    fn sync_locked(st: &mut DefinitionState) -> Option<SyncOutcome> {
        let slot = st.slot.clone()?;
        let enabled = st.is_enabled;
        Some(st.engine.sync(&slot, &st.committed, enabled))
    }

    fn eos_locked(st: &mut DefinitionState, slot: &HardwareSlot) -> EosOutcome {
        let enabled = st.is_enabled;
        let outcome = st.engine.on_eos(slot, &st.committed, enabled);
        if outcome.auto_disabled {
            st.is_enabled = false;
        }
        outcome
    }

    fn report_sync(&self, outcome: Option<SyncOutcome>) {
        match outcome {
            Some(SyncOutcome::Inconsistent(err)) => {
                warn!(sequence = self.id, "{err}");
                self.scan.raise_error(err.to_string());
            }
            Some(SyncOutcome::Synced) => {
                debug!(sequence = self.id, "sync complete");
                self.scan.request(ScanKind::Changed);
            }
            Some(SyncOutcome::Deferred) => {
                debug!(sequence = self.id, "sync pending");
            }
            Some(SyncOutcome::AlreadySynced) | None => {}
        }
    }

    fn report_eos(&self, outcome: EosOutcome) {
        let changed = outcome.auto_disabled || outcome.sync.is_some();
        self.report_sync(outcome.sync);
        self.scan.request(ScanKind::Run);
        if changed {
            self.scan.request(ScanKind::Changed);
        }
    }

    // ─── Interrupt entry points ─────────────────────────────────────

    /// Start-Of-Sequence from `slot`. Never fails.
    pub fn process_sos(&self, slot: &HardwareSlot) {
        {
            let mut st = self.state.lock();
            if !st.owns(slot) {
                warn!(sequence = self.id, slot = slot.id(), "SOS from a slot this sequence does not own");
                return;
            }
            st.engine.on_sos();
        }
        self.scan.request(ScanKind::Start);
    }

    /// End-Of-Sequence from `slot`. Never fails; tolerates duplicates.
    pub fn process_eos(&self, slot: &HardwareSlot) {
        let outcome = {
            let mut st = self.state.lock();
            if !st.owns(slot) {
                warn!(sequence = self.id, slot = slot.id(), "EOS from a slot this sequence does not own");
                return;
            }
            Self::eos_locked(&mut st, slot)
        };
        debug!(sequence = self.id, run = outcome.run, "EOS");
        self.report_eos(outcome);
    }

    // ─── Readbacks ──────────────────────────────────────────────────

    /// Description.
    pub fn description(&self) -> String {
        self.state.lock().description.clone()
    }

    /// Working event codes.
    pub fn event_codes(&self) -> Vec<u8> {
        self.state.lock().working.event_codes.clone()
    }

    /// Working timestamps in ticks.
    pub fn timestamps(&self) -> Vec<u64> {
        self.state.lock().working.timestamps.clone()
    }

    /// Working masks.
    pub fn masks(&self) -> Vec<u8> {
        self.state.lock().working.masks.clone()
    }

    /// Working trigger source.
    pub fn trigger_source(&self) -> TriggerSource {
        self.state.lock().working.trigger_source
    }

    /// Working run mode.
    pub fn run_mode(&self) -> RunMode {
        self.state.lock().working.run_mode
    }

    /// Committed snapshot.
    pub fn committed(&self) -> CommittedSequence {
        self.state.lock().committed.clone()
    }

    /// Working copy matches the committed snapshot.
    pub fn is_committed(&self) -> bool {
        self.state.lock().is_committed
    }

    /// Hardware holds the committed snapshot.
    pub fn is_synced(&self) -> bool {
        self.state.lock().engine.is_synced()
    }

    /// Sync state.
    pub fn sync_state(&self) -> SyncState {
        self.state.lock().engine.state()
    }

    /// Armed in software.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().is_enabled
    }

    /// Holds a Sequence RAM.
    pub fn is_loaded(&self) -> bool {
        self.state.lock().slot.is_some()
    }

    /// Id of the held Sequence RAM.
    pub fn slot_id(&self) -> Option<u8> {
        self.state.lock().slot.as_ref().map(|s| s.id())
    }

    /// EOS count, real and synthesized.
    pub fn run_count(&self) -> u64 {
        self.state.lock().engine.runs()
    }

    /// SOS count.
    pub fn start_count(&self) -> u64 {
        self.state.lock().engine.starts()
    }
}

impl Drop for SequenceDefinition {
    fn drop(&mut self) {
        if let Some(slot) = self.state.get_mut().slot.take() {
            slot.quiesce_and_disable();
            self.slots.release(&slot);
            debug!(sequence = self.id, slot = slot.id(), "released on drop");
        }
    }
}
