//! Sync engine: pushes a committed snapshot into a Sequence RAM.
//!
//! Unsynced → SyncPending → Synced, re-entering Unsynced on any new commit,
//! unload or reload. There is no terminal state.
//!
//! The RAM arrays of a slot must never change while it plays, yet the end
//! of playback is only known from the EOS interrupt. `sync()` therefore
//! blocks re-arming (trigger None, run mode Single) and, if the slot is
//! running, leaves the write to the next EOS. Duplicate EOS delivery is a
//! no-op once the state is Synced.

use crate::definition::CommittedSequence;
use crate::hw_slot::HardwareSlot;
use evg_common::seq::error::SequenceError;
use evg_common::seq::types::RunMode;
use tracing::debug;

/// Sync state of one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncState {
    /// Hardware does not hold the committed snapshot.
    #[default]
    Unsynced,
    /// Waiting for the running slot to reach EOS.
    SyncPending,
    /// Hardware holds the committed snapshot.
    Synced,
}

/// Result of a sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to do.
    AlreadySynced,
    /// Slot is running; completion deferred to the next EOS.
    Deferred,
    /// Snapshot written and verified.
    Synced,
    /// Readback disagreed; state left Unsynced for the next explicit sync.
    Inconsistent(SequenceError),
}

/// Result of EOS handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EosOutcome {
    /// Run counter after this EOS.
    pub run: u64,
    /// Sync performed on this EOS, if one was pending.
    pub sync: Option<SyncOutcome>,
    /// Single-shot run completed; the sequence must be marked disabled.
    pub auto_disabled: bool,
}

/// Per-sequence sync state machine and run/start counters.
#[derive(Debug, Default)]
pub struct SyncEngine {
    state: SyncState,
    runs: u64,
    starts: u64,
}

impl SyncEngine {
    /// New engine in Unsynced.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Hardware holds the committed snapshot.
    #[inline]
    pub fn is_synced(&self) -> bool {
        self.state == SyncState::Synced
    }

    /// EOS count, real and synthesized.
    #[inline]
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// SOS count.
    #[inline]
    pub fn starts(&self) -> u64 {
        self.starts
    }

    /// Drop back to Unsynced after a commit, unload or reload.
    pub fn invalidate(&mut self) {
        self.state = SyncState::Unsynced;
    }

    /// Start pushing `committed` into `slot`.
    pub fn sync(
        &mut self,
        slot: &HardwareSlot,
        committed: &CommittedSequence,
        enabled: bool,
    ) -> SyncOutcome {
        if self.state == SyncState::Synced {
            return SyncOutcome::AlreadySynced;
        }

        slot.quiesce();
        if slot.is_running() {
            debug!(slot = slot.id(), "sequence RAM running, sync deferred to EOS");
            self.state = SyncState::SyncPending;
            return SyncOutcome::Deferred;
        }

        self.finish_sync(slot, committed, enabled)
    }

    /// Write the snapshot, restore trigger source and run mode, and arm the
    /// slot only if `arm`. The slot must not be running.
    pub fn finish_sync(
        &mut self,
        slot: &HardwareSlot,
        committed: &CommittedSequence,
        arm: bool,
    ) -> SyncOutcome {
        slot.write_entries(&committed.entries);
        if let Err(err) = slot.verify_entries(&committed.entries) {
            self.state = SyncState::Unsynced;
            return SyncOutcome::Inconsistent(err);
        }

        slot.configure(committed.trigger_source, committed.run_mode, arm);
        self.state = SyncState::Synced;
        debug!(slot = slot.id(), entries = committed.entries.len(), armed = arm, "synced");
        SyncOutcome::Synced
    }

    /// Handle an End-Of-Sequence from `slot`.
    pub fn on_eos(
        &mut self,
        slot: &HardwareSlot,
        committed: &CommittedSequence,
        enabled: bool,
    ) -> EosOutcome {
        self.runs += 1;
        // Only a synced slot was playing the committed snapshot. Otherwise
        // the pass that ended belonged to older content, and a new Single
        // snapshot still owes its one run.
        let auto_disabled = self.state == SyncState::Synced
            && enabled
            && committed.run_mode == RunMode::Single;

        let sync = match self.state {
            SyncState::Synced => None,
            SyncState::SyncPending => Some(self.finish_sync(slot, committed, enabled)),
            // Never quiesced: an Auto slot may already be replaying.
            SyncState::Unsynced => Some(self.sync(slot, committed, enabled)),
        };

        if auto_disabled {
            slot.disable();
        }

        EosOutcome {
            run: self.runs,
            sync,
            auto_disabled,
        }
    }

    /// Handle a Start-Of-Sequence. Observational only.
    pub fn on_sos(&mut self) -> u64 {
        self.starts += 1;
        self.starts
    }
}
