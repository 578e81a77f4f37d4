//! Sequence RAM register contract.
//!
//! This module defines:
//! - `SeqRamRegisters` trait - Register-level interface of one Sequence RAM
//! - `ControlStrobe` - Write-one strobe bits of the control register
//! - `RamStatus` - Read-only status bits of the control register
//!
//! Bus probing and register-map setup live outside this workspace; a
//! backend hands out one `SeqRamRegisters` per physical slot.

use crate::consts::RAM_ENTRIES;
use crate::seq::types::{RunMode, TriggerSource};
use bitflags::bitflags;

bitflags! {
    /// Write-one strobe bits of the per-slot control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlStrobe: u32 {
        /// Arm the slot.
        const ENABLE     = 0x0001;
        /// Disarm the slot.
        const DISABLE    = 0x0002;
        /// Fire the software trigger.
        const SW_TRIGGER = 0x0004;
        /// Stop playback and rewind the RAM pointer. Raises no EOS.
        const RESET      = 0x0008;
    }
}

bitflags! {
    /// Read-only status bits of the per-slot control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RamStatus: u32 {
        /// Slot is armed.
        const ENABLED = 0x0100;
        /// Playback in progress.
        const RUNNING = 0x0200;
    }
}

/// Register-level interface of one Sequence RAM.
///
/// Writes are raw: the caller must guarantee the slot is not playing
/// before touching the event/timestamp/mask arrays, otherwise in-flight
/// timing output is corrupted.
///
/// # Timing Contracts
///
/// | Operation | Context | Blocking |
/// |-----------|---------|----------|
/// | array writes | calling thread or interrupt | never |
/// | `strobe()` | calling thread or interrupt | never |
/// | `status()` | any | never |
pub trait SeqRamRegisters: Send {
    /// Physical entries including the terminal slot.
    fn capacity(&self) -> usize {
        RAM_ENTRIES
    }

    /// Write the delta-ticks register of entry `index`.
    fn write_timestamp(&mut self, index: usize, delta: u32);

    /// Write the event-code register of entry `index`.
    fn write_event_code(&mut self, index: usize, code: u8);

    /// Write the mask register of entry `index`.
    fn write_mask(&mut self, index: usize, mask: u8);

    /// Read back the delta-ticks register of entry `index`.
    fn read_timestamp(&self, index: usize) -> u32;

    /// Read back the event-code register of entry `index`.
    fn read_event_code(&self, index: usize) -> u8;

    /// Read back the mask register of entry `index`.
    fn read_mask(&self, index: usize) -> u8;

    /// Write the trigger-source-select field.
    fn write_trigger_source(&mut self, source: TriggerSource);

    /// Read back the trigger-source-select field.
    fn read_trigger_source(&self) -> TriggerSource;

    /// Write the run-mode bits.
    fn write_run_mode(&mut self, mode: RunMode);

    /// Read back the run-mode bits.
    fn read_run_mode(&self) -> RunMode;

    /// Write strobe bits to the control register.
    fn strobe(&mut self, bits: ControlStrobe);

    /// Read the status bits of the control register.
    fn status(&self) -> RamStatus;
}
