//! Register backend trait.
//!
//! A backend gives the sequencer access to one card: it hands out the
//! register block of every Sequence RAM and reports pending SOS/EOS
//! interrupts when polled. Bus probing and register-map setup happen
//! inside the backend.

use evg_common::seq::config::CardConfig;
use evg_common::seq::error::CardError;
use evg_common::seq::registers::SeqRamRegisters;

/// Interrupt source bit of a Sequence RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrqKind {
    /// Start-Of-Sequence.
    Sos,
    /// End-Of-Sequence.
    Eos,
}

/// One pending interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotIrq {
    /// Sequence RAM id.
    pub slot: u8,
    /// Interrupt source.
    pub kind: IrqKind,
}

/// Factory function type for creating backend instances.
pub type BackendFactory = fn() -> Box<dyn CardBackend>;

/// Optional backend diagnostics.
#[derive(Debug, Clone, Default)]
pub struct BackendDiagnostics {
    /// Number of polls executed
    pub polls: u64,
    /// Interrupts reported
    pub interrupts: u64,
}

/// Interface of a pluggable card backend.
///
/// # Lifecycle
///
/// 1. `init()` - Called once with the card configuration
/// 2. `open_slot()` - Called once per Sequence RAM id, in order
/// 3. `poll_interrupts()` - Called every `irq_poll_us` by the interrupt front-end
/// 4. `shutdown()` - Called when the card is stopping
///
/// Interrupt delivery is at-least-once: a backend may report the same
/// hardware event twice (coalescing, rate limiting). Consumers tolerate it.
pub trait CardBackend: Send {
    /// Backend identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Backend semantic version.
    fn version(&self) -> &'static str;

    /// Initialize the backend for `config`.
    ///
    /// # Errors
    /// `CardError::InitFailed` or `CardError::ConfigError`.
    fn init(&mut self, config: &CardConfig) -> Result<(), CardError>;

    /// Register block of Sequence RAM `id`.
    fn open_slot(&mut self, id: u8) -> Result<Box<dyn SeqRamRegisters>, CardError>;

    /// Append pending interrupts to `pending`. Must not block.
    fn poll_interrupts(&mut self, pending: &mut Vec<SlotIrq>);

    /// Release hardware resources.
    fn shutdown(&mut self) -> Result<(), CardError> {
        Ok(())
    }

    /// Backend diagnostics.
    /// Default: None
    fn diagnostics(&self) -> Option<BackendDiagnostics> {
        None
    }
}
