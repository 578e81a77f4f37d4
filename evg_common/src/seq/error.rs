//! Sequencer error types.
//!
//! - `SequenceError` - Errors raised by sequence operations, grouped by [`ErrorKind`]
//! - `CardError` - Card, backend and configuration failures

use crate::config::ConfigError;
use thiserror::Error;

/// Coarse classification of a [`SequenceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input rejected by `commit()` or a setter; prior state retained.
    Validation,
    /// No free Sequence RAM; the caller may retry.
    ResourceExhausted,
    /// Operation not valid in the current state or for the given id.
    InvalidOperation,
    /// Register readback disagrees with the software view. Never fatal.
    HardwareInconsistency,
}

/// Errors raised by sequence operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// Input timestamps are not strictly increasing.
    #[error("timestamp[{index}] = {current} does not follow {previous}")]
    NonMonotonic {
        /// Index of the offending timestamp
        index: usize,
        /// Timestamp preceding it
        previous: u64,
        /// Offending timestamp
        current: u64,
    },

    /// Timestamp cannot be converted to ticks (negative or not finite).
    #[error("timestamp[{index}] is not a valid tick count")]
    InvalidTimestamp {
        /// Index of the offending timestamp
        index: usize,
    },

    /// Compiled sequence does not fit in Sequence RAM.
    #[error("compiled sequence has {len} entries, capacity is {capacity}")]
    TooManyEntries {
        /// Compiled entry count
        len: usize,
        /// RAM capacity including the terminal entry
        capacity: usize,
    },

    /// A working array exceeds the data-entry limit.
    #[error("{field} has {len} elements (max {max})")]
    ArrayTooLong {
        /// Array name
        field: &'static str,
        /// Supplied length
        len: usize,
        /// Maximum accepted length
        max: usize,
    },

    /// Every Sequence RAM is owned.
    #[error("no free sequence RAM for sequence {sequence}")]
    NoFreeSlot {
        /// Requesting sequence id
        sequence: u32,
    },

    /// Operation needs a loaded sequence.
    #[error("sequence {sequence} is not loaded ({operation})")]
    NotLoaded {
        /// Sequence id
        sequence: u32,
        /// Rejected operation
        operation: &'static str,
    },

    /// Operation on a sequence that was never loaded.
    #[error("sequence {sequence} was never loaded ({operation})")]
    NeverLoaded {
        /// Sequence id
        sequence: u32,
        /// Rejected operation
        operation: &'static str,
    },

    /// Slot id outside the card's pool.
    #[error("no sequence RAM with id {0}")]
    UnknownSlot(u8),

    /// Sequence id not registered on the card.
    #[error("no sequence with id {0}")]
    UnknownSequence(u32),

    /// Sequence id already registered on the card.
    #[error("sequence {0} already exists")]
    DuplicateSequence(u32),

    /// Property name not in the device's property table.
    #[error("unknown property '{0}'")]
    UnknownProperty(String),

    /// Property value of the wrong type.
    #[error("property '{property}' expects {expected}")]
    PropertyType {
        /// Property name
        property: &'static str,
        /// Expected value type
        expected: &'static str,
    },

    /// Write to a read-only property.
    #[error("property '{0}' is read-only")]
    PropertyReadOnly(&'static str),

    /// Hardware disagrees with the software view.
    #[error("hardware inconsistency on sequence RAM {slot}: {detail}")]
    HardwareInconsistency {
        /// Slot id
        slot: u8,
        /// What disagreed
        detail: String,
    },
}

impl SequenceError {
    /// Classify the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            SequenceError::NonMonotonic { .. }
            | SequenceError::InvalidTimestamp { .. }
            | SequenceError::TooManyEntries { .. }
            | SequenceError::ArrayTooLong { .. } => ErrorKind::Validation,
            SequenceError::NoFreeSlot { .. } => ErrorKind::ResourceExhausted,
            SequenceError::NotLoaded { .. }
            | SequenceError::NeverLoaded { .. }
            | SequenceError::UnknownSlot(_)
            | SequenceError::UnknownSequence(_)
            | SequenceError::DuplicateSequence(_)
            | SequenceError::UnknownProperty(_)
            | SequenceError::PropertyType { .. }
            | SequenceError::PropertyReadOnly(_) => ErrorKind::InvalidOperation,
            SequenceError::HardwareInconsistency { .. } => ErrorKind::HardwareInconsistency,
        }
    }
}

/// Card-level errors: backend resolution, initialization, configuration.
#[derive(Debug, Clone, Error)]
pub enum CardError {
    /// No backend registered under this name.
    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    /// Backend initialization failed.
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Sequence operation failed.
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

impl From<ConfigError> for CardError {
    fn from(err: ConfigError) -> Self {
        CardError::ConfigError(err.to_string())
    }
}
