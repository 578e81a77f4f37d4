//! Prelude module for common re-exports.
//!
//! ```rust
//! use evg_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::seq::config::{CardConfig, SequenceConfig, SequencerConfig};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{EOS_CODE, MAX_DATA_ENTRIES, RAM_ENTRIES};

// ─── Sequence types ─────────────────────────────────────────────────
pub use crate::seq::error::{CardError, ErrorKind, SequenceError};
pub use crate::seq::registers::{ControlStrobe, RamStatus, SeqRamRegisters};
pub use crate::seq::types::{EventEntry, RunMode, TriggerSource};
