//! Sequence RAM constants.
//!
//! Limits fixed by the timing card hardware and the reserved event codes
//! the sequencer emits on its own.

use static_assertions::const_assert;

/// Reserved event code terminating every committed sequence (End-Of-Sequence).
pub const EOS_CODE: u8 = 0x7F;

/// Event code of a continuation entry (no semantic event).
pub const NULL_CODE: u8 = 0x00;

/// Delta carried by a continuation entry: wait the full register width, keep counting.
pub const CONTINUATION_DELTA: u32 = u32::MAX;

/// Maximum number of user data entries in one Sequence RAM.
pub const MAX_DATA_ENTRIES: usize = 2047;

/// Physical entries in one Sequence RAM: data entries plus the terminal slot.
pub const RAM_ENTRIES: usize = MAX_DATA_ENTRIES + 1;

/// Sequence RAM slots on a standard generator card.
pub const DEFAULT_SLOT_COUNT: u8 = 2;

/// Upper bound on slots any supported card exposes.
pub const MAX_SLOTS: u8 = 8;

/// Ticks between the last user event and the appended EOS entry.
pub const DEFAULT_EOS_POST_GAP: u64 = 125;

/// Default interrupt poll period in microseconds.
pub const DEFAULT_IRQ_POLL_US: u32 = 1000;

/// Canonical service name (used for logging).
pub const SEQ_SERVICE_NAME: &str = "evg_seq";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/evg/sequencer.toml";

const_assert!(RAM_ENTRIES == 2048);
const_assert!(DEFAULT_SLOT_COUNT <= MAX_SLOTS);
const_assert!(EOS_CODE != NULL_CODE);
