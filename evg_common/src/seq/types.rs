//! Sequence data types.
//!
//! - `EventEntry` - One `(delta-ticks, code, mask)` row of a Sequence RAM
//! - `RunMode` - How a slot re-arms after playback
//! - `TriggerSource` - What starts playback of an armed slot

use crate::consts::{CONTINUATION_DELTA, EOS_CODE, NULL_CODE};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of a committed sequence as written to Sequence RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventEntry {
    /// Ticks since the previous entry.
    pub delta: u32,
    /// Event code emitted when the entry plays.
    pub code: u8,
    /// Event mask bits.
    pub mask: u8,
}

impl EventEntry {
    /// Synthetic entry that only advances time by the full register width.
    pub const CONTINUATION: EventEntry = EventEntry {
        delta: CONTINUATION_DELTA,
        code: NULL_CODE,
        mask: 0,
    };

    /// Create a new entry.
    pub const fn new(delta: u32, code: u8, mask: u8) -> Self {
        Self { delta, code, mask }
    }

    /// End-Of-Sequence entry `delta` ticks after the previous entry.
    pub const fn eos(delta: u32) -> Self {
        Self {
            delta,
            code: EOS_CODE,
            mask: 0,
        }
    }

    /// True for the reserved End-Of-Sequence code.
    #[inline]
    pub const fn is_eos(&self) -> bool {
        self.code == EOS_CODE
    }

    /// True for a synthetic continuation entry.
    #[inline]
    pub const fn is_continuation(&self) -> bool {
        self.delta == CONTINUATION_DELTA && self.code == NULL_CODE && self.mask == 0
    }
}

impl fmt::Display for EventEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(+{}, 0x{:02X}, 0x{:02X})", self.delta, self.code, self.mask)
    }
}

/// How a Sequence RAM behaves once playback reaches EOS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// One pass per trigger; the slot stays armed.
    #[default]
    Normal,
    /// Recycle: playback restarts immediately after EOS.
    Auto,
    /// One pass, then the slot disarms itself.
    Single,
}

impl RunMode {
    /// Parse a run-mode name, as written to the `run_mode` property by
    /// text-only clients. `recycle` is accepted for Auto.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "normal" => Some(RunMode::Normal),
            "auto" | "recycle" => Some(RunMode::Auto),
            "single" => Some(RunMode::Single),
            _ => None,
        }
    }
}

/// Trigger source feeding an armed Sequence RAM.
///
/// ```toml
/// trigger_source = "software"
/// trigger_source = { mxc = 0 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// Not connected; an armed slot never starts.
    #[default]
    None,
    /// Software trigger strobe only.
    Software,
    /// Multiplexed counter output `n` (0..=7).
    Mxc(u8),
    /// AC line synchronisation input.
    Ac,
    /// External trigger input `n` (0..=15).
    External(u8),
}

impl TriggerSource {
    /// Raw trigger-source-select field value.
    pub const fn to_raw(self) -> u32 {
        match self {
            TriggerSource::Mxc(n) => (n & 0x07) as u32,
            TriggerSource::Ac => 0x10,
            TriggerSource::Software => 0x11,
            TriggerSource::External(n) => 0x20 | (n & 0x0F) as u32,
            TriggerSource::None => 0xFF,
        }
    }

    /// Decode a trigger-source-select field value.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x00..=0x07 => Some(TriggerSource::Mxc(raw as u8)),
            0x10 => Some(TriggerSource::Ac),
            0x11 => Some(TriggerSource::Software),
            0x20..=0x2F => Some(TriggerSource::External((raw & 0x0F) as u8)),
            0xFF => Some(TriggerSource::None),
            _ => None,
        }
    }
}
