//! Sequencer configuration types.
//!
//! This module contains the configuration loaded from `sequencer.toml`:
//! - `SequencerConfig` - Root document
//! - `CardConfig` - One timing card and its register backend
//! - `SequenceConfig` - A sequence definition created at startup
//!
//! ```toml
//! [shared]
//! service_name = "evg-seq-01"
//!
//! [card]
//! name = "evg0"
//! driver = "simulation"
//!
//! [card.driver_config.simulation]
//! trigger_period_polls = 10
//!
//! [[sequences]]
//! id = 1
//! trigger_source = "software"
//! run_mode = "single"
//! event_codes = [7, 8]
//! timestamps = [100, 200]
//! ```

use crate::config::{ConfigError, SharedConfig};
use crate::consts::{
    DEFAULT_EOS_POST_GAP, DEFAULT_IRQ_POLL_US, DEFAULT_SLOT_COUNT, MAX_DATA_ENTRIES, MAX_SLOTS,
};
use crate::seq::types::{RunMode, TriggerSource};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

fn default_driver() -> String {
    "simulation".to_string()
}

fn default_slot_count() -> u8 {
    DEFAULT_SLOT_COUNT
}

fn default_ram_capacity() -> usize {
    MAX_DATA_ENTRIES
}

fn default_eos_post_gap() -> u64 {
    DEFAULT_EOS_POST_GAP
}

fn default_irq_poll_us() -> u32 {
    DEFAULT_IRQ_POLL_US
}

/// Root of `sequencer.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Fields common to all services.
    #[serde(default)]
    pub shared: SharedConfig,

    /// The timing card.
    pub card: CardConfig,

    /// Sequences created at startup.
    #[serde(default)]
    pub sequences: Vec<SequenceConfig>,
}

impl SequencerConfig {
    /// Validate the whole document.
    ///
    /// # Validation Rules
    /// 1. `shared` and `card` validate
    /// 2. Sequence ids are unique
    /// 3. Every sequence fits in the card's data capacity
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.card.validate()?;

        let mut ids = HashSet::new();
        for seq in &self.sequences {
            if !ids.insert(seq.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate sequence id {}",
                    seq.id
                )));
            }
            seq.validate(self.card.ram_capacity)?;
        }
        Ok(())
    }
}

/// One timing card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardConfig {
    /// Card name used in logs.
    pub name: String,

    /// Register backend (e.g., "simulation").
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Number of Sequence RAMs on the card.
    #[serde(default = "default_slot_count")]
    pub slot_count: u8,

    /// Data entries per Sequence RAM, excluding the terminal entry.
    #[serde(default = "default_ram_capacity")]
    pub ram_capacity: usize,

    /// Ticks between the last user event and the appended EOS.
    #[serde(default = "default_eos_post_gap")]
    pub eos_post_gap: u64,

    /// Interrupt front-end poll period in microseconds.
    #[serde(default = "default_irq_poll_us")]
    pub irq_poll_us: u32,

    /// Per-driver configuration sections.
    /// Key = driver name, Value = driver-specific TOML table.
    #[serde(default)]
    pub driver_config: HashMap<String, toml::Value>,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            name: "evg0".to_string(),
            driver: default_driver(),
            slot_count: DEFAULT_SLOT_COUNT,
            ram_capacity: MAX_DATA_ENTRIES,
            eos_post_gap: DEFAULT_EOS_POST_GAP,
            irq_poll_us: DEFAULT_IRQ_POLL_US,
            driver_config: HashMap::new(),
        }
    }
}

impl CardConfig {
    /// Validate the card configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "card name cannot be empty".to_string(),
            ));
        }
        if self.slot_count == 0 || self.slot_count > MAX_SLOTS {
            return Err(ConfigError::ValidationError(format!(
                "slot_count {} out of range 1..={}",
                self.slot_count, MAX_SLOTS
            )));
        }
        if self.ram_capacity == 0 || self.ram_capacity > MAX_DATA_ENTRIES {
            return Err(ConfigError::ValidationError(format!(
                "ram_capacity {} out of range 1..={}",
                self.ram_capacity, MAX_DATA_ENTRIES
            )));
        }
        if self.irq_poll_us == 0 {
            return Err(ConfigError::ValidationError(
                "irq_poll_us must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Driver-specific table for `driver`, if present.
    pub fn driver_section(&self, driver: &str) -> Option<&toml::Value> {
        self.driver_config.get(driver)
    }
}

/// A sequence created at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Sequence id, unique per card.
    pub id: u32,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Trigger source.
    #[serde(default)]
    pub trigger_source: TriggerSource,

    /// Run mode.
    #[serde(default)]
    pub run_mode: RunMode,

    /// Event codes.
    #[serde(default)]
    pub event_codes: Vec<u8>,

    /// Absolute timestamps in ticks.
    #[serde(default)]
    pub timestamps: Vec<u64>,

    /// Event masks; missing entries default to 0.
    #[serde(default)]
    pub masks: Vec<u8>,

    /// Commit and load at startup.
    #[serde(default)]
    pub load: bool,

    /// Arm after loading.
    #[serde(default)]
    pub enable: bool,
}

impl SequenceConfig {
    /// Validate array lengths against the card's data capacity.
    pub fn validate(&self, capacity: usize) -> Result<(), ConfigError> {
        for (field, len) in [
            ("event_codes", self.event_codes.len()),
            ("timestamps", self.timestamps.len()),
            ("masks", self.masks.len()),
        ] {
            if len > capacity {
                return Err(ConfigError::ValidationError(format!(
                    "sequence {}: {} has {} elements (max {})",
                    self.id, field, len, capacity
                )));
            }
        }
        if self.enable && !self.load {
            return Err(ConfigError::ValidationError(format!(
                "sequence {}: enable requires load",
                self.id
            )));
        }
        Ok(())
    }
}
