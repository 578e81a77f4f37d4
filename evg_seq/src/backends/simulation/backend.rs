//! Simulation backend implementation.
//!
//! Every Sequence RAM is a [`SimSeqRam`]. Each `poll_interrupts()` advances
//! playback by one poll; an optional periodic trigger edge is delivered on
//! every hardware trigger input.
//!
//! ```toml
//! [card.driver_config.simulation]
//! trigger_period_polls = 10   # 0 = no hardware triggers
//! playback_polls = 2          # polls from SOS to EOS
//! duplicate_eos = false       # report every EOS twice
//! ```

use super::ram::SimSeqRam;
use crate::backend::{BackendDiagnostics, CardBackend, IrqKind, SlotIrq};
use evg_common::seq::config::CardConfig;
use evg_common::seq::error::CardError;
use evg_common::seq::registers::SeqRamRegisters;
use tracing::{debug, info};

/// Settings read from `[card.driver_config.simulation]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSettings {
    /// Polls between hardware trigger edges; 0 disables them.
    pub trigger_period_polls: u64,
    /// Polls from SOS to EOS.
    pub playback_polls: u32,
    /// Report every EOS twice.
    pub duplicate_eos: bool,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            trigger_period_polls: 0,
            playback_polls: 1,
            duplicate_eos: false,
        }
    }
}

impl SimSettings {
    /// Parse the driver section. Missing keys keep their defaults.
    pub fn from_config(config: &CardConfig) -> Result<Self, CardError> {
        let mut settings = Self::default();
        let Some(section) = config.driver_section("simulation") else {
            return Ok(settings);
        };

        if let Some(value) = section.get("trigger_period_polls") {
            let period = value.as_integer().filter(|v| *v >= 0).ok_or_else(|| {
                CardError::ConfigError("trigger_period_polls must be a non-negative integer".into())
            })?;
            settings.trigger_period_polls = period as u64;
        }
        if let Some(value) = section.get("playback_polls") {
            let polls = value
                .as_integer()
                .filter(|v| (1..=i64::from(u32::MAX)).contains(v))
                .ok_or_else(|| {
                    CardError::ConfigError("playback_polls must be a positive integer".into())
                })?;
            settings.playback_polls = polls as u32;
        }
        if let Some(value) = section.get("duplicate_eos") {
            settings.duplicate_eos = value.as_bool().ok_or_else(|| {
                CardError::ConfigError("duplicate_eos must be a boolean".into())
            })?;
        }
        Ok(settings)
    }
}

/// Simulation backend implementing the CardBackend trait.
pub struct SimulationBackend {
    name: &'static str,
    version: &'static str,
    settings: SimSettings,
    ram_capacity: usize,
    slot_count: u8,
    rams: Vec<SimSeqRam>,
    initialized: bool,
    polls: u64,
    interrupts: u64,
    scratch: Vec<IrqKind>,
}

impl SimulationBackend {
    /// Create an uninitialized backend.
    pub fn new() -> Self {
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            settings: SimSettings::default(),
            ram_capacity: 0,
            slot_count: 0,
            rams: Vec::new(),
            initialized: false,
            polls: 0,
            interrupts: 0,
            scratch: Vec::new(),
        }
    }

    /// Handle to the RAM of slot `id`, once opened.
    pub fn ram(&self, id: u8) -> Option<SimSeqRam> {
        self.rams.get(usize::from(id)).cloned()
    }
}

impl Default for SimulationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CardBackend for SimulationBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, config: &CardConfig) -> Result<(), CardError> {
        self.settings = SimSettings::from_config(config)?;
        // One terminal entry past the data capacity.
        self.ram_capacity = config.ram_capacity + 1;
        self.slot_count = config.slot_count;
        self.rams.clear();
        self.polls = 0;
        self.interrupts = 0;
        self.initialized = true;

        info!(
            card = %config.name,
            slots = self.slot_count,
            capacity = self.ram_capacity,
            trigger_period_polls = self.settings.trigger_period_polls,
            playback_polls = self.settings.playback_polls,
            duplicate_eos = self.settings.duplicate_eos,
            "Simulation backend initialized"
        );
        Ok(())
    }

    fn open_slot(&mut self, id: u8) -> Result<Box<dyn SeqRamRegisters>, CardError> {
        if !self.initialized {
            return Err(CardError::InitFailed("backend not initialized".into()));
        }
        if id >= self.slot_count || usize::from(id) != self.rams.len() {
            return Err(CardError::InitFailed(format!(
                "sequence RAM {id} cannot be opened ({} of {} open)",
                self.rams.len(),
                self.slot_count
            )));
        }
        let ram = SimSeqRam::new(self.ram_capacity).with_playback_polls(self.settings.playback_polls);
        self.rams.push(ram.clone());
        debug!(slot = id, "simulated sequence RAM opened");
        Ok(Box::new(ram))
    }

    fn poll_interrupts(&mut self, pending: &mut Vec<SlotIrq>) {
        self.polls += 1;
        let period = self.settings.trigger_period_polls;
        let external = period > 0 && self.polls % period == 0;

        for (id, ram) in self.rams.iter().enumerate() {
            self.scratch.clear();
            ram.step(external, &mut self.scratch);
            let slot = id as u8;
            for &kind in &self.scratch {
                pending.push(SlotIrq { slot, kind });
                self.interrupts += 1;
                if kind == IrqKind::Eos && self.settings.duplicate_eos {
                    pending.push(SlotIrq { slot, kind });
                    self.interrupts += 1;
                }
            }
        }
    }

    fn shutdown(&mut self) -> Result<(), CardError> {
        info!(polls = self.polls, interrupts = self.interrupts, "Shutting down simulation backend");
        self.rams.clear();
        self.initialized = false;
        Ok(())
    }

    fn diagnostics(&self) -> Option<BackendDiagnostics> {
        Some(BackendDiagnostics {
            polls: self.polls,
            interrupts: self.interrupts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evg_common::seq::registers::ControlStrobe;
    use evg_common::seq::types::{RunMode, TriggerSource};

    fn config_with(section: &str) -> CardConfig {
        let value: toml::Value = toml::from_str(section).unwrap();
        let mut config = CardConfig::default();
        config.driver_config.insert("simulation".into(), value);
        config
    }

    #[test]
    fn test_settings_default_without_section() {
        let settings = SimSettings::from_config(&CardConfig::default()).unwrap();
        assert_eq!(settings, SimSettings::default());
    }

    #[test]
    fn test_settings_parsed() {
        let config = config_with("trigger_period_polls = 4\nplayback_polls = 3\nduplicate_eos = true");
        let settings = SimSettings::from_config(&config).unwrap();
        assert_eq!(settings.trigger_period_polls, 4);
        assert_eq!(settings.playback_polls, 3);
        assert!(settings.duplicate_eos);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let config = config_with("playback_polls = 0");
        assert!(matches!(
            SimSettings::from_config(&config),
            Err(CardError::ConfigError(_))
        ));
        let config = config_with("duplicate_eos = 1");
        assert!(SimSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_slots_open_in_order() {
        let mut backend = SimulationBackend::new();
        assert!(backend.open_slot(0).is_err());
        backend.init(&CardConfig::default()).unwrap();
        assert!(backend.open_slot(1).is_err());
        let regs = backend.open_slot(0).unwrap();
        assert_eq!(regs.capacity(), 2048);
        assert!(backend.open_slot(1).is_ok());
        assert!(backend.open_slot(2).is_err());
    }

    #[test]
    fn test_periodic_trigger_and_duplicate_eos() {
        let mut backend = SimulationBackend::new();
        backend
            .init(&config_with("trigger_period_polls = 2\nduplicate_eos = true"))
            .unwrap();
        let mut regs = backend.open_slot(0).unwrap();
        regs.write_trigger_source(TriggerSource::Mxc(1));
        regs.write_run_mode(RunMode::Normal);
        regs.strobe(ControlStrobe::ENABLE);

        let mut pending = Vec::new();
        backend.poll_interrupts(&mut pending);
        assert!(pending.is_empty());

        backend.poll_interrupts(&mut pending);
        assert_eq!(pending, vec![SlotIrq { slot: 0, kind: IrqKind::Sos }]);

        pending.clear();
        backend.poll_interrupts(&mut pending);
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|irq| irq.kind == IrqKind::Eos));
        assert_eq!(backend.diagnostics().map(|d| d.interrupts), Some(3));
    }
}
