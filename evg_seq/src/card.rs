//! Sequencer card and interrupt front-end.
//!
//! `SequencerCard` is the main entry point: it builds the backend and slot
//! pool from a [`CardConfig`], keeps the registry of sequence definitions
//! bound to the card, and runs the poll loop that turns backend interrupts
//! into `process_sos()`/`process_eos()` calls on the hardware slots.

use crate::backend::{CardBackend, IrqKind, SlotIrq};
use crate::backend_registry::BackendRegistry;
use crate::compiler::CompileLimits;
use crate::definition::SequenceDefinition;
use crate::properties::{self, PropertyValue, SOFT_SEQUENCE};
use crate::slot_manager::SlotManager;
use evg_common::config::ConfigLoader;
use evg_common::seq::config::{CardConfig, SequenceConfig, SequencerConfig};
use evg_common::seq::error::{CardError, SequenceError};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Interrupt front-end statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqStats {
    /// Polls executed
    pub polls: u64,
    /// SOS interrupts dispatched
    pub sos: u64,
    /// EOS interrupts dispatched
    pub eos: u64,
    /// Interrupts naming a slot outside the pool
    pub unknown_slot: u64,
    /// Polls that overran `irq_poll_us`
    pub overruns: u64,
    /// Longest poll in microseconds
    pub max_poll_us: u64,
}

/// One timing card: slot pool, sequences and interrupt front-end.
pub struct SequencerCard {
    /// Card configuration
    config: CardConfig,
    /// Register backend
    backend: Mutex<Box<dyn CardBackend>>,
    /// Sequence RAM pool
    slots: Arc<SlotManager>,
    /// Compiler limits derived from the card
    limits: CompileLimits,
    /// Sequences bound to this card
    sequences: RwLock<BTreeMap<u32, Arc<SequenceDefinition>>>,
    /// Poll loop control
    running: Arc<AtomicBool>,
    /// Poll period
    poll_period: Duration,
    /// Front-end statistics
    stats: Mutex<IrqStats>,
}

impl SequencerCard {
    /// Build a card, resolving `config.driver` through `registry`.
    ///
    /// # Errors
    /// Invalid configuration, unknown backend, or backend init failure.
    pub fn new(config: CardConfig, registry: &BackendRegistry) -> Result<Self, CardError> {
        config.validate()?;
        let backend = registry.create(&config.driver)?;
        Self::with_backend(config, backend)
    }

    /// Build a card around an already created backend.
    pub fn with_backend(
        config: CardConfig,
        mut backend: Box<dyn CardBackend>,
    ) -> Result<Self, CardError> {
        config.validate()?;
        info!(
            card = %config.name,
            "Created backend: {} v{}",
            backend.name(),
            backend.version()
        );
        backend.init(&config)?;

        let registers = (0..config.slot_count)
            .map(|id| backend.open_slot(id))
            .collect::<Result<Vec<_>, _>>()?;
        let slots = Arc::new(SlotManager::new(registers));

        let limits = CompileLimits {
            capacity: config.ram_capacity + 1,
            post_gap: config.eos_post_gap,
        };
        let poll_period = Duration::from_micros(u64::from(config.irq_poll_us));

        info!(
            card = %config.name,
            slots = slots.len(),
            capacity = limits.capacity,
            irq_poll_us = config.irq_poll_us,
            "Sequencer card ready"
        );

        Ok(Self {
            config,
            backend: Mutex::new(backend),
            slots,
            limits,
            sequences: RwLock::new(BTreeMap::new()),
            running: Arc::new(AtomicBool::new(true)),
            poll_period,
            stats: Mutex::new(IrqStats::default()),
        })
    }

    /// Load a sequencer configuration file.
    pub fn load_config(path: &Path) -> Result<SequencerConfig, CardError> {
        info!("Loading configuration from {:?}", path);
        let config = SequencerConfig::load(path)?;
        config.validate()?;
        info!(
            "Loaded config: card={}, driver={}, {} sequences",
            config.card.name,
            config.card.driver,
            config.sequences.len()
        );
        Ok(config)
    }

    /// Card name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Card configuration.
    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    /// Sequence RAM pool.
    pub fn slots(&self) -> &Arc<SlotManager> {
        &self.slots
    }

    /// Compiler limits.
    pub fn limits(&self) -> CompileLimits {
        self.limits
    }

    // ─── Sequence registry ──────────────────────────────────────────

    /// Create a sequence bound to this card.
    ///
    /// # Errors
    /// `SequenceError::DuplicateSequence` if `id` is taken.
    pub fn create_sequence(
        &self,
        id: u32,
        description: impl Into<String>,
    ) -> Result<Arc<SequenceDefinition>, SequenceError> {
        let mut sequences = self.sequences.write();
        if sequences.contains_key(&id) {
            return Err(SequenceError::DuplicateSequence(id));
        }
        let def = SequenceDefinition::new(id, description, Arc::clone(&self.slots), self.limits);
        sequences.insert(id, Arc::clone(&def));
        debug!(card = %self.config.name, sequence = id, "sequence created");
        Ok(def)
    }

    /// Sequence by id.
    pub fn sequence(&self, id: u32) -> Result<Arc<SequenceDefinition>, SequenceError> {
        self.sequences
            .read()
            .get(&id)
            .cloned()
            .ok_or(SequenceError::UnknownSequence(id))
    }

    /// All sequences in id order.
    pub fn sequences(&self) -> Vec<Arc<SequenceDefinition>> {
        self.sequences.read().values().cloned().collect()
    }

    /// Unload and forget a sequence.
    pub fn remove_sequence(&self, id: u32) -> Result<(), SequenceError> {
        let def = self
            .sequences
            .write()
            .remove(&id)
            .ok_or(SequenceError::UnknownSequence(id))?;
        def.unload();
        debug!(card = %self.config.name, sequence = id, "sequence removed");
        Ok(())
    }

    /// Create a sequence from configuration through the property table,
    /// then commit, load and enable as requested.
    ///
    /// # Errors
    /// Any error from the individual property writes. A `NoFreeSlot` on
    /// load is returned; the sequence stays registered and committed.
    pub fn apply_sequence_config(
        &self,
        cfg: &SequenceConfig,
    ) -> Result<Arc<SequenceDefinition>, SequenceError> {
        let def = self.create_sequence(cfg.id, cfg.description.clone())?;

        let writes = [
            ("event_codes", PropertyValue::Codes(cfg.event_codes.clone())),
            ("timestamps", PropertyValue::Ticks(cfg.timestamps.clone())),
            ("masks", PropertyValue::Codes(cfg.masks.clone())),
            ("trigger_source", PropertyValue::Trigger(cfg.trigger_source)),
            ("run_mode", PropertyValue::Mode(cfg.run_mode)),
        ];
        for (name, value) in writes {
            let prop = SOFT_SEQUENCE.resolve(name)?;
            properties::write(&def, prop, value)?;
        }

        if cfg.load {
            for name in ["commit", "load"] {
                properties::write(&def, SOFT_SEQUENCE.resolve(name)?, PropertyValue::None)?;
            }
        }
        if cfg.enable {
            properties::write(&def, SOFT_SEQUENCE.resolve("enable")?, PropertyValue::Bool(true))?;
        }

        info!(
            card = %self.config.name,
            sequence = cfg.id,
            loaded = def.is_loaded(),
            enabled = def.is_enabled(),
            "sequence configured"
        );
        Ok(def)
    }

    // ─── Interrupt front-end ────────────────────────────────────────

    /// Start-Of-Sequence from slot `slot_id`. Never fails.
    pub fn on_sos(&self, slot_id: u8) {
        self.dispatch(SlotIrq {
            slot: slot_id,
            kind: IrqKind::Sos,
        });
    }

    /// End-Of-Sequence from slot `slot_id`. Never fails.
    pub fn on_eos(&self, slot_id: u8) {
        self.dispatch(SlotIrq {
            slot: slot_id,
            kind: IrqKind::Eos,
        });
    }

    fn dispatch(&self, irq: SlotIrq) {
        let slot = match self.slots.slot(irq.slot) {
            Ok(slot) => slot,
            Err(err) => {
                warn!(card = %self.config.name, kind = ?irq.kind, "{err}");
                self.stats.lock().unknown_slot += 1;
                return;
            }
        };
        match irq.kind {
            IrqKind::Sos => {
                slot.process_sos();
                self.stats.lock().sos += 1;
            }
            IrqKind::Eos => {
                slot.process_eos();
                self.stats.lock().eos += 1;
            }
        }
    }

    /// Poll the backend once and dispatch everything it reported.
    /// Returns the number of interrupts dispatched.
    pub fn poll_once(&self) -> usize {
        let mut pending = Vec::new();
        self.backend.lock().poll_interrupts(&mut pending);
        // Backend lock released before entering slots and definitions.
        for irq in &pending {
            self.dispatch(*irq);
        }
        self.stats.lock().polls += 1;
        pending.len()
    }

    /// Run the poll loop until the running flag is cleared, or for at
    /// most `max_polls` polls.
    ///
    /// The flag is set when the card is built and only [`stop`](Self::stop)
    /// clears it, so a stop requested before the loop starts is honoured.
    pub fn run_interrupt_loop(&self, max_polls: Option<u64>) {
        info!(
            card = %self.config.name,
            "Starting interrupt loop (poll period={}us)...",
            self.poll_period.as_micros()
        );

        let mut polls = 0u64;
        while self.running.load(Ordering::SeqCst) {
            if max_polls.is_some_and(|max| polls >= max) {
                break;
            }
            let poll_start = Instant::now();
            self.poll_once();
            polls += 1;

            let elapsed = poll_start.elapsed();
            let poll_us = elapsed.as_micros() as u64;
            {
                let mut stats = self.stats.lock();
                stats.max_poll_us = stats.max_poll_us.max(poll_us);
                if elapsed > self.poll_period {
                    stats.overruns += 1;
                    if stats.overruns <= 10 || stats.overruns % 1000 == 0 {
                        warn!(
                            "Poll overrun #{}: poll took {}us (target {}us)",
                            stats.overruns,
                            poll_us,
                            self.config.irq_poll_us
                        );
                    }
                }
                if stats.polls % 1000 == 0 {
                    debug!(
                        "Interrupt loop: {} polls, sos={}, eos={}, max={}us",
                        stats.polls, stats.sos, stats.eos, stats.max_poll_us
                    );
                }
            }

            if elapsed < self.poll_period {
                std::thread::sleep(self.poll_period - elapsed);
            }
        }

        let stats = self.stats();
        info!(
            "Interrupt loop stopped after {} polls (sos: {}, eos: {}, overruns: {})",
            stats.polls, stats.sos, stats.eos, stats.overruns
        );
    }

    /// Flag controlling the poll loop, for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Ask the poll loop to stop. Sticky: later loops return at once.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Front-end statistics.
    pub fn stats(&self) -> IrqStats {
        *self.stats.lock()
    }

    /// Compare slot hardware state with ownership; see [`SlotManager::audit`].
    pub fn audit(&self) -> Vec<SequenceError> {
        self.slots.audit()
    }

    /// Stop the loop, unload every sequence and shut the backend down.
    pub fn shutdown(&self) -> Result<(), CardError> {
        info!(card = %self.config.name, "Shutdown requested");
        self.stop();
        for def in self.sequences() {
            def.unload();
        }
        self.backend.lock().shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evg_common::seq::types::{RunMode, TriggerSource};

    fn card() -> SequencerCard {
        SequencerCard::new(CardConfig::default(), &BackendRegistry::with_builtin()).unwrap()
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let config = CardConfig {
            driver: "vme".into(),
            ..CardConfig::default()
        };
        assert!(matches!(
            SequencerCard::new(config, &BackendRegistry::with_builtin()),
            Err(CardError::BackendNotFound(_))
        ));
    }

    #[test]
    fn test_capacity_includes_terminal_entry() {
        let card = card();
        assert_eq!(card.limits().capacity, 2048);
        assert_eq!(card.slots().len(), 2);
    }

    #[test]
    fn test_duplicate_and_unknown_sequences() {
        let card = card();
        card.create_sequence(1, "a").unwrap();
        assert_eq!(
            card.create_sequence(1, "b").unwrap_err(),
            SequenceError::DuplicateSequence(1)
        );
        assert_eq!(
            card.sequence(9).unwrap_err(),
            SequenceError::UnknownSequence(9)
        );
        card.remove_sequence(1).unwrap();
        assert!(card.sequence(1).is_err());
    }

    #[test]
    fn test_apply_config_loads_and_enables() {
        let card = card();
        let cfg = SequenceConfig {
            id: 3,
            trigger_source: TriggerSource::Software,
            run_mode: RunMode::Single,
            event_codes: vec![7, 8],
            timestamps: vec![100, 200],
            load: true,
            enable: true,
            ..SequenceConfig::default()
        };
        let def = card.apply_sequence_config(&cfg).unwrap();
        assert!(def.is_loaded());
        assert!(def.is_synced());
        assert!(def.is_enabled());
        assert_eq!(def.committed().timestamps(), vec![100, 200, 325]);
    }

    #[test]
    fn test_interrupt_on_unknown_slot_is_counted() {
        let card = card();
        card.on_eos(7);
        card.on_sos(7);
        assert_eq!(card.stats().unknown_slot, 2);
        assert_eq!(card.stats().eos, 0);
    }

    #[test]
    fn test_soft_triggered_run_is_dispatched() {
        let card = card();
        let def = card.create_sequence(1, "soft").unwrap();
        def.set_event_codes(&[1]).unwrap();
        def.set_timestamps(&[10]).unwrap();
        def.set_trigger_source(TriggerSource::Software);
        def.commit().unwrap();
        def.load().unwrap();
        def.enable();
        def.soft_trigger().unwrap();

        card.poll_once();
        assert_eq!(def.start_count(), 1);
        assert_eq!(def.run_count(), 1);
        assert!(def.is_enabled());
    }

    #[test]
    fn test_bounded_loop_stops() {
        let config = CardConfig {
            irq_poll_us: 10,
            ..CardConfig::default()
        };
        let card = SequencerCard::new(config, &BackendRegistry::with_builtin()).unwrap();
        card.run_interrupt_loop(Some(5));
        assert_eq!(card.stats().polls, 5);
        assert!(card.running_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_before_loop_is_honoured() {
        let card = card();
        card.running_flag().store(false, Ordering::SeqCst);
        card.run_interrupt_loop(None);
        assert_eq!(card.stats().polls, 0);

        card.stop();
        card.run_interrupt_loop(Some(10));
        assert_eq!(card.stats().polls, 0);
    }

    #[test]
    fn test_shutdown_unloads_everything() {
        let card = card();
        let def = card.create_sequence(1, "x").unwrap();
        def.load().unwrap();
        card.shutdown().unwrap();
        assert!(!def.is_loaded());
        assert_eq!(card.slots().free_count(), 2);
    }
}
