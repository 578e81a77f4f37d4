//! Scheduler integration tests.
//!
//! Drives `SequencerCard` with the simulation backend: slot exclusivity
//! under concurrent `load()`, stale and duplicate EOS delivery, deferred
//! sync during Auto playback, and the threaded interrupt loop.

use evg_common::seq::config::CardConfig;
use evg_common::seq::error::{CardError, SequenceError};
use evg_common::seq::registers::SeqRamRegisters;
use evg_common::seq::types::{EventEntry, RunMode, TriggerSource};
use evg_seq::backend::{CardBackend, SlotIrq};
use evg_seq::backends::simulation::{SimSeqRam, SimulationBackend};
use evg_seq::{BackendRegistry, SequencerCard, SyncState};
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Simulation backend that hands out RAM handles to the test.
struct Recording {
    inner: SimulationBackend,
    rams: Arc<Mutex<Vec<SimSeqRam>>>,
}

impl CardBackend for Recording {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn version(&self) -> &'static str {
        self.inner.version()
    }

    fn init(&mut self, config: &CardConfig) -> Result<(), CardError> {
        self.inner.init(config)
    }

    fn open_slot(&mut self, id: u8) -> Result<Box<dyn SeqRamRegisters>, CardError> {
        let regs = self.inner.open_slot(id)?;
        if let Some(ram) = self.inner.ram(id) {
            self.rams.lock().push(ram);
        }
        Ok(regs)
    }

    fn poll_interrupts(&mut self, pending: &mut Vec<SlotIrq>) {
        self.inner.poll_interrupts(pending);
    }
}

fn sim_config(slot_count: u8, section: &str) -> CardConfig {
    let mut config = CardConfig {
        slot_count,
        ram_capacity: 64,
        irq_poll_us: 100,
        ..CardConfig::default()
    };
    if !section.is_empty() {
        config
            .driver_config
            .insert("simulation".into(), toml::from_str(section).unwrap());
    }
    config
}

fn recording_card(slot_count: u8, section: &str) -> (SequencerCard, Vec<SimSeqRam>) {
    let rams = Arc::new(Mutex::new(Vec::new()));
    let backend = Recording {
        inner: SimulationBackend::new(),
        rams: Arc::clone(&rams),
    };
    let card = SequencerCard::with_backend(sim_config(slot_count, section), Box::new(backend))
        .expect("card");
    let rams = rams.lock().clone();
    (card, rams)
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

#[test]
fn test_concurrent_load_exactly_one_wins() {
    let card = SequencerCard::new(sim_config(1, ""), &BackendRegistry::with_builtin()).unwrap();
    let a = card.create_sequence(1, "a").unwrap();
    let b = card.create_sequence(2, "b").unwrap();

    for _ in 0..50 {
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [Arc::clone(&a), Arc::clone(&b)]
            .into_iter()
            .map(|def| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    def.load()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(SequenceError::NoFreeSlot { .. }))));
        assert_eq!(usize::from(a.is_loaded()) + usize::from(b.is_loaded()), 1);

        let owner = card.slots().slot(0).unwrap().owner().unwrap();
        let winner = if a.is_loaded() { &a } else { &b };
        assert!(Arc::ptr_eq(&owner, winner));

        a.unload();
        b.unload();
    }
}

#[test]
fn test_stale_eos_after_reassignment_is_ignored() {
    let card = SequencerCard::new(sim_config(1, ""), &BackendRegistry::with_builtin()).unwrap();
    let a = card.create_sequence(1, "a").unwrap();
    let b = card.create_sequence(2, "b").unwrap();

    a.load().unwrap();
    let slot = Arc::clone(card.slots().slot(0).unwrap());
    a.unload();
    b.load().unwrap();

    // EOS raced with the reassignment and reached the old owner.
    a.process_eos(&slot);
    assert_eq!(a.run_count(), 0);
    assert_eq!(b.run_count(), 0);

    card.on_eos(0);
    assert_eq!(b.run_count(), 1);
    assert_eq!(a.run_count(), 0);
}

#[test]
fn test_handoff_to_disabled_sequence_stays_disarmed() {
    let (card, rams) = recording_card(1, "");
    let ram = &rams[0];
    let a = card.create_sequence(1, "a").unwrap();
    a.set_trigger_source(TriggerSource::Mxc(0));
    a.set_run_mode(RunMode::Normal);
    a.commit().unwrap();
    a.load().unwrap();
    a.enable();
    assert!(ram.is_armed());
    a.unload();

    let b = card.create_sequence(2, "b").unwrap();
    b.set_trigger_source(TriggerSource::Mxc(0));
    b.commit().unwrap();
    b.load().unwrap();
    assert!(!b.is_enabled());
    assert!(!ram.is_armed());
    assert!(!ram.hardware_trigger(TriggerSource::Mxc(0)));

    card.poll_once();
    assert_eq!(b.start_count(), 0);
    assert_eq!(b.run_count(), 0);
    assert!(card.audit().is_empty());
}

#[test]
fn test_eos_on_unowned_slot_is_logged_only() {
    let card = SequencerCard::new(sim_config(2, ""), &BackendRegistry::with_builtin()).unwrap();
    card.on_eos(1);
    card.on_sos(1);
    assert_eq!(card.stats().eos, 1);
    assert_eq!(card.stats().sos, 1);
}

#[test]
fn test_duplicate_eos_delivery_is_tolerated() {
    let (card, rams) = recording_card(1, "duplicate_eos = true");
    let def = card.create_sequence(1, "dup").unwrap();
    def.set_event_codes(&[9]).unwrap();
    def.set_timestamps(&[40]).unwrap();
    def.set_trigger_source(TriggerSource::Software);
    def.commit().unwrap();
    def.load().unwrap();
    def.enable();

    def.soft_trigger().unwrap();
    card.poll_once();

    assert_eq!(card.stats().eos, 2);
    assert_eq!(def.run_count(), 2);
    assert_eq!(def.start_count(), 1);
    assert!(def.is_synced());
    assert!(def.is_enabled());
    assert!(rams[0].is_armed());
}

#[test]
fn test_commit_during_auto_playback_defers_write() {
    let (card, rams) = recording_card(1, "playback_polls = 3");
    let ram = &rams[0];
    let def = card.create_sequence(1, "auto").unwrap();
    def.set_event_codes(&[1, 2]).unwrap();
    def.set_timestamps(&[10, 20]).unwrap();
    def.set_trigger_source(TriggerSource::Software);
    def.set_run_mode(RunMode::Auto);
    def.commit().unwrap();
    def.load().unwrap();
    def.enable();
    def.soft_trigger().unwrap();
    assert!(ram.is_running());

    def.set_event_codes(&[5]).unwrap();
    def.set_timestamps(&[500]).unwrap();
    def.commit().unwrap();
    assert_eq!(def.sync_state(), SyncState::SyncPending);
    assert_eq!(ram.trigger_source(), TriggerSource::None);
    assert_eq!(ram.run_mode(), RunMode::Single);

    // Playback finishes within three polls.
    for _ in 0..3 {
        card.poll_once();
    }
    assert!(def.is_synced());
    assert_eq!(
        ram.entries(2),
        vec![EventEntry::new(500, 5, 0), EventEntry::eos(125)]
    );
    assert_eq!(ram.writes_while_running(), 0);
    // Re-armed with the committed mode, waiting for the next trigger.
    assert_eq!(ram.run_mode(), RunMode::Auto);
    assert!(ram.is_armed());
    assert!(!ram.is_running());
}

#[test]
fn test_unload_during_playback_blocks_rearm() {
    let (card, rams) = recording_card(1, "playback_polls = 2");
    let ram = &rams[0];
    let def = card.create_sequence(1, "auto").unwrap();
    def.set_trigger_source(TriggerSource::Software);
    def.set_run_mode(RunMode::Auto);
    def.commit().unwrap();
    def.load().unwrap();
    def.enable();
    def.soft_trigger().unwrap();

    def.unload();
    assert_eq!(card.slots().free_count(), 1);

    card.poll_once();
    card.poll_once();
    assert!(!ram.is_running());
    assert!(!ram.is_armed());
    assert_eq!(def.run_count(), 0);
    assert!(card.audit().is_empty());
}

#[test]
fn test_abort_stops_auto_playback() {
    let (card, rams) = recording_card(1, "playback_polls = 100");
    let def = card.create_sequence(1, "auto").unwrap();
    def.set_trigger_source(TriggerSource::Software);
    def.set_run_mode(RunMode::Auto);
    def.commit().unwrap();
    def.load().unwrap();
    def.enable();
    def.soft_trigger().unwrap();
    card.poll_once();

    def.abort().unwrap();
    assert!(!rams[0].is_running());
    assert!(!def.is_enabled());
    assert_eq!(def.run_count(), 1);

    card.poll_once();
    assert_eq!(def.run_count(), 1);
}

#[test]
fn test_interrupt_loop_thread_with_periodic_trigger() {
    let config = sim_config(2, "trigger_period_polls = 2");
    let card = Arc::new(SequencerCard::new(config, &BackendRegistry::with_builtin()).unwrap());
    let def = card.create_sequence(1, "periodic").unwrap();
    def.set_event_codes(&[3]).unwrap();
    def.set_timestamps(&[10]).unwrap();
    def.set_trigger_source(TriggerSource::Mxc(0));
    def.commit().unwrap();
    def.load().unwrap();
    def.enable();

    let worker = {
        let card = Arc::clone(&card);
        thread::spawn(move || card.run_interrupt_loop(Some(100_000)))
    };

    assert!(wait_until(Duration::from_secs(5), || def.run_count() >= 3));
    card.stop();
    worker.join().unwrap();

    assert!(def.start_count() >= 3);
    assert!(def.is_enabled());
    card.shutdown().unwrap();
    assert!(!def.is_loaded());
}
