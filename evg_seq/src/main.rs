//! # EVG Sequencer Binary
//!
//! Loads a sequencer configuration, builds the card, applies the configured
//! sequences and runs the interrupt front-end until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! # Run with the configured backend
//! evg_seq --config config/sequencer.toml
//!
//! # Force the simulation backend, stop after 5000 polls
//! evg_seq --config config/sequencer.toml --simulate --cycles 5000
//!
//! # Verbose JSON logs
//! evg_seq -c config/sequencer.toml -v --json
//! ```

#![deny(warnings)]

use clap::Parser;
use evg_common::config::LogLevel;
use evg_common::consts::DEFAULT_CONFIG_PATH;
use evg_seq::{BackendRegistry, SequencerCard};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// EVG Sequencer - Sequence RAM scheduler for timing cards
#[derive(Parser, Debug)]
#[command(name = "evg_seq")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Sequence RAM scheduler for event generator/receiver timing cards")]
#[command(long_about = None)]
struct Args {
    /// Path to the sequencer configuration file (sequencer.toml).
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Force the simulation backend
    #[arg(short = 's', long)]
    simulate: bool,

    /// Override the configured backend
    #[arg(short, long)]
    driver: Option<String>,

    /// Stop after this many interrupt polls (default: run until Ctrl-C)
    #[arg(long)]
    cycles: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("Sequencer startup failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // The configured log level is only known once the file is read.
    let loaded = SequencerCard::load_config(&args.config);
    let log_level = loaded
        .as_ref()
        .map(|config| config.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);

    info!("EVG Sequencer v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = loaded?;
    info!("Loaded configuration from {:?}", args.config);
    if args.simulate {
        info!("Simulation mode enabled");
        config.card.driver = "simulation".to_string();
    } else if let Some(driver) = &args.driver {
        info!("Backend from CLI: {}", driver);
        config.card.driver = driver.clone();
    }

    let registry = BackendRegistry::with_builtin();
    let card = SequencerCard::new(config.card, &registry)?;
    info!(service = %config.shared.service_name, "Card '{}' created", card.name());

    for seq in &config.sequences {
        if let Err(e) = card.apply_sequence_config(seq) {
            warn!(sequence = seq.id, "Failed to apply sequence: {}", e);
        }
    }

    let running = card.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    card.run_interrupt_loop(args.cycles);

    for err in card.audit() {
        warn!("Audit: {}", err);
    }
    for def in card.sequences() {
        info!(
            sequence = def.id(),
            runs = def.run_count(),
            starts = def.start_count(),
            "final counters"
        );
    }

    card.shutdown()?;
    info!("EVG Sequencer shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
///
/// `RUST_LOG` overrides the configured level; `--verbose` forces debug.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        log_level.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
