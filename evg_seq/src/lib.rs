//! # EVG Sequencer Library
//!
//! Sequence RAM scheduler for event generator/receiver timing cards.
//!
//! Users edit timestamped event sequences, commit them, and load them into
//! one of a card's few hardware Sequence RAMs. The scheduler compiles the
//! sequence into the RAM format, allocates slots, and keeps hardware and
//! software consistent while slots play autonomously.
//!
//! # Module Structure
//!
//! - [`compiler`] - Working arrays to Sequence RAM entries
//! - [`definition`] - `SequenceDefinition`, the user-facing sequence
//! - [`sync`] - Sync state machine (Unsynced/SyncPending/Synced)
//! - [`hw_slot`] - One physical Sequence RAM and its critical section
//! - [`slot_manager`] - Fixed slot pool, first-fit allocation
//! - [`scan`] - Level-triggered notification channels
//! - [`properties`] - Static property table per device type
//! - [`card`] - `SequencerCard`, sequence registry and interrupt front-end
//! - [`backend`] / [`backend_registry`] / [`backends`] - Register backends
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          SequencerCard                           │
//! │  ┌──────────────────┐   commit/load   ┌──────────────────────┐   │
//! │  │SequenceDefinition│────────────────►│     SlotManager      │   │
//! │  │  + SyncEngine    │◄─┐              │  [HardwareSlot; N]   │   │
//! │  └──────────────────┘  │ process_eos  └──────────┬───────────┘   │
//! │                        │                         │ registers     │
//! │  ┌──────────────────┐  │              ┌──────────▼───────────┐   │
//! │  │ Interrupt loop   │──┴──────────────│  CardBackend (trait) │   │
//! │  │ (poll_once)      │  poll_interrupts│  simulation, ...     │   │
//! │  └──────────────────┘                 └──────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod backend;
pub mod backend_registry;
pub mod backends;
pub mod card;
pub mod compiler;
pub mod definition;
pub mod hw_slot;
pub mod properties;
pub mod scan;
pub mod slot_manager;
pub mod sync;

// Re-export key types for convenience
pub use crate::backend::{CardBackend, IrqKind, SlotIrq};
pub use crate::backend_registry::BackendRegistry;
pub use crate::card::{IrqStats, SequencerCard};
pub use crate::definition::{CommittedSequence, SequenceDefinition};
pub use crate::sync::SyncState;
