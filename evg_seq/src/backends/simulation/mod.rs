//! Simulation backend module.
//!
//! Software Sequence RAMs for development and testing without a card.

mod backend;
mod ram;

pub use backend::{SimSettings, SimulationBackend};
pub use ram::SimSeqRam;

use crate::backend::CardBackend;

/// Factory function to create a simulation backend instance.
pub fn create_backend() -> Box<dyn CardBackend> {
    Box::new(SimulationBackend::new())
}
