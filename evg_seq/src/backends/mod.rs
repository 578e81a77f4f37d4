//! Card backend implementations.
//!
//! - [`simulation`] - Software Sequence RAMs for development and testing
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `backends/`
//! 2. Implement [`CardBackend`](crate::backend::CardBackend)
//! 3. Register it in [`register_all`]

pub mod simulation;

use crate::backend_registry::BackendRegistry;

/// Register every built-in backend.
pub fn register_all(registry: &mut BackendRegistry) {
    registry.register("simulation", simulation::create_backend);
}
