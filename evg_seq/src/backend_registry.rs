//! Backend registry.
//!
//! Maps backend names from the card configuration to factories. Built at
//! startup and passed to [`SequencerCard::new`](crate::card::SequencerCard::new)
//! by reference; there is no global registry.

use crate::backend::{BackendFactory, CardBackend};
use evg_common::seq::error::CardError;
use std::collections::HashMap;
use tracing::warn;

/// Registry of available card backends.
pub struct BackendRegistry {
    factories: HashMap<&'static str, BackendFactory>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every built-in backend.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::backends::register_all(&mut registry);
        registry
    }

    /// Register a backend factory.
    ///
    /// # Panics
    /// Panics if a backend with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: BackendFactory) {
        if self.factories.contains_key(name) {
            panic!("Backend '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a backend instance by name.
    ///
    /// # Errors
    /// `CardError::BackendNotFound` for an unknown name.
    pub fn create(&self, name: &str) -> Result<Box<dyn CardBackend>, CardError> {
        let Some(factory) = self.factories.get(name) else {
            warn!(available = ?self.names(), "Unknown backend '{}'", name);
            return Err(CardError::BackendNotFound(name.to_string()));
        };
        Ok(factory())
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
