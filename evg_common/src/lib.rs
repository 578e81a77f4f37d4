//! EVG Common Library
//!
//! This crate provides shared constants, types and configuration loading
//! utilities for the EVG sequencer workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Hardware limits and reserved event codes
//! - [`seq`] - Sequence types, error taxonomy, register contract and card configuration
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use evg_common::prelude::*;
//!
//! let entry = EventEntry::new(100, 7, 0);
//! assert!(!entry.is_eos());
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod seq;
