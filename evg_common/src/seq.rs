//! Sequence RAM types, errors, register contract and card configuration.

pub mod config;
pub mod error;
pub mod registers;
pub mod types;
