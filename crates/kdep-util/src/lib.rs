//! Shared utilities for kdep.
//!
//! This crate provides cross-cutting concerns used by all other kdep crates:
//! the error taxonomy, filesystem helpers, hashing of solve inputs, terminal
//! status lines, and `tracing` subscriber setup.

pub mod errors;
pub mod fs;
pub mod hash;
pub mod logging;
pub mod progress;
