//! Core data types for kdep.
//!
//! This crate defines the inputs and outputs of dependency solving: project
//! roots, versions and constraints, manifests and locks, package trees built
//! by static analysis of source directories, ignore rules, and the
//! aggregation of constraints across several manifests.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod config;
pub mod constraint;
pub mod constraint_set;
pub mod ignored;
pub mod lock;
pub mod manifest;
pub mod pkgtree;
pub mod project;
pub mod version;
