//! Dependency solver: backtracking search over the versions offered by a
//! [`VersionSource`](source::VersionSource), preferring locked versions,
//! with conflict traces on failure and cooperative cancellation.

pub mod cache;
pub mod cancel;
pub mod conflict;
pub mod graph;
pub mod solution;
pub mod solver;
pub mod source;

pub use cancel::{CancelHandle, CancelSignal};
pub use solution::Solution;
pub use solver::{solve, SolveError, SolveParameters, Solver};
pub use source::{MemorySource, SourceError, VersionSource};
