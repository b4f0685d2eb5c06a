//! Conflict traces explaining why a solve failed.

use std::fmt;

use kdep_core::constraint_set::Contribution;
use kdep_core::project::ProjectRoot;
use kdep_core::version::Version;

/// Why no version of a project could be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// The contributing constraints have no version in common.
    EmptyIntersection,
    /// None of the listed versions satisfies the constraint.
    NoMatchingVersion { available: Vec<Version> },
    /// The already selected version fails a constraint added later.
    VersionRejected { version: Version },
    /// A required package does not exist at the version tried.
    MissingPackage { path: String, version: Version },
    /// A required package failed to parse at the version tried.
    BrokenPackage {
        path: String,
        version: Version,
        message: String,
    },
    /// The source does not know the project.
    ProjectNotFound,
    /// Every candidate of a decision was tried and failed.
    CandidatesExhausted { tried: Vec<Version> },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyIntersection => f.write_str("constraints have no version in common"),
            Self::NoMatchingVersion { available } if available.is_empty() => {
                f.write_str("no versions available")
            }
            Self::NoMatchingVersion { available } => {
                let listed: Vec<String> = available.iter().map(|v| v.to_string()).collect();
                write!(f, "no matching version among {}", listed.join(", "))
            }
            Self::VersionRejected { version } => write!(f, "selected version {version} is rejected"),
            Self::MissingPackage { path, version } => write!(f, "package {path} does not exist at {version}"),
            Self::BrokenPackage { path, version, message } => {
                write!(f, "package {path} at {version} could not be parsed: {message}")
            }
            Self::ProjectNotFound => f.write_str("project could not be found"),
            Self::CandidatesExhausted { tried } => {
                let tried: Vec<String> = tried.iter().map(|v| v.to_string()).collect();
                write!(f, "all candidates failed: {}", tried.join(", "))
            }
        }
    }
}

/// One project that could not be satisfied, with the constraints that
/// applied to it and where each came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConflict {
    pub root: ProjectRoot,
    pub reason: ConflictReason,
    pub contributions: Vec<Contribution>,
}

impl fmt::Display for ProjectConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.root, self.reason)?;
        for c in &self.contributions {
            write!(f, "\n    {c}")?;
        }
        Ok(())
    }
}

/// The conflict trace of a failed solve: every distinct conflict seen,
/// grouped by project in project order, then in the order they arose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveFailure {
    pub conflicts: Vec<ProjectConflict>,
    /// Candidate versions tried before giving up.
    pub attempts: usize,
}

impl SolveFailure {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    /// The first conflict recorded for `root`.
    pub fn conflict_for(&self, root: &ProjectRoot) -> Option<&ProjectConflict> {
        self.conflicts.iter().find(|c| &c.root == root)
    }

    pub fn conflicts_for<'a>(&'a self, root: &'a ProjectRoot) -> impl Iterator<Item = &'a ProjectConflict> + 'a {
        self.conflicts.iter().filter(move |c| &c.root == root)
    }
}

impl fmt::Display for SolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.is_empty() {
            return write!(f, "no solution found after {} attempt(s)", self.attempts);
        }
        write!(
            f,
            "no solution found after {} attempt(s); conflicts ({}):",
            self.attempts,
            self.conflicts.len()
        )?;
        for c in &self.conflicts {
            write!(f, "\n  {c}")?;
        }
        Ok(())
    }
}
