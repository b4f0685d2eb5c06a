use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use kdep_core::lock::{Lock, LockedProject};
use kdep_core::project::ProjectRoot;
use kdep_core::version::Version;

/// The result of a successful solve: one locked version per project, and
/// which projects import which.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    projects: BTreeMap<ProjectRoot, LockedProject>,
    /// Importer to imported projects. `None` is the root project.
    imports: BTreeMap<Option<ProjectRoot>, BTreeSet<ProjectRoot>>,
    inputs_digest: String,
    attempts: usize,
}

impl Solution {
    pub(crate) fn new(
        projects: BTreeMap<ProjectRoot, LockedProject>,
        imports: BTreeMap<Option<ProjectRoot>, BTreeSet<ProjectRoot>>,
        inputs_digest: String,
        attempts: usize,
    ) -> Self {
        Self {
            projects,
            imports,
            inputs_digest,
            attempts,
        }
    }

    pub fn projects(&self) -> impl Iterator<Item = &LockedProject> {
        self.projects.values()
    }

    pub fn project(&self, root: &ProjectRoot) -> Option<&LockedProject> {
        self.projects.get(root)
    }

    pub fn version_of(&self, root: &ProjectRoot) -> Option<&Version> {
        self.projects.get(root).map(|p| &p.version)
    }

    /// Projects imported directly by `importer`, or by the root project
    /// when `importer` is `None`.
    pub fn imports_of(&self, importer: Option<&ProjectRoot>) -> impl Iterator<Item = &ProjectRoot> {
        self.imports
            .get(&importer.cloned())
            .into_iter()
            .flat_map(|set| set.iter())
    }

    pub fn inputs_digest(&self) -> &str {
        &self.inputs_digest
    }

    /// Candidate versions tried during the search.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Project this solution into a lock.
    pub fn to_lock(&self) -> Lock {
        Lock::new(self.inputs_digest.clone(), self.projects.values().cloned())
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in self.projects.values() {
            writeln!(f, "{} {} [{}]", p.root, p.version, p.packages.join(", "))?;
        }
        Ok(())
    }
}
