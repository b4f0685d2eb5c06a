//! Declared dependency constraints of one project.

use std::collections::{BTreeMap, BTreeSet};

use crate::constraint::{Constraint, ConstraintError};
use crate::project::ProjectRoot;

/// Constraint on one project plus an optional alternate source location.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectProperties {
    pub constraint: Constraint,
    /// Alternate location to fetch the project from, e.g. a fork.
    pub source: Option<String>,
}

impl ProjectProperties {
    pub fn new(constraint: Constraint) -> Self {
        Self {
            constraint,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Which parts of a dependency may be pruned from the vendor tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneOptions {
    pub nested_vendor: bool,
    pub go_tests: bool,
    pub unused_packages: bool,
    pub non_go: bool,
}

impl PruneOptions {
    /// Nested vendor directories, test files and unused packages.
    pub fn standard() -> Self {
        Self {
            nested_vendor: true,
            go_tests: true,
            unused_packages: true,
            non_go: false,
        }
    }
}

/// Default prune options with per-project exceptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadingPruneOptions {
    pub default: PruneOptions,
    pub per_project: BTreeMap<ProjectRoot, PruneOptions>,
}

impl CascadingPruneOptions {
    pub fn for_project(&self, root: &ProjectRoot) -> PruneOptions {
        self.per_project.get(root).copied().unwrap_or(self.default)
    }
}

impl Default for CascadingPruneOptions {
    fn default() -> Self {
        Self {
            default: PruneOptions::standard(),
            per_project: BTreeMap::new(),
        }
    }
}

/// A project's declared constraints, overrides, required and ignored
/// packages, and prune options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub constraints: BTreeMap<ProjectRoot, ProjectProperties>,
    /// Constraints that replace anything discovered transitively. Only the
    /// root project's overrides take effect.
    pub overrides: BTreeMap<ProjectRoot, ProjectProperties>,
    /// Import paths that must be part of the solution even if nothing
    /// imports them.
    pub required: BTreeSet<String>,
    /// Ignore patterns, see [`IgnoredRuleset`](crate::ignored::IgnoredRuleset).
    pub ignored: Vec<String>,
    pub prune: CascadingPruneOptions,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constraint(mut self, root: impl Into<ProjectRoot>, constraint: Constraint) -> Self {
        self.constraints
            .insert(root.into(), ProjectProperties::new(constraint));
        self
    }

    /// Parse `constraint` and add it as a dependency constraint.
    pub fn try_with_constraint(
        self,
        root: impl Into<ProjectRoot>,
        constraint: &str,
    ) -> Result<Self, ConstraintError> {
        let parsed = Constraint::parse(constraint)?;
        Ok(self.with_constraint(root, parsed))
    }

    pub fn with_properties(mut self, root: impl Into<ProjectRoot>, props: ProjectProperties) -> Self {
        self.constraints.insert(root.into(), props);
        self
    }

    pub fn with_override(mut self, root: impl Into<ProjectRoot>, constraint: Constraint) -> Self {
        self.overrides
            .insert(root.into(), ProjectProperties::new(constraint));
        self
    }

    pub fn with_required(mut self, import_path: impl Into<String>) -> Self {
        self.required.insert(import_path.into());
        self
    }

    pub fn with_ignored(mut self, pattern: impl Into<String>) -> Self {
        self.ignored.push(pattern.into());
        self
    }

    /// Constraint declared for `root`, `None` if the project is not listed.
    pub fn constraint_for(&self, root: &ProjectRoot) -> Option<&Constraint> {
        self.constraints.get(root).map(|p| &p.constraint)
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
            && self.overrides.is_empty()
            && self.required.is_empty()
            && self.ignored.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_entries() {
        let m = Manifest::new()
            .try_with_constraint("github.com/a/a", ">=1.0.0, <2.0.0")
            .unwrap()
            .with_override("github.com/b/b", Constraint::branch("master"))
            .with_required("github.com/c/c/cmd")
            .with_ignored("github.com/root/gen/*");
        let a = ProjectRoot::new("github.com/a/a");
        assert_eq!(
            m.constraint_for(&a).map(|c| c.to_string()).as_deref(),
            Some(">=1.0.0, <2.0.0")
        );
        assert!(m.overrides.contains_key(&ProjectRoot::new("github.com/b/b")));
        assert!(m.required.contains("github.com/c/c/cmd"));
        assert_eq!(m.ignored, vec!["github.com/root/gen/*".to_string()]);
        assert!(!m.is_empty());
    }

    #[test]
    fn prune_options_cascade() {
        let mut prune = CascadingPruneOptions::default();
        let special = ProjectRoot::new("github.com/keep/tests");
        prune.per_project.insert(
            special.clone(),
            PruneOptions {
                go_tests: false,
                ..PruneOptions::standard()
            },
        );
        assert!(prune.for_project(&ProjectRoot::new("github.com/x/y")).go_tests);
        assert!(!prune.for_project(&special).go_tests);
        assert!(prune.for_project(&special).unused_packages);
    }
}
