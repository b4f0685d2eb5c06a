//! Aggregation of constraints declared by several manifests.
//!
//! [`ConstraintSetBuilder`] folds the dependency constraints and overrides
//! of each manifest into one table, intersecting constraints declared for
//! the same project. Intersection is order independent (see
//! [`Constraint::intersect`]), so the result does not depend on the order in
//! which manifests are added. Empty intersections are reported together by
//! [`ConstraintSetBuilder::build`], before any solving happens.

use std::collections::BTreeMap;
use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

use crate::constraint::Constraint;
use crate::manifest::{Manifest, ProjectProperties};
use crate::project::ProjectRoot;

/// One manifest's constraint on a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    /// Name of the manifest the constraint was declared in.
    pub origin: String,
    pub constraint: Constraint,
    pub source: Option<String>,
}

impl fmt::Display for Contribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (from {})", self.constraint, self.origin)?;
        if let Some(source) = &self.source {
            write!(f, " [source {source}]")?;
        }
        Ok(())
    }
}

/// Merged constraint on one project, with everything that contributed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedConstraint {
    pub constraint: Constraint,
    pub source: Option<String>,
    pub contributions: Vec<Contribution>,
}

impl MergedConstraint {
    pub fn properties(&self) -> ProjectProperties {
        ProjectProperties {
            constraint: self.constraint.clone(),
            source: self.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Dependency,
    Override,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dependency => f.write_str("constraint"),
            Self::Override => f.write_str("override"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// No version satisfies every contribution.
    Disjoint,
    /// Contributions name different source locations.
    Sources,
}

/// A project whose contributions cannot all hold at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintConflict {
    pub root: ProjectRoot,
    pub kind: ConstraintKind,
    pub reason: ConflictReason,
    pub contributions: Vec<Contribution>,
}

impl fmt::Display for ConstraintConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.reason {
            ConflictReason::Disjoint => "no version satisfies every",
            ConflictReason::Sources => "conflicting sources in",
        };
        write!(f, "{}: {what} {}", self.root, self.kind)?;
        for c in &self.contributions {
            write!(f, "\n    {c}")?;
        }
        Ok(())
    }
}

fn render_conflicts(conflicts: &[ConstraintConflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("  {c}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error, Diagnostic)]
pub enum AggregateError {
    #[error("constraints are unsatisfiable before solving:\n{}", render_conflicts(.conflicts))]
    #[diagnostic(help("relax one of the listed constraints so that they overlap"))]
    Unsatisfiable { conflicts: Vec<ConstraintConflict> },
}

impl AggregateError {
    pub fn conflicts(&self) -> &[ConstraintConflict] {
        match self {
            Self::Unsatisfiable { conflicts } => conflicts,
        }
    }
}

/// The merged constraint table handed to the solver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    dependencies: BTreeMap<ProjectRoot, MergedConstraint>,
    overrides: BTreeMap<ProjectRoot, MergedConstraint>,
}

impl ConstraintSet {
    pub fn dependencies(&self) -> &BTreeMap<ProjectRoot, MergedConstraint> {
        &self.dependencies
    }

    pub fn overrides(&self) -> &BTreeMap<ProjectRoot, MergedConstraint> {
        &self.overrides
    }

    pub fn dependency(&self, root: &ProjectRoot) -> Option<&MergedConstraint> {
        self.dependencies.get(root)
    }

    pub fn override_for(&self, root: &ProjectRoot) -> Option<&MergedConstraint> {
        self.overrides.get(root)
    }

    /// The constraint the root project places on `root`: the override if
    /// there is one, else the merged dependency constraint.
    pub fn effective(&self, root: &ProjectRoot) -> Option<&MergedConstraint> {
        self.overrides.get(root).or_else(|| self.dependencies.get(root))
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.overrides.is_empty()
    }

    /// A set holding exactly one manifest's declarations, without
    /// conflict checking; each project is declared once per manifest.
    pub fn from_manifest(origin: &str, manifest: &Manifest) -> Self {
        let convert = |table: &BTreeMap<ProjectRoot, ProjectProperties>| {
            table
                .iter()
                .map(|(root, props)| {
                    let contribution = Contribution {
                        origin: origin.to_string(),
                        constraint: props.constraint.clone(),
                        source: props.source.clone(),
                    };
                    let merged = MergedConstraint {
                        constraint: props.constraint.clone(),
                        source: props.source.clone(),
                        contributions: vec![contribution],
                    };
                    (root.clone(), merged)
                })
                .collect()
        };
        Self {
            dependencies: convert(&manifest.constraints),
            overrides: convert(&manifest.overrides),
        }
    }
}

/// Accumulates contributions from manifests. Each builder owns its state;
/// concurrent aggregations use separate builders.
#[derive(Debug, Default)]
pub struct ConstraintSetBuilder {
    dependencies: BTreeMap<ProjectRoot, Vec<Contribution>>,
    overrides: BTreeMap<ProjectRoot, Vec<Contribution>>,
}

impl ConstraintSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every dependency constraint and override declared by `manifest`.
    pub fn add_manifest(&mut self, origin: &str, manifest: &Manifest) -> &mut Self {
        for (root, props) in &manifest.constraints {
            self.add_dependency(origin, root.clone(), props.clone());
        }
        for (root, props) in &manifest.overrides {
            self.add_override(origin, root.clone(), props.clone());
        }
        self
    }

    pub fn add_dependency(&mut self, origin: &str, root: ProjectRoot, props: ProjectProperties) -> &mut Self {
        push_contribution(&mut self.dependencies, origin, root, props);
        self
    }

    pub fn add_override(&mut self, origin: &str, root: ProjectRoot, props: ProjectProperties) -> &mut Self {
        push_contribution(&mut self.overrides, origin, root, props);
        self
    }

    /// Finish aggregation, reporting every project whose contributions
    /// cannot be satisfied together.
    pub fn build(self) -> Result<ConstraintSet, AggregateError> {
        let mut conflicts = Vec::new();
        let dependencies = merge_table(self.dependencies, ConstraintKind::Dependency, &mut conflicts);
        let overrides = merge_table(self.overrides, ConstraintKind::Override, &mut conflicts);
        if !conflicts.is_empty() {
            tracing::debug!("constraint aggregation found {} conflict(s)", conflicts.len());
            return Err(AggregateError::Unsatisfiable { conflicts });
        }
        Ok(ConstraintSet {
            dependencies,
            overrides,
        })
    }
}

fn push_contribution(
    table: &mut BTreeMap<ProjectRoot, Vec<Contribution>>,
    origin: &str,
    root: ProjectRoot,
    props: ProjectProperties,
) {
    table.entry(root).or_default().push(Contribution {
        origin: origin.to_string(),
        constraint: props.constraint,
        source: props.source,
    });
}

fn merge_table(
    table: BTreeMap<ProjectRoot, Vec<Contribution>>,
    kind: ConstraintKind,
    conflicts: &mut Vec<ConstraintConflict>,
) -> BTreeMap<ProjectRoot, MergedConstraint> {
    let mut merged = BTreeMap::new();
    for (root, contributions) in table {
        let constraint = contributions
            .iter()
            .fold(Constraint::any(), |acc, c| acc.intersect(&c.constraint));

        let mut sources: Vec<&String> = contributions.iter().filter_map(|c| c.source.as_ref()).collect();
        sources.sort();
        sources.dedup();

        let reason = if constraint.is_empty() {
            Some(ConflictReason::Disjoint)
        } else if sources.len() > 1 {
            Some(ConflictReason::Sources)
        } else {
            None
        };
        if let Some(reason) = reason {
            conflicts.push(ConstraintConflict {
                root,
                kind,
                reason,
                contributions,
            });
            continue;
        }

        let source = sources.first().map(|s| s.to_string());
        merged.insert(
            root,
            MergedConstraint {
                constraint,
                source,
                contributions,
            },
        );
    }
    merged
}

/// Aggregate `(origin, manifest)` pairs in one step.
pub fn aggregate<'a, I>(manifests: I) -> Result<ConstraintSet, AggregateError>
where
    I: IntoIterator<Item = (&'a str, &'a Manifest)>,
{
    let mut builder = ConstraintSetBuilder::new();
    for (origin, manifest) in manifests {
        builder.add_manifest(origin, manifest);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(root: &str, constraint: &str) -> Manifest {
        Manifest::new().try_with_constraint(root, constraint).unwrap()
    }

    #[test]
    fn overlapping_constraints_intersect() {
        let a = manifest("github.com/x/lib", ">=1.0.0");
        let b = manifest("github.com/x/lib", "<1.5.0");
        let set = aggregate([("a", &a), ("b", &b)]).unwrap();
        let merged = set.dependency(&ProjectRoot::new("github.com/x/lib")).unwrap();
        assert_eq!(merged.constraint.to_string(), ">=1.0.0, <1.5.0");
        assert_eq!(merged.contributions.len(), 2);
    }

    #[test]
    fn override_wins_in_effective() {
        let root = ProjectRoot::new("github.com/x/lib");
        let m = manifest("github.com/x/lib", "^1.0.0").with_override("github.com/x/lib", Constraint::branch("dev"));
        let set = aggregate([("root", &m)]).unwrap();
        assert_eq!(set.effective(&root).unwrap().constraint, Constraint::branch("dev"));
    }

    #[test]
    fn conflicting_sources_are_reported() {
        let root = ProjectRoot::new("github.com/x/lib");
        let a = Manifest::new().with_properties(
            root.clone(),
            ProjectProperties::new(Constraint::any()).with_source("github.com/fork1/lib"),
        );
        let b = Manifest::new().with_properties(
            root,
            ProjectProperties::new(Constraint::any()).with_source("github.com/fork2/lib"),
        );
        let err = aggregate([("a", &a), ("b", &b)]).unwrap_err();
        assert_eq!(err.conflicts()[0].reason, ConflictReason::Sources);
    }
}
