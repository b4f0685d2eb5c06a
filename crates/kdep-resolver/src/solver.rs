//! Backtracking search for a consistent version assignment.
//!
//! The search keeps a stack of decision points. Each decision picks the
//! next pending project (locked projects first, then the one with the
//! fewest versions, then by name), orders its candidates (the locked
//! version if it still satisfies the constraint, then the source's order,
//! newest first) and tries them one at a time. Selecting a version loads
//! its package tree and manifest, walks the packages required from it, and
//! turns their imports into demands on further projects. A demand that the
//! current state cannot meet is a conflict: the state is restored to the
//! latest decision point and its next candidate is tried.
//!
//! The search is a function of its parameters and of the source's
//! responses only, so identical inputs give identical solutions.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use kdep_core::constraint::Constraint;
use kdep_core::constraint_set::{ConstraintSet, Contribution};
use kdep_core::ignored::IgnoredRuleset;
use kdep_core::lock::{Lock, LockedProject};
use kdep_core::manifest::Manifest;
use kdep_core::pkgtree::{PackageTree, ReachFailure};
use kdep_core::project::{is_path_within, ProjectRoot};
use kdep_core::version::Version;
use kdep_util::errors::KdepError;

use crate::cancel::CancelSignal;
use crate::conflict::{ConflictReason, ProjectConflict, SolveFailure};
use crate::solution::Solution;
use crate::source::{SourceError, VersionSource};

#[derive(Debug, Error, Diagnostic)]
pub enum SolveError {
    #[error("{0}")]
    #[diagnostic(help("relax the constraints named in the trace, or update the lock for the listed projects"))]
    Unsatisfiable(SolveFailure),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("root package {path} cannot be used: {message}")]
    BrokenRootPackage { path: String, message: String },

    #[error("solve cancelled")]
    Cancelled,
}

impl From<SolveError> for KdepError {
    fn from(err: SolveError) -> Self {
        match err {
            SolveError::Unsatisfiable(failure) => KdepError::Unsatisfiable {
                message: failure.to_string(),
            },
            SolveError::Source(e) => KdepError::Source { message: e.to_string() },
            SolveError::BrokenRootPackage { path, message } => KdepError::PartialParse { path, message },
            SolveError::Cancelled => KdepError::Cancelled,
        }
    }
}

/// Inputs of one solve.
#[derive(Debug, Clone, Default)]
pub struct SolveParameters {
    /// Packages of the project being solved, and of any local projects
    /// composed into it.
    pub root_tree: PackageTree,
    /// Merged constraints and overrides of the root project.
    pub constraints: ConstraintSet,
    pub ignored: IgnoredRuleset,
    /// Import paths that must be solved even if nothing imports them.
    pub required: BTreeSet<String>,
    /// Projects supplied by the root tree itself, such as workspace members
    /// or composed local projects. Imports below them are never looked up.
    pub local_roots: BTreeSet<ProjectRoot>,
    /// Previous solution, preferred where it still fits.
    pub lock: Option<Lock>,
    /// Projects whose locked version is not preferred.
    pub to_change: BTreeSet<ProjectRoot>,
    /// Ignore the lock entirely.
    pub change_all: bool,
}

impl SolveParameters {
    pub fn new(root_tree: PackageTree, constraints: ConstraintSet) -> Self {
        Self {
            root_tree,
            constraints,
            ..Self::default()
        }
    }

    /// SHA-256 over a canonical rendering of everything that determines the
    /// solution except the lock and the source.
    pub fn inputs_digest(&self) -> String {
        let seeds = self
            .root_tree
            .valid_packages()
            .map(|p| p.import_path.clone())
            .filter(|p| !self.ignored.is_ignored(p));
        let external = self
            .root_tree
            .reach(seeds, &self.ignored, true)
            .map(|r| r.external)
            .unwrap_or_default();

        let mut lines = Vec::new();
        lines.push(format!("root {}", self.root_tree.import_root));
        lines.extend(external.iter().map(|i| format!("import {i}")));
        for (root, merged) in self.constraints.dependencies() {
            lines.push(format!(
                "constraint {root} {} {}",
                merged.constraint,
                merged.source.as_deref().unwrap_or("-")
            ));
        }
        for (root, merged) in self.constraints.overrides() {
            lines.push(format!(
                "override {root} {} {}",
                merged.constraint,
                merged.source.as_deref().unwrap_or("-")
            ));
        }
        lines.extend(self.ignored.patterns().iter().map(|p| format!("ignored {p}")));
        lines.extend(self.required.iter().map(|p| format!("required {p}")));
        lines.extend(self.local_roots.iter().map(|r| format!("local {r}")));
        kdep_util::hash::sha256_lines(lines)
    }

    fn locked_version(&self, root: &ProjectRoot) -> Option<&Version> {
        if self.change_all || self.to_change.contains(root) {
            return None;
        }
        self.lock.as_ref().and_then(|l| l.locked_version(root))
    }
}

/// Solve `params` against `source`.
pub async fn solve<S: VersionSource>(
    params: &SolveParameters,
    source: &S,
    cancel: &CancelSignal,
) -> Result<Solution, SolveError> {
    Solver::new(params, source).with_cancel(cancel.clone()).solve().await
}

/// A configured solve. Each call to [`solve`](Solver::solve) starts from
/// scratch with its own search state.
pub struct Solver<'a, S> {
    params: &'a SolveParameters,
    source: &'a S,
    cancel: CancelSignal,
}

#[derive(Debug, Clone)]
struct Selection {
    version: Version,
    /// Import paths of the packages used from this project.
    packages: BTreeSet<String>,
    tree: Arc<PackageTree>,
    manifest: Arc<Manifest>,
}

#[derive(Debug, Clone, Default)]
struct State {
    selected: BTreeMap<ProjectRoot, Selection>,
    /// Packages demanded from each project, selected or not.
    required: BTreeMap<ProjectRoot, BTreeSet<String>>,
    /// Constraints from selected projects' manifests on what they import.
    contributions: BTreeMap<ProjectRoot, Vec<Contribution>>,
    imports: BTreeMap<Option<ProjectRoot>, BTreeSet<ProjectRoot>>,
}

impl State {
    fn pending(&self) -> impl Iterator<Item = &ProjectRoot> {
        self.required.keys().filter(|r| !self.selected.contains_key(*r))
    }
}

/// Packages wanted from `target` on behalf of `importer`.
struct Demand {
    importer: Option<ProjectRoot>,
    target: ProjectRoot,
    packages: BTreeSet<String>,
}

struct Frame {
    project: ProjectRoot,
    candidates: VecDeque<Version>,
    tried: Vec<Version>,
    snapshot: State,
}

/// Search bookkeeping that survives backtracking.
#[derive(Default)]
struct Search {
    versions: BTreeMap<ProjectRoot, Vec<Version>>,
    roots: BTreeMap<String, ProjectRoot>,
    conflicts: BTreeMap<ProjectRoot, Vec<ProjectConflict>>,
    attempts: usize,
}

impl Search {
    fn record(&mut self, conflict: ProjectConflict) {
        tracing::debug!("conflict: {conflict}");
        let seen = self.conflicts.entry(conflict.root.clone()).or_default();
        if !seen.contains(&conflict) {
            seen.push(conflict);
        }
    }

    fn failure(self) -> SolveFailure {
        SolveFailure {
            conflicts: self.conflicts.into_values().flatten().collect(),
            attempts: self.attempts,
        }
    }
}

/// Outcome of a step that may conflict without the solve failing.
type Step<T> = Result<Result<T, ProjectConflict>, SolveError>;

impl<'a, S: VersionSource> Solver<'a, S> {
    pub fn new(params: &'a SolveParameters, source: &'a S) -> Self {
        Self {
            params,
            source,
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn solve(&self) -> Result<Solution, SolveError> {
        let mut search = Search::default();
        let mut state = State::default();
        let seeds = self.root_demands(&mut search).await?;
        if let Err(conflict) = self.expand(&mut search, &mut state, seeds).await? {
            search.record(conflict);
            return Err(SolveError::Unsatisfiable(search.failure()));
        }

        let mut stack: Vec<Frame> = Vec::new();
        loop {
            self.check_cancelled()?;
            let Some(project) = self.next_project(&mut search, &state).await? else {
                break;
            };
            let frame = match self.open_frame(&mut search, &state, project).await? {
                Ok(frame) => frame,
                Err(conflict) => {
                    search.record(conflict);
                    state = self.backtrack(&mut search, &mut stack).await?;
                    continue;
                }
            };
            stack.push(frame);
            state = self.backtrack(&mut search, &mut stack).await?;
        }

        let solution = self.finish(&search, state);
        tracing::info!(
            "solved {} project(s) in {} attempt(s)",
            solution.len(),
            solution.attempts()
        );
        Ok(solution)
    }

    fn check_cancelled(&self) -> Result<(), SolveError> {
        if self.cancel.is_cancelled() {
            Err(SolveError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run a source call, abandoning it if the solve is cancelled.
    async fn guarded<T>(&self, call: impl Future<Output = Result<T, SourceError>>) -> Result<Result<T, SourceError>, SolveError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SolveError::Cancelled),
            result = call => Ok(result),
        }
    }

    async fn deduce_root(&self, search: &mut Search, import_path: &str) -> Result<ProjectRoot, SolveError> {
        if let Some(root) = search.roots.get(import_path) {
            return Ok(root.clone());
        }
        let root = self.guarded(self.source.deduce_root(import_path)).await??;
        search.roots.insert(import_path.to_string(), root.clone());
        Ok(root)
    }

    /// Versions of `root`, newest first. `None` if the source does not
    /// know the project.
    async fn versions(&self, search: &mut Search, root: &ProjectRoot) -> Result<Option<Vec<Version>>, SolveError> {
        if let Some(listed) = search.versions.get(root) {
            return Ok(Some(listed.clone()));
        }
        match self.guarded(self.source.list_versions(root)).await? {
            Ok(listed) => {
                search.versions.insert(root.clone(), listed.clone());
                Ok(Some(listed))
            }
            Err(SourceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Walk the root packages and turn their external imports into the
    /// initial demands.
    async fn root_demands(&self, search: &mut Search) -> Result<VecDeque<Demand>, SolveError> {
        let tree = &self.params.root_tree;
        let ignored = &self.params.ignored;

        let mut seeds: Vec<String> = tree
            .valid_packages()
            .map(|p| p.import_path.clone())
            .filter(|p| !ignored.is_ignored(p))
            .collect();
        let mut external: BTreeSet<String> = BTreeSet::new();
        for path in &self.params.required {
            if ignored.is_ignored(path) {
                continue;
            }
            if tree.packages.contains_key(path) {
                seeds.push(path.clone());
            } else {
                external.insert(path.clone());
            }
        }

        let reach = tree.reach(seeds, ignored, true).map_err(|failure| {
            let message = match &failure {
                ReachFailure::Broken { message, .. } => message.clone(),
                missing @ ReachFailure::Missing { .. } => missing.to_string(),
            };
            SolveError::BrokenRootPackage {
                path: failure.path().to_string(),
                message,
            }
        })?;
        for (path, err) in tree.errors() {
            if !reach.internal.contains(path) && !ignored.is_ignored(path) {
                tracing::warn!("skipping unused package {path}: {err}");
            }
        }
        external.extend(reach.external);

        let grouped = self.group_imports(search, None, external).await?;
        Ok(grouped
            .into_iter()
            .map(|(target, packages)| Demand {
                importer: None,
                target,
                packages,
            })
            .collect())
    }

    /// Group external imports by project. Imports satisfied by the root
    /// tree and imports back into `owner` are dropped.
    async fn group_imports(
        &self,
        search: &mut Search,
        owner: Option<&ProjectRoot>,
        imports: BTreeSet<String>,
    ) -> Result<BTreeMap<ProjectRoot, BTreeSet<String>>, SolveError> {
        let own_root = self.params.root_tree.import_root.as_str();
        let mut grouped: BTreeMap<ProjectRoot, BTreeSet<String>> = BTreeMap::new();
        for import in imports {
            if self.params.root_tree.packages.contains_key(&import)
                || self.params.ignored.is_ignored(&import)
                || (!own_root.is_empty() && is_path_within(&import, own_root))
                || self.params.local_roots.iter().any(|r| r.contains(&import))
            {
                continue;
            }
            let root = self.deduce_root(search, &import).await?;
            if owner == Some(&root) {
                continue;
            }
            grouped.entry(root).or_default().insert(import);
        }
        Ok(grouped)
    }

    /// The constraint currently applying to `root` and what contributed to
    /// it. A root override replaces everything else.
    fn effective(&self, state: &State, root: &ProjectRoot) -> (Constraint, Vec<Contribution>) {
        if let Some(merged) = self.params.constraints.override_for(root) {
            return (merged.constraint.clone(), merged.contributions.clone());
        }
        let mut contributions: Vec<Contribution> = self
            .params
            .constraints
            .dependency(root)
            .map(|m| m.contributions.clone())
            .unwrap_or_default();
        if let Some(extra) = state.contributions.get(root) {
            contributions.extend(extra.iter().cloned());
        }
        let constraint = contributions
            .iter()
            .fold(Constraint::any(), |acc, c| acc.intersect(&c.constraint));
        (constraint, contributions)
    }

    fn conflict(&self, state: &State, root: &ProjectRoot, reason: ConflictReason) -> ProjectConflict {
        ProjectConflict {
            root: root.clone(),
            reason,
            contributions: self.effective(state, root).1,
        }
    }

    /// Apply demands until none are left, extending selected projects with
    /// newly needed packages.
    async fn expand(&self, search: &mut Search, state: &mut State, mut work: VecDeque<Demand>) -> Step<()> {
        while let Some(demand) = work.pop_front() {
            let Demand {
                importer,
                target,
                packages,
            } = demand;

            if let Some(importer_root) = &importer {
                if let Some(sel) = state.selected.get(importer_root) {
                    if let Some(props) = sel.manifest.constraints.get(&target) {
                        let origin = format!("{importer_root}@{}", sel.version);
                        let list = state.contributions.entry(target.clone()).or_default();
                        if !list.iter().any(|c| c.origin == origin) {
                            list.push(Contribution {
                                origin,
                                constraint: props.constraint.clone(),
                                source: props.source.clone(),
                            });
                        }
                    }
                }
            }
            state.imports.entry(importer).or_default().insert(target.clone());
            state.required.entry(target.clone()).or_default().extend(packages.iter().cloned());

            let (constraint, _) = self.effective(state, &target);
            if constraint.is_empty() {
                return Ok(Err(self.conflict(state, &target, ConflictReason::EmptyIntersection)));
            }

            let Some(sel) = state.selected.get(&target) else {
                continue;
            };
            if !constraint.matches(&sel.version) {
                let version = sel.version.clone();
                return Ok(Err(self.conflict(state, &target, ConflictReason::VersionRejected { version })));
            }
            let fresh: BTreeSet<String> = packages.difference(&sel.packages).cloned().collect();
            if fresh.is_empty() {
                continue;
            }
            let tree = Arc::clone(&sel.tree);
            let version = sel.version.clone();
            let reach = match tree.reach(fresh, &self.params.ignored, false) {
                Ok(reach) => reach,
                Err(failure) => return Ok(Err(self.reach_conflict(state, &target, &version, failure))),
            };
            if let Some(sel) = state.selected.get_mut(&target) {
                sel.packages.extend(reach.internal);
            }
            let grouped = self.group_imports(search, Some(&target), reach.external).await?;
            work.extend(grouped.into_iter().map(|(next, packages)| Demand {
                importer: Some(target.clone()),
                target: next,
                packages,
            }));
        }
        Ok(Ok(()))
    }

    fn reach_conflict(&self, state: &State, root: &ProjectRoot, version: &Version, failure: ReachFailure) -> ProjectConflict {
        let reason = match failure {
            ReachFailure::Missing { path, .. } => ConflictReason::MissingPackage {
                path,
                version: version.clone(),
            },
            ReachFailure::Broken { path, message } => ConflictReason::BrokenPackage {
                path,
                version: version.clone(),
                message,
            },
        };
        self.conflict(state, root, reason)
    }

    /// Choose the pending project to decide next.
    async fn next_project(&self, search: &mut Search, state: &State) -> Result<Option<ProjectRoot>, SolveError> {
        let mut best: Option<((bool, usize), ProjectRoot)> = None;
        let pending: Vec<ProjectRoot> = state.pending().cloned().collect();
        for root in pending {
            let unlocked = self.params.locked_version(&root).is_none();
            let count = self
                .versions(search, &root)
                .await?
                .map(|v| v.len())
                .unwrap_or(0);
            let key = (unlocked, count);
            if best.as_ref().map_or(true, |(k, _)| key < *k) {
                best = Some((key, root));
            }
        }
        Ok(best.map(|(_, root)| root))
    }

    /// Order the candidates for `project`, or explain why there are none.
    async fn open_frame(&self, search: &mut Search, state: &State, project: ProjectRoot) -> Step<Frame> {
        let (constraint, _) = self.effective(state, &project);
        if constraint.is_empty() {
            return Ok(Err(self.conflict(state, &project, ConflictReason::EmptyIntersection)));
        }
        let Some(listed) = self.versions(search, &project).await? else {
            return Ok(Err(self.conflict(state, &project, ConflictReason::ProjectNotFound)));
        };

        let mut candidates: VecDeque<Version> = VecDeque::new();
        let pinned = self
            .params
            .locked_version(&project)
            .filter(|v| constraint.matches(v))
            .cloned();
        for v in &listed {
            if constraint.matches(v) && !pinned.as_ref().is_some_and(|p| p.same_release(v)) {
                candidates.push_back(v.clone());
            }
        }
        if let Some(pinned) = pinned {
            candidates.push_front(pinned);
        }
        if candidates.is_empty() {
            let reason = ConflictReason::NoMatchingVersion { available: listed };
            return Ok(Err(self.conflict(state, &project, reason)));
        }
        tracing::debug!("deciding {project}: {} candidate(s) under {constraint}", candidates.len());
        Ok(Ok(Frame {
            project,
            candidates,
            tried: Vec::new(),
            snapshot: state.clone(),
        }))
    }

    /// Try the remaining candidates of the innermost decision, unwinding to
    /// outer decisions as they run dry. Returns the state after the first
    /// candidate that selects cleanly.
    async fn backtrack(&self, search: &mut Search, stack: &mut Vec<Frame>) -> Result<State, SolveError> {
        loop {
            self.check_cancelled()?;
            let Some(frame) = stack.last_mut() else {
                return Err(SolveError::Unsatisfiable(std::mem::take(search).failure()));
            };
            let Some(version) = frame.candidates.pop_front() else {
                tracing::debug!("exhausted candidates for {}, backing up", frame.project);
                if let Some(done) = stack.pop() {
                    let reason = ConflictReason::CandidatesExhausted { tried: done.tried };
                    search.record(self.conflict(&done.snapshot, &done.project, reason));
                }
                continue;
            };
            frame.tried.push(version.clone());
            let project = frame.project.clone();
            let mut state = frame.snapshot.clone();
            search.attempts += 1;
            tracing::debug!("trying {project} {version}");
            match self.select(search, &mut state, &project, version).await? {
                Ok(()) => return Ok(state),
                Err(conflict) => search.record(conflict),
            }
        }
    }

    async fn select(&self, search: &mut Search, state: &mut State, project: &ProjectRoot, version: Version) -> Step<()> {
        let tree = match self.guarded(self.source.package_tree_at(project, &version)).await? {
            Ok(tree) => tree,
            Err(SourceError::NotFound(_)) => {
                return Ok(Err(self.conflict(state, project, ConflictReason::VersionRejected { version })))
            }
            Err(e) => return Err(e.into()),
        };
        let manifest = match self.guarded(self.source.manifest_at(project, &version)).await? {
            Ok(manifest) => manifest,
            Err(SourceError::NotFound(_)) => {
                return Ok(Err(self.conflict(state, project, ConflictReason::VersionRejected { version })))
            }
            Err(e) => return Err(e.into()),
        };

        let required = state.required.get(project).cloned().unwrap_or_default();
        let reach = match tree.reach(required, &self.params.ignored, false) {
            Ok(reach) => reach,
            Err(failure) => return Ok(Err(self.reach_conflict(state, project, &version, failure))),
        };
        state.selected.insert(
            project.clone(),
            Selection {
                version,
                packages: reach.internal,
                tree: Arc::new(tree),
                manifest: Arc::new(manifest),
            },
        );

        let grouped = self.group_imports(search, Some(project), reach.external).await?;
        let work = grouped
            .into_iter()
            .map(|(target, packages)| Demand {
                importer: Some(project.clone()),
                target,
                packages,
            })
            .collect();
        self.expand(search, state, work).await
    }

    fn finish(&self, search: &Search, state: State) -> Solution {
        let projects = state
            .selected
            .into_iter()
            .map(|(root, sel)| {
                let packages = sel
                    .packages
                    .iter()
                    .filter_map(|p| root.relative(p).map(str::to_string));
                let mut locked = LockedProject::new(root.clone(), sel.version, packages);
                locked.source = self
                    .params
                    .constraints
                    .effective(&root)
                    .and_then(|m| m.source.clone());
                (root, locked)
            })
            .collect();
        Solution::new(projects, state.imports, self.params.inputs_digest(), search.attempts)
    }
}
