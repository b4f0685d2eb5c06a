//! Operation: solve a project and write the results.

use std::path::PathBuf;

use kdep_core::config::{KdepConfig, ResolutionMode};
use kdep_core::lock::{Lock, LockDiff};
use kdep_resolver::{CancelSignal, SolveParameters, Solution, VersionSource};
use kdep_util::errors::KdepError;

use crate::godeps;
use crate::ops_lock::write_lock;
use crate::project::ProjectOps;
use crate::vendor::VendorFailure;

/// Options for [`solve`].
#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    pub mode: ResolutionMode,
    /// Report what would change without writing anything.
    pub dry_run: bool,
    /// Solve even when the lock is current.
    pub force: bool,
    /// Ignore the lock's versions.
    pub change_all: bool,
}

impl SolveOptions {
    pub fn from_config(config: &KdepConfig) -> Self {
        Self {
            mode: config.resolve.mode,
            change_all: !config.resolve.prefer_lock,
            ..Self::default()
        }
    }
}

/// What [`solve`] did.
#[derive(Debug, Default)]
pub struct SolveOutcome {
    /// `None` when the lock was current and no solve ran.
    pub solution: Option<Solution>,
    pub diff: LockDiff,
    pub lock_written: bool,
    pub godeps: Option<PathBuf>,
    pub vendor_failures: Vec<VendorFailure>,
}

impl SolveOutcome {
    pub fn skipped(&self) -> bool {
        self.solution.is_none()
    }
}

/// Returns `true` when `lock` was computed from these inputs and every
/// locked version still satisfies its constraint.
pub fn lock_is_current(params: &SolveParameters, lock: &Lock) -> bool {
    if lock.inputs_digest != params.inputs_digest() {
        return false;
    }
    lock.projects.iter().all(|p| {
        params
            .constraints
            .effective(&p.root)
            .map_or(true, |m| m.constraint.matches(&p.version))
    })
}

/// Solve `project` against `source`, then write the lock and, in
/// [`ResolutionMode::Standard`], the Godeps export and local vendor links.
///
/// Nothing is written on a dry run, on failure, or on cancellation.
pub async fn solve<S: VersionSource>(
    project: &dyn ProjectOps,
    source: &S,
    opts: &SolveOptions,
    cancel: &CancelSignal,
) -> miette::Result<SolveOutcome> {
    let mut params = project.make_params()?;
    params.change_all = opts.change_all;

    if !opts.force && !opts.change_all {
        if let Some(lock) = project.lock() {
            if lock_is_current(&params, lock) {
                kdep_util::progress::status_info("Fresh", &format!("{} lock is up to date", project.import_root()));
                return Ok(SolveOutcome::default());
            }
        }
    }

    kdep_util::progress::status("Solving", &project.root_dir().display().to_string());
    let solution = kdep_resolver::solve(&params, source, cancel)
        .await
        .map_err(KdepError::from)?;
    let new_lock = solution.to_lock();

    if opts.dry_run {
        let diff = LockDiff::between(project.lock(), &new_lock);
        for line in diff.to_string().lines() {
            kdep_util::progress::status_info("Would", line);
        }
        return Ok(SolveOutcome {
            solution: Some(solution),
            diff,
            ..SolveOutcome::default()
        });
    }

    let written = write_lock(project.root_dir(), project.lock(), &new_lock)?;
    let mut outcome = SolveOutcome {
        diff: written.diff,
        lock_written: written.written,
        ..SolveOutcome::default()
    };

    if opts.mode == ResolutionMode::Standard {
        if project.godeps_compat() {
            outcome.godeps = Some(godeps::export(project.root_dir(), project.import_root(), &solution)?);
        }
        outcome.vendor_failures = project.link_vendor();
        for failure in &outcome.vendor_failures {
            kdep_util::progress::status_warn("Vendor", &failure.to_string());
        }
    }
    outcome.solution = Some(solution);
    Ok(outcome)
}
