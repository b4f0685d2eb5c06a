//! Operation: write a solution's lock, only when it changed.

use std::path::{Path, PathBuf};

use kdep_core::lock::{Lock, LockDiff};

/// File name of the lock inside a project or workspace directory.
pub const LOCK_FILE: &str = "kdep.lock";

/// Result of [`write_lock`].
#[derive(Debug, Clone)]
pub struct LockWrite {
    pub path: PathBuf,
    pub diff: LockDiff,
    pub written: bool,
}

/// Write `new` to `<project_dir>/kdep.lock` unless it equals `old`.
pub fn write_lock(project_dir: &Path, old: Option<&Lock>, new: &Lock) -> miette::Result<LockWrite> {
    let path = project_dir.join(LOCK_FILE);
    let diff = LockDiff::between(old, new);
    if diff.is_empty() {
        tracing::debug!("{} is up to date", path.display());
        return Ok(LockWrite {
            path,
            diff,
            written: false,
        });
    }
    new.write_to(&path)?;
    kdep_util::progress::status("Locking", &format!("{} project(s)", new.projects.len()));
    Ok(LockWrite {
        path,
        diff,
        written: true,
    })
}
