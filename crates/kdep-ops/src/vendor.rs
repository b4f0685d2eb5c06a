//! Relative symlinks that expose local projects through `vendor/`.
//!
//! Every link is attempted; failures are collected and returned so the
//! caller can decide whether a partial vendor tree is acceptable.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::workspace::WorkspaceMember;

/// A link or directory that could not be created.
#[derive(Debug, Error)]
#[error("{}: {source}", path.display())]
pub struct VendorFailure {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Link `vendor/<import>` to each local project directory.
pub fn link_local_projects(project_dir: &Path, entries: &BTreeMap<String, PathBuf>) -> Vec<VendorFailure> {
    let vendor = project_dir.join("vendor");
    let mut failures = Vec::new();
    for (import, dir) in entries {
        if let Err(failure) = link_into(&vendor.join(import), dir) {
            failures.push(failure);
        }
    }
    failures
}

/// For each workspace member, link `<member>/vendor` to the workspace
/// vendor directory and `vendor/<name>` back to the member.
pub fn link_workspace_members(workspace_dir: &Path, members: &[WorkspaceMember]) -> Vec<VendorFailure> {
    let vendor = workspace_dir.join("vendor");
    let mut failures = Vec::new();
    for member in members {
        let member_dir = workspace_dir.join(&member.path);
        if let Err(failure) = link_into(&member_dir.join("vendor"), &vendor) {
            failures.push(failure);
        }
        if let Err(failure) = link_into(&vendor.join(&member.name), &member_dir) {
            failures.push(failure);
        }
    }
    failures
}

/// Create `link` pointing at `target` through a path relative to the
/// link's parent. An existing link with the same target is left alone.
fn link_into(link: &Path, target: &Path) -> Result<(), VendorFailure> {
    let fail = |source: io::Error| VendorFailure {
        path: link.to_path_buf(),
        source,
    };
    let parent = link
        .parent()
        .ok_or_else(|| fail(io::Error::new(io::ErrorKind::InvalidInput, "link has no parent")))?;
    kdep_util::fs::ensure_dir(parent).map_err(|source| VendorFailure {
        path: parent.to_path_buf(),
        source,
    })?;
    let relative = pathdiff::diff_paths(target, parent).ok_or_else(|| {
        fail(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no relative path to {}", target.display()),
        ))
    })?;

    if let Ok(existing) = std::fs::read_link(link) {
        if existing == relative {
            return Ok(());
        }
    }
    symlink_dir(&relative, link).map_err(fail)?;
    tracing::debug!("linked {} -> {}", link.display(), relative.display());
    Ok(())
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
