//! Orchestration around the solver: projects and workspaces, the top-level
//! solve, parallel member checks, lock writing, Godeps export and local
//! vendor links.

pub mod godeps;
pub mod ops_check;
pub mod ops_lock;
pub mod ops_solve;
pub mod ops_tree;
pub mod project;
pub mod vendor;
pub mod workspace;

pub use project::{wrap_project, BaseProject, ManifestLoader, MultiRepoProject, ProjectMeta, ProjectOps, StaticLoader};
pub use workspace::{Workspace, WorkspaceMember};

use kdep_core::config::KdepConfig;

/// Install the log subscriber with the `[log]` filter. Returns `false` if
/// a subscriber was already installed.
pub fn init_logging(config: &KdepConfig) -> bool {
    kdep_util::logging::init(&config.log.filter)
}
