//! Several projects solved together against one lock.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use kdep_core::constraint_set::{ConstraintSet, ConstraintSetBuilder};
use kdep_core::lock::Lock;
use kdep_core::manifest::Manifest;
use kdep_core::pkgtree::PackageTree;
use kdep_core::project::ProjectRoot;
use kdep_util::errors::KdepResult;

use crate::ops_lock::LOCK_FILE;
use crate::project::{aggregate_error, BaseProject, ManifestLoader, ProjectOps};
use crate::vendor::{self, VendorFailure};

/// One `[[package]]` entry of a workspace: the member's import root and
/// its directory relative to the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub name: String,
    pub path: PathBuf,
}

impl WorkspaceMember {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug)]
pub struct Workspace {
    root_dir: PathBuf,
    import_root: ProjectRoot,
    members: Vec<WorkspaceMember>,
    projects: Vec<BaseProject>,
    /// Ignore rules and required packages of all members.
    manifest: Manifest,
    lock: Option<Lock>,
}

impl Workspace {
    /// Load every member through `loader`, and the workspace lock if any.
    pub fn load(
        root_dir: impl Into<PathBuf>,
        members: Vec<WorkspaceMember>,
        loader: &dyn ManifestLoader,
    ) -> KdepResult<Self> {
        let root_dir = root_dir.into();
        let projects = members
            .iter()
            .map(|m| BaseProject::load(root_dir.join(&m.path), m.name.as_str(), loader))
            .collect::<KdepResult<Vec<_>>>()?;
        let lock = Lock::from_optional_path(&root_dir.join(LOCK_FILE))?;
        Ok(Self::from_projects(root_dir, members, projects, lock))
    }

    /// Assemble a workspace from already loaded members. `projects` must be
    /// in the same order as `members`.
    pub fn from_projects(
        root_dir: PathBuf,
        members: Vec<WorkspaceMember>,
        projects: Vec<BaseProject>,
        lock: Option<Lock>,
    ) -> Self {
        let mut manifest = Manifest::new();
        for p in &projects {
            manifest.ignored.extend(p.manifest.ignored.iter().cloned());
            manifest.required.extend(p.manifest.required.iter().cloned());
        }
        manifest.ignored.sort();
        manifest.ignored.dedup();
        Self {
            root_dir,
            import_root: ProjectRoot::new(""),
            members,
            projects,
            manifest,
            lock,
        }
    }

    pub fn members(&self) -> &[WorkspaceMember] {
        &self.members
    }

    pub fn projects(&self) -> &[BaseProject] {
        &self.projects
    }

    /// Member constraints and overrides, aggregated with each member's name
    /// as the origin.
    pub fn aggregate_constraints(&self) -> KdepResult<ConstraintSet> {
        let mut builder = ConstraintSetBuilder::new();
        for (member, project) in self.members.iter().zip(&self.projects) {
            builder.add_manifest(&member.name, &project.manifest);
        }
        builder.build().map_err(aggregate_error)
    }
}

impl ProjectOps for Workspace {
    /// Empty: a workspace is not itself importable.
    fn import_root(&self) -> &ProjectRoot {
        &self.import_root
    }

    fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn lock(&self) -> Option<&Lock> {
        self.lock.as_ref()
    }

    /// Every member's packages in one tree.
    fn parse_root_package_tree(&self) -> KdepResult<PackageTree> {
        let mut tree = PackageTree::new("");
        for project in &self.projects {
            let member_tree = project.parse_root_package_tree()?;
            tree = tree.merge(&member_tree, std::slice::from_ref(&project.import_root));
        }
        Ok(tree)
    }

    fn constraints(&self) -> KdepResult<ConstraintSet> {
        self.aggregate_constraints()
    }

    /// Members are never looked up in the version source.
    fn local_roots(&self) -> BTreeSet<ProjectRoot> {
        self.members.iter().map(|m| ProjectRoot::new(m.name.as_str())).collect()
    }

    /// Each member sees the shared vendor tree, which links back to every
    /// member by name.
    fn link_vendor(&self) -> Vec<VendorFailure> {
        vendor::link_workspace_members(&self.root_dir, &self.members)
    }
}
