//! Projects as the solver sees them.
//!
//! [`ProjectOps`] is the capability every solvable project offers.
//! [`BaseProject`] is a plain project directory; [`MultiRepoProject`]
//! decorates one with local sub-projects found under its local GOPATHs,
//! composing their package trees and manifests into the root.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use kdep_core::config::ResolutionMode;
use kdep_core::constraint_set::{AggregateError, ConstraintSet, ConstraintSetBuilder};
use kdep_core::ignored::IgnoredRuleset;
use kdep_core::lock::Lock;
use kdep_core::manifest::Manifest;
use kdep_core::pkgtree::{BuildOptions, PackageTree};
use kdep_core::project::ProjectRoot;
use kdep_resolver::SolveParameters;
use kdep_util::errors::{KdepError, KdepResult};

use crate::ops_lock::LOCK_FILE;
use crate::vendor::{self, VendorFailure};

/// Multi-repo metadata a project may declare next to its manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectMeta {
    /// This project composes local sub-projects.
    #[serde(default)]
    pub is_root: bool,
    /// This project is composed into some other root.
    #[serde(default)]
    pub is_child: bool,
    /// Import roots of the local sub-projects.
    #[serde(default)]
    pub local_deps: Vec<String>,
    /// Directories, relative to the root, laid out as `<gopath>/src/<import>`.
    #[serde(default)]
    pub local_gopaths: Vec<String>,
    /// Also write `Godeps/Godeps.json` after a solve.
    #[serde(default)]
    pub godep_compat: bool,
}

impl ProjectMeta {
    pub fn is_kdep(&self) -> bool {
        self.is_root || self.is_child
    }
}

/// Supplies manifests and metadata for project directories.
pub trait ManifestLoader: Send + Sync {
    fn load_manifest(&self, project_dir: &Path) -> KdepResult<Manifest>;

    /// Multi-repo metadata, `None` when the project declares none.
    fn load_meta(&self, _project_dir: &Path) -> KdepResult<Option<ProjectMeta>> {
        Ok(None)
    }
}

/// A [`ManifestLoader`] over manifests registered in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    entries: BTreeMap<PathBuf, (Manifest, Option<ProjectMeta>)>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dir: impl Into<PathBuf>, manifest: Manifest, meta: Option<ProjectMeta>) -> &mut Self {
        self.entries.insert(dir.into(), (manifest, meta));
        self
    }
}

impl ManifestLoader for StaticLoader {
    /// Unregistered directories get an empty manifest.
    fn load_manifest(&self, project_dir: &Path) -> KdepResult<Manifest> {
        Ok(self
            .entries
            .get(project_dir)
            .map(|(m, _)| m.clone())
            .unwrap_or_default())
    }

    fn load_meta(&self, project_dir: &Path) -> KdepResult<Option<ProjectMeta>> {
        Ok(self.entries.get(project_dir).and_then(|(_, meta)| meta.clone()))
    }
}

pub(crate) fn aggregate_error(err: AggregateError) -> miette::Report {
    KdepError::Unsatisfiable {
        message: err.to_string(),
    }
    .into()
}

/// What the solver and writers need from a project.
pub trait ProjectOps: Send + Sync {
    fn import_root(&self) -> &ProjectRoot;

    fn root_dir(&self) -> &Path;

    fn manifest(&self) -> &Manifest;

    fn lock(&self) -> Option<&Lock>;

    /// Analyze the project's own sources.
    fn parse_root_package_tree(&self) -> KdepResult<PackageTree>;

    fn constraints(&self) -> KdepResult<ConstraintSet> {
        Ok(ConstraintSet::from_manifest(self.import_root().as_str(), self.manifest()))
    }

    fn ignored_patterns(&self) -> Vec<String> {
        self.manifest().ignored.clone()
    }

    fn required_packages(&self) -> BTreeSet<String> {
        self.manifest().required.clone()
    }

    /// Projects composed into the root tree.
    fn local_roots(&self) -> BTreeSet<ProjectRoot> {
        BTreeSet::new()
    }

    /// Import path to directory of local projects to link into `vendor/`.
    fn vendor_entries(&self) -> BTreeMap<String, PathBuf> {
        BTreeMap::new()
    }

    fn godeps_compat(&self) -> bool {
        false
    }

    /// Create the `vendor/` links this project needs after a solve.
    fn link_vendor(&self) -> Vec<VendorFailure> {
        vendor::link_local_projects(self.root_dir(), &self.vendor_entries())
    }

    /// Gather everything a solve of this project needs.
    fn make_params(&self) -> KdepResult<SolveParameters> {
        let root_tree = self.parse_root_package_tree()?;
        let ignored = IgnoredRuleset::new(self.ignored_patterns())?;
        for broken in root_tree.check_errors(&ignored)? {
            tracing::warn!("{broken}");
        }
        let mut params = SolveParameters::new(root_tree, self.constraints()?);
        params.ignored = ignored;
        params.required = self.required_packages();
        params.local_roots = self.local_roots();
        params.lock = self.lock().cloned();
        Ok(params)
    }
}

/// A single project directory.
#[derive(Debug, Clone)]
pub struct BaseProject {
    pub root_dir: PathBuf,
    pub import_root: ProjectRoot,
    pub manifest: Manifest,
    pub lock: Option<Lock>,
    pub build: BuildOptions,
}

impl BaseProject {
    pub fn new(root_dir: impl Into<PathBuf>, import_root: impl Into<ProjectRoot>, manifest: Manifest) -> Self {
        Self {
            root_dir: root_dir.into(),
            import_root: import_root.into(),
            manifest,
            lock: None,
            build: BuildOptions::default(),
        }
    }

    /// Load the manifest through `loader` and the lock from disk, if any.
    pub fn load(
        root_dir: impl Into<PathBuf>,
        import_root: impl Into<ProjectRoot>,
        loader: &dyn ManifestLoader,
    ) -> KdepResult<Self> {
        let root_dir = root_dir.into();
        let manifest = loader.load_manifest(&root_dir)?;
        let lock = Lock::from_optional_path(&root_dir.join(LOCK_FILE))?;
        let mut project = Self::new(root_dir, import_root, manifest);
        project.lock = lock;
        Ok(project)
    }
}

impl ProjectOps for BaseProject {
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

    fn parse_root_package_tree(&self) -> KdepResult<PackageTree> {
        PackageTree::build(&self.root_dir, self.import_root.as_str(), &self.build)
    }
}

/// A root project with local sub-projects checked out under its local
/// GOPATHs. Everything not listed here is forwarded to the base project.
#[derive(Debug)]
pub struct MultiRepoProject {
    base: BaseProject,
    meta: ProjectMeta,
    subprojects: Vec<BaseProject>,
}

impl MultiRepoProject {
    /// Locate each local dependency at `<root>/<gopath>/src/<import>`,
    /// taking the first GOPATH that has it.
    pub fn new(mut base: BaseProject, meta: ProjectMeta, loader: &dyn ManifestLoader) -> KdepResult<Self> {
        let mut subprojects = Vec::new();
        for dep in &meta.local_deps {
            let found = meta
                .local_gopaths
                .iter()
                .map(|gopath| base.root_dir.join(gopath).join("src").join(dep))
                .find(|candidate| candidate.is_dir());
            match found {
                Some(dir) => {
                    tracing::debug!("local dependency {dep} at {}", dir.display());
                    subprojects.push(BaseProject::load(dir, dep.as_str(), loader)?);
                }
                None => tracing::warn!("local dependency {dep} not found in any local GOPATH"),
            }
        }
        base.build
            .skip_dirs
            .extend(meta.local_gopaths.iter().map(PathBuf::from));
        Ok(Self {
            base,
            meta,
            subprojects,
        })
    }

    pub fn subprojects(&self) -> &[BaseProject] {
        &self.subprojects
    }

    pub fn meta(&self) -> &ProjectMeta {
        &self.meta
    }

    /// Import path prefixes of the local GOPATH directories inside the root.
    fn gopath_prefixes(&self) -> Vec<String> {
        self.meta
            .local_gopaths
            .iter()
            .map(|gp| self.base.import_root.join(gp.trim_matches('/')))
            .collect()
    }
}

impl ProjectOps for MultiRepoProject {
    fn import_root(&self) -> &ProjectRoot {
        self.base.import_root()
    }

    fn root_dir(&self) -> &Path {
        self.base.root_dir()
    }

    fn manifest(&self) -> &Manifest {
        self.base.manifest()
    }

    fn lock(&self) -> Option<&Lock> {
        self.base.lock()
    }

    /// The root tree with GOPATH regions stripped, then every sub-project
    /// tree merged over it.
    fn parse_root_package_tree(&self) -> KdepResult<PackageTree> {
        let mut tree = self.base.parse_root_package_tree()?;
        let prefixes = self.gopath_prefixes();
        tree.strip_prefixes(prefixes.as_slice());
        for sub in &self.subprojects {
            let sub_tree = sub.parse_root_package_tree()?;
            tree = tree.merge(&sub_tree, std::slice::from_ref(&sub.import_root));
        }
        Ok(tree)
    }

    fn constraints(&self) -> KdepResult<ConstraintSet> {
        let mut builder = ConstraintSetBuilder::new();
        builder.add_manifest(self.base.import_root.as_str(), &self.base.manifest);
        for sub in &self.subprojects {
            builder.add_manifest(sub.import_root.as_str(), &sub.manifest);
        }
        builder.build().map_err(aggregate_error)
    }

    fn ignored_patterns(&self) -> Vec<String> {
        let mut patterns = self.base.manifest.ignored.clone();
        for sub in &self.subprojects {
            patterns.extend(sub.manifest.ignored.iter().cloned());
        }
        patterns
    }

    fn required_packages(&self) -> BTreeSet<String> {
        let mut required = self.base.manifest.required.clone();
        for sub in &self.subprojects {
            required.extend(sub.manifest.required.iter().cloned());
        }
        required
    }

    fn local_roots(&self) -> BTreeSet<ProjectRoot> {
        self.subprojects.iter().map(|s| s.import_root.clone()).collect()
    }

    fn vendor_entries(&self) -> BTreeMap<String, PathBuf> {
        self.subprojects
            .iter()
            .map(|s| (s.import_root.to_string(), s.root_dir.clone()))
            .collect()
    }

    fn godeps_compat(&self) -> bool {
        self.meta.godep_compat
    }
}

/// Choose how `base` is solved.
///
/// In [`ResolutionMode::LegacyPassthrough`], or when the project declares
/// no multi-repo metadata, the base project is returned unchanged. A
/// project that is only a child of some other root cannot be solved on its
/// own.
pub fn wrap_project(
    base: BaseProject,
    meta: Option<ProjectMeta>,
    loader: &dyn ManifestLoader,
    mode: ResolutionMode,
) -> KdepResult<Box<dyn ProjectOps>> {
    if mode == ResolutionMode::LegacyPassthrough {
        return Ok(Box::new(base));
    }
    let Some(meta) = meta.filter(ProjectMeta::is_kdep) else {
        tracing::debug!("{} has no multi-repo metadata, solving as declared", base.import_root);
        return Ok(Box::new(base));
    };
    if !meta.is_root {
        return Err(KdepError::Input {
            message: format!("{} is not a multi-repo root", base.import_root),
        }
        .into());
    }
    Ok(Box::new(MultiRepoProject::new(base, meta, loader)?))
}
