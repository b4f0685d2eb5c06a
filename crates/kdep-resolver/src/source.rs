//! The contract between the solver and wherever versions come from.

use std::collections::BTreeMap;
use std::future::Future;

use miette::Diagnostic;
use thiserror::Error;

use kdep_core::manifest::Manifest;
use kdep_core::pkgtree::{Package, PackageTree};
use kdep_core::project::ProjectRoot;
use kdep_core::version::{upgrade_order, Version};

/// Failure of a [`VersionSource`] call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum SourceError {
    /// The project, or the requested version of it, does not exist.
    #[error("project {0} could not be found")]
    NotFound(ProjectRoot),

    /// I/O failure talking to the source. The solver never retries these.
    #[error("failed to fetch {root}: {message}")]
    Fetch { root: ProjectRoot, message: String },
}

/// Everything the solver needs to know about projects it does not own.
///
/// Implementations perform whatever I/O they need; retry policy belongs
/// here, not in the solver. All methods must be safe to call concurrently.
pub trait VersionSource: Send + Sync {
    /// Every version of `root`, newest first. May be empty.
    fn list_versions(
        &self,
        root: &ProjectRoot,
    ) -> impl Future<Output = Result<Vec<Version>, SourceError>> + Send;

    /// The package tree of `root` at `version`.
    fn package_tree_at(
        &self,
        root: &ProjectRoot,
        version: &Version,
    ) -> impl Future<Output = Result<PackageTree, SourceError>> + Send;

    /// The constraints `root` declares at `version`.
    fn manifest_at(
        &self,
        root: &ProjectRoot,
        version: &Version,
    ) -> impl Future<Output = Result<Manifest, SourceError>> + Send;

    /// The project owning `import_path`.
    fn deduce_root(
        &self,
        import_path: &str,
    ) -> impl Future<Output = Result<ProjectRoot, SourceError>> + Send {
        let root = default_root(import_path);
        async move { Ok(root) }
    }
}

/// The first three elements of an import path, e.g. `github.com/org/repo`.
pub fn default_root(import_path: &str) -> ProjectRoot {
    let end = import_path
        .match_indices('/')
        .nth(2)
        .map(|(i, _)| i)
        .unwrap_or(import_path.len());
    ProjectRoot::new(&import_path[..end])
}

#[derive(Debug, Clone)]
struct Release {
    version: Version,
    tree: PackageTree,
    manifest: Manifest,
}

/// A [`VersionSource`] backed by in-memory releases.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    projects: BTreeMap<ProjectRoot, Vec<Release>>,
    failures: BTreeMap<ProjectRoot, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a release of `root`.
    pub fn add_release(
        &mut self,
        root: impl Into<ProjectRoot>,
        version: Version,
        tree: PackageTree,
        manifest: Manifest,
    ) -> &mut Self {
        let releases = self.projects.entry(root.into()).or_default();
        releases.retain(|r| r.version != version);
        releases.push(Release {
            version,
            tree,
            manifest,
        });
        releases.sort_by(|a, b| upgrade_order(&a.version, &b.version));
        self
    }

    /// Register a release whose only package is the project root itself,
    /// importing `imports`.
    pub fn add_package_release(
        &mut self,
        root: impl Into<ProjectRoot>,
        version: Version,
        imports: &[&str],
        manifest: Manifest,
    ) -> &mut Self {
        let root = root.into();
        let tree = single_package_tree(&root, imports);
        self.add_release(root, version, tree, manifest)
    }

    /// Make every call for `root` fail with [`SourceError::Fetch`].
    pub fn fail_fetch(&mut self, root: impl Into<ProjectRoot>, message: impl Into<String>) -> &mut Self {
        self.failures.insert(root.into(), message.into());
        self
    }

    fn check_failure(&self, root: &ProjectRoot) -> Result<(), SourceError> {
        match self.failures.get(root) {
            Some(message) => Err(SourceError::Fetch {
                root: root.clone(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn release(&self, root: &ProjectRoot, version: &Version) -> Result<&Release, SourceError> {
        self.check_failure(root)?;
        self.projects
            .get(root)
            .and_then(|releases| releases.iter().find(|r| r.version.same_release(version)))
            .ok_or_else(|| SourceError::NotFound(root.clone()))
    }
}

impl VersionSource for MemorySource {
    async fn list_versions(&self, root: &ProjectRoot) -> Result<Vec<Version>, SourceError> {
        self.check_failure(root)?;
        self.projects
            .get(root)
            .map(|releases| releases.iter().map(|r| r.version.clone()).collect())
            .ok_or_else(|| SourceError::NotFound(root.clone()))
    }

    async fn package_tree_at(&self, root: &ProjectRoot, version: &Version) -> Result<PackageTree, SourceError> {
        self.release(root, version).map(|r| r.tree.clone())
    }

    async fn manifest_at(&self, root: &ProjectRoot, version: &Version) -> Result<Manifest, SourceError> {
        self.release(root, version).map(|r| r.manifest.clone())
    }

    /// Longest registered root owning `import_path`, else [`default_root`].
    async fn deduce_root(&self, import_path: &str) -> Result<ProjectRoot, SourceError> {
        Ok(self
            .projects
            .keys()
            .filter(|root| root.contains(import_path))
            .max_by_key(|root| root.as_str().len())
            .cloned()
            .unwrap_or_else(|| default_root(import_path)))
    }
}

/// A tree holding one package at `root` that imports `imports`.
pub fn single_package_tree(root: &ProjectRoot, imports: &[&str]) -> PackageTree {
    let mut tree = PackageTree::new(root.as_str());
    let mut imports: Vec<String> = imports.iter().map(|s| s.to_string()).collect();
    imports.sort();
    imports.dedup();
    tree.insert_package(Package {
        import_path: root.to_string(),
        name: root.as_str().rsplit('/').next().unwrap_or_default().to_string(),
        imports,
        test_imports: Vec::new(),
    });
    tree
}
