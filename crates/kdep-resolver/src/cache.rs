//! Read-mostly cache in front of a version source.
//!
//! Successful responses are kept for the lifetime of the cache, keyed by
//! project (version lists, root deduction) or by `(project, version)`
//! (package trees, manifests). Failures are never cached, so a later call
//! asks the inner source again. One cache may be shared by concurrent
//! solves.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use kdep_core::manifest::Manifest;
use kdep_core::pkgtree::PackageTree;
use kdep_core::project::ProjectRoot;
use kdep_core::version::Version;

use crate::source::{SourceError, VersionSource};

#[derive(Debug)]
struct Table<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K: Eq + Hash, V: Clone> Table<K, V> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries.read().ok().and_then(|m| m.get(key).cloned())
    }

    fn put(&self, key: K, value: V) {
        if let Ok(mut m) = self.entries.write() {
            m.insert(key, value);
        }
    }

    fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }
}

/// A [`VersionSource`] decorator that memoizes successful calls.
#[derive(Debug)]
pub struct CachingSource<S> {
    inner: S,
    versions: Table<ProjectRoot, Vec<Version>>,
    trees: Table<(ProjectRoot, Version), PackageTree>,
    manifests: Table<(ProjectRoot, Version), Manifest>,
    roots: Table<String, ProjectRoot>,
}

impl<S: VersionSource> CachingSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            versions: Table::new(),
            trees: Table::new(),
            manifests: Table::new(),
            roots: Table::new(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of cached `(project, version)` package trees.
    pub fn cached_trees(&self) -> usize {
        self.trees.len()
    }
}

impl<S: VersionSource> VersionSource for CachingSource<S> {
    async fn list_versions(&self, root: &ProjectRoot) -> Result<Vec<Version>, SourceError> {
        if let Some(hit) = self.versions.get(root) {
            return Ok(hit);
        }
        let listed = self.inner.list_versions(root).await?;
        self.versions.put(root.clone(), listed.clone());
        Ok(listed)
    }

    async fn package_tree_at(&self, root: &ProjectRoot, version: &Version) -> Result<PackageTree, SourceError> {
        let key = (root.clone(), version.clone());
        if let Some(hit) = self.trees.get(&key) {
            return Ok(hit);
        }
        let tree = self.inner.package_tree_at(root, version).await?;
        self.trees.put(key, tree.clone());
        Ok(tree)
    }

    async fn manifest_at(&self, root: &ProjectRoot, version: &Version) -> Result<Manifest, SourceError> {
        let key = (root.clone(), version.clone());
        if let Some(hit) = self.manifests.get(&key) {
            return Ok(hit);
        }
        let manifest = self.inner.manifest_at(root, version).await?;
        self.manifests.put(key, manifest.clone());
        Ok(manifest)
    }

    async fn deduce_root(&self, import_path: &str) -> Result<ProjectRoot, SourceError> {
        let key = import_path.to_string();
        if let Some(hit) = self.roots.get(&key) {
            return Ok(hit);
        }
        let root = self.inner.deduce_root(import_path).await?;
        self.roots.put(key, root.clone());
        Ok(root)
    }
}
