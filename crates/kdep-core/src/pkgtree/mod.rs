//! Import graph of a source tree.
//!
//! A [`PackageTree`] maps every import path under an import root to either a
//! parsed [`Package`] or the [`PackageError`] that prevented parsing it. A
//! broken package is recorded in place instead of failing the whole build,
//! so it only matters if something actually reaches it (see
//! [`PackageTree::reach`]).

pub mod analyzer;

pub use analyzer::{GoSourceAnalyzer, PackageAnalyzer};

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;
use walkdir::WalkDir;

use kdep_util::errors::KdepError;

use crate::ignored::IgnoredRuleset;
use crate::project::is_path_within;

/// A parsed package and its direct imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub import_path: String,
    pub name: String,
    /// Sorted, deduplicated.
    pub imports: Vec<String>,
    /// Imports only used by tests. Sorted, deduplicated.
    pub test_imports: Vec<String>,
}

/// Why a package could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PackageError {
    pub message: String,
}

impl PackageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOrErr {
    Package(Package),
    Err(PackageError),
}

impl PackageOrErr {
    pub fn package(&self) -> Option<&Package> {
        match self {
            Self::Package(p) => Some(p),
            Self::Err(_) => None,
        }
    }
}

/// Restricts which directories [`PackageTree::build`] visits.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Directories, relative to the root, to analyze. Empty means all.
    pub source_paths: Vec<PathBuf>,
    /// Directories, relative to the root, to skip entirely.
    pub skip_dirs: Vec<PathBuf>,
}

/// A package reached from the seeds that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ReachFailure {
    #[error("package {path} does not exist{}", imported_by(.importer))]
    Missing {
        path: String,
        importer: Option<String>,
    },

    #[error("package {path} could not be parsed: {message}")]
    Broken { path: String, message: String },
}

fn imported_by(importer: &Option<String>) -> String {
    importer
        .as_ref()
        .map(|i| format!(" (imported by {i})"))
        .unwrap_or_default()
}

impl ReachFailure {
    pub fn path(&self) -> &str {
        match self {
            Self::Missing { path, .. } | Self::Broken { path, .. } => path,
        }
    }
}

/// Everything reachable from a set of seed packages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reach {
    /// Packages of this tree that were visited, seeds included.
    pub internal: BTreeSet<String>,
    /// Imports that are neither in the tree nor standard library packages.
    pub external: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageTree {
    pub import_root: String,
    pub packages: BTreeMap<String, PackageOrErr>,
}

impl PackageTree {
    pub fn new(import_root: impl Into<String>) -> Self {
        Self {
            import_root: import_root.into(),
            packages: BTreeMap::new(),
        }
    }

    /// Analyze every directory under `root_dir` with [`GoSourceAnalyzer`].
    pub fn build(root_dir: &Path, import_root: &str, opts: &BuildOptions) -> miette::Result<Self> {
        Self::build_with(root_dir, import_root, opts, &GoSourceAnalyzer)
    }

    /// Analyze every directory under `root_dir`, keyed by import path.
    ///
    /// `vendor`, `testdata` and directories starting with `.` or `_` are
    /// never visited. A directory that fails to analyze is recorded as an
    /// error entry.
    pub fn build_with(
        root_dir: &Path,
        import_root: &str,
        opts: &BuildOptions,
        analyzer: &dyn PackageAnalyzer,
    ) -> miette::Result<Self> {
        if !root_dir.is_dir() {
            return Err(KdepError::Input {
                message: format!("{} is not a directory", root_dir.display()),
            }
            .into());
        }
        let mut tree = Self::new(import_root);
        let walker = WalkDir::new(root_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 {
                    return true;
                }
                if !e.file_type().is_dir() {
                    return false;
                }
                let name = e.file_name().to_string_lossy();
                if name.starts_with('.') || name.starts_with('_') || name == "vendor" || name == "testdata" {
                    return false;
                }
                let rel = e.path().strip_prefix(root_dir).unwrap_or(e.path());
                !opts.skip_dirs.iter().any(|skip| rel.starts_with(skip))
                    && (opts.source_paths.is_empty()
                        || opts
                            .source_paths
                            .iter()
                            .any(|src| rel.starts_with(src) || src.starts_with(rel)))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let Some(path) = e.path() else {
                        return Err(KdepError::Generic {
                            message: format!("Failed to walk {}: {e}", root_dir.display()),
                        }
                        .into());
                    };
                    let rel = path.strip_prefix(root_dir).unwrap_or(path);
                    let import_path = join_import(import_root, rel);
                    tracing::warn!("Failed to read {}: {e}", path.display());
                    tree.packages
                        .insert(import_path, PackageOrErr::Err(PackageError::new(e.to_string())));
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let rel = entry.path().strip_prefix(root_dir).unwrap_or(entry.path());
            if !opts.source_paths.is_empty() && !opts.source_paths.iter().any(|src| rel.starts_with(src)) {
                continue;
            }
            let import_path = join_import(import_root, rel);
            match analyzer.analyze(entry.path(), &import_path) {
                Ok(Some(package)) => {
                    tree.packages.insert(import_path, PackageOrErr::Package(package));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!("package {import_path} failed to parse: {e}");
                    tree.packages.insert(import_path, PackageOrErr::Err(e));
                }
            }
        }
        Ok(tree)
    }

    pub fn insert_package(&mut self, package: Package) {
        self.packages
            .insert(package.import_path.clone(), PackageOrErr::Package(package));
    }

    pub fn insert_error(&mut self, import_path: impl Into<String>, error: PackageError) {
        self.packages.insert(import_path.into(), PackageOrErr::Err(error));
    }

    /// Remove every entry equal to or below one of `prefixes`.
    pub fn strip_prefixes<S: AsRef<str>>(&mut self, prefixes: &[S]) {
        self.packages
            .retain(|path, _| !prefixes.iter().any(|p| is_path_within(path, p.as_ref())));
    }

    /// Compose `overlay` onto this tree: entries under `prefixes` are
    /// removed first, then every overlay entry is copied in, replacing any
    /// entry with the same path.
    pub fn merge<S: AsRef<str>>(&self, overlay: &PackageTree, prefixes: &[S]) -> PackageTree {
        let mut merged = self.clone();
        merged.strip_prefixes(prefixes);
        merged
            .packages
            .extend(overlay.packages.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    pub fn get(&self, import_path: &str) -> Option<&PackageOrErr> {
        self.packages.get(import_path)
    }

    /// Every successfully parsed package.
    pub fn valid_packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values().filter_map(PackageOrErr::package)
    }

    /// Import paths of packages that failed to parse, with their errors.
    pub fn errors(&self) -> impl Iterator<Item = (&String, &PackageError)> {
        self.packages.iter().filter_map(|(path, p)| match p {
            PackageOrErr::Err(e) => Some((path, e)),
            PackageOrErr::Package(_) => None,
        })
    }

    /// Decide whether parse errors in this tree stop a solve.
    ///
    /// The tree is unusable when it holds no package, or when every
    /// non-ignored entry is broken. Otherwise the broken packages are
    /// returned for reporting and left to [`reach`](Self::reach) to judge.
    pub fn check_errors(&self, ignored: &IgnoredRuleset) -> miette::Result<Vec<String>> {
        if self.packages.is_empty() {
            return Err(KdepError::Input {
                message: format!("no packages found under {}", self.import_root),
            }
            .into());
        }
        let relevant: Vec<(&String, &PackageOrErr)> =
            self.packages.iter().filter(|(path, _)| !ignored.is_ignored(path)).collect();
        let broken: Vec<String> = relevant
            .iter()
            .filter_map(|(path, p)| match p {
                PackageOrErr::Err(e) => Some(format!("{path}: {e}")),
                PackageOrErr::Package(_) => None,
            })
            .collect();
        if !relevant.is_empty() && broken.len() == relevant.len() {
            return Err(KdepError::PartialParse {
                path: self.import_root.clone(),
                message: format!("every package failed to parse:\n  {}", broken.join("\n  ")),
            }
            .into());
        }
        Ok(broken)
    }

    /// Walk the import graph from `seeds`.
    ///
    /// Imports that are keys of this tree are followed; other imports are
    /// collected as external unless they belong to the standard library.
    /// Ignored paths are neither followed nor collected. Reaching a broken
    /// package, or a path below a non-empty import root with no entry, fails.
    pub fn reach<I, S>(&self, seeds: I, ignored: &IgnoredRuleset, with_tests: bool) -> Result<Reach, ReachFailure>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut reach = Reach::default();
        let mut queue: VecDeque<(String, Option<String>)> =
            seeds.into_iter().map(|s| (s.into(), None)).collect();

        while let Some((path, importer)) = queue.pop_front() {
            if ignored.is_ignored(&path) || reach.internal.contains(&path) {
                continue;
            }
            let package = match self.packages.get(&path) {
                Some(PackageOrErr::Package(p)) => p,
                Some(PackageOrErr::Err(e)) => {
                    return Err(ReachFailure::Broken {
                        path,
                        message: e.message.clone(),
                    })
                }
                None => return Err(ReachFailure::Missing { path, importer }),
            };
            reach.internal.insert(path.clone());

            let tests = if with_tests { package.test_imports.as_slice() } else { &[] };
            for import in package.imports.iter().chain(tests) {
                if ignored.is_ignored(import) {
                    continue;
                }
                if self.packages.contains_key(import)
                    || (!self.import_root.is_empty() && is_path_within(import, &self.import_root))
                {
                    if !reach.internal.contains(import) {
                        queue.push_back((import.clone(), Some(path.clone())));
                    }
                } else if !is_standard_import(import) {
                    reach.external.insert(import.clone());
                }
            }
        }
        Ok(reach)
    }
}

impl fmt::Display for PackageTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.import_root)?;
        for (path, p) in &self.packages {
            match p {
                PackageOrErr::Package(p) => writeln!(f, "  {path} ({} imports)", p.imports.len())?,
                PackageOrErr::Err(e) => writeln!(f, "  {path} [error: {e}]")?,
            }
        }
        Ok(())
    }
}

fn join_import(import_root: &str, rel: &Path) -> String {
    let rel = kdep_util::fs::to_slash(rel);
    if rel.is_empty() {
        import_root.to_string()
    } else if import_root.is_empty() {
        rel
    } else {
        format!("{import_root}/{rel}")
    }
}

/// Returns `true` for standard library import paths, whose first element
/// has no dot.
pub fn is_standard_import(import_path: &str) -> bool {
    let first = import_path.split('/').next().unwrap_or(import_path);
    !first.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(path: &str, imports: &[&str]) -> Package {
        Package {
            import_path: path.to_string(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            test_imports: Vec::new(),
        }
    }

    #[test]
    fn standard_imports() {
        assert!(is_standard_import("fmt"));
        assert!(is_standard_import("net/http"));
        assert!(!is_standard_import("github.com/pkg/errors"));
        assert!(!is_standard_import("gopkg.in/yaml.v2"));
    }

    #[test]
    fn strip_is_segment_aware() {
        let mut tree = PackageTree::new("example.com/root");
        tree.insert_package(pkg("example.com/root/gopath", &[]));
        tree.insert_package(pkg("example.com/root/gopath/src/x", &[]));
        tree.insert_package(pkg("example.com/root/gopathological", &[]));
        tree.strip_prefixes(&["example.com/root/gopath"]);
        let keys: Vec<&String> = tree.packages.keys().collect();
        assert_eq!(keys, vec!["example.com/root/gopathological"]);
    }

    #[test]
    fn reach_reports_missing_internal_import() {
        let mut tree = PackageTree::new("example.com/root");
        tree.insert_package(pkg("example.com/root", &["example.com/root/gone"]));
        let err = tree
            .reach(["example.com/root"], &IgnoredRuleset::default(), false)
            .unwrap_err();
        assert_eq!(
            err,
            ReachFailure::Missing {
                path: "example.com/root/gone".to_string(),
                importer: Some("example.com/root".to_string()),
            }
        );
        assert!(err.to_string().contains("imported by example.com/root"));
    }

    #[test]
    fn reach_includes_tests_on_request() {
        let mut tree = PackageTree::new("example.com/root");
        let mut root = pkg("example.com/root", &["fmt"]);
        root.test_imports = vec!["github.com/stretchr/testify/assert".to_string()];
        tree.insert_package(root);
        let ignored = IgnoredRuleset::default();
        let without = tree.reach(["example.com/root"], &ignored, false).unwrap();
        assert!(without.external.is_empty());
        let with = tree.reach(["example.com/root"], &ignored, true).unwrap();
        assert!(with.external.contains("github.com/stretchr/testify/assert"));
    }
}
