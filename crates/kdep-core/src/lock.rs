use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use kdep_util::errors::KdepError;

use crate::project::ProjectRoot;
use crate::version::{Revision, Version};

/// A previously computed solution: one locked version per project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lock {
    /// Digest of the solve inputs the lock was computed from.
    pub inputs_digest: String,
    /// Sorted by project root.
    pub projects: Vec<LockedProject>,
}

/// One project's locked version and the packages the solution needs from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedProject {
    pub root: ProjectRoot,
    pub version: Version,
    /// Package paths relative to `root`, `"."` for the root package. Sorted.
    pub packages: Vec<String>,
    pub source: Option<String>,
}

impl LockedProject {
    pub fn new(root: ProjectRoot, version: Version, packages: impl IntoIterator<Item = String>) -> Self {
        let packages: BTreeSet<String> = packages.into_iter().collect();
        Self {
            root,
            version,
            packages: packages.into_iter().collect(),
            source: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawLock {
    #[serde(rename = "inputs-digest", default)]
    inputs_digest: String,
    #[serde(default)]
    projects: Vec<RawLockedProject>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawLockedProject {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(default)]
    packages: Vec<String>,
}

impl RawLockedProject {
    fn from_locked(p: &LockedProject) -> Self {
        let (rev, branch, version) = p.version.components();
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        Self {
            name: p.root.to_string(),
            branch: non_empty(branch),
            version: non_empty(version),
            revision: non_empty(rev),
            source: p.source.clone(),
            packages: p.packages.clone(),
        }
    }

    fn into_locked(self) -> Result<LockedProject, KdepError> {
        let base = match (self.branch, self.version) {
            (Some(_), Some(_)) => {
                return Err(KdepError::Input {
                    message: format!("lock entry {} has both a branch and a version", self.name),
                })
            }
            (Some(branch), None) => Some(Version::branch(branch)),
            (None, Some(version)) => Some(Version::from_tag(&version)),
            (None, None) => None,
        };
        let version = match (base, self.revision) {
            (Some(v), Some(rev)) => v.paired(Revision::new(rev)),
            (Some(v), None) => v,
            (None, Some(rev)) => Version::revision(rev),
            (None, None) => {
                return Err(KdepError::Input {
                    message: format!("lock entry {} has no version, branch or revision", self.name),
                })
            }
        };
        let mut locked = LockedProject::new(ProjectRoot::new(self.name), version, self.packages);
        locked.source = self.source;
        Ok(locked)
    }
}

impl Lock {
    pub fn new(inputs_digest: impl Into<String>, projects: impl IntoIterator<Item = LockedProject>) -> Self {
        let mut projects: Vec<LockedProject> = projects.into_iter().collect();
        projects.sort_by(|a, b| a.root.cmp(&b.root));
        Self {
            inputs_digest: inputs_digest.into(),
            projects,
        }
    }

    /// Load and parse a lock file from the given path.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| KdepError::Input {
            message: format!("Failed to read lock {}: {e}", path.display()),
        })?;
        Self::parse_toml(&content)
    }

    /// Load a lock file if it exists.
    pub fn from_optional_path(path: &Path) -> miette::Result<Option<Self>> {
        if path.is_file() {
            Self::from_path(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Parse lock TOML.
    pub fn parse_toml(content: &str) -> miette::Result<Self> {
        let raw: RawLock = toml::from_str(content).map_err(|e| KdepError::Input {
            message: format!("Failed to parse lock: {e}"),
        })?;
        let projects = raw
            .projects
            .into_iter()
            .map(RawLockedProject::into_locked)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(raw.inputs_digest, projects))
    }

    /// Serialize the lock to a pretty-printed TOML string.
    pub fn to_string_pretty(&self) -> Result<String, toml::ser::Error> {
        let raw = RawLock {
            inputs_digest: self.inputs_digest.clone(),
            projects: self.projects.iter().map(RawLockedProject::from_locked).collect(),
        };
        toml::to_string_pretty(&raw)
    }

    /// Serialize and atomically write the lock.
    pub fn write_to(&self, path: &Path) -> miette::Result<()> {
        let content = self.to_string_pretty().map_err(|e| KdepError::Generic {
            message: format!("Failed to serialize lock: {e}"),
        })?;
        kdep_util::fs::write_atomic(path, content.as_bytes()).map_err(KdepError::Io)?;
        Ok(())
    }

    pub fn project(&self, root: &ProjectRoot) -> Option<&LockedProject> {
        self.projects
            .binary_search_by(|p| p.root.cmp(root))
            .ok()
            .map(|i| &self.projects[i])
    }

    pub fn locked_version(&self, root: &ProjectRoot) -> Option<&Version> {
        self.project(root).map(|p| &p.version)
    }
}

/// A project whose locked version or package list changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectChange {
    pub root: ProjectRoot,
    pub old: LockedProject,
    pub new: LockedProject,
}

/// Difference between two locks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockDiff {
    pub digest_changed: bool,
    pub added: Vec<LockedProject>,
    pub removed: Vec<LockedProject>,
    pub changed: Vec<ProjectChange>,
}

impl LockDiff {
    /// Compare `old` (absent if no lock existed) with `new`.
    pub fn between(old: Option<&Lock>, new: &Lock) -> Self {
        let Some(old) = old else {
            return Self {
                digest_changed: true,
                added: new.projects.clone(),
                ..Self::default()
            };
        };
        let old_map: BTreeMap<&ProjectRoot, &LockedProject> =
            old.projects.iter().map(|p| (&p.root, p)).collect();
        let new_map: BTreeMap<&ProjectRoot, &LockedProject> =
            new.projects.iter().map(|p| (&p.root, p)).collect();

        let mut diff = Self {
            digest_changed: old.inputs_digest != new.inputs_digest,
            ..Self::default()
        };
        for (root, project) in &new_map {
            match old_map.get(root) {
                None => diff.added.push((*project).clone()),
                Some(previous) if previous != project => diff.changed.push(ProjectChange {
                    root: (*root).clone(),
                    old: (*previous).clone(),
                    new: (*project).clone(),
                }),
                Some(_) => {}
            }
        }
        for (root, project) in &old_map {
            if !new_map.contains_key(root) {
                diff.removed.push((*project).clone());
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        !self.digest_changed && self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

impl fmt::Display for LockDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("lock is up to date");
        }
        if self.digest_changed {
            writeln!(f, "inputs digest changed")?;
        }
        for p in &self.added {
            writeln!(f, "+ {} {}", p.root, p.version)?;
        }
        for p in &self.removed {
            writeln!(f, "- {} {}", p.root, p.version)?;
        }
        for c in &self.changed {
            if c.old.version == c.new.version {
                writeln!(f, "~ {} {} (packages)", c.root, c.new.version)?;
            } else {
                writeln!(f, "~ {} {} -> {}", c.root, c.old.version, c.new.version)?;
            }
        }
        Ok(())
    }
}
