use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one resolvable project, e.g. `github.com/pkg/errors`.
///
/// A project root owns every import path equal to it or below it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectRoot(String);

impl ProjectRoot {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        match root.strip_suffix('/') {
            Some(trimmed) => Self(trimmed.to_string()),
            None => Self(root),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `import_path` belongs to this project.
    pub fn contains(&self, import_path: &str) -> bool {
        is_path_within(import_path, &self.0)
    }

    /// The path of `import_path` relative to this root, `"."` for the root
    /// package itself.
    pub fn relative<'a>(&self, import_path: &'a str) -> Option<&'a str> {
        if import_path == self.0 {
            return Some(".");
        }
        import_path
            .strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }

    /// Inverse of [`relative`](Self::relative).
    pub fn join(&self, relative: &str) -> String {
        if relative == "." || relative.is_empty() {
            self.0.clone()
        } else {
            format!("{}/{}", self.0, relative)
        }
    }
}

impl fmt::Display for ProjectRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectRoot {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ProjectRoot {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for ProjectRoot {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Segment-aware prefix test: `a/b` is within `a` but `ab` is not.
pub fn is_path_within(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/') || prefix.is_empty(),
        None => false,
    }
}
