//! Versions of a project: semver releases, plain tags, branches and bare
//! revisions.
//!
//! A version other than a bare revision may be *paired* with the revision it
//! currently points at. Pairing matters for revision constraints and for the
//! lock, which records both halves.

use std::cmp::Ordering;
use std::fmt;

/// An immutable source revision, e.g. a commit hash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(String);

impl Revision {
    pub fn new(rev: impl Into<String>) -> Self {
        Self(rev.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One selectable version of a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// A tag that parses as a semantic version. `tag` is the tag text as
    /// written, e.g. `v1.2.0`.
    Semver {
        version: semver::Version,
        tag: String,
        revision: Option<Revision>,
    },
    /// A tag that is not a semantic version.
    Tag {
        name: String,
        revision: Option<Revision>,
    },
    Branch {
        name: String,
        revision: Option<Revision>,
    },
    Revision(Revision),
}

impl Version {
    /// Parse a semantic version, accepting an optional leading `v`.
    pub fn semver(s: &str) -> Result<Self, semver::Error> {
        let trimmed = s.trim();
        let version = semver::Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed))?;
        Ok(Self::Semver {
            version,
            tag: trimmed.to_string(),
            revision: None,
        })
    }

    /// Interpret a tag name: semantic versions become [`Version::Semver`],
    /// anything else a plain [`Version::Tag`].
    pub fn from_tag(name: &str) -> Self {
        Self::semver(name).unwrap_or_else(|_| Self::Tag {
            name: name.to_string(),
            revision: None,
        })
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Self::Tag {
            name: name.into(),
            revision: None,
        }
    }

    pub fn branch(name: impl Into<String>) -> Self {
        Self::Branch {
            name: name.into(),
            revision: None,
        }
    }

    pub fn revision(rev: impl Into<String>) -> Self {
        Self::Revision(Revision::new(rev))
    }

    /// Pair this version with the revision it points at.
    pub fn paired(self, rev: Revision) -> Self {
        match self {
            Self::Semver { version, tag, .. } => Self::Semver {
                version,
                tag,
                revision: Some(rev),
            },
            Self::Tag { name, .. } => Self::Tag {
                name,
                revision: Some(rev),
            },
            Self::Branch { name, .. } => Self::Branch {
                name,
                revision: Some(rev),
            },
            Self::Revision(_) => Self::Revision(rev),
        }
    }

    /// The underlying revision, if known.
    pub fn underlying_revision(&self) -> Option<&Revision> {
        match self {
            Self::Semver { revision, .. }
            | Self::Tag { revision, .. }
            | Self::Branch { revision, .. } => revision.as_ref(),
            Self::Revision(rev) => Some(rev),
        }
    }

    pub fn is_prerelease(&self) -> bool {
        matches!(self, Self::Semver { version, .. } if !version.pre.is_empty())
    }

    /// Returns `true` when both values name the same release, treating a
    /// missing revision on either side as a wildcard.
    pub fn same_release(&self, other: &Version) -> bool {
        let revisions_agree = match (self.underlying_revision(), other.underlying_revision()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        let names_agree = match (self, other) {
            (Self::Semver { version: a, .. }, Self::Semver { version: b, .. }) => a == b,
            (Self::Tag { name: a, .. }, Self::Tag { name: b, .. }) => a == b,
            (Self::Branch { name: a, .. }, Self::Branch { name: b, .. }) => a == b,
            (Self::Revision(a), other) | (other, Self::Revision(a)) => {
                other.underlying_revision() == Some(a)
            }
            _ => false,
        };
        names_agree && revisions_agree
    }

    /// Split into `(revision, branch, version)` strings, empty where absent.
    pub fn components(&self) -> (String, String, String) {
        let rev = self
            .underlying_revision()
            .map(|r| r.to_string())
            .unwrap_or_default();
        match self {
            Self::Semver { tag, .. } => (rev, String::new(), tag.clone()),
            Self::Tag { name, .. } => (rev, String::new(), name.clone()),
            Self::Branch { name, .. } => (rev, name.clone(), String::new()),
            Self::Revision(_) => (rev, String::new(), String::new()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Semver { version, .. } if version.pre.is_empty() => 0,
            Self::Semver { .. } => 1,
            Self::Branch { .. } => 2,
            Self::Tag { .. } => 3,
            Self::Revision(_) => 4,
        }
    }
}

/// Ordering that puts the most desirable upgrade first: semver releases
/// newest first, then prereleases newest first, then branches, tags and bare
/// revisions by name.
pub fn upgrade_order(a: &Version, b: &Version) -> Ordering {
    a.rank()
        .cmp(&b.rank())
        .then_with(|| match (a, b) {
            (
                Version::Semver { version: x, tag: tx, .. },
                Version::Semver { version: y, tag: ty, .. },
            ) => y.cmp(x).then_with(|| tx.cmp(ty)),
            (Version::Tag { name: x, .. }, Version::Tag { name: y, .. })
            | (Version::Branch { name: x, .. }, Version::Branch { name: y, .. }) => x.cmp(y),
            _ => Ordering::Equal,
        })
        .then_with(|| a.underlying_revision().cmp(&b.underlying_revision()))
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semver { tag: name, .. } | Self::Tag { name, .. } | Self::Branch { name, .. } => {
                f.write_str(name)
            }
            Self::Revision(rev) => write!(f, "{rev}"),
        }
    }
}
