//! Version constraints in a canonical form.
//!
//! A [`Constraint`] is a required revision (optional) combined with a
//! [`Selector`]. Semver selectors are stored as a [`RangeSet`]: sorted,
//! disjoint, non-adjacent intervals. Intersection works component-wise and
//! never depends on operand order, so folding constraints from many
//! manifests yields the same value whatever order the manifests come in.

use std::cmp::Ordering;
use std::fmt;

use miette::Diagnostic;
use semver::{BuildMetadata, Comparator, Op, Prerelease, VersionReq};
use thiserror::Error;

use crate::version::{Revision, Version};

/// A malformed constraint string.
#[derive(Debug, Error, Diagnostic)]
pub enum ConstraintError {
    #[error("invalid version constraint `{input}`: {source}")]
    #[diagnostic(help("use semver requirement syntax, e.g. `^1.2.0` or `>=1.0.0, <2.0.0`"))]
    Semver {
        input: String,
        #[source]
        source: semver::Error,
    },

    #[error("unsupported comparator in version constraint `{input}`")]
    Unsupported { input: String },
}

/// Which versions a constraint admits, ignoring revision pinning.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Any,
    Empty,
    Semver(RangeSet),
    Branch(String),
    Tag(String),
}

/// A predicate over [`Version`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    revision: Option<Revision>,
    selector: Selector,
}

impl Constraint {
    /// Admits every version.
    pub fn any() -> Self {
        Self {
            revision: None,
            selector: Selector::Any,
        }
    }

    /// Admits nothing.
    pub fn none() -> Self {
        Self {
            revision: None,
            selector: Selector::Empty,
        }
    }

    /// Parse a semver requirement.
    ///
    /// Accepts `*` (any), comma-separated comparators, `||` unions and `==`
    /// as a synonym of `=`. A bare version `1.2.3` means `^1.2.3`.
    pub fn parse(input: &str) -> Result<Self, ConstraintError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }
        let mut set = RangeSet::empty();
        for alternative in trimmed.split("||") {
            let normalized = alternative.trim().replace("==", "=");
            let req = VersionReq::parse(&normalized).map_err(|source| ConstraintError::Semver {
                input: input.to_string(),
                source,
            })?;
            let mut conjunction = RangeSet::full();
            let mut prerelease = false;
            for comparator in &req.comparators {
                let interval = comparator_interval(comparator).ok_or_else(|| {
                    ConstraintError::Unsupported {
                        input: input.to_string(),
                    }
                })?;
                prerelease |= interval.names_prerelease();
                conjunction = conjunction.intersect(&RangeSet::from_interval(interval));
            }
            // Any comparator naming a prerelease opens its whole conjunction.
            conjunction.prerelease = prerelease;
            set = set.union(&conjunction);
        }
        Ok(Self::from_selector(Selector::Semver(set)))
    }

    /// Admits exactly the given branch.
    pub fn branch(name: impl Into<String>) -> Self {
        Self::from_selector(Selector::Branch(name.into()))
    }

    /// Admits exactly the given non-semver tag.
    pub fn tag(name: impl Into<String>) -> Self {
        Self::from_selector(Selector::Tag(name.into()))
    }

    /// Admits any version whose underlying revision is `rev`.
    pub fn revision(rev: impl Into<String>) -> Self {
        Self {
            revision: Some(Revision::new(rev)),
            selector: Selector::Any,
        }
    }

    /// Admits exactly `version` (and its paired revision, if any).
    pub fn exact(version: &Version) -> Self {
        let selector = match version {
            Version::Semver { version, .. } => Selector::Semver(RangeSet::from_interval(Interval {
                lower: Bound::Included(version.clone()),
                upper: Bound::Included(version.clone()),
            })),
            Version::Tag { name, .. } => Selector::Tag(name.clone()),
            Version::Branch { name, .. } => Selector::Branch(name.clone()),
            Version::Revision(_) => Selector::Any,
        };
        Self {
            revision: version.underlying_revision().cloned(),
            selector,
        }
    }

    /// Add a revision requirement on top of this constraint.
    pub fn with_revision(self, rev: Revision) -> Self {
        self.intersect(&Self {
            revision: Some(rev),
            selector: Selector::Any,
        })
    }

    fn from_selector(selector: Selector) -> Self {
        match selector {
            Selector::Semver(set) if set.is_empty() => Self::none(),
            selector => Self {
                revision: None,
                selector,
            },
        }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn required_revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    /// Returns `true` if no version can satisfy this constraint.
    pub fn is_empty(&self) -> bool {
        self.selector == Selector::Empty
    }

    pub fn is_any(&self) -> bool {
        self.selector == Selector::Any && self.revision.is_none()
    }

    /// The most restrictive constraint admitting what both admit.
    pub fn intersect(&self, other: &Constraint) -> Constraint {
        if self.is_empty() || other.is_empty() {
            return Self::none();
        }
        let revision = match (&self.revision, &other.revision) {
            (Some(a), Some(b)) if a != b => return Self::none(),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        let selector = match (&self.selector, &other.selector) {
            (Selector::Any, s) | (s, Selector::Any) => s.clone(),
            (Selector::Semver(a), Selector::Semver(b)) => {
                let set = a.intersect(b);
                if set.is_empty() {
                    Selector::Empty
                } else {
                    Selector::Semver(set)
                }
            }
            (Selector::Branch(a), Selector::Branch(b)) if a == b => Selector::Branch(a.clone()),
            (Selector::Tag(a), Selector::Tag(b)) if a == b => Selector::Tag(a.clone()),
            _ => Selector::Empty,
        };
        if selector == Selector::Empty {
            return Self::none();
        }
        Self { revision, selector }
    }

    /// Returns `true` if `version` satisfies this constraint.
    pub fn matches(&self, version: &Version) -> bool {
        if let Some(rev) = &self.revision {
            if version.underlying_revision() != Some(rev) {
                return false;
            }
        }
        match (&self.selector, version) {
            (Selector::Any, _) => true,
            (Selector::Empty, _) => false,
            (Selector::Semver(set), Version::Semver { version, .. }) => set.contains(version),
            (Selector::Branch(want), Version::Branch { name, .. }) => want == name,
            (Selector::Tag(want), Version::Tag { name, .. }) => want == name,
            _ => false,
        }
    }
}

impl Default for Constraint {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.selector, &self.revision) {
            (Selector::Any, None) => f.write_str("*"),
            (Selector::Any, Some(rev)) => write!(f, "rev {rev}"),
            (Selector::Empty, _) => f.write_str("<none>"),
            (selector, rev) => {
                match selector {
                    Selector::Semver(set) => write!(f, "{set}")?,
                    Selector::Branch(name) => write!(f, "branch {name}")?,
                    Selector::Tag(name) => write!(f, "tag {name}")?,
                    Selector::Any | Selector::Empty => {}
                }
                if let Some(rev) = rev {
                    write!(f, " @ {rev}")?;
                }
                Ok(())
            }
        }
    }
}

/// One end of an [`Interval`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bound {
    Unbounded,
    Included(semver::Version),
    Excluded(semver::Version),
}

impl Bound {
    fn version(&self) -> Option<&semver::Version> {
        match self {
            Self::Unbounded => None,
            Self::Included(v) | Self::Excluded(v) => Some(v),
        }
    }
}

/// A contiguous range of semantic versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    pub lower: Bound,
    pub upper: Bound,
}

fn cmp_lower(a: &Bound, b: &Bound) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Less),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Greater),
    }
}

fn cmp_upper(a: &Bound, b: &Bound) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Greater),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Less),
    }
}

impl Interval {
    fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            (lo, hi) => match (lo.version(), hi.version()) {
                (Some(lo), Some(hi)) => lo >= hi,
                _ => false,
            },
        }
    }

    fn contains(&self, v: &semver::Version) -> bool {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(lo) => v >= lo,
            Bound::Excluded(lo) => v > lo,
        };
        let below_upper = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(hi) => v <= hi,
            Bound::Excluded(hi) => v < hi,
        };
        above_lower && below_upper
    }

    fn intersect(&self, other: &Interval) -> Interval {
        let lower = if cmp_lower(&self.lower, &other.lower) == Ordering::Less {
            other.lower.clone()
        } else {
            self.lower.clone()
        };
        let upper = if cmp_upper(&self.upper, &other.upper) == Ordering::Greater {
            other.upper.clone()
        } else {
            self.upper.clone()
        };
        Interval { lower, upper }
    }

    /// Whether `next`, which starts no earlier than `self`, overlaps or
    /// touches `self` so the two can be merged.
    fn connects_to(&self, next: &Interval) -> bool {
        match (&self.upper, &next.lower) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
            (upper, lower) => match (upper.version(), lower.version()) {
                (Some(hi), Some(lo)) => match hi.cmp(lo) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => {
                        !matches!((upper, lower), (Bound::Excluded(_), Bound::Excluded(_)))
                    }
                },
                _ => true,
            },
        }
    }

    fn names_prerelease(&self) -> bool {
        [&self.lower, &self.upper]
            .iter()
            .filter_map(|b| b.version())
            .any(|v| !v.pre.is_empty())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, Bound::Unbounded) => f.write_str("*"),
            (Bound::Included(lo), Bound::Included(hi)) if lo == hi => write!(f, "={lo}"),
            (lower, upper) => {
                let lower = match lower {
                    Bound::Unbounded => None,
                    Bound::Included(v) => Some(format!(">={v}")),
                    Bound::Excluded(v) => Some(format!(">{v}")),
                };
                let upper = match upper {
                    Bound::Unbounded => None,
                    Bound::Included(v) => Some(format!("<={v}")),
                    Bound::Excluded(v) => Some(format!("<{v}")),
                };
                let parts: Vec<String> = lower.into_iter().chain(upper).collect();
                f.write_str(&parts.join(", "))
            }
        }
    }
}

/// A canonical union of semver intervals.
///
/// Prerelease versions are admitted only if `prerelease` is set. A single
/// interval sets it when one of its bounds names a prerelease; intersection
/// keeps it only if both sides had it and union if either did. The flag is
/// carried explicitly because the bounds that named a prerelease may not
/// survive an intersection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeSet {
    intervals: Vec<Interval>,
    prerelease: bool,
}

impl RangeSet {
    pub fn empty() -> Self {
        Self {
            intervals: Vec::new(),
            prerelease: false,
        }
    }

    pub fn full() -> Self {
        Self::from_interval(Interval {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        })
    }

    pub fn from_interval(interval: Interval) -> Self {
        let prerelease = interval.names_prerelease();
        Self::normalize(vec![interval], prerelease)
    }

    /// Whether prerelease versions inside the intervals are admitted.
    pub fn admits_prerelease(&self) -> bool {
        self.prerelease
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn contains(&self, v: &semver::Version) -> bool {
        if !v.pre.is_empty() && !self.prerelease {
            return false;
        }
        self.intervals.iter().any(|i| i.contains(v))
    }

    pub fn intersect(&self, other: &RangeSet) -> RangeSet {
        let mut out = Vec::new();
        for a in &self.intervals {
            for b in &other.intervals {
                out.push(a.intersect(b));
            }
        }
        Self::normalize(out, self.prerelease && other.prerelease)
    }

    pub fn union(&self, other: &RangeSet) -> RangeSet {
        let mut all = self.intervals.clone();
        all.extend(other.intervals.iter().cloned());
        Self::normalize(all, self.prerelease || other.prerelease)
    }

    fn normalize(mut intervals: Vec<Interval>, prerelease: bool) -> Self {
        intervals.retain(|i| !i.is_empty());
        intervals.sort_by(|a, b| cmp_lower(&a.lower, &b.lower).then(cmp_upper(&a.upper, &b.upper)));
        let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
        for next in intervals {
            match merged.last_mut() {
                Some(last) if last.connects_to(&next) => {
                    if cmp_upper(&next.upper, &last.upper) == Ordering::Greater {
                        last.upper = next.upper;
                    }
                }
                _ => merged.push(next),
            }
        }
        Self {
            intervals: merged,
            prerelease,
        }
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.intervals.is_empty() {
            return f.write_str("<none>");
        }
        let parts: Vec<String> = self.intervals.iter().map(|i| i.to_string()).collect();
        f.write_str(&parts.join(" || "))
    }
}

fn version_of(major: u64, minor: u64, patch: u64, pre: Prerelease) -> semver::Version {
    semver::Version {
        major,
        minor,
        patch,
        pre,
        build: BuildMetadata::EMPTY,
    }
}

/// Translate one semver comparator into the interval it admits.
fn comparator_interval(c: &Comparator) -> Option<Interval> {
    let major = c.major;
    let base = version_of(major, c.minor.unwrap_or(0), c.patch.unwrap_or(0), c.pre.clone());
    let bump_major = || version_of(major + 1, 0, 0, Prerelease::EMPTY);
    let bump_minor = |minor: u64| version_of(major, minor + 1, 0, Prerelease::EMPTY);

    // Upper bound of the version family named by a partial version.
    let family_end = match c.minor {
        None => bump_major(),
        Some(minor) if c.patch.is_none() => bump_minor(minor),
        Some(_) => base.clone(),
    };

    let interval = match c.op {
        Op::Exact | Op::Wildcard => match (c.minor, c.patch) {
            (Some(_), Some(_)) => Interval {
                lower: Bound::Included(base.clone()),
                upper: Bound::Included(base),
            },
            _ => Interval {
                lower: Bound::Included(base),
                upper: Bound::Excluded(family_end),
            },
        },
        Op::Greater => match (c.minor, c.patch) {
            (Some(_), Some(_)) => Interval {
                lower: Bound::Excluded(base),
                upper: Bound::Unbounded,
            },
            _ => Interval {
                lower: Bound::Included(family_end),
                upper: Bound::Unbounded,
            },
        },
        Op::GreaterEq => Interval {
            lower: Bound::Included(base),
            upper: Bound::Unbounded,
        },
        Op::Less => Interval {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(base),
        },
        Op::LessEq => match (c.minor, c.patch) {
            (Some(_), Some(_)) => Interval {
                lower: Bound::Unbounded,
                upper: Bound::Included(base),
            },
            _ => Interval {
                lower: Bound::Unbounded,
                upper: Bound::Excluded(family_end),
            },
        },
        Op::Tilde => {
            let upper = match c.minor {
                None => bump_major(),
                Some(minor) => bump_minor(minor),
            };
            Interval {
                lower: Bound::Included(base),
                upper: Bound::Excluded(upper),
            }
        }
        Op::Caret => {
            let upper = match (major, c.minor, c.patch) {
                (0, Some(0), Some(patch)) => version_of(0, 0, patch + 1, Prerelease::EMPTY),
                (0, Some(minor), _) => bump_minor(minor),
                _ => bump_major(),
            };
            Interval {
                lower: Bound::Included(base),
                upper: Bound::Excluded(upper),
            }
        }
        _ => return None,
    };
    Some(interval)
}
