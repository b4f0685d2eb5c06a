//! Import path patterns excluded from resolution.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use kdep_util::errors::KdepError;

/// A set of ignore patterns.
///
/// A pattern ending in `*` with no other wildcard is a prefix match, so
/// `github.com/org/tool/*` ignores `github.com/org/tool/cmd` and everything
/// below it. Other patterns are globs in which `*` does not cross `/`; a
/// pattern without metacharacters matches exactly itself.
#[derive(Debug, Clone)]
pub struct IgnoredRuleset {
    patterns: Vec<String>,
    prefixes: Vec<String>,
    globs: GlobSet,
}

impl Default for IgnoredRuleset {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            prefixes: Vec::new(),
            globs: GlobSet::empty(),
        }
    }
}

fn is_glob_meta(c: char) -> bool {
    matches!(c, '*' | '?' | '[' | ']' | '{' | '}')
}

impl IgnoredRuleset {
    pub fn new<I, S>(patterns: I) -> miette::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all = Vec::new();
        let mut prefixes = Vec::new();
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            all.push(pattern.to_string());
            match pattern.strip_suffix('*') {
                Some(prefix) if !prefix.contains(is_glob_meta) => {
                    prefixes.push(prefix.to_string());
                }
                _ => {
                    let glob = GlobBuilder::new(pattern)
                        .literal_separator(true)
                        .build()
                        .map_err(|e| KdepError::Input {
                            message: format!("invalid ignore pattern `{pattern}`: {e}"),
                        })?;
                    builder.add(glob);
                }
            }
        }
        all.sort();
        all.dedup();
        let globs = builder.build().map_err(|e| KdepError::Input {
            message: format!("invalid ignore patterns: {e}"),
        })?;
        Ok(Self {
            patterns: all,
            prefixes,
            globs,
        })
    }

    /// Returns `true` if `import_path` is excluded from resolution.
    pub fn is_ignored(&self, import_path: &str) -> bool {
        self.prefixes.iter().any(|p| import_path.starts_with(p.as_str()))
            || self.globs.is_match(import_path)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The patterns, sorted and deduplicated.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_star_is_prefix() {
        let rules = IgnoredRuleset::new(["github.com/org/tool/*"]).unwrap();
        assert!(rules.is_ignored("github.com/org/tool/cmd"));
        assert!(rules.is_ignored("github.com/org/tool/cmd/deep"));
        assert!(!rules.is_ignored("github.com/org/other"));
    }

    #[test]
    fn exact_pattern_matches_itself_only() {
        let rules = IgnoredRuleset::new(["github.com/org/tool"]).unwrap();
        assert!(rules.is_ignored("github.com/org/tool"));
        assert!(!rules.is_ignored("github.com/org/tool/sub"));
    }

    #[test]
    fn inner_glob_stays_in_segment() {
        let rules = IgnoredRuleset::new(["github.com/*/gen"]).unwrap();
        assert!(rules.is_ignored("github.com/org/gen"));
        assert!(!rules.is_ignored("github.com/org/x/gen"));
    }

    #[test]
    fn default_ignores_nothing() {
        let rules = IgnoredRuleset::default();
        assert!(rules.is_empty());
        assert!(!rules.is_ignored("github.com/anything"));
    }

    #[test]
    fn patterns_are_sorted() {
        let rules = IgnoredRuleset::new(["b/*", "a", "b/*", " "]).unwrap();
        assert_eq!(rules.patterns(), &["a".to_string(), "b/*".to_string()]);
    }
}
