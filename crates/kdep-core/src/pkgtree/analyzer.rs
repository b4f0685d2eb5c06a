//! Static analysis of one source directory into a [`Package`].

use std::collections::BTreeSet;
use std::path::Path;

use super::{Package, PackageError};

/// Turns one directory into a package description.
///
/// `Ok(None)` means the directory holds no package at all; `Err` records a
/// directory that holds a package which could not be understood.
pub trait PackageAnalyzer: Send + Sync {
    fn analyze(&self, dir: &Path, import_path: &str) -> Result<Option<Package>, PackageError>;
}

/// Reads `.go` files and extracts the package clause and import
/// declarations.
///
/// Files excluded with an `ignore` build constraint are skipped. Imports of
/// `_test.go` files are recorded as test imports. The cgo pseudo-package `C`
/// is never recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoSourceAnalyzer;

impl PackageAnalyzer for GoSourceAnalyzer {
    fn analyze(&self, dir: &Path, import_path: &str) -> Result<Option<Package>, PackageError> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| PackageError::new(format!("cannot read {}: {e}", dir.display())))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "go"))
            .collect();
        files.sort();

        let mut name: Option<(String, String)> = None;
        let mut test_name: Option<String> = None;
        let mut imports = BTreeSet::new();
        let mut test_imports = BTreeSet::new();

        for file in &files {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let src = std::fs::read_to_string(file)
                .map_err(|e| PackageError::new(format!("{file_name}: {e}")))?;
            if is_ignored_by_build_tag(&src) {
                continue;
            }
            let parsed = parse_go_file(&src).map_err(|e| PackageError::new(format!("{file_name}: {e}")))?;
            let is_test = file_name.ends_with("_test.go");

            if is_test {
                test_imports.extend(parsed.imports);
                let base = parsed.package.strip_suffix("_test").unwrap_or(&parsed.package);
                test_name.get_or_insert_with(|| base.to_string());
                if parsed.package.ends_with("_test") {
                    continue;
                }
            } else {
                imports.extend(parsed.imports);
            }

            if let Some((existing, first_file)) = &name {
                if *existing != parsed.package {
                    return Err(PackageError::new(format!(
                        "found packages {existing} ({first_file}) and {} ({file_name})",
                        parsed.package
                    )));
                }
            } else {
                name = Some((parsed.package, file_name));
            }
        }

        let Some(name) = name.map(|(n, _)| n).or(test_name) else {
            return Ok(None);
        };
        imports.remove("C");
        test_imports.remove("C");
        test_imports.remove(import_path);
        Ok(Some(Package {
            import_path: import_path.to_string(),
            name,
            imports: imports.into_iter().collect(),
            test_imports: test_imports.into_iter().collect(),
        }))
    }
}

/// Returns `true` if the file opts out of every build with an `ignore`
/// constraint ahead of the package clause.
fn is_ignored_by_build_tag(src: &str) -> bool {
    for line in src.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with("//") {
            return false;
        }
        if let Some(expr) = line.strip_prefix("//go:build") {
            return expr.trim() == "ignore";
        }
        if let Some(tags) = line.strip_prefix("// +build") {
            return tags.split_whitespace().any(|t| t == "ignore");
        }
    }
    false
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct GoFile {
    pub(crate) package: String,
    pub(crate) imports: Vec<String>,
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_trivia(&mut self) -> Result<(), String> {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ';');
            self.pos += rest.len() - trimmed.len();
            if trimmed.starts_with("//") {
                let end = trimmed.find('\n').unwrap_or(trimmed.len());
                self.pos += end;
            } else if let Some(body) = trimmed.strip_prefix("/*") {
                let end = body.find("*/").ok_or("unterminated comment")?;
                self.pos += 2 + end + 2;
            } else {
                return Ok(());
            }
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if len == 0 || rest.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        self.pos += len;
        Some(&rest[..len])
    }

    fn eat(&mut self, c: char) -> bool {
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn string_lit(&mut self) -> Result<String, String> {
        let rest = self.rest();
        if let Some(body) = rest.strip_prefix('`') {
            let end = body.find('`').ok_or("unterminated raw string")?;
            self.pos += end + 2;
            return Ok(body[..end].to_string());
        }
        let body = rest.strip_prefix('"').ok_or("expected import path string")?;
        let mut out = String::new();
        let mut chars = body.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 2;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                '\n' => break,
                c => out.push(c),
            }
        }
        Err("unterminated string".to_string())
    }

    fn import_spec(&mut self) -> Result<String, String> {
        if !self.eat('.') && !self.eat('_') {
            self.ident();
        }
        self.skip_trivia()?;
        self.string_lit()
    }
}

/// Parse the package clause and import declarations of one Go file.
pub(crate) fn parse_go_file(src: &str) -> Result<GoFile, String> {
    let mut s = Scanner { src, pos: 0 };
    s.skip_trivia()?;
    if s.ident() != Some("package") {
        return Err("expected package clause".to_string());
    }
    s.skip_trivia()?;
    let package = s.ident().ok_or("expected package name")?.to_string();

    let mut imports = Vec::new();
    loop {
        s.skip_trivia()?;
        if s.ident() != Some("import") {
            break;
        }
        s.skip_trivia()?;
        if s.eat('(') {
            loop {
                s.skip_trivia()?;
                if s.eat(')') {
                    break;
                }
                if s.rest().is_empty() {
                    return Err("unterminated import block".to_string());
                }
                imports.push(s.import_spec()?);
            }
        } else {
            imports.push(s.import_spec()?);
        }
    }
    Ok(GoFile { package, imports })
}
