//! Legacy `Godeps/Godeps.json` export of a solution.
//!
//! The export is a projection: one entry per locked package, sorted by
//! import path, so the same solution always renders to the same bytes.

use std::path::{Path, PathBuf};

use serde::Serialize;

use kdep_core::project::ProjectRoot;
use kdep_resolver::Solution;
use kdep_util::errors::KdepError;

const GENERATED_COMMENT: &str = "GENERATED BY DEP, DO NOT EDIT";

#[derive(Debug, Serialize)]
struct Godeps {
    #[serde(rename = "_Comment")]
    comment: String,
    #[serde(rename = "ImportPath")]
    import_path: String,
    #[serde(rename = "Deps")]
    deps: Vec<GodepsEntry>,
}

#[derive(Debug, Serialize)]
struct GodepsEntry {
    #[serde(rename = "ImportPath")]
    import_path: String,
    #[serde(rename = "Comment", skip_serializing_if = "String::is_empty")]
    comment: String,
    #[serde(rename = "Rev")]
    rev: String,
}

/// Render the Godeps JSON for `solution`, tab-indented.
pub fn render(import_root: &ProjectRoot, solution: &Solution) -> Result<String, serde_json::Error> {
    let mut deps: Vec<GodepsEntry> = Vec::new();
    for project in solution.projects() {
        let (rev, _, version) = project.version.components();
        for pkg in &project.packages {
            deps.push(GodepsEntry {
                import_path: project.root.join(pkg),
                comment: version.clone(),
                rev: rev.clone(),
            });
        }
    }
    deps.sort_by(|a, b| a.import_path.cmp(&b.import_path));

    let godeps = Godeps {
        comment: GENERATED_COMMENT.to_string(),
        import_path: import_root.to_string(),
        deps,
    };
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    godeps.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write `<project_dir>/Godeps/Godeps.json` and return its path.
pub fn export(project_dir: &Path, import_root: &ProjectRoot, solution: &Solution) -> miette::Result<PathBuf> {
    let path = project_dir.join("Godeps").join("Godeps.json");
    let content = render(import_root, solution).map_err(|e| KdepError::Generic {
        message: format!("Failed to render Godeps.json: {e}"),
    })?;
    kdep_util::fs::write_atomic(&path, content.as_bytes()).map_err(KdepError::Io)?;
    tracing::debug!("wrote {}", path.display());
    Ok(path)
}
