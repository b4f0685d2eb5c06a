use std::path::Path;

use kdep_core::ignored::IgnoredRuleset;
use kdep_core::pkgtree::{BuildOptions, PackageOrErr, PackageTree, ReachFailure};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn sample_project(root: &Path) {
    write(
        root,
        "main.go",
        "package main\n\nimport (\n\t\"fmt\"\n\t\"example.com/app/util\"\n\t\"github.com/pkg/errors\"\n)\n",
    );
    write(root, "main_test.go", "package main\n\nimport \"github.com/stretchr/testify/assert\"\n");
    write(root, "util/util.go", "package util\n\nimport \"strings\"\n");
    write(root, "broken/a.go", "package a\n");
    write(root, "broken/b.go", "package b\n");
    write(root, "vendor/github.com/pkg/errors/errors.go", "package errors\n");
    write(root, "testdata/fixture.go", "package fixture\n");
    write(root, ".hidden/x.go", "package hidden\n");
    write(root, "_scratch/x.go", "package scratch\n");
    write(root, "tools/gen.go", "//go:build ignore\n\npackage main\n\nimport \"github.com/tool/gen\"\n");
    write(root, "docs/README.md", "no go here");
}

#[test]
fn test_build_records_packages_and_errors() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    let tree = PackageTree::build(dir.path(), "example.com/app", &BuildOptions::default()).unwrap();

    let keys: Vec<&str> = tree.packages.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["example.com/app", "example.com/app/broken", "example.com/app/util"]);

    let root = tree.get("example.com/app").and_then(PackageOrErr::package).unwrap();
    assert_eq!(root.name, "main");
    assert_eq!(root.imports, vec!["example.com/app/util", "fmt", "github.com/pkg/errors"]);
    assert_eq!(root.test_imports, vec!["github.com/stretchr/testify/assert"]);

    match tree.get("example.com/app/broken") {
        Some(PackageOrErr::Err(e)) => assert!(e.message.contains("found packages a")),
        other => panic!("expected error entry, got {other:?}"),
    }
}

#[test]
fn test_build_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    let opts = BuildOptions::default();
    let first = PackageTree::build(dir.path(), "example.com/app", &opts).unwrap();
    let second = PackageTree::build(dir.path(), "example.com/app", &opts).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_build_respects_source_paths_and_skip_dirs() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a/x/x.go", "package x\n");
    write(dir.path(), "a/y/y.go", "package y\n");
    write(dir.path(), "b/b.go", "package b\n");
    let opts = BuildOptions {
        source_paths: vec!["a".into()],
        skip_dirs: vec!["a/y".into()],
    };
    let tree = PackageTree::build(dir.path(), "example.com/m", &opts).unwrap();
    let keys: Vec<&str> = tree.packages.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["example.com/m/a/x"]);
}

#[test]
fn test_build_rejects_missing_root() {
    let dir = tempfile::tempdir().unwrap();
    assert!(PackageTree::build(&dir.path().join("nope"), "x.com/y", &BuildOptions::default()).is_err());
}

#[test]
fn test_merge_into_itself_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    let tree = PackageTree::build(dir.path(), "example.com/app", &BuildOptions::default()).unwrap();
    let merged = tree.merge(&tree, &["example.com/app/util"]);
    assert_eq!(merged, tree);
    let merged_all = tree.merge(&tree, &["example.com/app"]);
    assert_eq!(merged_all, tree);
}

#[test]
fn test_merge_drops_stale_entries_under_prefix() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.go", "package main\n");
    write(dir.path(), "gopath/src/example.com/sub/old/old.go", "package old\n");
    let base = PackageTree::build(dir.path(), "example.com/app", &BuildOptions::default()).unwrap();
    assert!(base.get("example.com/app/gopath/src/example.com/sub/old").is_some());

    let sub_dir = dir.path().join("gopath/src/example.com/sub");
    write(&sub_dir, "new/new.go", "package new\n");
    std::fs::remove_dir_all(sub_dir.join("old")).unwrap();
    let overlay = PackageTree::build(&sub_dir, "example.com/sub", &BuildOptions::default()).unwrap();

    let merged = base.merge(&overlay, &["example.com/app/gopath"]);
    let keys: Vec<&str> = merged.packages.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["example.com/app", "example.com/sub/new"]);
}

#[test]
fn test_broken_package_only_fails_when_reached() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    let tree = PackageTree::build(dir.path(), "example.com/app", &BuildOptions::default()).unwrap();
    let ignored = IgnoredRuleset::default();

    let reach = tree.reach(["example.com/app"], &ignored, true).unwrap();
    assert!(reach.internal.contains("example.com/app/util"));
    assert_eq!(
        reach.external.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["github.com/pkg/errors", "github.com/stretchr/testify/assert"]
    );

    let err = tree.reach(["example.com/app/broken"], &ignored, false).unwrap_err();
    assert!(matches!(err, ReachFailure::Broken { .. }));
}

#[test]
fn test_reach_skips_ignored_imports() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    let tree = PackageTree::build(dir.path(), "example.com/app", &BuildOptions::default()).unwrap();
    let ignored = IgnoredRuleset::new(["github.com/pkg/*"]).unwrap();
    let reach = tree.reach(["example.com/app"], &ignored, false).unwrap();
    assert!(reach.external.is_empty());
}

#[test]
fn test_check_errors_tolerates_partial_failure() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    let tree = PackageTree::build(dir.path(), "example.com/app", &BuildOptions::default()).unwrap();
    let broken = tree.check_errors(&IgnoredRuleset::default()).unwrap();
    assert_eq!(broken.len(), 1);
    assert!(broken[0].starts_with("example.com/app/broken"));
}

#[test]
fn test_check_errors_fails_when_everything_is_broken() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", "package a\n");
    write(dir.path(), "b.go", "package b\n");
    let tree = PackageTree::build(dir.path(), "example.com/bad", &BuildOptions::default()).unwrap();
    assert!(tree.check_errors(&IgnoredRuleset::default()).is_err());
    assert!(PackageTree::new("example.com/empty")
        .check_errors(&IgnoredRuleset::default())
        .is_err());
}
