use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

use kdep_core::constraint::Constraint;
use kdep_core::constraint_set::ConstraintSet;
use kdep_core::ignored::IgnoredRuleset;
use kdep_core::lock::{Lock, LockedProject};
use kdep_core::manifest::Manifest;
use kdep_core::pkgtree::{Package, PackageError, PackageTree};
use kdep_core::project::ProjectRoot;
use kdep_core::version::Version;
use kdep_resolver::conflict::ConflictReason;
use kdep_resolver::source::{default_root, SourceError};
use kdep_resolver::{solve, CancelHandle, CancelSignal, MemorySource, SolveError, SolveParameters, VersionSource};

const APP: &str = "example.com/app";
const A: &str = "github.com/x/a";
const B: &str = "github.com/x/b";
const C: &str = "github.com/x/c";

fn v(s: &str) -> Version {
    Version::semver(s).unwrap()
}

fn pkg(path: &str, imports: &[&str]) -> Package {
    Package {
        import_path: path.to_string(),
        name: path.rsplit('/').next().unwrap().to_string(),
        imports: imports.iter().map(|s| s.to_string()).collect(),
        test_imports: Vec::new(),
    }
}

fn root_tree(imports: &[&str]) -> PackageTree {
    let mut tree = PackageTree::new(APP);
    tree.insert_package(pkg(APP, imports));
    tree
}

fn params(imports: &[&str], manifest: &Manifest) -> SolveParameters {
    SolveParameters::new(root_tree(imports), ConstraintSet::from_manifest("root", manifest))
}

fn requires(root: &str, constraint: &str) -> Manifest {
    Manifest::new().try_with_constraint(root, constraint).unwrap()
}

fn locked(entries: &[(&str, &str)]) -> Lock {
    Lock::new(
        "digest",
        entries
            .iter()
            .map(|(root, ver)| LockedProject::new(ProjectRoot::new(*root), v(ver), [".".to_string()])),
    )
}

fn version_of(solution: &kdep_resolver::Solution, root: &str) -> String {
    solution.version_of(&ProjectRoot::new(root)).unwrap().to_string()
}

#[tokio::test]
async fn test_newest_matching_versions_are_selected() {
    let mut source = MemorySource::new();
    source
        .add_package_release(A, v("1.5.0"), &[B], requires(B, "==3.0.0"))
        .add_package_release(A, v("1.2.0"), &[B], Manifest::new())
        .add_package_release(B, v("3.0.0"), &[], Manifest::new())
        .add_package_release(B, v("2.9.0"), &[], Manifest::new());

    let params = params(&[A], &requires(A, ">=1.0.0, <2.0.0"));
    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();

    assert_eq!(solution.len(), 2);
    assert_eq!(version_of(&solution, A), "1.5.0");
    assert_eq!(version_of(&solution, B), "3.0.0");
    assert_eq!(solution.project(&ProjectRoot::new(A)).unwrap().packages, vec!["."]);
    let root_imports: Vec<&ProjectRoot> = solution.imports_of(None).collect();
    assert_eq!(root_imports, vec![&ProjectRoot::new(A)]);
    let a_imports: Vec<&ProjectRoot> = solution.imports_of(Some(&ProjectRoot::new(A))).collect();
    assert_eq!(a_imports, vec![&ProjectRoot::new(B)]);
    assert_eq!(solution.inputs_digest(), params.inputs_digest());
}

#[tokio::test]
async fn test_locked_version_is_kept_while_it_satisfies() {
    let mut source = MemorySource::new();
    source
        .add_package_release(A, v("1.5.0"), &[], Manifest::new())
        .add_package_release(A, v("1.2.0"), &[], Manifest::new());

    let mut params = params(&[A], &requires(A, ">=1.0.0, <2.0.0"));
    params.lock = Some(locked(&[(A, "1.2.0")]));
    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();
    assert_eq!(version_of(&solution, A), "1.2.0");
    assert_eq!(solution.attempts(), 1);

    params.to_change = BTreeSet::from([ProjectRoot::new(A)]);
    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();
    assert_eq!(version_of(&solution, A), "1.5.0");

    params.to_change.clear();
    params.change_all = true;
    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();
    assert_eq!(version_of(&solution, A), "1.5.0");
}

#[tokio::test]
async fn test_lock_pin_outside_constraint_is_dropped() {
    let mut source = MemorySource::new();
    source
        .add_package_release(A, v("2.1.0"), &[], Manifest::new())
        .add_package_release(A, v("1.2.0"), &[], Manifest::new());

    let mut params = params(&[A], &requires(A, "^2.0.0"));
    params.lock = Some(locked(&[(A, "1.2.0")]));
    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();
    assert_eq!(version_of(&solution, A), "2.1.0");
}

#[tokio::test]
async fn test_backtracks_past_conflicting_candidate() {
    let mut source = MemorySource::new();
    source
        .add_package_release(A, v("2.0.0"), &[C], requires(C, "^2.0.0"))
        .add_package_release(A, v("1.0.0"), &[C], requires(C, "^1.0.0"))
        .add_package_release(C, v("2.0.0"), &[], Manifest::new())
        .add_package_release(C, v("1.0.0"), &[], Manifest::new());

    let params = params(&[A, C], &requires(C, "^1.0.0"));
    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();
    assert_eq!(version_of(&solution, A), "1.0.0");
    assert_eq!(version_of(&solution, C), "1.0.0");
    assert!(solution.attempts() >= 3, "attempts: {}", solution.attempts());
}

#[tokio::test]
async fn test_missing_package_rejects_version() {
    let mut source = MemorySource::new();
    source.add_package_release(A, v("1.5.0"), &[], Manifest::new());
    let mut tree = PackageTree::new(A);
    tree.insert_package(pkg(A, &[]));
    tree.insert_package(pkg("github.com/x/a/sub", &[]));
    source.add_release(A, v("1.2.0"), tree, Manifest::new());

    let params = params(&["github.com/x/a/sub"], &Manifest::new());
    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();
    assert_eq!(version_of(&solution, A), "1.2.0");
    assert_eq!(solution.project(&ProjectRoot::new(A)).unwrap().packages, vec!["sub"]);
}

#[tokio::test]
async fn test_root_override_beats_dependency_constraint() {
    let mut source = MemorySource::new();
    source
        .add_package_release(B, v("1.0.0"), &[A], requires(A, "=1.0.0"))
        .add_package_release(A, v("2.0.0"), &[], Manifest::new())
        .add_package_release(A, v("1.0.0"), &[], Manifest::new());

    let manifest = Manifest::new().with_override(A, Constraint::parse("=2.0.0").unwrap());
    let params = params(&[B], &manifest);
    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();
    assert_eq!(version_of(&solution, A), "2.0.0");
}

#[tokio::test]
async fn test_source_recorded_from_root_constraint() {
    let mut source = MemorySource::new();
    source.add_package_release(A, v("1.0.0"), &[], Manifest::new());
    let manifest = Manifest::new().with_properties(
        A,
        kdep_core::manifest::ProjectProperties::new(Constraint::any()).with_source("https://mirror.example.com/a"),
    );
    let params = params(&[A], &manifest);
    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();
    let project = solution.project(&ProjectRoot::new(A)).unwrap();
    assert_eq!(project.source.as_deref(), Some("https://mirror.example.com/a"));
}

#[tokio::test]
async fn test_unsatisfiable_trace_names_contributors() {
    let mut source = MemorySource::new();
    source
        .add_package_release(A, v("1.5.0"), &[B], requires(B, "==3.0.0"))
        .add_package_release(B, v("2.9.0"), &[], Manifest::new());

    let params = params(&[A], &requires(A, ">=1.0.0, <2.0.0"));
    let err = solve(&params, &source, &CancelSignal::never()).await.unwrap_err();
    let SolveError::Unsatisfiable(failure) = &err else {
        panic!("expected unsatisfiable, got {err:?}");
    };
    let conflict = failure.conflict_for(&ProjectRoot::new(B)).unwrap();
    assert!(matches!(conflict.reason, ConflictReason::NoMatchingVersion { .. }));
    let origins: Vec<&str> = conflict.contributions.iter().map(|c| c.origin.as_str()).collect();
    assert_eq!(origins, vec!["github.com/x/a@1.5.0"]);
    assert!(err.to_string().contains("=3.0.0 (from github.com/x/a@1.5.0)"), "got: {err}");
}

#[tokio::test]
async fn test_trace_keeps_every_failed_candidate() {
    let mut source = MemorySource::new();
    source
        .add_package_release(A, v("2.0.0"), &[C], requires(C, "^2.0.0"))
        .add_package_release(A, v("1.0.0"), &[C], requires(C, "^3.0.0"))
        .add_package_release(C, v("3.0.0"), &[], Manifest::new())
        .add_package_release(C, v("2.0.0"), &[], Manifest::new())
        .add_package_release(C, v("1.0.0"), &[], Manifest::new());

    let params = params(&[A, C], &requires(C, "^1.0.0"));
    let err = solve(&params, &source, &CancelSignal::never()).await.unwrap_err();
    let SolveError::Unsatisfiable(failure) = &err else {
        panic!("expected unsatisfiable, got {err:?}");
    };

    let c_root = ProjectRoot::new(C);
    let origins: BTreeSet<&str> = failure
        .conflicts_for(&c_root)
        .flat_map(|c| c.contributions.iter().map(|c| c.origin.as_str()))
        .collect();
    assert!(origins.contains("github.com/x/a@2.0.0"), "got: {origins:?}");
    assert!(origins.contains("github.com/x/a@1.0.0"), "got: {origins:?}");

    let exhausted = failure
        .conflicts_for(&ProjectRoot::new(A))
        .find_map(|c| match &c.reason {
            ConflictReason::CandidatesExhausted { tried } => Some(tried.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(exhausted, vec![v("2.0.0"), v("1.0.0")]);

    let text = err.to_string();
    assert!(text.contains(">=2.0.0, <3.0.0 (from github.com/x/a@2.0.0)"), "got: {text}");
    assert!(text.contains(">=3.0.0, <4.0.0 (from github.com/x/a@1.0.0)"), "got: {text}");
    assert!(text.contains("github.com/x/a: all candidates failed: 2.0.0, 1.0.0"), "got: {text}");
}

#[tokio::test]
async fn test_unknown_project_is_unsatisfiable() {
    let source = MemorySource::new();
    let params = params(&["github.com/nobody/home"], &Manifest::new());
    let err = solve(&params, &source, &CancelSignal::never()).await.unwrap_err();
    let SolveError::Unsatisfiable(failure) = err else {
        panic!("expected unsatisfiable");
    };
    let conflict = failure.conflict_for(&ProjectRoot::new("github.com/nobody/home")).unwrap();
    assert_eq!(conflict.reason, ConflictReason::ProjectNotFound);
}

#[tokio::test]
async fn test_fetch_errors_propagate() {
    let mut source = MemorySource::new();
    source.add_package_release(A, v("1.0.0"), &[], Manifest::new());
    source.fail_fetch(A, "connection reset");
    let params = params(&[A], &Manifest::new());
    let err = solve(&params, &source, &CancelSignal::never()).await.unwrap_err();
    assert!(matches!(err, SolveError::Source(SourceError::Fetch { .. })), "got {err:?}");
}

#[tokio::test]
async fn test_broken_unused_package_does_not_fail_solve() {
    let mut source = MemorySource::new();
    source.add_package_release(A, v("1.0.0"), &[], Manifest::new());

    let mut tree = PackageTree::new(APP);
    for i in 0..9 {
        tree.insert_package(pkg(&format!("{APP}/p{i}"), &[A]));
    }
    tree.insert_error(format!("{APP}/broken"), PackageError::new("expected 'package', found 'EOF'"));
    let params = SolveParameters::new(tree, ConstraintSet::default());

    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();
    assert_eq!(version_of(&solution, A), "1.0.0");
}

#[tokio::test]
async fn test_broken_imported_root_package_fails() {
    let source = MemorySource::new();
    let mut tree = PackageTree::new(APP);
    tree.insert_package(pkg(APP, &["example.com/app/broken"]));
    tree.insert_error(format!("{APP}/broken"), PackageError::new("syntax error"));
    let params = SolveParameters::new(tree, ConstraintSet::default());

    let err = solve(&params, &source, &CancelSignal::never()).await.unwrap_err();
    assert!(
        matches!(&err, SolveError::BrokenRootPackage { path, .. } if path == "example.com/app/broken"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_required_packages_are_solved_without_imports() {
    let mut source = MemorySource::new();
    source.add_package_release(A, v("1.0.0"), &[], Manifest::new());
    let mut params = params(&[], &Manifest::new());
    params.required.insert(A.to_string());
    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();
    assert_eq!(version_of(&solution, A), "1.0.0");
}

/// Records every project and import path the solver asks about.
#[derive(Default)]
struct Recording {
    inner: MemorySource,
    asked: Mutex<Vec<String>>,
}

impl Recording {
    fn note(&self, what: &str) {
        self.asked.lock().unwrap().push(what.to_string());
    }

    fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl VersionSource for Recording {
    async fn list_versions(&self, root: &ProjectRoot) -> Result<Vec<Version>, SourceError> {
        self.note(root.as_str());
        self.inner.list_versions(root).await
    }

    async fn package_tree_at(&self, root: &ProjectRoot, version: &Version) -> Result<PackageTree, SourceError> {
        self.note(root.as_str());
        self.inner.package_tree_at(root, version).await
    }

    async fn manifest_at(&self, root: &ProjectRoot, version: &Version) -> Result<Manifest, SourceError> {
        self.note(root.as_str());
        self.inner.manifest_at(root, version).await
    }

    async fn deduce_root(&self, import_path: &str) -> Result<ProjectRoot, SourceError> {
        self.note(import_path);
        Ok(default_root(import_path))
    }
}

#[tokio::test]
async fn test_ignored_imports_are_never_looked_up() {
    let mut source = Recording::default();
    source.inner.add_package_release(A, v("1.0.0"), &["github.com/secret/internal/pkg"], Manifest::new());

    let mut params = params(&[A, "github.com/secret/tool"], &Manifest::new());
    params.ignored = IgnoredRuleset::new(["github.com/secret/*"]).unwrap();
    let solution = solve(&params, &source, &CancelSignal::never()).await.unwrap();

    assert_eq!(solution.len(), 1);
    let asked = source.asked();
    assert!(!asked.is_empty());
    assert!(
        asked.iter().all(|p| !p.starts_with("github.com/secret")),
        "asked: {asked:?}"
    );
}

#[tokio::test]
async fn test_identical_inputs_give_identical_solutions() {
    let mut source = MemorySource::new();
    for ver in ["1.0.0", "1.1.0", "1.2.0"] {
        source.add_package_release(A, v(ver), &[B, C], Manifest::new());
        source.add_package_release(B, v(ver), &[C], requires(C, "<1.2.0"));
        source.add_package_release(C, v(ver), &[], Manifest::new());
    }
    let params = params(&[A], &Manifest::new());
    let first = solve(&params, &source, &CancelSignal::never()).await.unwrap();
    for _ in 0..5 {
        let again = solve(&params, &source, &CancelSignal::never()).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(again.to_lock(), first.to_lock());
    }
    assert_eq!(version_of(&first, C), "1.1.0");
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let mut source = MemorySource::new();
    source.add_package_release(A, v("1.0.0"), &[], Manifest::new());
    let handle = CancelHandle::new();
    handle.cancel();
    let params = params(&[A], &Manifest::new());
    let err = solve(&params, &source, &handle.signal()).await.unwrap_err();
    assert!(matches!(err, SolveError::Cancelled));
}

/// A source whose version listing never completes.
struct Stalled;

impl VersionSource for Stalled {
    async fn list_versions(&self, _root: &ProjectRoot) -> Result<Vec<Version>, SourceError> {
        std::future::pending().await
    }

    async fn package_tree_at(&self, root: &ProjectRoot, _version: &Version) -> Result<PackageTree, SourceError> {
        Err(SourceError::NotFound(root.clone()))
    }

    async fn manifest_at(&self, root: &ProjectRoot, _version: &Version) -> Result<Manifest, SourceError> {
        Err(SourceError::NotFound(root.clone()))
    }
}

#[tokio::test]
async fn test_cancel_interrupts_pending_source_call() {
    let handle = CancelHandle::new();
    let signal = handle.signal();
    let params = params(&[A], &Manifest::new());

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
    };
    let (result, ()) = tokio::join!(solve(&params, &Stalled, &signal), canceller);
    assert!(matches!(result, Err(SolveError::Cancelled)));
}
