use kdep_core::constraint::Constraint;
use kdep_core::constraint_set::{aggregate, AggregateError, ConflictReason, ConstraintKind, ConstraintSetBuilder};
use kdep_core::manifest::Manifest;
use kdep_core::project::ProjectRoot;

fn manifest(entries: &[(&str, &str)]) -> Manifest {
    entries.iter().fold(Manifest::new(), |m, (root, c)| {
        m.try_with_constraint(*root, c).unwrap()
    })
}

#[test]
fn test_exact_version_conflict_cites_both_manifests() {
    let svc_a = manifest(&[("github.com/x/lib", "==1.0.0")]);
    let svc_b = manifest(&[("github.com/x/lib", "==2.0.0")]);
    let err = aggregate([("services/a", &svc_a), ("services/b", &svc_b)]).unwrap_err();

    let AggregateError::Unsatisfiable { conflicts } = &err;
    assert_eq!(conflicts.len(), 1);
    let conflict = &conflicts[0];
    assert_eq!(conflict.root, ProjectRoot::new("github.com/x/lib"));
    assert_eq!(conflict.kind, ConstraintKind::Dependency);
    assert_eq!(conflict.reason, ConflictReason::Disjoint);
    let origins: Vec<&str> = conflict.contributions.iter().map(|c| c.origin.as_str()).collect();
    assert_eq!(origins, vec!["services/a", "services/b"]);

    let rendered = err.to_string();
    assert!(rendered.contains("github.com/x/lib"), "got: {rendered}");
    assert!(rendered.contains("=1.0.0 (from services/a)"), "got: {rendered}");
    assert!(rendered.contains("=2.0.0 (from services/b)"), "got: {rendered}");
}

#[test]
fn test_all_conflicts_reported_together() {
    let a = manifest(&[("github.com/x/one", "^1.0.0"), ("github.com/x/two", "^1.0.0")]);
    let b = manifest(&[("github.com/x/one", "^2.0.0"), ("github.com/x/two", "^2.0.0")]);
    let err = aggregate([("a", &a), ("b", &b)]).unwrap_err();
    assert_eq!(err.conflicts().len(), 2);
}

#[test]
fn test_aggregation_order_does_not_matter() {
    let manifests = [
        manifest(&[("github.com/x/lib", ">=1.0.0"), ("github.com/y/lib", "^0.3.0")]),
        manifest(&[("github.com/x/lib", "<3.0.0")]),
        manifest(&[("github.com/x/lib", "^1.4.0 || ^2.1.0"), ("github.com/y/lib", "~0.3.2")]),
    ];
    let orders: [[usize; 3]; 4] = [[0, 1, 2], [2, 1, 0], [1, 0, 2], [2, 0, 1]];
    let results: Vec<_> = orders
        .iter()
        .map(|order| {
            let set = aggregate(order.iter().map(|&i| ("m", &manifests[i]))).unwrap();
            set.dependencies()
                .iter()
                .map(|(root, merged)| (root.clone(), merged.constraint.clone()))
                .collect::<Vec<_>>()
        })
        .collect();
    for r in &results[1..] {
        assert_eq!(r, &results[0]);
    }
    assert_eq!(results[0][0].1.to_string(), ">=1.4.0, <2.0.0 || >=2.1.0, <3.0.0");
    assert_eq!(results[0][1].1.to_string(), ">=0.3.2, <0.4.0");
}

#[test]
fn test_branch_and_range_constraints_conflict() {
    let a = Manifest::new().with_constraint("github.com/x/lib", Constraint::branch("master"));
    let b = manifest(&[("github.com/x/lib", "^1.0.0")]);
    assert!(aggregate([("a", &a), ("b", &b)]).is_err());
}

#[test]
fn test_overrides_are_tracked_separately() {
    let a = manifest(&[("github.com/x/lib", "^1.0.0")])
        .with_override("github.com/x/lib", Constraint::parse("^2.0.0").unwrap());
    let b = Manifest::new().with_override("github.com/x/lib", Constraint::parse(">=2.1.0").unwrap());

    let mut builder = ConstraintSetBuilder::new();
    builder.add_manifest("a", &a).add_manifest("b", &b);
    let set = builder.build().unwrap();

    let root = ProjectRoot::new("github.com/x/lib");
    assert_eq!(set.dependency(&root).unwrap().constraint.to_string(), ">=1.0.0, <2.0.0");
    let effective = set.effective(&root).unwrap();
    assert_eq!(effective.constraint.to_string(), ">=2.1.0, <3.0.0");
    assert_eq!(effective.contributions.len(), 2);
}

#[test]
fn test_conflicting_overrides_are_reported() {
    let a = Manifest::new().with_override("github.com/x/lib", Constraint::parse("=1.0.0").unwrap());
    let b = Manifest::new().with_override("github.com/x/lib", Constraint::parse("=1.1.0").unwrap());
    let err = aggregate([("a", &a), ("b", &b)]).unwrap_err();
    assert_eq!(err.conflicts()[0].kind, ConstraintKind::Override);
}
