use kdep_core::constraint_set::ConstraintSet;
use kdep_core::manifest::Manifest;
use kdep_core::pkgtree::{Package, PackageTree};
use kdep_core::version::Version;
use kdep_resolver::graph::SolutionGraph;
use kdep_resolver::{solve, CancelSignal, MemorySource, SolveParameters, Solution};

async fn solved() -> Solution {
    let v = |s: &str| Version::semver(s).unwrap();
    let mut source = MemorySource::new();
    source
        .add_package_release("github.com/x/web", v("1.4.0"), &["github.com/x/log", "github.com/x/json"], Manifest::new())
        .add_package_release("github.com/x/json", v("0.3.1"), &["github.com/x/log"], Manifest::new())
        .add_package_release("github.com/x/log", v("2.0.0"), &[], Manifest::new());

    let mut tree = PackageTree::new("example.com/app");
    tree.insert_package(Package {
        import_path: "example.com/app".to_string(),
        name: "main".to_string(),
        imports: vec!["github.com/x/web".to_string()],
        test_imports: Vec::new(),
    });
    let params = SolveParameters::new(tree, ConstraintSet::default());
    solve(&params, &source, &CancelSignal::never()).await.unwrap()
}

#[tokio::test]
async fn test_print_tree() {
    let graph = SolutionGraph::from_solution(&solved().await, "example.com/app");
    assert_eq!(graph.len(), 3);
    let expected = "\
example.com/app
└── github.com/x/web 1.4.0
    ├── github.com/x/json 0.3.1
    │   └── github.com/x/log 2.0.0
    └── github.com/x/log 2.0.0
";
    assert_eq!(graph.print_tree(None), expected);

    let shallow = graph.print_tree(Some(1));
    assert_eq!(shallow, "example.com/app\n└── github.com/x/web 1.4.0\n");
}

#[tokio::test]
async fn test_find_path_and_inverted_tree() {
    let graph = SolutionGraph::from_solution(&solved().await, "example.com/app");
    let path: Vec<String> = graph
        .find_path("github.com/x/log")
        .unwrap()
        .iter()
        .map(|n| n.name.clone())
        .collect();
    assert_eq!(path, vec!["example.com/app", "github.com/x/web", "github.com/x/json", "github.com/x/log"]);
    assert!(graph.find_path("github.com/x/missing").is_none());

    let inverted = graph.print_inverted_tree("github.com/x/log");
    assert!(inverted.starts_with("github.com/x/log 2.0.0\n"), "got: {inverted}");
    assert!(inverted.contains("├── github.com/x/json 0.3.1"), "got: {inverted}");
    assert!(inverted.contains("└── github.com/x/web 1.4.0"), "got: {inverted}");
}
