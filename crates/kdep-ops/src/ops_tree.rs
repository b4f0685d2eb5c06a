//! Operation: render a solution as an import tree.

use kdep_resolver::graph::SolutionGraph;
use kdep_resolver::Solution;

/// Options for [`render`].
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    /// Maximum tree depth to display.
    pub depth: Option<usize>,
    /// Explain why this project is in the solution instead.
    pub why: Option<String>,
    /// Show the projects importing `why` rather than one path to it.
    pub inverted: bool,
}

/// Render `solution` below a root named `root_name`.
pub fn render(solution: &Solution, root_name: &str, opts: &TreeOptions) -> String {
    let graph = SolutionGraph::from_solution(solution, root_name);
    let Some(target) = opts.why.as_deref() else {
        return graph.print_tree(opts.depth);
    };
    if opts.inverted {
        return graph.print_inverted_tree(target);
    }
    match graph.find_path(target) {
        Some(path) => {
            let mut out = format!("Path to {target}:\n");
            for (i, node) in path.iter().enumerate() {
                out.push_str(&format!("{}{node}\n", "  ".repeat(i)));
            }
            out
        }
        None => format!("Project '{target}' is not in the solution.\n"),
    }
}
