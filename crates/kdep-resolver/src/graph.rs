//! Import graph of a solution, for display and "why is this here" queries.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::solution::Solution;

/// A node of the solution graph: the root project or a locked project.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct SolvedNode {
    pub name: String,
    /// Empty for the root project.
    pub version: String,
}

impl fmt::Display for SolvedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} {}", self.name, self.version)
        }
    }
}

/// Projects of a solution connected by importer → imported edges.
pub struct SolutionGraph {
    graph: DiGraph<SolvedNode, ()>,
    index: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

impl SolutionGraph {
    /// Build the graph of `solution`, naming the root project `root_name`.
    pub fn from_solution(solution: &Solution, root_name: &str) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let root = graph.add_node(SolvedNode {
            name: root_name.to_string(),
            version: String::new(),
        });
        for p in solution.projects() {
            let idx = graph.add_node(SolvedNode {
                name: p.root.to_string(),
                version: p.version.to_string(),
            });
            index.insert(p.root.to_string(), idx);
        }
        let mut g = Self { graph, index, root };

        for target in solution.imports_of(None) {
            if let Some(to) = g.find(target.as_str()) {
                g.add_edge(root, to);
            }
        }
        for p in solution.projects() {
            let Some(from) = g.find(p.root.as_str()) else {
                continue;
            };
            for target in solution.imports_of(Some(&p.root)) {
                if let Some(to) = g.find(target.as_str()) {
                    g.add_edge(from, to);
                }
            }
        }
        g
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        if !self.graph.edges(from).any(|e| e.target() == to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Look up a project node by root.
    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &SolvedNode {
        &self.graph[idx]
    }

    /// Direct imports of a node, sorted by name.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.target())
            .collect();
        deps.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));
        deps
    }

    /// Nodes importing `idx`, sorted by name.
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.source())
            .collect();
        deps.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));
        deps
    }

    /// Render the import tree below the root.
    pub fn print_tree(&self, max_depth: Option<usize>) -> String {
        let mut output = format!("{}\n", self.graph[self.root]);
        let mut visited = HashSet::new();
        visited.insert(self.root);
        let deps = self.dependencies_of(self.root);
        let count = deps.len();
        for (i, idx) in deps.iter().enumerate() {
            self.print_subtree(&mut output, *idx, "", i == count - 1, 1, max_depth, &mut visited);
        }
        output
    }

    #[allow(clippy::too_many_arguments)]
    fn print_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        depth: usize,
        max_depth: Option<usize>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}\n", self.graph[idx]));

        if max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        if !visited.insert(idx) {
            return;
        }

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let deps = self.dependencies_of(idx);
        let count = deps.len();
        for (i, child) in deps.iter().enumerate() {
            self.print_subtree(output, *child, &child_prefix, i == count - 1, depth + 1, max_depth, visited);
        }
        visited.remove(&idx);
    }

    /// The import chain from the root project to `name`, if any.
    pub fn find_path(&self, name: &str) -> Option<Vec<&SolvedNode>> {
        let target = self.find(name)?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.dfs_path(self.root, target, &mut path, &mut visited) {
            Some(path.iter().map(|&idx| &self.graph[idx]).collect())
        } else {
            None
        }
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        for next in self.dependencies_of(current) {
            if self.dfs_path(next, target, path, visited) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Render every chain of importers leading to `name`.
    pub fn print_inverted_tree(&self, name: &str) -> String {
        let mut output = String::new();
        let Some(idx) = self.find(name) else {
            return output;
        };
        output.push_str(&format!("{}\n", self.graph[idx]));
        let mut visited = HashSet::new();
        visited.insert(idx);
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, dep_idx) in dependents.iter().enumerate() {
            self.print_inverted_subtree(&mut output, *dep_idx, "", i == count - 1, &mut visited);
        }
        output
    }

    fn print_inverted_subtree(
        &self,
        output: &mut String,
        idx: NodeIndex,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        output.push_str(&format!("{prefix}{connector}{}\n", self.graph[idx]));
        if !visited.insert(idx) {
            return;
        }
        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let dependents = self.dependents_of(idx);
        let count = dependents.len();
        for (i, dep_idx) in dependents.iter().enumerate() {
            self.print_inverted_subtree(output, *dep_idx, &child_prefix, i == count - 1, visited);
        }
        visited.remove(&idx);
    }

    /// Number of locked projects.
    pub fn len(&self) -> usize {
        self.graph.node_count().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
