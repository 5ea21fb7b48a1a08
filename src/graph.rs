//! File dependency graph.
//!
//! Nodes are [`FileId`]s and an edge `a -> b` means "a includes b". The graph
//! is an arena keyed by id, so include cycles need no special handling.

use crate::types::FileId;
use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Include relationships of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyNode {
    pub file: FileId,
    /// Files this file includes.
    pub includes: BTreeSet<FileId>,
    /// Files that include this file.
    pub dependents: BTreeSet<FileId>,
}

/// Direction of a transitive dependency walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyMode {
    /// Files that (transitively) include the argument.
    DependsOnArg,
    /// Files the argument (transitively) includes.
    ArgDependsOn,
}

/// Read access to a dependency graph.
pub trait DependencyLookup {
    fn dependency_node(&self, file: FileId) -> Option<DependencyNode>;

    /// Files that transitively depend on `file`, nearest first.
    fn dependencies_of(&self, file: FileId) -> Vec<FileId>;
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<FileId, ()>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, file: FileId) {
        self.graph.add_node(file);
    }

    pub fn add_include(&mut self, includer: FileId, included: FileId) {
        self.graph.add_edge(includer, included, ());
    }

    /// Replace the outgoing edges of `file`. Incoming edges are kept since
    /// they belong to the includers.
    pub fn set_includes(&mut self, file: FileId, includes: impl IntoIterator<Item = FileId>) {
        self.graph.add_node(file);
        let old: Vec<FileId> = self
            .graph
            .neighbors_directed(file, Direction::Outgoing)
            .collect();
        for target in old {
            self.graph.remove_edge(file, target);
        }
        for target in includes {
            if target != file {
                self.graph.add_edge(file, target, ());
            }
        }
    }

    /// Drop `file` and every edge touching it.
    pub fn remove_file(&mut self, file: FileId) -> bool {
        self.graph.remove_node(file)
    }

    pub fn contains(&self, file: FileId) -> bool {
        self.graph.contains_node(file)
    }

    pub fn file_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn includes(&self, file: FileId) -> BTreeSet<FileId> {
        self.neighbors(file, Direction::Outgoing)
    }

    pub fn dependents(&self, file: FileId) -> BTreeSet<FileId> {
        self.neighbors(file, Direction::Incoming)
    }

    fn neighbors(&self, file: FileId, direction: Direction) -> BTreeSet<FileId> {
        if !self.graph.contains_node(file) {
            return BTreeSet::new();
        }
        self.graph.neighbors_directed(file, direction).collect()
    }

    /// Breadth-first transitive walk from `file`, excluding `file` itself.
    /// Each level is visited in ascending id order.
    pub fn dependencies(&self, file: FileId, mode: DependencyMode) -> Vec<FileId> {
        let direction = match mode {
            DependencyMode::DependsOnArg => Direction::Incoming,
            DependencyMode::ArgDependsOn => Direction::Outgoing,
        };

        let mut out = Vec::new();
        let mut seen = HashSet::from([file]);
        let mut queue = VecDeque::from([file]);
        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current, direction) {
                if seen.insert(next) {
                    out.push(next);
                    queue.push_back(next);
                }
            }
        }
        out
    }

    /// Edges as `(includer, included)` pairs, for persistence.
    pub fn edges(&self) -> Vec<(FileId, FileId)> {
        self.graph.all_edges().map(|(a, b, _)| (a, b)).collect()
    }

    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            files: self.graph.nodes().collect(),
            edges: self.edges(),
        }
    }

    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Self {
        let mut graph = Self::new();
        for &file in &snapshot.files {
            graph.add_file(file);
        }
        for &(a, b) in &snapshot.edges {
            graph.add_include(a, b);
        }
        graph
    }
}

impl DependencyLookup for DependencyGraph {
    fn dependency_node(&self, file: FileId) -> Option<DependencyNode> {
        if !self.contains(file) {
            return None;
        }
        Some(DependencyNode {
            file,
            includes: self.includes(file),
            dependents: self.dependents(file),
        })
    }

    fn dependencies_of(&self, file: FileId) -> Vec<FileId> {
        self.dependencies(file, DependencyMode::DependsOnArg)
    }
}

/// Serializable form of a [`DependencyGraph`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub files: Vec<FileId>,
    pub edges: Vec<(FileId, FileId)>,
}
