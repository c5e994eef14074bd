//! The persisted call graph
//!
//! Nodes and edges with forward (`caller -> edges`) and reverse
//! (`callee -> edges`) indices for O(degree) lookups. The store owns the
//! indexed representation; readers get references and never mutate.
//! Persistence is three JSON documents under `lake/callgraph/`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{Error, Result};

use super::edge::CallEdge;
use super::node::CallNode;

/// Aggregate graph statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Total nodes
    pub node_count: usize,
    /// Total edges
    pub edge_count: usize,
    /// Edges bound to a concrete callee
    pub resolved_edges: usize,
    /// `resolved_edges / edge_count`, `1.0` for an empty graph
    pub resolution_rate: f64,
    /// Nodes tagged as entry points
    pub entry_points: usize,
    /// Nodes tagged as data accessors
    pub data_accessors: usize,
}

/// The call graph.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    nodes: BTreeMap<String, CallNode>,
    edges: Vec<CallEdge>,
    forward: HashMap<String, Vec<usize>>,
    reverse: HashMap<String, Vec<usize>>,
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    forward: BTreeMap<String, Vec<usize>>,
    reverse: BTreeMap<String, Vec<usize>>,
}

impl CallGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node. Re-inserting the same qualified name replaces the
    /// record (incremental rebuilds re-add unchanged files' nodes).
    pub fn add_node(&mut self, node: CallNode) {
        self.nodes.insert(node.qualified_name.clone(), node);
    }

    /// Inserts an edge and indexes it.
    ///
    /// A resolved edge must reference an existing callee node; the edge
    /// contract (`resolved ⇔ callee_id`) is checked here so a broken edge
    /// never enters the store.
    pub fn add_edge(&mut self, edge: CallEdge) -> Result<()> {
        if !edge.check_invariant() {
            return Err(Error::Internal(format!(
                "edge {} violates the resolved/callee contract",
                edge
            )));
        }
        if let Some(callee) = &edge.callee_id {
            if !self.nodes.contains_key(callee) {
                return Err(Error::Internal(format!(
                    "edge {} references missing callee node",
                    edge
                )));
            }
        }
        let index = self.edges.len();
        self.forward
            .entry(edge.caller_id.clone())
            .or_default()
            .push(index);
        if let Some(callee) = &edge.callee_id {
            self.reverse.entry(callee.clone()).or_default().push(index);
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Node by qualified name.
    pub fn node(&self, id: &str) -> Option<&CallNode> {
        self.nodes.get(id)
    }

    /// Mutable node access, for tagging passes.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut CallNode> {
        self.nodes.get_mut(id)
    }

    /// All nodes, ordered by qualified name.
    pub fn nodes(&self) -> impl Iterator<Item = &CallNode> {
        self.nodes.values()
    }

    /// All edges.
    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    /// Outgoing edges of a node, O(out-degree).
    pub fn out_edges(&self, id: &str) -> Vec<&CallEdge> {
        self.forward
            .get(id)
            .map(|indices| indices.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Incoming resolved edges of a node, O(in-degree).
    pub fn in_edges(&self, id: &str) -> Vec<&CallEdge> {
        self.reverse
            .get(id)
            .map(|indices| indices.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Nodes tagged as entry points.
    pub fn entry_points(&self) -> Vec<&CallNode> {
        self.nodes.values().filter(|n| n.is_entry_point).collect()
    }

    /// Nodes tagged as data accessors.
    pub fn data_accessors(&self) -> Vec<&CallNode> {
        self.nodes.values().filter(|n| n.is_data_accessor).collect()
    }

    /// Nodes declared in the given file.
    pub fn nodes_in_file(&self, file: &Path) -> Vec<&CallNode> {
        self.nodes.values().filter(|n| n.file == file).collect()
    }

    /// Unresolved edges whose written callee name matches, for by-name
    /// traversal.
    pub fn unresolved_edges_named(&self, name: &str) -> Vec<&CallEdge> {
        self.edges
            .iter()
            .filter(|e| !e.resolved && e.callee_name == name)
            .collect()
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> GraphStats {
        let resolved = self.edges.iter().filter(|e| e.resolved).count();
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            resolved_edges: resolved,
            resolution_rate: if self.edges.is_empty() {
                1.0
            } else {
                resolved as f64 / self.edges.len() as f64
            },
            entry_points: self.nodes.values().filter(|n| n.is_entry_point).count(),
            data_accessors: self.nodes.values().filter(|n| n.is_data_accessor).count(),
        }
    }

    /// Persists nodes, edges, and indices under `lake/callgraph/`.
    pub fn save(&self, drift_dir: &Path) -> Result<()> {
        let dir = drift_dir.join("lake").join("callgraph");
        let nodes: Vec<&CallNode> = self.nodes.values().collect();
        crate::store::write_json_atomic(&dir.join("nodes.json"), &nodes)?;
        crate::store::write_json_atomic(&dir.join("edges.json"), &self.edges)?;
        let index = PersistedIndex {
            forward: self.forward.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            reverse: self.reverse.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        crate::store::write_json_atomic(&dir.join("index.json"), &index)
    }

    /// Loads a persisted graph, tolerating absence (empty graph). Indices
    /// are rebuilt from the edges rather than trusted from disk.
    pub fn load(drift_dir: &Path) -> Result<Self> {
        let dir = drift_dir.join("lake").join("callgraph");
        let nodes_path = dir.join("nodes.json");
        if !nodes_path.is_file() {
            return Ok(Self::new());
        }
        let nodes: Vec<CallNode> =
            serde_json::from_str(&std::fs::read_to_string(&nodes_path)?)?;
        let edges: Vec<CallEdge> =
            serde_json::from_str(&std::fs::read_to_string(dir.join("edges.json"))?)?;
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node);
        }
        for edge in edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_graph::edge::ResolutionTier;
    use crate::call_graph::node::NodeKind;
    use crate::language::Language;
    use std::path::PathBuf;
    use tempfile::TempDir;

    pub(crate) fn node(qualified: &str, file: &str, line: usize) -> CallNode {
        CallNode {
            qualified_name: qualified.into(),
            name: qualified.rsplit("::").next().unwrap().into(),
            file: PathBuf::from(file),
            line,
            language: Language::TypeScript,
            kind: NodeKind::Function,
            is_entry_point: false,
            is_data_accessor: false,
        }
    }

    fn resolved_edge(from: &str, to: &str, line: usize) -> CallEdge {
        let mut edge = CallEdge::unresolved(
            from,
            to.rsplit("::").next().unwrap(),
            None,
            "src/a.ts",
            line,
        );
        edge.bind(to, ResolutionTier::Exact);
        edge
    }

    #[test]
    fn indices_answer_in_degree_queries() {
        let mut graph = CallGraph::new();
        graph.add_node(node("src/a::f", "src/a.ts", 1));
        graph.add_node(node("src/a::g", "src/a.ts", 5));
        graph.add_node(node("src/b::h", "src/b.ts", 1));
        graph.add_edge(resolved_edge("src/a::f", "src/a::g", 2)).unwrap();
        graph.add_edge(resolved_edge("src/b::h", "src/a::g", 3)).unwrap();

        assert_eq!(graph.out_edges("src/a::f").len(), 1);
        assert_eq!(graph.in_edges("src/a::g").len(), 2);
        assert!(graph.in_edges("src/a::f").is_empty());

        let stats = graph.stats();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 2);
        assert!((stats.resolution_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn resolved_edge_to_missing_node_is_rejected() {
        let mut graph = CallGraph::new();
        graph.add_node(node("src/a::f", "src/a.ts", 1));
        let err = graph
            .add_edge(resolved_edge("src/a::f", "src/ghost::g", 2))
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn unresolved_edges_are_kept_and_counted() {
        let mut graph = CallGraph::new();
        graph.add_node(node("src/a::f", "src/a.ts", 1));
        graph
            .add_edge(CallEdge::unresolved("src/a::f", "mystery", None, "src/a.ts", 2))
            .unwrap();
        let stats = graph.stats();
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.resolved_edges, 0);
        assert_eq!(stats.resolution_rate, 0.0);
        assert_eq!(graph.unresolved_edges_named("mystery").len(), 1);
    }

    #[test]
    fn save_load_round_trip() {
        let mut graph = CallGraph::new();
        graph.add_node(node("src/a::f", "src/a.ts", 1));
        graph.add_node(node("src/a::g", "src/a.ts", 5));
        graph.add_edge(resolved_edge("src/a::f", "src/a::g", 2)).unwrap();
        graph
            .add_edge(CallEdge::unresolved("src/a::g", "ext", None, "src/a.ts", 6))
            .unwrap();

        let dir = TempDir::new().unwrap();
        graph.save(dir.path()).unwrap();
        let loaded = CallGraph::load(dir.path()).unwrap();
        assert_eq!(loaded.stats(), graph.stats());
        assert_eq!(loaded.out_edges("src/a::f").len(), 1);
    }
}
