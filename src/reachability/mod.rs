//! Reachability, impact, and data-exposure queries
//!
//! Bounded traversals over the persisted call graph. Paths never revisit a
//! node, enumeration stops at `max_depth`/`max_paths`, and unresolved
//! edges are only followed by name when the caller opts in, at a
//! confidence penalty recorded on the path.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::call_graph::{CallGraph, CallNode};
use crate::model::AccessPoint;

/// Confidence multiplier applied when a traversal follows an unresolved
/// edge by name.
const UNRESOLVED_PENALTY: f64 = 0.5;

/// Traversal bounds.
#[derive(Debug, Clone, Copy)]
pub struct TraversalOptions {
    /// Maximum path length in edges
    pub max_depth: usize,
    /// Maximum number of paths returned
    pub max_paths: usize,
    /// Follow unresolved edges by callee name, at a confidence penalty
    pub traverse_unresolved: bool,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_paths: 64,
            traverse_unresolved: false,
        }
    }
}

/// One path through the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachPath {
    /// Node ids in order, start to sink
    pub nodes: Vec<String>,
    /// Aggregate confidence: product of edge-resolution confidences
    pub confidence: f64,
}

/// What a change set touches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactResult {
    /// Files containing affected functions
    pub affected_files: Vec<PathBuf>,
    /// Affected functions (the changed ones plus transitive callers)
    pub affected_functions: Vec<String>,
    /// Affected entry points
    pub entry_points_touched: Vec<String>,
    /// Affected data accessors
    pub data_access_touched: Vec<String>,
    /// `clamp(0, 100, 10·entry + 15·data + 5·ceil(functions/10))`
    pub risk_score: u32,
}

/// Query engine over a built graph.
pub struct ReachabilityEngine<'g> {
    graph: &'g CallGraph,
}

impl<'g> ReachabilityEngine<'g> {
    /// Creates the engine over a graph view.
    pub fn new(graph: &'g CallGraph) -> Self {
        Self { graph }
    }

    /// Enumerates paths from entry points (or the given starts) to nodes
    /// matching the sink predicate.
    ///
    /// Paths are sorted by length ascending, then aggregate confidence
    /// descending.
    pub fn reachability<F>(
        &self,
        from: Option<&[String]>,
        sink: F,
        options: &TraversalOptions,
    ) -> Vec<ReachPath>
    where
        F: Fn(&CallNode) -> bool,
    {
        let mut starts: Vec<String> = match from {
            Some(ids) => ids.to_vec(),
            None => self
                .graph
                .entry_points()
                .iter()
                .map(|n| n.qualified_name.clone())
                .collect(),
        };
        starts.sort();
        starts.dedup();

        let mut paths = Vec::new();
        for start in starts {
            if paths.len() >= options.max_paths {
                break;
            }
            if self.graph.node(&start).is_none() {
                continue;
            }
            let mut current = vec![start.clone()];
            let mut on_path: HashSet<String> = HashSet::from([start.clone()]);
            self.dfs_forward(
                &start,
                &sink,
                options,
                1.0,
                &mut current,
                &mut on_path,
                &mut paths,
            );
        }

        paths.sort_by(|a, b| {
            a.nodes
                .len()
                .cmp(&b.nodes.len())
                .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.nodes.cmp(&b.nodes))
        });
        paths.truncate(options.max_paths);
        paths
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs_forward<F>(
        &self,
        at: &str,
        sink: &F,
        options: &TraversalOptions,
        confidence: f64,
        current: &mut Vec<String>,
        on_path: &mut HashSet<String>,
        paths: &mut Vec<ReachPath>,
    ) where
        F: Fn(&CallNode) -> bool,
    {
        if paths.len() >= options.max_paths {
            return;
        }
        if let Some(node) = self.graph.node(at) {
            if sink(node) {
                paths.push(ReachPath {
                    nodes: current.clone(),
                    confidence,
                });
                return;
            }
        }
        if current.len() > options.max_depth {
            return;
        }
        for (next, step_confidence) in self.successors(at, options) {
            if on_path.contains(&next) {
                continue; // no node twice on one path
            }
            current.push(next.clone());
            on_path.insert(next.clone());
            self.dfs_forward(
                &next,
                sink,
                options,
                confidence * step_confidence,
                current,
                on_path,
                paths,
            );
            on_path.remove(&next);
            current.pop();
        }
    }

    /// Forward successors with per-step confidence.
    fn successors(&self, at: &str, options: &TraversalOptions) -> Vec<(String, f64)> {
        let mut next = Vec::new();
        for edge in self.graph.out_edges(at) {
            match &edge.callee_id {
                Some(callee) => {
                    let confidence = edge
                        .resolution
                        .map(|tier| tier.confidence())
                        .unwrap_or(1.0);
                    next.push((callee.clone(), confidence));
                }
                None if options.traverse_unresolved => {
                    // By-name continuation: every declaration sharing the
                    // written name is a candidate, at a penalty.
                    for node in self.graph.nodes() {
                        if node.name == edge.callee_name {
                            next.push((node.qualified_name.clone(), UNRESOLVED_PENALTY));
                        }
                    }
                }
                None => {}
            }
        }
        next.sort_by(|a, b| a.0.cmp(&b.0));
        next.dedup_by(|a, b| a.0 == b.0);
        next
    }

    /// Impact of a change set: reverse BFS from every function declared in
    /// the given files.
    pub fn impact_of_changes(&self, files: &[PathBuf], max_depth: usize) -> ImpactResult {
        let mut seeds: Vec<String> = Vec::new();
        for file in files {
            for node in self.graph.nodes_in_file(Path::new(file)) {
                seeds.push(node.qualified_name.clone());
            }
        }
        seeds.sort();
        seeds.dedup();

        let mut affected: BTreeSet<String> = seeds.iter().cloned().collect();
        let mut queue: VecDeque<(String, usize)> =
            seeds.into_iter().map(|s| (s, 0)).collect();
        while let Some((id, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for edge in self.graph.in_edges(&id) {
                if affected.insert(edge.caller_id.clone()) {
                    queue.push_back((edge.caller_id.clone(), depth + 1));
                }
            }
        }

        let mut files_touched: BTreeSet<PathBuf> = BTreeSet::new();
        let mut entry_points = Vec::new();
        let mut data_access = Vec::new();
        for id in &affected {
            if let Some(node) = self.graph.node(id) {
                files_touched.insert(node.file.clone());
                if node.is_entry_point {
                    entry_points.push(id.clone());
                }
                if node.is_data_accessor {
                    data_access.push(id.clone());
                }
            }
        }

        let risk = 10 * entry_points.len() as u32
            + 15 * data_access.len() as u32
            + 5 * (affected.len() as u32).div_ceil(10);

        ImpactResult {
            affected_files: files_touched.into_iter().collect(),
            affected_functions: affected.into_iter().collect(),
            entry_points_touched: entry_points,
            data_access_touched: data_access,
            risk_score: risk.min(100),
        }
    }

    /// Entry-point paths that reach the node owning an access point.
    ///
    /// The owning node is the last declaration in the file at or before
    /// the access line. Paths run entry point → … → owner.
    pub fn data_exposure(
        &self,
        access_point: &AccessPoint,
        options: &TraversalOptions,
    ) -> Vec<ReachPath> {
        let Some(owner) = self.owning_node(access_point) else {
            return Vec::new();
        };
        let owner_name = owner.qualified_name.clone();
        self.reachability(
            None,
            |node: &CallNode| node.qualified_name == owner_name,
            options,
        )
    }

    fn owning_node(&self, access_point: &AccessPoint) -> Option<&CallNode> {
        let mut nodes: Vec<&CallNode> = self
            .graph
            .nodes_in_file(&access_point.file)
            .into_iter()
            .filter(|n| n.line <= access_point.line)
            .collect();
        nodes.sort_by_key(|n| n.line);
        nodes.pop()
    }
}

/// Sink predicate matching data accessors, the common security query.
pub fn data_accessor_sink(node: &CallNode) -> bool {
    node.is_data_accessor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_graph::{CallEdge, CallNode, NodeKind, ResolutionTier};
    use crate::language::Language;
    use crate::model::AccessOperation;

    fn node(qualified: &str, file: &str, line: usize, entry: bool, data: bool) -> CallNode {
        CallNode {
            qualified_name: qualified.into(),
            name: qualified.rsplit("::").next().unwrap().into(),
            file: PathBuf::from(file),
            line,
            language: Language::Rust,
            kind: NodeKind::Function,
            is_entry_point: entry,
            is_data_accessor: data,
        }
    }

    fn edge(from: &str, to: &str, line: usize) -> CallEdge {
        let mut edge = CallEdge::unresolved(
            from,
            to.rsplit("::").next().unwrap(),
            None,
            "src/x.rs",
            line,
        );
        edge.bind(to, ResolutionTier::Exact);
        edge
    }

    /// route_handler -> service -> delete_user (data accessor).
    fn sample_graph() -> CallGraph {
        let mut graph = CallGraph::new();
        graph.add_node(node("src/routes::route_handler", "src/routes.rs", 1, true, false));
        graph.add_node(node("src/service::service", "src/service.rs", 1, false, false));
        graph.add_node(node("src/repo::delete_user", "src/repo.rs", 10, false, true));
        graph
            .add_edge(edge("src/routes::route_handler", "src/service::service", 2))
            .unwrap();
        graph
            .add_edge(edge("src/service::service", "src/repo::delete_user", 3))
            .unwrap();
        graph
    }

    #[test]
    fn reachability_finds_entry_to_sink_path() {
        let graph = sample_graph();
        let engine = ReachabilityEngine::new(&graph);
        let paths = engine.reachability(None, data_accessor_sink, &TraversalOptions::default());
        assert_eq!(paths.len(), 1);
        assert_eq!(
            paths[0].nodes,
            vec![
                "src/routes::route_handler".to_string(),
                "src/service::service".to_string(),
                "src/repo::delete_user".to_string(),
            ]
        );
        assert!((paths[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn paths_never_revisit_nodes() {
        let mut graph = sample_graph();
        // Add a cycle service -> route_handler.
        graph
            .add_edge(edge("src/service::service", "src/routes::route_handler", 4))
            .unwrap();
        let engine = ReachabilityEngine::new(&graph);
        let paths = engine.reachability(None, data_accessor_sink, &TraversalOptions::default());
        for path in &paths {
            let unique: HashSet<_> = path.nodes.iter().collect();
            assert_eq!(unique.len(), path.nodes.len());
        }
    }

    #[test]
    fn depth_bound_cuts_enumeration() {
        let graph = sample_graph();
        let engine = ReachabilityEngine::new(&graph);
        let options = TraversalOptions {
            max_depth: 1,
            ..Default::default()
        };
        let paths = engine.reachability(None, data_accessor_sink, &options);
        assert!(paths.is_empty());
    }

    #[test]
    fn impact_of_repo_change_reaches_the_route() {
        let graph = sample_graph();
        let engine = ReachabilityEngine::new(&graph);
        let impact = engine.impact_of_changes(&[PathBuf::from("src/repo.rs")], 5);

        assert!(impact
            .affected_functions
            .contains(&"src/service::service".to_string()));
        assert!(impact
            .affected_functions
            .contains(&"src/routes::route_handler".to_string()));
        assert_eq!(impact.entry_points_touched.len(), 1);
        assert_eq!(impact.data_access_touched.len(), 1);
        // 10·1 + 15·1 + 5·ceil(3/10) = 30
        assert_eq!(impact.risk_score, 30);
        assert!(impact.risk_score >= 25);
    }

    #[test]
    fn unresolved_edges_require_opt_in_and_cost_confidence() {
        let mut graph = sample_graph();
        graph.add_node(node("src/jobs::cleanup", "src/jobs.rs", 1, true, false));
        graph
            .add_edge(CallEdge::unresolved(
                "src/jobs::cleanup",
                "delete_user",
                None,
                "src/jobs.rs",
                2,
            ))
            .unwrap();
        let engine = ReachabilityEngine::new(&graph);

        let strict = engine.reachability(
            Some(&["src/jobs::cleanup".to_string()]),
            data_accessor_sink,
            &TraversalOptions::default(),
        );
        assert!(strict.is_empty());

        let relaxed = engine.reachability(
            Some(&["src/jobs::cleanup".to_string()]),
            data_accessor_sink,
            &TraversalOptions {
                traverse_unresolved: true,
                ..Default::default()
            },
        );
        assert_eq!(relaxed.len(), 1);
        assert!((relaxed[0].confidence - UNRESOLVED_PENALTY).abs() < 1e-9);
    }

    #[test]
    fn data_exposure_walks_back_to_entries() {
        let graph = sample_graph();
        let engine = ReachabilityEngine::new(&graph);
        let point = AccessPoint {
            file: PathBuf::from("src/repo.rs"),
            line: 12,
            table: "users".into(),
            fields: Vec::new(),
            operation: AccessOperation::Delete,
            framework: "raw-sql".into(),
        };
        let paths = engine.data_exposure(&point, &TraversalOptions::default());
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].nodes.first().unwrap(), "src/routes::route_handler");
        assert_eq!(paths[0].nodes.last().unwrap(), "src/repo::delete_user");
    }
}
