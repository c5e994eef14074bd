//! Incremental call-graph construction
//!
//! Extraction streams file-by-file: content is read, extracted, and
//! dropped before the next file, with results cached in the on-disk
//! intermediate keyed by content hash. Resolution then runs over bounded
//! batches of files so the candidate working set stays small. A whole
//! project is never held in memory as raw source.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::Result;
use crate::model::{AccessPoint, Location};
use crate::scanner::{content_hash, ScanIssue};
use crate::walker::WalkedFile;

use super::edge::CallEdge;
use super::extract::{extract_file, FileExtraction};
use super::graph::CallGraph;
use super::intermediate::Intermediate;
use super::node::CallNode;
use super::resolver::SymbolResolver;

/// Files resolved per batch; bounds the resolver's working set.
const RESOLUTION_BATCH: usize = 50;

/// Path fragments that mark a file as framework entry territory.
const ENTRY_PATH_HINTS: &[&str] = &["/routes/", "/controllers/", "/handlers/", "/pages/api/"];

/// What a build produced, for hosts and status output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphBuildResult {
    /// Files whose extraction contributed to the graph
    pub files_processed: usize,
    /// Function/method/closure nodes
    pub total_functions: usize,
    /// Call-site edges
    pub total_calls: usize,
    /// Edges bound to a concrete callee
    pub resolved_calls: usize,
    /// `resolved_calls / total_calls`, `1.0` when there are no calls
    pub resolution_rate: f64,
    /// Nodes tagged as entry points
    pub entry_points: usize,
    /// Nodes tagged as data accessors
    pub data_accessors: usize,
    /// Wall-clock build time
    pub duration_ms: u64,
    /// Non-fatal per-file problems
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ScanIssue>,
}

/// Builds the call graph from walked files plus scan hints.
pub struct GraphBuilder {
    /// `.drift` directory for the intermediate and persisted graph;
    /// `None` keeps everything in memory (tests)
    drift_dir: Option<PathBuf>,
}

impl GraphBuilder {
    /// A builder that persists under the given `.drift` directory.
    pub fn new(drift_dir: impl Into<PathBuf>) -> Self {
        Self {
            drift_dir: Some(drift_dir.into()),
        }
    }

    /// A builder with no persistence.
    pub fn in_memory() -> Self {
        Self { drift_dir: None }
    }

    /// Builds the graph.
    ///
    /// `route_locations` are route-structure pattern locations from the
    /// scan; `access_points` come from the boundary analyzer. Both drive
    /// node tagging.
    pub fn build(
        &self,
        files: &[WalkedFile],
        route_locations: &[Location],
        access_points: &[AccessPoint],
    ) -> Result<(CallGraph, GraphBuildResult)> {
        let started = Instant::now();
        let mut errors: Vec<ScanIssue> = Vec::new();

        // Phase 1: streaming extraction with the hash-keyed intermediate.
        let mut intermediate = match &self.drift_dir {
            Some(dir) => Intermediate::load(dir)?,
            None => Intermediate::default(),
        };

        let extracted: Vec<std::result::Result<(PathBuf, String, FileExtraction), ScanIssue>> =
            files
                .par_iter()
                .map(|file| {
                    let content =
                        std::fs::read_to_string(&file.absolute_path).map_err(|e| ScanIssue {
                            file: Some(file.relative_path.clone()),
                            detector: None,
                            message: format!("read failed: {}", e),
                        })?;
                    let hash = content_hash(&content);
                    if let Some(cached) = intermediate.cached(&file.relative_path, &hash) {
                        return Ok((file.relative_path.clone(), hash, cached.clone()));
                    }
                    let extraction =
                        extract_file(&file.relative_path, &content, file.language);
                    Ok((file.relative_path.clone(), hash, extraction))
                })
                .collect();

        let mut extractions: Vec<FileExtraction> = Vec::with_capacity(files.len());
        for outcome in extracted {
            match outcome {
                Ok((path, hash, extraction)) => {
                    intermediate.insert(path, hash, extraction.clone());
                    extractions.push(extraction);
                }
                Err(issue) => errors.push(issue),
            }
        }
        let live: BTreeSet<PathBuf> = extractions.iter().map(|e| e.file.clone()).collect();
        intermediate.retain_files(&live);

        // Phase 2: nodes.
        let mut graph = CallGraph::new();
        for extraction in &extractions {
            for function in &extraction.functions {
                graph.add_node(CallNode {
                    qualified_name: CallNode::qualify(&extraction.file, &function.name),
                    name: function.name.clone(),
                    file: extraction.file.clone(),
                    line: function.line,
                    language: extraction.language,
                    kind: function.kind,
                    is_entry_point: false,
                    is_data_accessor: false,
                });
            }
        }

        // Phase 3: batched resolution.
        let resolver = SymbolResolver::new(&extractions);
        for batch in extractions.chunks(RESOLUTION_BATCH) {
            for extraction in batch {
                for call in &extraction.calls {
                    // Module-level call sites have no enclosing callable to
                    // attribute the edge to.
                    let Some(enclosing) = &call.enclosing else {
                        continue;
                    };
                    let caller_id = CallNode::qualify(&extraction.file, enclosing);
                    let mut edge = CallEdge::unresolved(
                        caller_id,
                        call.callee_name.clone(),
                        call.receiver.clone(),
                        extraction.file.clone(),
                        call.line,
                    );
                    if let Some((callee_id, tier)) = resolver.resolve(&extraction.file, call)
                    {
                        edge.bind(callee_id, tier);
                    }
                    graph.add_edge(edge)?;
                }
            }
        }

        // Phase 4: tagging.
        tag_nodes(&mut graph, &extractions, route_locations, access_points);

        // Phase 5: persistence.
        if let Some(dir) = &self.drift_dir {
            intermediate.save(dir)?;
            graph.save(dir)?;
        }

        let stats = graph.stats();
        let result = GraphBuildResult {
            files_processed: extractions.len(),
            total_functions: stats.node_count,
            total_calls: stats.edge_count,
            resolved_calls: stats.resolved_edges,
            resolution_rate: stats.resolution_rate,
            entry_points: stats.entry_points,
            data_accessors: stats.data_accessors,
            duration_ms: started.elapsed().as_millis() as u64,
            errors,
        };
        Ok((graph, result))
    }
}

/// Body ranges per file: each function owns `[its line, next function's
/// line)`; the last one runs to end-of-file.
fn body_ranges(extraction: &FileExtraction) -> Vec<(String, usize, usize)> {
    let mut ranges = Vec::with_capacity(extraction.functions.len());
    for (index, function) in extraction.functions.iter().enumerate() {
        let end = extraction
            .functions
            .get(index + 1)
            .map(|next| next.line)
            .unwrap_or(usize::MAX);
        ranges.push((function.name.clone(), function.line, end));
    }
    ranges
}

fn tag_nodes(
    graph: &mut CallGraph,
    extractions: &[FileExtraction],
    route_locations: &[Location],
    access_points: &[AccessPoint],
) {
    let mut routes_by_file: BTreeMap<&Path, Vec<usize>> = BTreeMap::new();
    for location in route_locations {
        routes_by_file
            .entry(location.file.as_path())
            .or_default()
            .push(location.line);
    }
    let mut access_by_file: BTreeMap<&Path, Vec<usize>> = BTreeMap::new();
    for point in access_points {
        access_by_file
            .entry(point.file.as_path())
            .or_default()
            .push(point.line);
    }

    for extraction in extractions {
        let path_str = format!("/{}", extraction.file.display()).replace('\\', "/");
        let path_is_entry = ENTRY_PATH_HINTS.iter().any(|hint| path_str.contains(hint))
            || extraction
                .file
                .file_name()
                .map(|n| n.to_string_lossy().starts_with("route."))
                .unwrap_or(false);
        let route_lines = routes_by_file.get(extraction.file.as_path());
        let access_lines = access_by_file.get(extraction.file.as_path());

        for (name, start, end) in body_ranges(extraction) {
            let id = CallNode::qualify(&extraction.file, &name);
            let in_body = |lines: Option<&Vec<usize>>| {
                lines
                    .map(|ls| ls.iter().any(|&l| l >= start && l < end))
                    .unwrap_or(false)
            };
            let is_entry = path_is_entry || name == "main" || in_body(route_lines);
            let is_accessor = in_body(access_lines);
            if let Some(node) = graph.node_mut(&id) {
                node.is_entry_point |= is_entry;
                node.is_data_accessor |= is_accessor;
            }
        }
    }

    // A node called from an access-point location is itself a data
    // accessor (the query lives at its call site).
    let mut callees_at_access: Vec<String> = Vec::new();
    for edge in graph.edges() {
        if let Some(callee) = &edge.callee_id {
            let hit = access_by_file
                .get(edge.call_site_file.as_path())
                .map(|ls| ls.contains(&edge.call_site_line))
                .unwrap_or(false);
            if hit {
                callees_at_access.push(callee.clone());
            }
        }
    }
    for callee in callees_at_access {
        if let Some(node) = graph.node_mut(&callee) {
            node.is_data_accessor = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use std::fs;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> (TempDir, Vec<WalkedFile>) {
        let dir = TempDir::new().unwrap();
        let mut walked = Vec::new();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            walked.push(WalkedFile {
                absolute_path: path,
                relative_path: PathBuf::from(rel),
                language: Language::from_path(Path::new(rel)),
            });
        }
        (dir, walked)
    }

    const ROUTES_TS: &str = r#"
import { getUser } from '../services/users';

export async function userHandler(req, res) {
  const user = await getUser(req.params.id);
  res.json({ data: user });
}
"#;

    const USERS_TS: &str = r#"
export async function getUser(id) {
  return prisma.user.findUnique({ where: { id } });
}
"#;

    fn sample_access_point(line: usize) -> AccessPoint {
        AccessPoint {
            file: PathBuf::from("src/services/users.ts"),
            line,
            table: "users".into(),
            fields: Vec::new(),
            operation: crate::model::AccessOperation::Read,
            framework: "prisma".into(),
        }
    }

    #[test]
    fn cross_file_edge_resolves_and_tags() {
        let (_dir, files) = project(&[
            ("src/routes/user.ts", ROUTES_TS),
            ("src/services/users.ts", USERS_TS),
        ]);
        let builder = GraphBuilder::in_memory();
        let (graph, result) = builder
            .build(&files, &[], &[sample_access_point(3)])
            .unwrap();

        assert_eq!(result.files_processed, 2);
        let handler = graph.node("src/routes/user::userHandler").expect("handler node");
        assert!(handler.is_entry_point); // path convention
        let get_user = graph.node("src/services/users::getUser").expect("getUser node");
        assert!(get_user.is_data_accessor);

        let edge = graph
            .out_edges("src/routes/user::userHandler")
            .into_iter()
            .find(|e| e.callee_name == "getUser")
            .expect("getUser edge");
        assert!(edge.resolved);
        assert_eq!(edge.callee_id.as_deref(), Some("src/services/users::getUser"));
        assert!(result.resolution_rate > 0.0);
    }

    #[test]
    fn incremental_rebuild_reuses_unchanged_extractions() {
        let (dir, files) = project(&[
            ("src/routes/user.ts", ROUTES_TS),
            ("src/services/users.ts", USERS_TS),
        ]);
        let drift = dir.path().join(".drift");
        let builder = GraphBuilder::new(&drift);
        let (first_graph, _) = builder.build(&files, &[], &[]).unwrap();

        // Nothing changed: nodes survive byte-for-byte.
        let (second_graph, _) = builder.build(&files, &[], &[]).unwrap();
        let first_nodes: Vec<_> = first_graph.nodes().collect();
        let second_nodes: Vec<_> = second_graph.nodes().collect();
        assert_eq!(first_nodes, second_nodes);
        assert!(drift.join("lake/callgraph/intermediate.json").is_file());
        assert!(drift.join("lake/callgraph/nodes.json").is_file());
    }

    #[test]
    fn unreadable_files_are_nonfatal() {
        let (_dir, mut files) = project(&[("src/a.ts", "function ok() {}\n")]);
        files.push(WalkedFile {
            absolute_path: PathBuf::from("/nonexistent/ghost.ts"),
            relative_path: PathBuf::from("ghost.ts"),
            language: Language::TypeScript,
        });
        let (graph, result) = GraphBuilder::in_memory().build(&files, &[], &[]).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert!(graph.node("src/a::ok").is_some());
    }
}
