//! Property suites for the pipeline invariants

mod common;

use proptest::prelude::*;

use drift_rs::call_graph::{CallEdge, CallGraph, CallNode, NodeKind, ResolutionTier};
use drift_rs::detectors::{Detector, DetectorOutput, OutlierEvidence, PatternEvidence};
use drift_rs::language::Language;
use drift_rs::model::{Location, Outlier};
use drift_rs::reachability::{data_accessor_sink, ReachabilityEngine, TraversalOptions};
use drift_rs::scanner::{FileDetection, MergeAccumulator};
use std::collections::HashSet;
use std::path::PathBuf;

/// Content generator that produces route-declaration-shaped files so the
/// detectors have something to chew on.
fn route_file() -> impl Strategy<Value = String> {
    let segment = prop_oneof![
        Just("users".to_string()),
        Just("orders".to_string()),
        Just("userProfile".to_string()),
        Just("line_items".to_string()),
        Just("v1".to_string()),
        Just(":id".to_string()),
    ];
    proptest::collection::vec(
        (proptest::collection::vec(segment, 1..4), any::<bool>()),
        0..8,
    )
    .prop_map(|routes| {
        let mut out = String::new();
        for (segments, post) in routes {
            let verb = if post { "post" } else { "get" };
            out.push_str(&format!("app.{}('/{}', handler);\n", verb, segments.join("/")));
        }
        out
    })
}

proptest! {
    /// Invariant 1: a detector is a pure function of its inputs.
    #[test]
    fn detector_determinism(content in route_file()) {
        let detector = Detector::default_catalogue()
            .into_iter()
            .find(|d| d.meta().id == "api/route-structure")
            .unwrap();
        let run = || {
            run_detector_once(&detector, "src/routes.ts", &content)
        };
        let first = run();
        let second = run();
        prop_assert_eq!(first.matches, second.matches);
        prop_assert_eq!(first.outliers, second.outliers);
    }

    /// Invariant 2: merging partitions in any order equals merging the
    /// union, up to sort order.
    #[test]
    fn merge_commutativity(
        locations in proptest::collection::vec((1usize..40, 1usize..10, any::<bool>()), 0..24),
        split in 0usize..24,
    ) {
        let detections: Vec<FileDetection> = locations
            .iter()
            .map(|&(line, file_index, is_outlier)| detection(file_index, line, is_outlier))
            .collect();
        let split = split.min(detections.len());

        let mut whole = MergeAccumulator::new();
        for d in &detections {
            whole.add(d);
        }

        let (left, right) = detections.split_at(split);
        let mut merged = MergeAccumulator::new();
        let mut part_a = MergeAccumulator::new();
        for d in right {
            part_a.add(d);
        }
        for d in left {
            merged.add(d);
        }
        merged.absorb(part_a);

        let now = chrono::Utc::now();
        let lookup = |id: &str| meta_for(id);
        prop_assert_eq!(
            whole.into_patterns(lookup, 10, now),
            merged.into_patterns(lookup, 10, now)
        );
    }

    /// Invariant 5: `resolved ⇔ callee_id` survives arbitrary bind
    /// sequences, and no resolved edge references a missing node.
    #[test]
    fn edge_contract(binds in proptest::collection::vec(any::<bool>(), 1..32)) {
        let mut graph = CallGraph::new();
        for i in 0..binds.len() + 1 {
            graph.add_node(node(&format!("src/f{}::func{}", i, i), i + 1));
        }
        for (i, bind) in binds.iter().enumerate() {
            let mut edge = CallEdge::unresolved(
                format!("src/f{}::func{}", i, i),
                format!("func{}", i + 1),
                None,
                "src/x.ts",
                i + 1,
            );
            if *bind {
                edge.bind(format!("src/f{}::func{}", i + 1, i + 1), ResolutionTier::Exact);
            }
            graph.add_edge(edge).unwrap();
        }
        for edge in graph.edges() {
            prop_assert!(edge.check_invariant());
            if let Some(callee) = &edge.callee_id {
                prop_assert!(graph.node(callee).is_some());
            }
        }
        let stats = graph.stats();
        prop_assert_eq!(
            stats.resolved_edges,
            binds.iter().filter(|b| **b).count()
        );
    }

    /// Invariant 6: every reachability path starts at an entry point,
    /// ends at the sink, walks real edges, and visits no node twice.
    #[test]
    fn reachability_soundness(edges in proptest::collection::vec((0usize..12, 0usize..12), 0..40)) {
        let mut graph = CallGraph::new();
        for i in 0..12 {
            let mut n = node(&format!("src/m::f{}", i), i + 1);
            n.is_entry_point = i == 0;
            n.is_data_accessor = i == 11;
            graph.add_node(n);
        }
        for (index, &(from, to)) in edges.iter().enumerate() {
            let mut edge = CallEdge::unresolved(
                format!("src/m::f{}", from),
                format!("f{}", to),
                None,
                "src/m.ts",
                index + 1,
            );
            edge.bind(format!("src/m::f{}", to), ResolutionTier::Exact);
            graph.add_edge(edge).unwrap();
        }

        let engine = ReachabilityEngine::new(&graph);
        let options = TraversalOptions::default();
        let paths = engine.reachability(None, data_accessor_sink, &options);
        prop_assert!(paths.len() <= options.max_paths);

        let edge_set: HashSet<(String, String)> = graph
            .edges()
            .iter()
            .filter_map(|e| e.callee_id.clone().map(|c| (e.caller_id.clone(), c)))
            .collect();
        for path in &paths {
            prop_assert_eq!(path.nodes.first().unwrap(), "src/m::f0");
            prop_assert!(graph.node(path.nodes.last().unwrap()).unwrap().is_data_accessor);
            let unique: HashSet<_> = path.nodes.iter().collect();
            prop_assert_eq!(unique.len(), path.nodes.len());
            for pair in path.nodes.windows(2) {
                prop_assert!(edge_set.contains(&(pair[0].clone(), pair[1].clone())));
            }
        }
    }
}

fn run_detector_once(detector: &Detector, path: &str, content: &str) -> DetectorOutput {
    use drift_rs::detectors::{CommentMap, DetectContext, LineIndex, ProjectSummary};
    let comments = CommentMap::build(content, Language::TypeScript);
    let lines = LineIndex::build(content);
    let path = std::path::Path::new(path);
    let now = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let mut summary = ProjectSummary {
        total_files: 1,
        ..Default::default()
    };
    {
        let ctx = DetectContext {
            content,
            path,
            language: Language::TypeScript,
            comments: &comments,
            lines: &lines,
            summary: &ProjectSummary::default(),
            max_matches: 10_000,
            now,
        };
        summary.absorb(&detector.observe(&ctx));
    }
    let ctx = DetectContext {
        content,
        path,
        language: Language::TypeScript,
        comments: &comments,
        lines: &lines,
        summary: &summary,
        max_matches: 10_000,
        now,
    };
    detector.detect(&ctx)
}

fn meta_for(id: &str) -> Option<&'static drift_rs::detectors::DetectorMeta> {
    use std::sync::OnceLock;
    static CATALOGUE: OnceLock<Vec<Detector>> = OnceLock::new();
    CATALOGUE
        .get_or_init(Detector::default_catalogue)
        .iter()
        .map(Detector::meta)
        .find(|m| m.id == id)
}

fn detection(file_index: usize, line: usize, is_outlier: bool) -> FileDetection {
    let file = format!("src/f{}.ts", file_index);
    let output = if is_outlier {
        DetectorOutput {
            matches: Vec::new(),
            outliers: vec![OutlierEvidence {
                local_slug: "url-casing".into(),
                outlier: Outlier {
                    location: Location::new(file.clone(), line, 9),
                    reason: "inconsistent-casing".into(),
                    deviation_score: 0.7,
                    suggested_fix: None,
                },
            }],
            confidence: 0.0,
            truncated: false,
        }
    } else {
        DetectorOutput {
            matches: vec![PatternEvidence {
                local_slug: "url-casing".into(),
                name: "URL casing".into(),
                description: "Route segments follow one casing convention".into(),
                location: Location::new(file.clone(), line, 1),
            }],
            outliers: Vec::new(),
            confidence: 1.0,
            truncated: false,
        }
    };
    FileDetection {
        file: PathBuf::from(file),
        detector_id: "api/route-structure".into(),
        output,
    }
}

fn node(qualified: &str, line: usize) -> CallNode {
    CallNode {
        qualified_name: qualified.into(),
        name: qualified.rsplit("::").next().unwrap().into(),
        file: PathBuf::from("src/m.ts"),
        line,
        language: Language::TypeScript,
        kind: NodeKind::Function,
        is_entry_point: false,
        is_data_accessor: false,
    }
}

/// Invariant 3, exercised as a plain test over a mutation sequence: the
/// three status partitions stay pairwise disjoint and cover the live set.
#[test]
fn status_partitions_stay_disjoint() {
    use drift_rs::model::PatternStatus;
    let dir = common::init_project(&[(
        "src/routes.ts",
        "app.get('/api/users', a);\napp.get('/api/users/:id', b);\napp.get('/api/userProfile', c);\n",
    )]);
    let engine = drift_rs::DriftEngine::open(dir.path()).unwrap();
    engine.scan(false).unwrap();

    let ids: Vec<String> = engine
        .query_patterns(&drift_rs::PatternFilter::default())
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert!(!ids.is_empty());

    for (index, id) in ids.iter().enumerate() {
        match index % 3 {
            0 => {
                engine.approve(id, None).unwrap();
            }
            1 => {
                engine.ignore(id).unwrap();
            }
            _ => {}
        }
        let mut seen = HashSet::new();
        let mut total = 0usize;
        for status in PatternStatus::ALL {
            let batch = engine
                .query_patterns(&drift_rs::PatternFilter {
                    status: Some(status),
                    ..Default::default()
                })
                .unwrap();
            total += batch.len();
            for pattern in batch {
                assert!(
                    seen.insert(pattern.id.clone()),
                    "{} in two partitions",
                    pattern.id
                );
            }
        }
        assert_eq!(total, ids.len());
    }
}

/// Invariant 7: duplicate registration fails without override; override
/// replaces and keeps the size.
#[test]
fn registry_uniqueness() {
    use drift_rs::registry::{DetectorRegistry, RegisterOptions};
    let mut registry = DetectorRegistry::new();
    let detector = || {
        Detector::default_catalogue()
            .into_iter()
            .find(|d| d.meta().id == "api/route-structure")
            .unwrap()
    };
    registry.register(detector(), RegisterOptions::default()).unwrap();
    let size = registry.len();
    assert!(registry.register(detector(), RegisterOptions::default()).is_err());
    registry
        .register(
            detector(),
            RegisterOptions {
                override_existing: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(registry.len(), size);
}
