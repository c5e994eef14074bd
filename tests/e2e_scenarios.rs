//! End-to-end scenarios through the engine façade

mod common;

use pretty_assertions::assert_eq;
use std::path::PathBuf;

use drift_rs::model::{PatternStatus, VariantScope};
use drift_rs::store::VariantInput;
use drift_rs::{DriftEngine, PatternFilter};

#[test]
fn route_casing_violation_with_suggested_fix() {
    let dir = common::init_project(&[(
        "src/routes.ts",
        "app.get('/api/users', listUsers);\napp.get('/api/users/:id', getUser);\napp.get('/api/userProfile', getProfile);\n",
    )]);
    let engine = DriftEngine::open(dir.path()).unwrap();
    let outcome = engine.scan(false).unwrap();
    assert!(outcome.persisted);

    let casing: Vec<_> = outcome
        .violations
        .iter()
        .filter(|v| v.pattern_id == "api/route-structure/url-casing")
        .collect();
    assert_eq!(casing.len(), 1);
    let violation = casing[0];
    assert!(violation.reason.contains("inconsistent-casing"));
    assert_eq!(violation.suggested_fix.as_deref(), Some("user-profile"));
    assert_eq!(violation.location.line, 3);
    // Column points at the offending segment inside the path literal.
    assert_eq!(violation.location.column, "app.get('/api/".len() + 1);
}

#[test]
fn raw_array_response_flagged_against_standard_envelope() {
    let dir = common::init_project(&[(
        "src/handlers.ts",
        "res.json({ data: users, error: null });\nres.json({ data: orders, error: null });\nres.json([1, 2, 3]);\n",
    )]);
    let engine = DriftEngine::open(dir.path()).unwrap();
    let outcome = engine.scan(false).unwrap();

    let raw: Vec<_> = outcome
        .violations
        .iter()
        .filter(|v| v.reason.starts_with("raw-data-response"))
        .collect();
    assert_eq!(raw.len(), 1);
    assert!(raw[0].reason.contains("standard"));

    let envelope = engine
        .query_patterns(&PatternFilter::default())
        .unwrap()
        .into_iter()
        .find(|p| p.id == "api/response-envelope/envelope-shape")
        .expect("envelope pattern");
    assert!(envelope.description.contains("standard"));
}

#[test]
fn approve_flow_moves_partition_and_silences_violations() {
    let dir = common::init_project(&[(
        "src/routes.ts",
        "app.get('/api/users', a);\napp.get('/api/users/:id', b);\napp.get('/api/userProfile', c);\n",
    )]);
    let engine = DriftEngine::open(dir.path()).unwrap();
    let outcome = engine.scan(false).unwrap();
    assert!(outcome
        .violations
        .iter()
        .any(|v| v.pattern_id == "api/route-structure/url-casing"));

    engine
        .approve("api/route-structure/url-casing", Some("dev"))
        .unwrap();

    let approved = engine
        .query_patterns(&PatternFilter {
            status: Some(PatternStatus::Approved),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(
        approved
            .iter()
            .filter(|p| p.id == "api/route-structure/url-casing")
            .count(),
        1
    );
    let discovered = engine
        .query_patterns(&PatternFilter {
            status: Some(PatternStatus::Discovered),
            ..Default::default()
        })
        .unwrap();
    assert!(discovered
        .iter()
        .all(|p| p.id != "api/route-structure/url-casing"));

    // A re-scan keeps the approval and no longer surfaces the outliers.
    let rescan = engine.scan(false).unwrap();
    assert!(rescan
        .violations
        .iter()
        .all(|v| v.pattern_id != "api/route-structure/url-casing"));
}

#[test]
fn file_variant_masks_exactly_its_violation() {
    let dir = common::init_project(&[
        (
            "src/routes.ts",
            "app.get('/api/users', a);\napp.get('/api/orders', b);\n",
        ),
        ("src/legacy.ts", "app.get('/api/legacyThing', c);\n"),
        ("src/fresh.ts", "app.get('/api/freshThing', d);\n"),
    ]);
    let engine = DriftEngine::open(dir.path()).unwrap();
    let before = engine.scan(false).unwrap();
    let casing_before: Vec<_> = before
        .violations
        .iter()
        .filter(|v| v.pattern_id == "api/route-structure/url-casing")
        .collect();
    assert_eq!(casing_before.len(), 2);

    engine
        .create_variant(VariantInput {
            pattern_id: "api/route-structure/url-casing".into(),
            name: "legacy module".into(),
            reason: "grandfathered until the v2 rewrite".into(),
            scope: VariantScope::File("src/legacy.ts".into()),
            locations: Vec::new(),
        })
        .unwrap();

    let after = engine.scan(false).unwrap();
    let casing_after: Vec<_> = after
        .violations
        .iter()
        .filter(|v| v.pattern_id == "api/route-structure/url-casing")
        .collect();
    assert_eq!(casing_after.len(), 1);
    assert_eq!(casing_after[0].location.file, PathBuf::from("src/fresh.ts"));
}

#[test]
fn impact_analysis_walks_back_to_the_route() {
    let dir = common::init_project(&[
        (
            "src/routes/user.ts",
            "import { deleteUser } from '../service';\n\nexport async function handleDelete(req, res) {\n  await deleteUser(req.params.id);\n  res.json({ data: true, error: null });\n}\n",
        ),
        (
            "src/service.ts",
            "import { removeUser } from './repo';\n\nexport async function deleteUser(id) {\n  return removeUser(id);\n}\n",
        ),
        (
            "src/repo.ts",
            "export async function removeUser(id) {\n  return prisma.user.delete({ where: { id } });\n}\n",
        ),
    ]);
    let engine = DriftEngine::open(dir.path()).unwrap();
    let (outcome, graph) = engine.full().unwrap();
    assert!(outcome.persisted);
    let graph = graph.expect("call graph enabled by default");
    assert!(graph.total_functions >= 3);
    assert!(graph.resolution_rate > 0.0);

    let impact = engine
        .impact(&[PathBuf::from("src/repo.ts")], 5)
        .unwrap();
    assert!(impact
        .affected_functions
        .contains(&"src/service::deleteUser".to_string()));
    assert!(impact
        .affected_functions
        .contains(&"src/routes/user::handleDelete".to_string()));
    assert!(!impact.entry_points_touched.is_empty());
    assert!(impact.risk_score >= 25, "risk {}", impact.risk_score);
}

#[test]
fn reachability_paths_start_at_entries_and_end_at_data() {
    let dir = common::init_project(&[
        (
            "src/routes/user.ts",
            "import { deleteUser } from '../service';\n\nexport async function handleDelete(req, res) {\n  await deleteUser(req.params.id);\n  res.json({ data: true, error: null });\n}\n",
        ),
        (
            "src/service.ts",
            "import { removeUser } from './repo';\n\nexport async function deleteUser(id) {\n  return removeUser(id);\n}\n",
        ),
        (
            "src/repo.ts",
            "export async function removeUser(id) {\n  return prisma.user.delete({ where: { id } });\n}\n",
        ),
    ]);
    let engine = DriftEngine::open(dir.path()).unwrap();
    engine.full().unwrap();

    let paths = engine
        .reachability(None, &drift_rs::TraversalOptions::default())
        .unwrap();
    assert!(!paths.is_empty());
    let path = &paths[0];
    assert_eq!(path.nodes.first().unwrap(), "src/routes/user::handleDelete");
    assert_eq!(path.nodes.last().unwrap(), "src/repo::removeUser");
    // No node appears twice on one path.
    let unique: std::collections::HashSet<_> = path.nodes.iter().collect();
    assert_eq!(unique.len(), path.nodes.len());
}

#[test]
fn uninitialized_project_points_at_init() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = DriftEngine::open(dir.path()).unwrap_err();
    assert!(err.to_string().contains("run init first"));
}
