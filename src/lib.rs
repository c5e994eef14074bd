//! drift-rs: a multi-language architectural drift detector
//!
//! drift-rs scans a source tree, infers the conventions the codebase
//! actually follows (route shapes, response envelopes, auth primitives,
//! error and logging styles, memoization hygiene), records them as
//! patterns with confidence scores, and flags the locations that deviate.
//! A second layer builds a cross-file call graph so every pattern and
//! data-access point can be traced back to reachable entry points for
//! impact analysis and security prioritization.
//!
//! # Quick Start
//!
//! ```no_run
//! use drift_rs::DriftEngine;
//!
//! let engine = DriftEngine::open(".")?;
//! let outcome = engine.scan(false)?;
//!
//! println!(
//!     "{} patterns, {} violations",
//!     outcome.result.patterns.len(),
//!     outcome.violations.len()
//! );
//! # Ok::<(), drift_rs::Error>(())
//! ```
//!
//! # Architecture
//!
//! - [`walker`]: filtered file walking with `.driftignore` support
//! - [`registry`]: detector registration and queries
//! - [`detectors`]: the convention-mining detector catalogue
//! - [`scanner`]: the parallel scan pipeline and merge
//! - [`store`]: the status-partitioned pattern & variant store
//! - [`boundaries`]: data-access, sensitivity, and secret analysis
//! - [`call_graph`]: incremental call-graph construction
//! - [`reachability`]: reachability, impact, and exposure queries
//! - [`workspace`]: project registry, context cache, schema migrations

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boundaries;
pub mod call_graph;
pub mod config;
pub mod detectors;
pub mod error;
pub mod language;
pub mod model;
pub mod output;
pub mod reachability;
pub mod registry;
pub mod scanner;
pub mod store;
pub mod walker;
pub mod workspace;

pub use config::DriftConfig;
pub use error::{Error, Result};

// Re-export the main working types for convenience
pub use call_graph::{CallGraph, GraphBuildResult, GraphBuilder};
pub use reachability::{ImpactResult, ReachabilityEngine, TraversalOptions};
pub use registry::DetectorRegistry;
pub use scanner::{ScanOptions, ScanResult, Scanner};
pub use store::PatternStore;
pub use workspace::WorkspaceManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use boundaries::{BoundaryAnalyzer, BoundaryReport};
use model::{Location, Pattern, PatternCategory, PatternStatus, Variant, Violation};
use scanner::PriorState;
use store::VariantInput;
use walker::FileWalker;

/// Everything one scan invocation produced.
#[derive(Debug)]
pub struct ScanOutcome {
    /// The raw scan result (patterns as merged, pre-commit)
    pub result: ScanResult,
    /// Violations surfaced to the user: outliers of discovered patterns,
    /// minus variant-covered locations
    pub violations: Vec<Violation>,
    /// Boundary report, when the feature is enabled
    pub boundary: Option<BoundaryReport>,
    /// Whether the store was updated (false on cancel/timeout)
    pub persisted: bool,
}

/// Summary served by `status` without re-scanning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// Project display name
    pub project_name: String,
    /// Project id
    pub project_id: String,
    /// When the last committed scan ran
    pub last_scan: Option<DateTime<Utc>>,
    /// Live pattern counts per status
    pub pattern_counts: BTreeMap<String, usize>,
    /// Call graph statistics, when a graph has been built
    pub graph: Option<call_graph::GraphStats>,
}

/// Filters for [`DriftEngine::query_patterns`].
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    /// Match this status
    pub status: Option<PatternStatus>,
    /// Match this category
    pub category: Option<PatternCategory>,
    /// Minimum confidence score
    pub min_confidence: Option<f64>,
}

/// The façade hosts drive: one engine per open project.
///
/// The engine is an explicit context object; there is no process-wide
/// singleton. Shells construct one at the command boundary and thread it
/// through.
pub struct DriftEngine {
    root: PathBuf,
    config: DriftConfig,
    registry: DetectorRegistry,
}

impl std::fmt::Debug for DriftEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftEngine")
            .field("root", &self.root)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DriftEngine {
    /// Opens an initialized project. Fails with an actionable message when
    /// the project has no `.drift/config.json` yet.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config_path = root.join(".drift").join("config.json");
        if !config_path.is_file() {
            return Err(Error::InvalidArgument(format!(
                "{} is not initialized; run init first",
                root.display()
            )));
        }
        let config = DriftConfig::from_file(&config_path)?;
        Ok(Self {
            root,
            config,
            registry: DetectorRegistry::with_defaults(),
        })
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The project's `.drift` directory.
    pub fn drift_dir(&self) -> PathBuf {
        self.root.join(".drift")
    }

    /// The loaded configuration.
    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// The detector registry, for hosts that tune the catalogue.
    pub fn registry_mut(&mut self) -> &mut DetectorRegistry {
        &mut self.registry
    }

    fn walker(&self) -> Result<FileWalker> {
        Ok(FileWalker::new(&self.root, &self.config.ignore)?
            .with_max_file_size(self.config.scan.max_file_size))
    }

    fn open_store(&self) -> Result<PatternStore> {
        let mut store = PatternStore::new(self.drift_dir(), self.config.scan.store_layout);
        store.initialize()?;
        Ok(store)
    }

    /// Runs a scan and commits the results.
    ///
    /// With `incremental` set, only files whose content hash changed since
    /// the last manifest are re-detected, provided the project's dominance
    /// inputs are unchanged.
    pub fn scan(&self, incremental: bool) -> Result<ScanOutcome> {
        self.scan_with_options(ScanOptions {
            incremental,
            ..ScanOptions::from_config(&self.config.scan)
        })
    }

    /// Runs a scan with explicit options.
    pub fn scan_with_options(&self, options: ScanOptions) -> Result<ScanOutcome> {
        let drift_dir = self.drift_dir();
        let walker = self.walker()?;
        let (files, walk_errors) = walker.collect_files();

        let mut store = self.open_store()?;
        let manifest_path = drift_dir.join("manifest.json");
        let previous_manifest = scanner::ScanManifest::load(&manifest_path)?;
        let previous_patterns = store.all();
        let variants = store.variants();

        let scanner = Scanner::new(&self.registry);
        let result = scanner.scan(
            &files,
            &walk_errors,
            PriorState {
                manifest: previous_manifest.as_ref(),
                patterns: &previous_patterns,
                variants: &variants,
            },
            &options,
        );

        if result.cancelled || result.timed_out {
            return Ok(ScanOutcome {
                violations: Vec::new(),
                boundary: None,
                persisted: false,
                result,
            });
        }

        store.commit_scan(result.patterns.clone(), result.total_files, options.now)?;
        result.manifest.save(&manifest_path)?;

        // Violations surface only for discovered patterns: approval means
        // the evidence was reviewed, ignoring means it was dismissed.
        let discovered = store.get_by_status(PatternStatus::Discovered);
        let violations = scanner::materialize_violations(&discovered, &variants);

        let boundary = if self.config.features.boundaries {
            let report = BoundaryAnalyzer::new().scan(&files);
            report.save(&drift_dir)?;
            Some(report)
        } else {
            None
        };

        store.record_snapshot(
            violations.len(),
            options.now,
            &store::RetentionPolicy {
                keep_last: self.config.history.keep_last,
                max_age_days: self.config.history.max_age_days,
            },
        )?;

        Ok(ScanOutcome {
            result,
            violations,
            boundary,
            persisted: true,
        })
    }

    /// Builds (or incrementally rebuilds) the call graph, using stored
    /// route patterns and the access map as tagging hints.
    pub fn build_call_graph(&self) -> Result<GraphBuildResult> {
        let drift_dir = self.drift_dir();
        let walker = self.walker()?;
        let (files, _) = walker.collect_files();

        let store = self.open_store()?;
        let route_locations: Vec<Location> = store
            .get_by_category(PatternCategory::Api)
            .into_iter()
            .filter(|p| p.subcategory == "route-structure")
            .flat_map(|p| p.locations)
            .collect();
        let access_points = BoundaryReport::load(&drift_dir)?
            .map(|r| r.access_points)
            .unwrap_or_default();

        let builder = GraphBuilder::new(&drift_dir);
        let (_, result) = builder.build(&files, &route_locations, &access_points)?;
        Ok(result)
    }

    /// Full pipeline: scan, then call graph when the feature is on.
    pub fn full(&self) -> Result<(ScanOutcome, Option<GraphBuildResult>)> {
        let outcome = self.scan(false)?;
        let graph = if self.config.features.call_graph && outcome.persisted {
            Some(self.build_call_graph()?)
        } else {
            None
        };
        Ok((outcome, graph))
    }

    /// Status summary from caches; never re-scans.
    pub fn status(&self) -> Result<StatusReport> {
        let drift_dir = self.drift_dir();
        let store = self.open_store()?;
        let manifest = scanner::ScanManifest::load(&drift_dir.join("manifest.json"))?;
        let graph = {
            let graph = CallGraph::load(&drift_dir)?;
            if graph.stats().node_count > 0 {
                Some(graph.stats())
            } else {
                None
            }
        };
        let mut pattern_counts = BTreeMap::new();
        for status in PatternStatus::ALL {
            pattern_counts.insert(
                status.as_str().to_string(),
                store.get_by_status(status).len(),
            );
        }
        Ok(StatusReport {
            project_name: self.config.project.name.clone(),
            project_id: self.config.project.id.clone(),
            last_scan: manifest.map(|m| m.last_scan),
            pattern_counts,
            graph,
        })
    }

    /// Approves a pattern.
    pub fn approve(&self, id: &str, approved_by: Option<&str>) -> Result<Pattern> {
        let mut store = self.open_store()?;
        store.approve(id, approved_by)
    }

    /// Ignores a pattern.
    pub fn ignore(&self, id: &str) -> Result<Pattern> {
        let mut store = self.open_store()?;
        store.ignore(id)
    }

    /// Creates a variant over a pattern.
    pub fn create_variant(&self, input: VariantInput) -> Result<Variant> {
        let mut store = self.open_store()?;
        store.create_variant(input)
    }

    /// Queries patterns from the store without re-scanning.
    pub fn query_patterns(&self, filter: &PatternFilter) -> Result<Vec<Pattern>> {
        let store = self.open_store()?;
        let mut patterns: Vec<Pattern> = store
            .all()
            .into_iter()
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .filter(|p| filter.category.map_or(true, |c| p.category == c))
            .filter(|p| {
                filter
                    .min_confidence
                    .map_or(true, |min| p.confidence.score >= min)
            })
            .collect();
        patterns.sort_by(|a, b| {
            (a.category, &a.subcategory, &a.id).cmp(&(b.category, &b.subcategory, &b.id))
        });
        Ok(patterns)
    }

    /// Impact of a change set, served from the persisted graph.
    pub fn impact(&self, files: &[PathBuf], max_depth: usize) -> Result<ImpactResult> {
        let graph = CallGraph::load(&self.drift_dir())?;
        Ok(ReachabilityEngine::new(&graph).impact_of_changes(files, max_depth))
    }

    /// Entry-point-to-data-accessor paths, served from the persisted
    /// graph.
    pub fn reachability(
        &self,
        from: Option<&[String]>,
        options: &TraversalOptions,
    ) -> Result<Vec<reachability::ReachPath>> {
        let graph = CallGraph::load(&self.drift_dir())?;
        let engine = ReachabilityEngine::new(&graph);
        Ok(engine.reachability(from, reachability::data_accessor_sink, options))
    }
}
