//! Scan pipeline: walk output in, patterns and violations out
//!
//! The scanner partitions files across a bounded worker pool, runs the
//! observe phase to learn the project's dominant forms, then runs the
//! detect phase and merges per-file outputs into pattern records. Workers
//! never throw: per-file failures are captured, a crashed chunk is retried
//! once on the coordinator thread, and everything else lands in
//! `ScanResult::errors`.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ScanConfig;
use crate::detectors::{CommentMap, DetectContext, LineIndex, ProjectSummary};
use crate::model::{Pattern, Variant, Violation};
use crate::registry::DetectorRegistry;
use crate::walker::{WalkError, WalkedFile};

mod confidence;
mod incremental;
mod merge;

pub use confidence::compute as compute_confidence;
pub use incremental::{content_hash, count_observations, FileEntry, ScanManifest};
pub use merge::{FileDetection, MergeAccumulator};

/// Cancellation token honored at file boundaries and before store writes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Tuning for one scan invocation.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Re-scan only changed files, reusing prior evidence
    pub incremental: bool,
    /// Overall scan timeout
    pub timeout: Duration,
    /// Worker pool size
    pub threads: usize,
    /// Per-file match cap
    pub max_matches_per_file: usize,
    /// Scan timestamp; injected so results are reproducible
    pub now: DateTime<Utc>,
}

impl ScanOptions {
    /// Derives options from the project scan config.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            incremental: false,
            timeout: Duration::from_secs(config.timeout_secs),
            threads: config.effective_threads(),
            max_matches_per_file: config.max_matches_per_file,
            now: Utc::now(),
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

/// Prior state an incremental scan builds on.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorState<'a> {
    /// Manifest of the last committed scan
    pub manifest: Option<&'a ScanManifest>,
    /// Patterns currently in the store
    pub patterns: &'a [Pattern],
    /// Sanctioned variants; covered locations never become violations
    pub variants: &'a [Variant],
}

/// A problem recorded during the scan. Never fatal to the scan itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanIssue {
    /// File involved, when the issue is file-scoped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Detector involved, when the issue is detector-scoped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
    /// What happened
    pub message: String,
}

/// Per-file scan statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    /// Evidence count across detectors
    pub matches: usize,
    /// Outlier count across detectors
    pub outliers: usize,
    /// Detectors that ran on the file
    pub detectors_run: usize,
    /// Whether any detector hit the per-file cap
    pub truncated: bool,
}

/// Per-detector scan statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStats {
    /// Files the detector ran on
    pub files: usize,
    /// Total time spent in the detector, microseconds
    pub duration_us: u64,
    /// Evidence emitted
    pub matches: usize,
    /// Outliers emitted
    pub outliers: usize,
}

/// Worker pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Pool size used
    pub workers: usize,
    /// Files per chunk
    pub chunk_sizes: Vec<usize>,
    /// Chunks that crashed and were retried on the coordinator
    pub retried_chunks: usize,
}

/// Everything a scan produces.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Patterns, sorted by `(category, subcategory, id)`
    pub patterns: Vec<Pattern>,
    /// Violations, variant-filtered, sorted by `(pattern_id, location)`
    pub violations: Vec<Violation>,
    /// Per-file statistics
    pub per_file_stats: BTreeMap<PathBuf, FileStats>,
    /// Per-detector statistics
    pub detector_stats: BTreeMap<String, DetectorStats>,
    /// Worker pool statistics
    pub worker_stats: WorkerStats,
    /// Non-fatal problems encountered
    pub errors: Vec<ScanIssue>,
    /// Manifest describing this scan, for the next incremental run
    pub manifest: ScanManifest,
    /// Files in scope
    pub total_files: usize,
    /// The timeout fired and the result is partial
    pub timed_out: bool,
    /// Cancellation fired; partial work was discarded
    pub cancelled: bool,
    /// Wall-clock duration
    pub duration_ms: u64,
}

struct LoadedFile {
    walked: WalkedFile,
    content: String,
    hash: String,
    size: u64,
    form_counts: BTreeMap<String, BTreeMap<String, usize>>,
}

/// The scan coordinator.
pub struct Scanner<'r> {
    registry: &'r DetectorRegistry,
    cancel: CancellationToken,
}

impl<'r> Scanner<'r> {
    /// Creates a scanner over the given registry.
    pub fn new(registry: &'r DetectorRegistry) -> Self {
        Self {
            registry,
            cancel: CancellationToken::new(),
        }
    }

    /// The cancellation token for this scanner.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs a scan over the walked files.
    ///
    /// `walk_errors` from the file walker are folded into the result's
    /// error list so hosts see one aggregate.
    pub fn scan(
        &self,
        files: &[WalkedFile],
        walk_errors: &[WalkError],
        prior: PriorState<'_>,
        options: &ScanOptions,
    ) -> ScanResult {
        let started = Instant::now();
        let deadline = started + options.timeout;
        let mut errors: Vec<ScanIssue> = walk_errors.iter().map(issue_from_walk).collect();
        let mut timed_out = false;

        // Phase 1: load + observe. Content is read once and kept for the
        // detect phase.
        let load_chunk_sizes = chunk_sizes(files.len(), options.threads);
        let chunks = make_chunks(files, &load_chunk_sizes);
        let mut worker_stats = WorkerStats {
            workers: options.threads,
            chunk_sizes: load_chunk_sizes.clone(),
            retried_chunks: 0,
        };

        let load_results: Vec<(Vec<LoadedFile>, Vec<ScanIssue>, bool)> = chunks
            .par_iter()
            .map(|chunk| self.load_chunk(chunk, deadline))
            .collect();

        let mut loaded: Vec<LoadedFile> = Vec::with_capacity(files.len());
        for (chunk_loaded, chunk_errors, chunk_timed_out) in load_results {
            loaded.extend(chunk_loaded);
            errors.extend(chunk_errors);
            timed_out |= chunk_timed_out;
        }
        if self.cancel.is_cancelled() {
            return self.cancelled_result(options, started, errors, files.len());
        }

        // Phase 2: dominance summary over every loaded file.
        let mut summary = ProjectSummary {
            total_files: loaded.len(),
            ..Default::default()
        };
        for file in &loaded {
            for (key, forms) in &file.form_counts {
                let slot = summary.form_counts.entry(key.clone()).or_default();
                for (form, count) in forms {
                    *slot.entry(form.clone()).or_insert(0) += count;
                }
            }
        }

        // Incremental fast path: detect only changed files when every
        // dominance input is unchanged, otherwise fall back to a full pass.
        let current_hashes: BTreeMap<PathBuf, String> = loaded
            .iter()
            .map(|f| (f.walked.relative_path.clone(), f.hash.clone()))
            .collect();
        let (detect_set, reuse_set): (BTreeSet<PathBuf>, BTreeSet<PathBuf>) =
            match (options.incremental, prior.manifest) {
                (true, Some(manifest)) => {
                    let (changed, _removed) = manifest.changed_files(&current_hashes);
                    let totals: BTreeMap<_, _> = summary
                        .form_counts
                        .iter()
                        .map(|(k, v)| {
                            (k.clone(), v.iter().map(|(f, c)| (f.clone(), *c)).collect())
                        })
                        .collect();
                    if totals == manifest.total_form_counts() {
                        let reuse = current_hashes
                            .keys()
                            .filter(|p| !changed.contains(*p))
                            .cloned()
                            .collect();
                        (changed, reuse)
                    } else {
                        log::info!("dominance inputs shifted; incremental scan widened to full");
                        (current_hashes.keys().cloned().collect(), BTreeSet::new())
                    }
                }
                _ => (current_hashes.keys().cloned().collect(), BTreeSet::new()),
            };

        // Phase 3: detect.
        let to_detect: Vec<&LoadedFile> = loaded
            .iter()
            .filter(|f| detect_set.contains(&f.walked.relative_path))
            .collect();
        let detect_chunk_sizes = chunk_sizes(to_detect.len(), options.threads);
        let detect_chunks = make_chunks(&to_detect, &detect_chunk_sizes);

        let detect_results: Vec<std::thread::Result<ChunkDetections>> = detect_chunks
            .par_iter()
            .map(|chunk| {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    self.detect_chunk(chunk, &summary, options, deadline)
                }))
            })
            .collect();

        let mut detections: Vec<FileDetection> = Vec::new();
        let mut per_file_stats: BTreeMap<PathBuf, FileStats> = BTreeMap::new();
        let mut detector_stats: BTreeMap<String, DetectorStats> = BTreeMap::new();

        for (index, outcome) in detect_results.into_iter().enumerate() {
            let chunk = &detect_chunks[index];
            let bundle = match outcome {
                Ok(bundle) => bundle,
                Err(_) => {
                    // Crashed chunk: retry once on this thread, isolating
                    // each file so one poisoned input costs only itself.
                    worker_stats.retried_chunks += 1;
                    let mut retried = ChunkDetections::default();
                    for file in chunk.iter().copied() {
                        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
                            || self.detect_chunk(&[file], &summary, options, deadline),
                        ));
                        match result {
                            Ok(one) => retried.merge(one),
                            Err(_) => retried.errors.push(ScanIssue {
                                file: Some(file.walked.relative_path.clone()),
                                detector: None,
                                message: "detector crashed twice; file excluded from merge"
                                    .into(),
                            }),
                        }
                    }
                    retried
                }
            };
            detections.extend(bundle.detections);
            errors.extend(bundle.errors);
            timed_out |= bundle.timed_out;
            for (path, stats) in bundle.per_file {
                per_file_stats.insert(path, stats);
            }
            for (id, stats) in bundle.per_detector {
                let slot = detector_stats.entry(id).or_default();
                slot.files += stats.files;
                slot.duration_us += stats.duration_us;
                slot.matches += stats.matches;
                slot.outliers += stats.outliers;
            }
        }

        if self.cancel.is_cancelled() {
            return self.cancelled_result(options, started, errors, files.len());
        }

        // Phase 4: merge. Incremental runs seed the accumulator with the
        // prior evidence of files that were not re-scanned.
        let mut accumulator = MergeAccumulator::new();
        if !reuse_set.is_empty() {
            seed_from_previous(&mut accumulator, prior.patterns, &reuse_set);
        }
        for detection in &detections {
            accumulator.add(detection);
        }
        let patterns = accumulator.into_patterns(
            |id| self.registry.info(id),
            loaded.len(),
            options.now,
        );

        // Phase 5: violations, minus variant-covered locations.
        let violations = materialize_violations(&patterns, prior.variants);

        // Phase 6: next manifest.
        let mut manifest = ScanManifest::empty(options.now);
        for file in &loaded {
            manifest.files.insert(
                file.walked.relative_path.clone(),
                FileEntry {
                    content_hash: file.hash.clone(),
                    size: file.size,
                    form_counts: file.form_counts.clone(),
                },
            );
        }

        ScanResult {
            patterns,
            violations,
            per_file_stats,
            detector_stats,
            worker_stats,
            errors,
            manifest,
            total_files: loaded.len(),
            timed_out,
            cancelled: false,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn load_chunk(
        &self,
        chunk: &[WalkedFile],
        deadline: Instant,
    ) -> (Vec<LoadedFile>, Vec<ScanIssue>, bool) {
        let mut loaded = Vec::with_capacity(chunk.len());
        let mut errors = Vec::new();
        let mut timed_out = false;
        for file in chunk {
            if self.cancel.is_cancelled() {
                break;
            }
            if Instant::now() > deadline {
                timed_out = true;
                break;
            }
            let content = match std::fs::read_to_string(&file.absolute_path) {
                Ok(content) => content,
                Err(e) => {
                    errors.push(ScanIssue {
                        file: Some(file.relative_path.clone()),
                        detector: None,
                        message: format!("read failed: {}", e),
                    });
                    continue;
                }
            };
            let hash = content_hash(&content);
            let size = content.len() as u64;
            let observations = self.observe_file(file, &content);
            loaded.push(LoadedFile {
                walked: file.clone(),
                form_counts: count_observations(&observations),
                content,
                hash,
                size,
            });
        }
        (loaded, errors, timed_out)
    }

    fn observe_file(
        &self,
        file: &WalkedFile,
        content: &str,
    ) -> Vec<crate::detectors::FormObservation> {
        let comments = CommentMap::build(content, file.language);
        let lines = LineIndex::build(content);
        let empty = ProjectSummary::default();
        let ctx = DetectContext {
            content,
            path: &file.relative_path,
            language: file.language,
            comments: &comments,
            lines: &lines,
            summary: &empty,
            max_matches: usize::MAX,
            now: Utc::now(),
        };
        let mut observations = Vec::new();
        for detector in self
            .registry
            .enabled_for_file(&file.relative_path, file.language)
        {
            observations.extend(detector.observe(&ctx));
        }
        observations
    }

    fn detect_chunk(
        &self,
        chunk: &[&LoadedFile],
        summary: &ProjectSummary,
        options: &ScanOptions,
        deadline: Instant,
    ) -> ChunkDetections {
        let mut bundle = ChunkDetections::default();
        for file in chunk {
            if self.cancel.is_cancelled() {
                break;
            }
            if Instant::now() > deadline {
                bundle.timed_out = true;
                break;
            }
            let comments = CommentMap::build(&file.content, file.walked.language);
            let lines = LineIndex::build(&file.content);
            let ctx = DetectContext {
                content: &file.content,
                path: &file.walked.relative_path,
                language: file.walked.language,
                comments: &comments,
                lines: &lines,
                summary,
                max_matches: options.max_matches_per_file,
                now: options.now,
            };
            let mut file_stats = FileStats::default();
            for detector in self
                .registry
                .enabled_for_file(&file.walked.relative_path, file.walked.language)
            {
                let id = detector.meta().id.clone();
                let timer = Instant::now();
                let output = match std::panic::catch_unwind(
                    std::panic::AssertUnwindSafe(|| detector.detect(&ctx)),
                ) {
                    Ok(output) => output,
                    Err(_) => {
                        bundle.errors.push(ScanIssue {
                            file: Some(file.walked.relative_path.clone()),
                            detector: Some(id.clone()),
                            message: "detector panicked; file skipped for this detector"
                                .into(),
                        });
                        continue;
                    }
                };
                let elapsed = timer.elapsed().as_micros() as u64;
                file_stats.matches += output.matches.len();
                file_stats.outliers += output.outliers.len();
                file_stats.detectors_run += 1;
                file_stats.truncated |= output.truncated;

                let slot = bundle.per_detector.entry(id.clone()).or_default();
                slot.files += 1;
                slot.duration_us += elapsed;
                slot.matches += output.matches.len();
                slot.outliers += output.outliers.len();

                bundle.detections.push(FileDetection {
                    file: file.walked.relative_path.clone(),
                    detector_id: id,
                    output,
                });
            }
            bundle
                .per_file
                .insert(file.walked.relative_path.clone(), file_stats);
        }
        bundle
    }

    fn cancelled_result(
        &self,
        options: &ScanOptions,
        started: Instant,
        errors: Vec<ScanIssue>,
        total_files: usize,
    ) -> ScanResult {
        ScanResult {
            patterns: Vec::new(),
            violations: Vec::new(),
            per_file_stats: BTreeMap::new(),
            detector_stats: BTreeMap::new(),
            worker_stats: WorkerStats::default(),
            errors,
            manifest: ScanManifest::empty(options.now),
            total_files,
            timed_out: false,
            cancelled: true,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Default)]
struct ChunkDetections {
    detections: Vec<FileDetection>,
    errors: Vec<ScanIssue>,
    per_file: BTreeMap<PathBuf, FileStats>,
    per_detector: BTreeMap<String, DetectorStats>,
    timed_out: bool,
}

impl ChunkDetections {
    fn merge(&mut self, other: ChunkDetections) {
        self.detections.extend(other.detections);
        self.errors.extend(other.errors);
        self.per_file.extend(other.per_file);
        for (id, stats) in other.per_detector {
            let slot = self.per_detector.entry(id).or_default();
            slot.files += stats.files;
            slot.duration_us += stats.duration_us;
            slot.matches += stats.matches;
            slot.outliers += stats.outliers;
        }
        self.timed_out |= other.timed_out;
    }
}

fn issue_from_walk(error: &WalkError) -> ScanIssue {
    match error {
        WalkError::Entry { path, message } => ScanIssue {
            file: path.clone(),
            detector: None,
            message: message.clone(),
        },
        WalkError::Oversized { path, size } => ScanIssue {
            file: Some(path.clone()),
            detector: None,
            message: format!("skipped: {} bytes exceeds the file size cap", size),
        },
    }
}

/// Splits `total` into `workers` roughly equal chunk sizes.
fn chunk_sizes(total: usize, workers: usize) -> Vec<usize> {
    let workers = workers.max(1);
    if total == 0 {
        return Vec::new();
    }
    let base = total / workers;
    let remainder = total % workers;
    (0..workers.min(total))
        .map(|i| base + usize::from(i < remainder))
        .filter(|&size| size > 0)
        .collect()
}

fn make_chunks<'a, T>(items: &'a [T], sizes: &[usize]) -> Vec<&'a [T]> {
    let mut chunks = Vec::with_capacity(sizes.len());
    let mut start = 0;
    for &size in sizes {
        chunks.push(&items[start..start + size]);
        start += size;
    }
    chunks
}

/// Seeds the accumulator with stored evidence for files that were not
/// re-scanned this run.
fn seed_from_previous(
    accumulator: &mut MergeAccumulator,
    previous: &[Pattern],
    reuse: &BTreeSet<PathBuf>,
) {
    use crate::detectors::{DetectorOutput, OutlierEvidence, PatternEvidence};
    for pattern in previous {
        let Some((detector_id, slug)) = pattern.id.rsplit_once('/') else {
            continue;
        };
        let matches: Vec<PatternEvidence> = pattern
            .locations
            .iter()
            .filter(|l| reuse.contains(&l.file))
            .map(|l| PatternEvidence {
                local_slug: slug.to_string(),
                name: pattern.name.clone(),
                description: pattern.description.clone(),
                location: l.clone(),
            })
            .collect();
        let outliers: Vec<OutlierEvidence> = pattern
            .outliers
            .iter()
            .filter(|o| reuse.contains(&o.location.file))
            .map(|o| OutlierEvidence {
                local_slug: slug.to_string(),
                outlier: o.clone(),
            })
            .collect();
        if matches.is_empty() && outliers.is_empty() {
            continue;
        }
        accumulator.add(&FileDetection {
            file: PathBuf::new(),
            detector_id: detector_id.to_string(),
            output: DetectorOutput {
                matches,
                outliers,
                confidence: 0.0,
                truncated: false,
            },
        });
    }
}

/// Projects pattern outliers into violations, dropping variant-covered
/// locations. Output is sorted by `(pattern_id, file, line, column)`.
pub fn materialize_violations(patterns: &[Pattern], variants: &[Variant]) -> Vec<Violation> {
    let mut by_pattern: HashMap<&str, Vec<&Variant>> = HashMap::new();
    for variant in variants {
        by_pattern
            .entry(variant.pattern_id.as_str())
            .or_default()
            .push(variant);
    }
    let mut violations = Vec::new();
    for pattern in patterns {
        let covering = by_pattern.get(pattern.id.as_str());
        for outlier in &pattern.outliers {
            let covered = covering
                .map(|vs| vs.iter().any(|v| v.covers(&outlier.location)))
                .unwrap_or(false);
            if !covered {
                violations.push(Violation::from_outlier(pattern, outlier));
            }
        }
    }
    violations.sort_by(|a, b| {
        (
            &a.pattern_id,
            &a.location.file,
            a.location.line,
            a.location.column,
        )
            .cmp(&(
                &b.pattern_id,
                &b.location.file,
                b.location.line,
                b.location.column,
            ))
    });
    violations
}
