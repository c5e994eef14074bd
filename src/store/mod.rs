//! Pattern & variant store
//!
//! Durable, status-partitioned storage for patterns under `.drift/patterns`.
//! Two physical layouts are supported behind one API: layered JSON (one
//! file per `(status, category)` tuple) and a unified single-document
//! database. Status transitions are atomic: both affected partitions are
//! rewritten in a single commit, with a backup restore if the second write
//! fails. Writers go through temp-then-rename; transient I/O failures are
//! retried with exponential backoff at this boundary.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::StoreLayout;
use crate::error::{Error, Result};
use crate::model::{
    Location, Pattern, PatternCategory, PatternStatus, Variant,
};

mod history;
mod layered;
mod migrate;
mod unified;
mod variants;

pub use history::{HistoryStore, RetentionPolicy, Snapshot};
pub use migrate::{migrate_layout, restore_backup};
pub use variants::{VariantInput, VariantManager};

/// How many times a transient write is retried before surfacing.
const IO_RETRIES: u32 = 3;

/// Serializes `value` to `path` via temp-then-rename, retrying transient
/// failures with exponential backoff.
pub(crate) fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("tmp");

    let mut attempt = 0;
    loop {
        let outcome = std::fs::write(&tmp, &payload)
            .and_then(|()| std::fs::rename(&tmp, path));
        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if is_transient(&e) && attempt < IO_RETRIES => {
                attempt += 1;
                std::thread::sleep(std::time::Duration::from_millis(10 << attempt));
            }
            Err(e) if is_transient(&e) => {
                return Err(Error::IoTransient {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::TimedOut
    )
}

/// The pattern store. Owns every persisted pattern; readers get snapshots.
pub struct PatternStore {
    root: PathBuf,
    layout: StoreLayout,
    patterns: BTreeMap<String, Pattern>,
    variants: VariantManager,
    history: HistoryStore,
}

impl PatternStore {
    /// Opens (without loading) a store rooted at the project's `.drift`
    /// directory.
    pub fn new(drift_dir: impl Into<PathBuf>, layout: StoreLayout) -> Self {
        let root = drift_dir.into();
        Self {
            variants: VariantManager::new(root.join("patterns").join("variants")),
            history: HistoryStore::new(root.join("history").join("snapshots")),
            root,
            layout,
            patterns: BTreeMap::new(),
        }
    }

    /// The `.drift` directory this store lives under.
    pub fn drift_dir(&self) -> &Path {
        &self.root
    }

    /// The active physical layout.
    pub fn layout(&self) -> StoreLayout {
        self.layout
    }

    /// Creates directories and loads all persisted patterns and variants.
    /// Absent files are tolerated; a fresh project loads empty.
    pub fn initialize(&mut self) -> Result<()> {
        std::fs::create_dir_all(self.patterns_dir())?;
        self.patterns = match self.layout {
            StoreLayout::Layered => layered::load_all(&self.patterns_dir())?,
            StoreLayout::Unified => unified::load_all(&self.patterns_dir())?,
        };
        self.variants.load()?;
        Ok(())
    }

    fn patterns_dir(&self) -> PathBuf {
        self.root.join("patterns")
    }

    /// Persists every live pattern in the active layout.
    pub fn save_all(&self) -> Result<()> {
        match self.layout {
            StoreLayout::Layered => layered::save_all(&self.patterns_dir(), &self.patterns),
            StoreLayout::Unified => unified::save_all(&self.patterns_dir(), &self.patterns),
        }
    }

    /// A snapshot of one pattern.
    pub fn get(&self, id: &str) -> Option<Pattern> {
        self.patterns.get(id).cloned()
    }

    /// Snapshots of all patterns in a category, any status.
    pub fn get_by_category(&self, category: PatternCategory) -> Vec<Pattern> {
        self.patterns
            .values()
            .filter(|p| p.category == category)
            .cloned()
            .collect()
    }

    /// Snapshots of all patterns in a status partition.
    pub fn get_by_status(&self, status: PatternStatus) -> Vec<Pattern> {
        self.patterns
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect()
    }

    /// Snapshots of every live pattern.
    pub fn all(&self) -> Vec<Pattern> {
        self.patterns.values().cloned().collect()
    }

    /// Number of live patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the store holds no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Approves a pattern: `discovered → approved` or `ignored → approved`
    /// (clearing ignore bookkeeping). Unknown ids are an error.
    pub fn approve(&mut self, id: &str, approved_by: Option<&str>) -> Result<Pattern> {
        let now = Utc::now();
        let pattern = self
            .patterns
            .get_mut(id)
            .ok_or_else(|| Error::pattern_not_found(id))?;
        let before = pattern.clone();
        let from = pattern.status;
        pattern.status = PatternStatus::Approved;
        pattern.metadata.approved_at = Some(now);
        pattern.metadata.approved_by = approved_by.map(str::to_string);
        pattern.metadata.tags.retain(|t| t != "ignored");
        let snapshot = pattern.clone();
        if let Err(e) = self.commit_transition(&snapshot, from) {
            // Disk was restored from backup; put memory back too.
            self.patterns.insert(id.to_string(), before);
            return Err(e);
        }
        Ok(snapshot)
    }

    /// Ignores a pattern: `discovered → ignored` or `approved → ignored`.
    pub fn ignore(&mut self, id: &str) -> Result<Pattern> {
        let pattern = self
            .patterns
            .get_mut(id)
            .ok_or_else(|| Error::pattern_not_found(id))?;
        let before = pattern.clone();
        let from = pattern.status;
        pattern.status = PatternStatus::Ignored;
        pattern.metadata.approved_at = None;
        pattern.metadata.approved_by = None;
        let snapshot = pattern.clone();
        if let Err(e) = self.commit_transition(&snapshot, from) {
            self.patterns.insert(id.to_string(), before);
            return Err(e);
        }
        Ok(snapshot)
    }

    /// Deletes a pattern outright, along with its variants.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let pattern = self
            .patterns
            .remove(id)
            .ok_or_else(|| Error::pattern_not_found(id))?;
        self.variants.delete_for_pattern(id)?;
        self.rewrite_partitions(&[(pattern.status, pattern.category)])
    }

    /// Commits a status transition: both affected partitions are rewritten
    /// together, restoring from backup if the commit fails partway.
    fn commit_transition(&self, pattern: &Pattern, from: PatternStatus) -> Result<()> {
        let mut touched = vec![(from, pattern.category)];
        if pattern.status != from {
            touched.push((pattern.status, pattern.category));
        }
        self.rewrite_partitions(&touched)
    }

    fn rewrite_partitions(&self, touched: &[(PatternStatus, PatternCategory)]) -> Result<()> {
        match self.layout {
            StoreLayout::Layered => {
                layered::rewrite_partitions(&self.patterns_dir(), &self.patterns, touched)
            }
            // The unified layout is one document; a single atomic write is
            // the whole commit.
            StoreLayout::Unified => unified::save_all(&self.patterns_dir(), &self.patterns),
        }
    }

    /// Folds a scan's patterns into the store.
    ///
    /// Existing patterns keep their status and approval bookkeeping and
    /// their original `first_seen`; `last_seen` refreshes to `now`.
    /// Patterns the scan no longer produces are destroyed. Confidence is
    /// recomputed against the true `first_seen`.
    pub fn commit_scan(
        &mut self,
        scanned: Vec<Pattern>,
        total_files_in_scope: usize,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut next: BTreeMap<String, Pattern> = BTreeMap::new();
        for mut pattern in scanned {
            if pattern.locations.is_empty() {
                continue;
            }
            if let Some(existing) = self.patterns.get(&pattern.id) {
                pattern.status = existing.status;
                pattern.metadata.first_seen =
                    existing.metadata.first_seen.min(pattern.metadata.first_seen);
                pattern.metadata.approved_at = existing.metadata.approved_at;
                pattern.metadata.approved_by = existing.metadata.approved_by.clone();
                pattern.metadata.tags = existing.metadata.tags.clone();
            }
            pattern.metadata.last_seen = now;
            pattern.confidence = crate::scanner::compute_confidence(
                pattern.locations.len(),
                pattern.outliers.len(),
                total_files_in_scope,
                pattern.spread(),
                pattern.metadata.first_seen,
                now,
            );
            if let Err(violation) = pattern.check_invariants() {
                return Err(Error::Internal(violation));
            }
            next.insert(pattern.id.clone(), pattern);
        }
        self.patterns = next;
        self.save_all()
    }

    /// Creates a variant for a pattern. The pattern must exist.
    pub fn create_variant(&mut self, input: VariantInput) -> Result<Variant> {
        if !self.patterns.contains_key(&input.pattern_id) {
            return Err(Error::pattern_not_found(&input.pattern_id));
        }
        self.variants.create(input)
    }

    /// Whether any variant of the pattern covers the location.
    pub fn is_location_covered(&self, pattern_id: &str, location: &Location) -> bool {
        self.variants.is_location_covered(pattern_id, location)
    }

    /// All variants, across patterns.
    pub fn variants(&self) -> Vec<Variant> {
        self.variants.all()
    }

    /// The variant manager, for hosts that manage variants directly.
    pub fn variants_mut(&mut self) -> &mut VariantManager {
        &mut self.variants
    }

    /// Records a trend snapshot of the current store contents.
    pub fn record_snapshot(
        &self,
        violations_total: usize,
        now: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> Result<Snapshot> {
        self.history
            .record(self.patterns.values(), violations_total, now, policy)
    }

    /// The history store.
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Verifies the partition invariant: the three statuses partition the
    /// live set. The in-memory map makes overlap impossible; this guards
    /// the on-disk representation after reload.
    pub fn check_partition_invariant(&self) -> Result<()> {
        let by_status: usize = PatternStatus::ALL
            .iter()
            .map(|&s| self.get_by_status(s).len())
            .sum();
        if by_status != self.patterns.len() {
            return Err(Error::Internal(format!(
                "status partitions cover {} patterns but {} are live",
                by_status,
                self.patterns.len()
            )));
        }
        Ok(())
    }
}
