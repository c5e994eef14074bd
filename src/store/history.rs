//! Trend snapshots
//!
//! Every committed scan may append a snapshot of the store's aggregate
//! state under `history/snapshots/<iso-timestamp>.json`. Snapshots are
//! append-only; the only mutation is retention pruning, driven by a
//! count/age policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Result;
use crate::model::Pattern;

use super::write_json_atomic;

/// Retention policy for snapshots. Whichever rule prunes more wins.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Keep at most this many snapshots
    pub keep_last: usize,
    /// Drop snapshots older than this many days
    pub max_age_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_last: 30,
            max_age_days: 90,
        }
    }
}

/// One snapshot of aggregate store state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// Live patterns at the time
    pub total_patterns: usize,
    /// Pattern count per status
    pub by_status: BTreeMap<String, usize>,
    /// Pattern count per category
    pub by_category: BTreeMap<String, usize>,
    /// Violations surfaced by the scan that produced this snapshot
    pub violations_total: usize,
    /// Mean confidence score across patterns
    pub mean_confidence: f64,
}

/// Append-only snapshot store.
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    /// Creates a history store rooted at `history/snapshots`.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Takes and persists a snapshot, then applies retention.
    pub fn record<'p>(
        &self,
        patterns: impl Iterator<Item = &'p Pattern>,
        violations_total: usize,
        now: DateTime<Utc>,
        policy: &RetentionPolicy,
    ) -> Result<Snapshot> {
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        let mut total = 0usize;
        let mut confidence_sum = 0.0f64;
        for pattern in patterns {
            total += 1;
            confidence_sum += pattern.confidence.score;
            *by_status
                .entry(pattern.status.as_str().to_string())
                .or_insert(0) += 1;
            *by_category
                .entry(pattern.category.as_str().to_string())
                .or_insert(0) += 1;
        }
        let snapshot = Snapshot {
            taken_at: now,
            total_patterns: total,
            by_status,
            by_category,
            violations_total,
            mean_confidence: if total == 0 {
                0.0
            } else {
                confidence_sum / total as f64
            },
        };

        let name = format!("{}.json", now.format("%Y-%m-%dT%H-%M-%S%.3fZ"));
        write_json_atomic(&self.dir.join(name), &snapshot)?;
        self.prune(now, policy)?;
        Ok(snapshot)
    }

    /// Loads every retained snapshot, oldest first.
    pub fn load_all(&self) -> Result<Vec<Snapshot>> {
        let mut named = self.snapshot_files()?;
        named.sort();
        let mut snapshots = Vec::with_capacity(named.len());
        for path in named {
            let content = std::fs::read_to_string(&path)?;
            snapshots.push(serde_json::from_str(&content)?);
        }
        Ok(snapshots)
    }

    fn snapshot_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Applies the retention policy. Snapshot file names sort
    /// chronologically, so pruning works on names alone.
    fn prune(&self, now: DateTime<Utc>, policy: &RetentionPolicy) -> Result<()> {
        let mut files = self.snapshot_files()?;
        files.sort();

        let cutoff_name = format!(
            "{}.json",
            (now - chrono::Duration::days(policy.max_age_days))
                .format("%Y-%m-%dT%H-%M-%S%.3fZ")
        );
        let mut keep: Vec<&PathBuf> = files
            .iter()
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().as_ref() >= cutoff_name.as_str())
                    .unwrap_or(false)
            })
            .collect();
        if keep.len() > policy.keep_last {
            let drop_count = keep.len() - policy.keep_last;
            keep.drain(..drop_count);
        }
        let keep_set: std::collections::HashSet<&PathBuf> = keep.into_iter().collect();
        for path in &files {
            if !keep_set.contains(path) {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Confidence, DetectionMethod, Location, PatternCategory, PatternMetadata,
        PatternStatus, Severity,
    };
    use chrono::Duration;
    use tempfile::TempDir;

    fn pattern(score: f64) -> Pattern {
        Pattern {
            id: "api/route-structure/a".into(),
            name: "p".into(),
            description: String::new(),
            category: PatternCategory::Api,
            subcategory: "route-structure".into(),
            detection_method: DetectionMethod::Regex,
            confidence: Confidence {
                score,
                ..Default::default()
            },
            severity: Severity::Warning,
            locations: vec![Location::new("src/a.ts", 1, 1)],
            outliers: Vec::new(),
            metadata: PatternMetadata::new(Utc::now()),
            status: PatternStatus::Discovered,
        }
    }

    #[test]
    fn record_and_load() {
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::new(dir.path().join("snapshots"));
        let patterns = [pattern(0.8), pattern(0.4)];
        let snapshot = history
            .record(patterns.iter(), 3, Utc::now(), &RetentionPolicy::default())
            .unwrap();
        assert_eq!(snapshot.total_patterns, 2);
        assert!((snapshot.mean_confidence - 0.6).abs() < 1e-9);
        assert_eq!(snapshot.by_status["discovered"], 2);

        let loaded = history.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], snapshot);
    }

    #[test]
    fn count_retention_prunes_oldest() {
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::new(dir.path().join("snapshots"));
        let policy = RetentionPolicy {
            keep_last: 2,
            max_age_days: 90,
        };
        let base = Utc::now();
        for i in 0..4 {
            history
                .record(
                    [pattern(0.5)].iter(),
                    0,
                    base + Duration::seconds(i),
                    &policy,
                )
                .unwrap();
        }
        assert_eq!(history.load_all().unwrap().len(), 2);
    }

    #[test]
    fn age_retention_drops_stale_snapshots() {
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::new(dir.path().join("snapshots"));
        let policy = RetentionPolicy {
            keep_last: 10,
            max_age_days: 30,
        };
        let now = Utc::now();
        history
            .record([pattern(0.5)].iter(), 0, now - Duration::days(60), &policy)
            .unwrap();
        history
            .record([pattern(0.5)].iter(), 0, now, &policy)
            .unwrap();
        let loaded = history.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].taken_at.date_naive(), now.date_naive());
    }
}
