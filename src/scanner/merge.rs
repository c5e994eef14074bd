//! Order-independent merge of detector outputs
//!
//! Workers return per-file detector outputs in whatever order the pool
//! finishes them; the coordinator folds them into a keyed accumulator.
//! Merging is commutative: locations and outliers are unioned and
//! deduplicated by `(file, line, column)`, so any partitioning of the same
//! file set produces the same patterns.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::detectors::{DetectorMeta, DetectorOutput};
use crate::model::{Location, Outlier, Pattern, PatternMetadata, PatternStatus};

use super::confidence;

/// One detector's output for one file, tagged for merging.
#[derive(Debug, Clone)]
pub struct FileDetection {
    /// File the output belongs to
    pub file: PathBuf,
    /// Detector that produced it
    pub detector_id: String,
    /// The output itself
    pub output: DetectorOutput,
}

#[derive(Debug, Default, Clone)]
struct PatternAccumulator {
    name: Option<String>,
    description: Option<String>,
    locations: BTreeMap<(PathBuf, usize, usize), Location>,
    outliers: BTreeMap<(PathBuf, usize, usize), Outlier>,
}

/// Keyed accumulator over `(detector_id, local_slug)`.
#[derive(Debug, Default, Clone)]
pub struct MergeAccumulator {
    map: BTreeMap<(String, String), PatternAccumulator>,
}

impl MergeAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one file's detector output in. Order-independent.
    pub fn add(&mut self, detection: &FileDetection) {
        for evidence in &detection.output.matches {
            let acc = self
                .map
                .entry((detection.detector_id.clone(), evidence.local_slug.clone()))
                .or_default();
            acc.name.get_or_insert_with(|| evidence.name.clone());
            acc.description
                .get_or_insert_with(|| evidence.description.clone());
            acc.locations.insert(
                (
                    evidence.location.file.clone(),
                    evidence.location.line,
                    evidence.location.column,
                ),
                evidence.location.clone(),
            );
        }
        for outlier in &detection.output.outliers {
            let acc = self
                .map
                .entry((detection.detector_id.clone(), outlier.local_slug.clone()))
                .or_default();
            acc.outliers.insert(
                (
                    outlier.outlier.location.file.clone(),
                    outlier.outlier.location.line,
                    outlier.outlier.location.column,
                ),
                outlier.outlier.clone(),
            );
        }
    }

    /// Unions another accumulator in. Used when chunks are merged.
    pub fn absorb(&mut self, other: MergeAccumulator) {
        for (key, acc) in other.map {
            let target = self.map.entry(key).or_default();
            if target.name.is_none() {
                target.name = acc.name;
            }
            if target.description.is_none() {
                target.description = acc.description;
            }
            target.locations.extend(acc.locations);
            target.outliers.extend(acc.outliers);
        }
    }

    /// Materializes the accumulated evidence into pattern records.
    ///
    /// `meta_for` resolves a detector id to its descriptor. Patterns with no
    /// surviving evidence are dropped: a discovered pattern with zero
    /// locations must not exist. Output is sorted by
    /// `(category, subcategory, id)`.
    pub fn into_patterns<'m, F>(
        self,
        meta_for: F,
        total_files_in_scope: usize,
        now: DateTime<Utc>,
    ) -> Vec<Pattern>
    where
        F: Fn(&str) -> Option<&'m DetectorMeta>,
    {
        let mut patterns = Vec::new();
        for ((detector_id, slug), acc) in self.map {
            let Some(meta) = meta_for(&detector_id) else {
                continue;
            };
            if acc.locations.is_empty() {
                continue;
            }
            let mut pattern = Pattern {
                id: format!("{}/{}", detector_id, slug),
                name: acc.name.unwrap_or_else(|| slug.clone()),
                description: acc.description.unwrap_or_default(),
                category: meta.category,
                subcategory: meta.subcategory.clone(),
                detection_method: meta.method,
                confidence: Default::default(),
                severity: meta.default_severity,
                locations: acc.locations.into_values().collect(),
                outliers: acc.outliers.into_values().collect(),
                metadata: PatternMetadata::new(now),
                status: PatternStatus::Discovered,
            };
            pattern.normalize();
            if pattern.locations.is_empty() {
                continue;
            }
            pattern.confidence = confidence::compute(
                pattern.locations.len(),
                pattern.outliers.len(),
                total_files_in_scope,
                pattern.spread(),
                pattern.metadata.first_seen,
                now,
            );
            patterns.push(pattern);
        }
        patterns.sort_by(|a, b| {
            (a.category, &a.subcategory, &a.id).cmp(&(b.category, &b.subcategory, &b.id))
        });
        patterns
    }
}
