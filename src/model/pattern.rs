//! The pattern record: an inferred convention with evidence and
//! counter-evidence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::{DetectionMethod, Location, PatternCategory, Severity};

/// Lifecycle status of a pattern. The three statuses partition the live
/// pattern set; a pattern is in exactly one at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    /// Mined from the codebase, not yet reviewed
    Discovered,
    /// Reviewed and accepted as the project convention
    Approved,
    /// Reviewed and dismissed; resurrects only on re-detection
    Ignored,
}

impl PatternStatus {
    /// All statuses in partition order.
    pub const ALL: [PatternStatus; 3] = [
        PatternStatus::Discovered,
        PatternStatus::Approved,
        PatternStatus::Ignored,
    ];

    /// Stable name used for partition directories.
    pub fn as_str(self) -> &'static str {
        match self {
            PatternStatus::Discovered => "discovered",
            PatternStatus::Approved => "approved",
            PatternStatus::Ignored => "ignored",
        }
    }

    /// Parses the stable name back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }
}

impl fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Discrete confidence bands derived from the score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// score < 0.40
    Uncertain,
    /// 0.40 <= score < 0.65
    Low,
    /// 0.65 <= score < 0.85
    Medium,
    /// score >= 0.85
    High,
}

impl ConfidenceLevel {
    /// Band for a score in `[0, 1]`.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            ConfidenceLevel::High
        } else if score >= 0.65 {
            ConfidenceLevel::Medium
        } else if score >= 0.40 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::Uncertain
        }
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceLevel::Uncertain => "uncertain",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence accounting for a pattern.
///
/// `score` is always the deterministic blend of the four components; it is
/// recomputed on every merge rather than stored as free-standing truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    /// Matching locations over total files in scope, clamped to `[0, 1]`
    pub frequency: f64,
    /// Matching locations over matching plus outliers
    pub consistency: f64,
    /// Days since the pattern was first seen
    pub age_days: f64,
    /// Number of distinct files the evidence spans
    pub spread_file_count: usize,
    /// Blended score in `[0, 1]`
    pub score: f64,
    /// Discrete band for the score
    pub level: ConfidenceLevel,
}

impl Default for Confidence {
    fn default() -> Self {
        Self {
            frequency: 0.0,
            consistency: 0.0,
            age_days: 0.0,
            spread_file_count: 0,
            score: 0.0,
            level: ConfidenceLevel::Uncertain,
        }
    }
}

/// A location that deviates from the pattern's dominant form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    /// Where the deviation occurs
    pub location: Location,
    /// Human-readable reason for flagging
    pub reason: String,
    /// How far the occurrence deviates, in `[0, 1]`
    pub deviation_score: f64,
    /// A concrete replacement when the detector can produce one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

/// Bookkeeping metadata carried by every pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMetadata {
    /// First scan that produced this pattern
    pub first_seen: DateTime<Utc>,
    /// Most recent scan that produced evidence
    pub last_seen: DateTime<Utc>,
    /// Set when the pattern is approved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// Who approved it, when recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl PatternMetadata {
    /// Fresh metadata for a pattern first seen `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            approved_at: None,
            approved_by: None,
            tags: Vec::new(),
        }
    }
}

/// An inferred convention recorded with evidence (locations) and
/// counter-evidence (outliers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Stable id: `category/subcategory/local-slug`
    pub id: String,
    /// Human name
    pub name: String,
    /// What the convention is
    pub description: String,
    /// Closed category
    pub category: PatternCategory,
    /// Free subcategory string
    pub subcategory: String,
    /// How the detector found it
    pub detection_method: DetectionMethod,
    /// Confidence accounting
    pub confidence: Confidence,
    /// Severity inherited by violations
    pub severity: Severity,
    /// Evidence, sorted by `(file, line, column)`
    pub locations: Vec<Location>,
    /// Counter-evidence; disjoint from `locations` by `(file, line, column)`
    pub outliers: Vec<Outlier>,
    /// Bookkeeping
    pub metadata: PatternMetadata,
    /// Lifecycle status
    pub status: PatternStatus,
}

impl Pattern {
    /// Number of distinct files the evidence spans.
    pub fn spread(&self) -> usize {
        self.locations
            .iter()
            .map(|l| &l.file)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Sorts evidence and outliers into their canonical order.
    pub fn normalize(&mut self) {
        self.locations.sort();
        self.locations.dedup_by(|a, b| a.key() == b.key());
        self.outliers.sort_by(|a, b| a.location.cmp(&b.location));
        self.outliers
            .dedup_by(|a, b| a.location.key() == b.location.key());
        // A location cannot be both evidence and counter-evidence.
        let evidence: HashSet<_> = self
            .locations
            .iter()
            .map(|l| (l.file.clone(), l.line, l.column))
            .collect();
        self.outliers.retain(|o| {
            !evidence.contains(&(
                o.location.file.clone(),
                o.location.line,
                o.location.column,
            ))
        });
    }

    /// Checks the structural invariants a live pattern must satisfy.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.status == PatternStatus::Discovered && self.locations.is_empty() {
            return Err(format!("discovered pattern {} has zero locations", self.id));
        }
        if self.status == PatternStatus::Approved && self.metadata.approved_at.is_none() {
            return Err(format!("approved pattern {} missing approved_at", self.id));
        }
        let evidence: HashSet<_> = self.locations.iter().map(Location::key).collect();
        for outlier in &self.outliers {
            if evidence.contains(&outlier.location.key()) {
                return Err(format!(
                    "pattern {} lists {} as both location and outlier",
                    self.id, outlier.location
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_pattern() -> Pattern {
        Pattern {
            id: "api/route-structure/url-casing".into(),
            name: "URL casing".into(),
            description: "Routes use kebab-case segments".into(),
            category: PatternCategory::Api,
            subcategory: "route-structure".into(),
            detection_method: DetectionMethod::Regex,
            confidence: Confidence::default(),
            severity: Severity::Warning,
            locations: vec![
                Location::new("src/b.ts", 3, 1),
                Location::new("src/a.ts", 1, 1),
                Location::new("src/a.ts", 1, 1),
            ],
            outliers: vec![Outlier {
                location: Location::new("src/a.ts", 1, 1),
                reason: "camelCase segment".into(),
                deviation_score: 0.7,
                suggested_fix: None,
            }],
            metadata: PatternMetadata::new(Utc::now()),
            status: PatternStatus::Discovered,
        }
    }

    #[test]
    fn normalize_sorts_dedups_and_separates() {
        let mut pattern = sample_pattern();
        pattern.normalize();
        assert_eq!(pattern.locations.len(), 2);
        assert_eq!(pattern.locations[0].file, PathBuf::from("src/a.ts"));
        // The outlier collided with evidence and was dropped.
        assert!(pattern.outliers.is_empty());
        assert!(pattern.check_invariants().is_ok());
    }

    #[test]
    fn discovered_with_no_locations_is_invalid() {
        let mut pattern = sample_pattern();
        pattern.locations.clear();
        pattern.outliers.clear();
        assert!(pattern.check_invariants().is_err());
    }

    #[test]
    fn approved_requires_timestamp() {
        let mut pattern = sample_pattern();
        pattern.normalize();
        pattern.status = PatternStatus::Approved;
        assert!(pattern.check_invariants().is_err());
        pattern.metadata.approved_at = Some(Utc::now());
        assert!(pattern.check_invariants().is_ok());
    }

    #[test]
    fn confidence_levels() {
        assert_eq!(ConfidenceLevel::from_score(0.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.85), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.7), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.5), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.1), ConfidenceLevel::Uncertain);
    }
}
