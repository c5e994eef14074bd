//! The violation projection surfaced to hosts

use serde::{Deserialize, Serialize};

use super::{Location, Outlier, Pattern, Severity};

/// A runtime projection of an outlier plus its pattern metadata, keyed by
/// `(pattern_id, file, line, column)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Id of the pattern being deviated from
    pub pattern_id: String,
    /// Pattern's human name, denormalized for display
    pub pattern_name: String,
    /// Where the deviation occurs
    pub location: Location,
    /// Why it was flagged
    pub reason: String,
    /// Severity, inherited from the pattern unless overridden in config
    pub severity: Severity,
    /// How far the occurrence deviates, in `[0, 1]`
    pub deviation_score: f64,
    /// A concrete replacement when the detector produced one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl Violation {
    /// Projects an outlier through its owning pattern.
    pub fn from_outlier(pattern: &Pattern, outlier: &Outlier) -> Self {
        Self {
            pattern_id: pattern.id.clone(),
            pattern_name: pattern.name.clone(),
            location: outlier.location.clone(),
            reason: outlier.reason.clone(),
            severity: pattern.severity,
            deviation_score: outlier.deviation_score,
            suggested_fix: outlier.suggested_fix.clone(),
        }
    }

    /// The composite key violations are deduplicated by.
    pub fn key(&self) -> (&str, &std::path::PathBuf, usize, usize) {
        (
            self.pattern_id.as_str(),
            &self.location.file,
            self.location.line,
            self.location.column,
        )
    }
}
