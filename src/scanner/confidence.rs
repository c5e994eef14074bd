//! Canonical confidence formula
//!
//! One formula, applied to every pattern after merge:
//!
//! ```text
//! frequency   = min(1, matching_locations / max(1, total_files_in_scope))
//! consistency = matching_locations / (matching_locations + outliers)
//! score       = 0.40·frequency + 0.40·consistency
//!             + 0.15·min(1, age_days/90) + 0.05·min(1, spread/10)
//! ```
//!
//! Bands: `>= 0.85` high, `>= 0.65` medium, `>= 0.40` low, else uncertain.

use chrono::{DateTime, Utc};

use crate::model::{Confidence, ConfidenceLevel};

const W_FREQUENCY: f64 = 0.40;
const W_CONSISTENCY: f64 = 0.40;
const W_AGE: f64 = 0.15;
const W_SPREAD: f64 = 0.05;

const AGE_SATURATION_DAYS: f64 = 90.0;
const SPREAD_SATURATION_FILES: f64 = 10.0;

/// Computes the confidence record for merged pattern evidence.
pub fn compute(
    matching_locations: usize,
    outliers: usize,
    total_files_in_scope: usize,
    spread_file_count: usize,
    first_seen: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Confidence {
    let frequency =
        (matching_locations as f64 / total_files_in_scope.max(1) as f64).min(1.0);
    let denominator = matching_locations + outliers;
    let consistency = if denominator == 0 {
        0.0
    } else {
        matching_locations as f64 / denominator as f64
    };
    let age_days = (now - first_seen).num_seconds().max(0) as f64 / 86_400.0;

    let score = W_FREQUENCY * frequency
        + W_CONSISTENCY * consistency
        + W_AGE * (age_days / AGE_SATURATION_DAYS).min(1.0)
        + W_SPREAD * (spread_file_count as f64 / SPREAD_SATURATION_FILES).min(1.0);

    Confidence {
        frequency,
        consistency,
        age_days,
        spread_file_count,
        score,
        level: ConfidenceLevel::from_score(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_consistent_pattern_scores_from_frequency_and_consistency() {
        let now = Utc::now();
        let confidence = compute(10, 0, 10, 10, now, now);
        assert!((confidence.frequency - 1.0).abs() < 1e-9);
        assert!((confidence.consistency - 1.0).abs() < 1e-9);
        // 0.40 + 0.40 + 0 age + 0.05 full spread
        assert!((confidence.score - 0.85).abs() < 1e-9);
        assert_eq!(confidence.level, ConfidenceLevel::High);
    }

    #[test]
    fn age_saturates_at_ninety_days() {
        let now = Utc::now();
        let old = now - Duration::days(365);
        let aged = compute(10, 0, 10, 10, old, now);
        assert!((aged.score - 1.0).abs() < 1e-9);

        let half = compute(10, 0, 10, 10, now - Duration::days(45), now);
        assert!((half.score - 0.925).abs() < 1e-3);
    }

    #[test]
    fn outliers_pull_consistency_down() {
        let now = Utc::now();
        let confidence = compute(6, 2, 10, 3, now, now);
        assert!((confidence.consistency - 0.75).abs() < 1e-9);
        assert!((confidence.frequency - 0.6).abs() < 1e-9);
        let expected = 0.40 * 0.6 + 0.40 * 0.75 + 0.05 * 0.3;
        assert!((confidence.score - expected).abs() < 1e-9);
        assert_eq!(confidence.level, ConfidenceLevel::Low);
    }

    #[test]
    fn zero_evidence_is_floor() {
        let now = Utc::now();
        let confidence = compute(0, 0, 10, 0, now, now);
        assert_eq!(confidence.score, 0.0);
        assert_eq!(confidence.level, ConfidenceLevel::Uncertain);
    }

    #[test]
    fn frequency_clamps_when_locations_exceed_files() {
        let now = Utc::now();
        let confidence = compute(25, 0, 10, 10, now, now);
        assert!((confidence.frequency - 1.0).abs() < 1e-9);
    }
}
