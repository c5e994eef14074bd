//! JSON rendering

use serde_json::json;

use crate::error::Result;
use crate::{ScanOutcome, StatusReport};

/// Renders a scan outcome as a stable JSON document.
pub fn render_json(outcome: &ScanOutcome) -> Result<String> {
    let result = &outcome.result;
    let document = json!({
        "version": env!("CARGO_PKG_VERSION"),
        "totalFiles": result.total_files,
        "durationMs": result.duration_ms,
        "timedOut": result.timed_out,
        "cancelled": result.cancelled,
        "persisted": outcome.persisted,
        "patterns": result.patterns,
        "violations": outcome.violations,
        "detectorStats": result.detector_stats,
        "workerStats": result.worker_stats,
        "errors": result.errors,
        "boundary": outcome.boundary.as_ref().map(|b| json!({
            "accessPoints": b.access_points.len(),
            "sensitiveFields": b.sensitive_fields.len(),
            "secrets": b.secrets.len(),
            "envIssues": b.env_issues.len(),
        })),
    });
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Renders a status report as JSON.
pub fn render_status_json(status: &StatusReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(status)?)
}
