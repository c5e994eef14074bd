//! Human-readable terminal rendering

use colored::Colorize;
use console::style;

use crate::model::Severity;
use crate::{ScanOutcome, StatusReport};

fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::Error => "error".red().bold().to_string(),
        Severity::Warning => "warning".yellow().to_string(),
        Severity::Info => "info".cyan().to_string(),
        Severity::Hint => "hint".dimmed().to_string(),
    }
}

/// Renders a scan outcome for a terminal.
pub fn render_human(outcome: &ScanOutcome) -> String {
    let result = &outcome.result;
    let mut out = String::new();

    out.push_str(&format!("{}\n\n", style("Scan Summary").bold().underlined()));
    out.push_str(&format!("  Files scanned:   {}\n", result.total_files));
    out.push_str(&format!("  Patterns:        {}\n", result.patterns.len()));
    out.push_str(&format!("  Violations:      {}\n", outcome.violations.len()));
    out.push_str(&format!("  Duration:        {} ms\n", result.duration_ms));
    if result.timed_out {
        out.push_str(&format!("  {}\n", "Timed out: results are partial".yellow()));
    }
    if result.cancelled {
        out.push_str(&format!("  {}\n", "Cancelled: nothing persisted".yellow()));
    }
    if !result.errors.is_empty() {
        out.push_str(&format!(
            "  Errors:          {} (non-fatal)\n",
            result.errors.len()
        ));
    }

    if let Some(boundary) = &outcome.boundary {
        out.push_str(&format!("\n{}\n", style("Boundaries").bold()));
        out.push_str(&format!(
            "  Access points:   {}\n",
            boundary.access_points.len()
        ));
        out.push_str(&format!(
            "  Sensitive fields: {}\n",
            boundary.sensitive_fields.len()
        ));
        if !boundary.secrets.is_empty() {
            out.push_str(&format!(
                "  {} {}\n",
                "Secrets:".red().bold(),
                boundary.secrets.len()
            ));
        }
    }

    if !outcome.violations.is_empty() {
        out.push_str(&format!("\n{}\n", style("Violations").bold()));
        for violation in outcome.violations.iter().take(50) {
            out.push_str(&format!(
                "  {} {} {} - {}\n",
                severity_label(violation.severity),
                violation.location,
                violation.pattern_id.dimmed(),
                violation.reason,
            ));
            if let Some(fix) = &violation.suggested_fix {
                out.push_str(&format!("      suggested: {}\n", fix.green()));
            }
        }
        if outcome.violations.len() > 50 {
            out.push_str(&format!(
                "  … and {} more\n",
                outcome.violations.len() - 50
            ));
        }
    }

    out
}

/// Renders a status report for a terminal.
pub fn render_status_human(status: &StatusReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", style("Project Status").bold().underlined()));
    out.push_str(&format!("  Project:      {}\n", status.project_name));
    out.push_str(&format!("  Id:           {}\n", status.project_id));
    match &status.last_scan {
        Some(when) => out.push_str(&format!("  Last scan:    {}\n", when.to_rfc3339())),
        None => out.push_str("  Last scan:    never\n"),
    }
    out.push_str("\n  Patterns\n");
    for (status_name, count) in &status.pattern_counts {
        out.push_str(&format!("    {:<12} {}\n", status_name, count));
    }
    if let Some(graph) = &status.graph {
        out.push_str(&format!("\n{}\n", style("Call Graph").bold()));
        out.push_str(&format!("  Functions:    {}\n", graph.node_count));
        out.push_str(&format!("  Calls:        {}\n", graph.edge_count));
        out.push_str(&format!(
            "  Resolved:     {:.1}%\n",
            graph.resolution_rate * 100.0
        ));
        out.push_str(&format!("  Entry points: {}\n", graph.entry_points));
        out.push_str(&format!("  Data access:  {}\n", graph.data_accessors));
    }
    out
}
