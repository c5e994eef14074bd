//! Report rendering for the CLI shell
//!
//! The library computes; this module presents. Two formats: `human` for
//! terminals (colored, sectioned) and `json` for machine consumers.

use serde::{Deserialize, Serialize};
use std::fmt;

mod console;
mod json;

pub use console::{render_human, render_status_human};
pub use json::{render_json, render_status_json};

/// Available output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable terminal output
    Human,
    /// JSON for machine processing
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Human => write!(f, "human"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
