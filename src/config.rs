//! Configuration structures for drift-rs
//!
//! The on-disk shape is `.drift/config.json`. Unknown keys are preserved on
//! write so hosts can annotate the file without drift-rs erasing their data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::Result;

/// The main configuration structure for drift-rs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftConfig {
    /// Config schema version (semver)
    pub version: String,

    /// Project identity
    pub project: ProjectConfig,

    /// Ignore globs merged after built-in defaults and `.driftignore`
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Feature flags
    #[serde(default)]
    pub features: FeatureFlags,

    /// Telemetry settings (transport is external; only the switch lives here)
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Scan tuning
    #[serde(default)]
    pub scan: ScanConfig,

    /// Snapshot retention
    #[serde(default)]
    pub history: HistoryConfig,

    /// Keys we do not understand, preserved verbatim on write
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Project identity block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Stable project id
    pub id: String,
    /// Display name
    pub name: String,
    /// When `init` first ran for this root
    pub initialized_at: DateTime<Utc>,
    /// Unknown keys, preserved
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Feature flags controlling the optional analyzers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    /// Build the call graph during `full`
    pub call_graph: bool,
    /// Run the boundary / data-access analyzer
    pub boundaries: bool,
    /// Reserved: structural DNA extraction
    pub dna: bool,
    /// Reserved: contract tracking
    pub contracts: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            call_graph: true,
            boundaries: true,
            dna: false,
            contracts: false,
        }
    }
}

/// Telemetry switch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryConfig {
    /// Whether the host may emit telemetry for this project
    #[serde(default)]
    pub enabled: bool,
    /// Unknown keys, preserved
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Scan tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    /// Worker pool size; `None` means logical cores clamped to `[1, 16]`
    #[serde(default)]
    pub threads: Option<usize>,
    /// Overall scan timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Files larger than this many bytes are skipped
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Per-file match cap; detectors set `truncated` beyond it
    #[serde(default = "default_max_matches_per_file")]
    pub max_matches_per_file: usize,
    /// Physical pattern-store layout
    #[serde(default)]
    pub store_layout: StoreLayout,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_file_size() -> u64 {
    2 * 1024 * 1024
}

fn default_max_matches_per_file() -> usize {
    10_000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: None,
            timeout_secs: default_timeout_secs(),
            max_file_size: default_max_file_size(),
            max_matches_per_file: default_max_matches_per_file(),
            store_layout: StoreLayout::default(),
        }
    }
}

impl ScanConfig {
    /// Effective worker count: configured value, or logical cores, clamped
    /// to `[1, 16]`.
    pub fn effective_threads(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.threads.unwrap_or(cores).clamp(1, 16)
    }
}

/// Physical layout the pattern store runs in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreLayout {
    /// One file per `(status, category)` tuple
    #[default]
    Layered,
    /// One keyed document with a `(status, category)` index
    Unified,
}

/// Snapshot retention policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Keep at most this many snapshots
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
    /// Drop snapshots older than this many days
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
}

fn default_keep_last() -> usize {
    30
}

fn default_max_age_days() -> i64 {
    90
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            keep_last: default_keep_last(),
            max_age_days: default_max_age_days(),
        }
    }
}

impl DriftConfig {
    /// Current config schema version written by `init`.
    pub const CURRENT_VERSION: &'static str = "2.0.0";

    /// Builds a fresh config for a newly initialized project.
    pub fn new(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
            project: ProjectConfig {
                id: project_id.into(),
                name: name.into(),
                initialized_at: Utc::now(),
                extra: serde_json::Map::new(),
            },
            ignore: Vec::new(),
            features: FeatureFlags::default(),
            telemetry: TelemetryConfig::default(),
            scan: ScanConfig::default(),
            history: HistoryConfig::default(),
            extra: serde_json::Map::new(),
        }
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file, preserving unknown keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = DriftConfig::new("p-1", "demo");
        assert_eq!(config.version, DriftConfig::CURRENT_VERSION);
        assert!(config.features.call_graph);
        assert_eq!(config.scan.timeout_secs, 300);
        assert_eq!(config.scan.max_matches_per_file, 10_000);
        assert_eq!(config.history.keep_last, 30);
        let threads = config.scan.effective_threads();
        assert!((1..=16).contains(&threads));
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let raw = r#"{
            "version": "2.0.0",
            "project": {"id": "p", "name": "n", "initializedAt": "2024-01-01T00:00:00Z", "customerTier": "gold"},
            "ignore": ["generated/**"],
            "futureSection": {"enabled": true}
        }"#;
        let config: DriftConfig = serde_json::from_str(raw).unwrap();
        assert!(config.extra.contains_key("futureSection"));
        assert!(config.project.extra.contains_key("customerTier"));

        let out = serde_json::to_value(&config).unwrap();
        assert_eq!(out["futureSection"]["enabled"], Value::Bool(true));
        assert_eq!(out["project"]["customerTier"], Value::String("gold".into()));
    }

    #[test]
    fn store_layout_parses() {
        let cfg: ScanConfig =
            serde_json::from_str(r#"{"storeLayout": "unified"}"#).unwrap();
        assert_eq!(cfg.store_layout, StoreLayout::Unified);
    }
}
