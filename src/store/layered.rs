//! Layered JSON layout: one file per `(status, category)` tuple
//!
//! `patterns/{discovered|approved|ignored}/<category>.json`, each holding a
//! versioned pattern file. Version `2.x` is the current shape; `1.x` files
//! (the legacy layout, where records carried neither status nor category)
//! are migrated on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::model::{Pattern, PatternCategory, PatternStatus};

use super::write_json_atomic;

/// Current pattern-file version.
pub const FILE_VERSION: &str = "2.0";

/// On-disk shape of one partition file.
#[derive(Debug, Serialize, Deserialize)]
pub struct PatternFile {
    /// File format version; `"1."` prefixes are legacy
    pub version: String,
    /// Category every pattern in the file belongs to
    pub category: PatternCategory,
    /// The pattern records
    pub patterns: Vec<Pattern>,
    /// When the file was last written
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawPatternFile {
    version: String,
    #[serde(default)]
    patterns: Vec<serde_json::Value>,
}

fn partition_path(dir: &Path, status: PatternStatus, category: PatternCategory) -> std::path::PathBuf {
    dir.join(status.as_str())
        .join(format!("{}.json", category.as_str()))
}

/// Reads one partition file, tolerating absence and migrating `1.x` records
/// (which lack explicit status/category) to the current shape.
fn load_partition(
    path: &Path,
    status: PatternStatus,
    category: PatternCategory,
) -> Result<Vec<Pattern>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let raw: RawPatternFile = serde_json::from_str(&content)?;
    let legacy = raw.version.starts_with("1.");
    let mut patterns = Vec::with_capacity(raw.patterns.len());
    for mut value in raw.patterns {
        if legacy {
            if let Some(obj) = value.as_object_mut() {
                obj.entry("status")
                    .or_insert_with(|| serde_json::json!(status.as_str()));
                obj.entry("category")
                    .or_insert_with(|| serde_json::json!(category.as_str()));
                obj.entry("outliers").or_insert_with(|| serde_json::json!([]));
            }
        }
        let pattern: Pattern = serde_json::from_value(value)?;
        patterns.push(pattern);
    }
    Ok(patterns)
}

/// Loads every partition under `dir` into one id-keyed map.
pub fn load_all(dir: &Path) -> Result<BTreeMap<String, Pattern>> {
    let mut map = BTreeMap::new();
    for status in PatternStatus::ALL {
        for category in PatternCategory::ALL {
            let path = partition_path(dir, status, category);
            for mut pattern in load_partition(&path, status, category)? {
                // The directory is authoritative for status on reload.
                pattern.status = status;
                map.insert(pattern.id.clone(), pattern);
            }
        }
    }
    Ok(map)
}

fn partition_file(
    patterns: &BTreeMap<String, Pattern>,
    status: PatternStatus,
    category: PatternCategory,
) -> PatternFile {
    PatternFile {
        version: FILE_VERSION.to_string(),
        category,
        patterns: patterns
            .values()
            .filter(|p| p.status == status && p.category == category)
            .cloned()
            .collect(),
        last_updated: Utc::now(),
    }
}

/// Writes every non-empty partition and removes files for partitions that
/// became empty.
pub fn save_all(dir: &Path, patterns: &BTreeMap<String, Pattern>) -> Result<()> {
    for status in PatternStatus::ALL {
        for category in PatternCategory::ALL {
            write_partition(dir, patterns, status, category)?;
        }
    }
    Ok(())
}

fn write_partition(
    dir: &Path,
    patterns: &BTreeMap<String, Pattern>,
    status: PatternStatus,
    category: PatternCategory,
) -> Result<()> {
    let path = partition_path(dir, status, category);
    let file = partition_file(patterns, status, category);
    if file.patterns.is_empty() {
        if path.is_file() {
            std::fs::remove_file(&path)?;
        }
        return Ok(());
    }
    write_json_atomic(&path, &file)
}

/// Rewrites exactly the touched partitions as one commit.
///
/// Before writing, every touched file is backed up; if any write fails the
/// already-written files are restored so the on-disk state stays coherent
/// with a single status for every pattern.
pub fn rewrite_partitions(
    dir: &Path,
    patterns: &BTreeMap<String, Pattern>,
    touched: &[(PatternStatus, PatternCategory)],
) -> Result<()> {
    let mut backups: Vec<(std::path::PathBuf, Option<String>)> = Vec::new();
    for &(status, category) in touched {
        let path = partition_path(dir, status, category);
        let original = if path.is_file() {
            Some(std::fs::read_to_string(&path)?)
        } else {
            None
        };
        backups.push((path, original));
    }

    for (index, &(status, category)) in touched.iter().enumerate() {
        if let Err(e) = write_partition(dir, patterns, status, category) {
            // Restore everything written so far from backup.
            for (path, original) in backups.iter().take(index + 1) {
                match original {
                    Some(content) => {
                        let _ = std::fs::write(path, content);
                    }
                    None => {
                        let _ = std::fs::remove_file(path);
                    }
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Confidence, DetectionMethod, Location, PatternMetadata, Severity,
    };
    use tempfile::TempDir;

    fn pattern(id: &str, status: PatternStatus) -> Pattern {
        Pattern {
            id: id.into(),
            name: "p".into(),
            description: String::new(),
            category: PatternCategory::Api,
            subcategory: "route-structure".into(),
            detection_method: DetectionMethod::Regex,
            confidence: Confidence::default(),
            severity: Severity::Warning,
            locations: vec![Location::new("src/a.ts", 1, 1)],
            outliers: Vec::new(),
            metadata: PatternMetadata::new(Utc::now()),
            status,
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut map = BTreeMap::new();
        map.insert(
            "api/route-structure/a".to_string(),
            pattern("api/route-structure/a", PatternStatus::Discovered),
        );
        map.insert(
            "api/route-structure/b".to_string(),
            pattern("api/route-structure/b", PatternStatus::Approved),
        );
        save_all(dir.path(), &map).unwrap();

        assert!(dir.path().join("discovered/api.json").is_file());
        assert!(dir.path().join("approved/api.json").is_file());

        let loaded = load_all(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded["api/route-structure/b"].status,
            PatternStatus::Approved
        );
    }

    #[test]
    fn empty_partitions_remove_their_files() {
        let dir = TempDir::new().unwrap();
        let mut map = BTreeMap::new();
        map.insert(
            "api/route-structure/a".to_string(),
            pattern("api/route-structure/a", PatternStatus::Discovered),
        );
        save_all(dir.path(), &map).unwrap();
        assert!(dir.path().join("discovered/api.json").is_file());

        map.get_mut("api/route-structure/a").unwrap().status = PatternStatus::Ignored;
        save_all(dir.path(), &map).unwrap();
        assert!(!dir.path().join("discovered/api.json").is_file());
        assert!(dir.path().join("ignored/api.json").is_file());
    }

    #[test]
    fn legacy_v1_files_are_migrated_on_read() {
        let dir = TempDir::new().unwrap();
        let legacy = serde_json::json!({
            "version": "1.4",
            "patterns": [{
                "id": "api/route-structure/a",
                "name": "p",
                "description": "",
                "subcategory": "route-structure",
                "detection_method": "regex",
                "confidence": {
                    "frequency": 0.5, "consistency": 1.0, "age_days": 0.0,
                    "spread_file_count": 1, "score": 0.5, "level": "low"
                },
                "severity": "warning",
                "locations": [{"file": "src/a.ts", "line": 1, "column": 1}],
                "metadata": {
                    "first_seen": "2024-01-01T00:00:00Z",
                    "last_seen": "2024-01-01T00:00:00Z"
                }
            }]
        });
        let path = dir.path().join("approved/api.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_string(&legacy).unwrap()).unwrap();

        let loaded = load_all(dir.path()).unwrap();
        let p = &loaded["api/route-structure/a"];
        assert_eq!(p.status, PatternStatus::Approved);
        assert_eq!(p.category, PatternCategory::Api);
        assert!(p.outliers.is_empty());
    }
}
