//! Unified single-database layout
//!
//! One keyed document, `patterns/db.json`, holding every pattern plus a
//! `(status, category)` index, the logical `patterns(id primary, status,
//! category, payload)` table. Behaviorally equivalent to the layered
//! layout; the migration tool converts between the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::Pattern;

use super::write_json_atomic;

/// File name of the unified database inside `patterns/`.
pub const DB_FILE: &str = "db.json";

/// Current database document version.
pub const DB_VERSION: &str = "2.0";

/// The unified database document.
#[derive(Debug, Serialize, Deserialize)]
pub struct UnifiedDb {
    /// Document version
    pub version: String,
    /// Every live pattern, keyed by id
    pub patterns: BTreeMap<String, Pattern>,
    /// `status/category` -> pattern ids, the query index
    pub index: BTreeMap<String, Vec<String>>,
    /// When the document was last written
    pub last_updated: DateTime<Utc>,
}

fn index_key(pattern: &Pattern) -> String {
    format!("{}/{}", pattern.status.as_str(), pattern.category.as_str())
}

/// Loads the unified database, tolerating absence.
pub fn load_all(dir: &Path) -> Result<BTreeMap<String, Pattern>> {
    let path = dir.join(DB_FILE);
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let content = std::fs::read_to_string(&path)?;
    let db: UnifiedDb = serde_json::from_str(&content)?;

    // The index is derived state; verify it references real rows.
    for ids in db.index.values() {
        for id in ids {
            if !db.patterns.contains_key(id) {
                return Err(Error::Internal(format!(
                    "unified index references missing pattern '{}'",
                    id
                )));
            }
        }
    }
    Ok(db.patterns)
}

/// Writes the whole document atomically, index rebuilt from the rows.
pub fn save_all(dir: &Path, patterns: &BTreeMap<String, Pattern>) -> Result<()> {
    let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pattern in patterns.values() {
        index
            .entry(index_key(pattern))
            .or_default()
            .push(pattern.id.clone());
    }
    let db = UnifiedDb {
        version: DB_VERSION.to_string(),
        patterns: patterns.clone(),
        index,
        last_updated: Utc::now(),
    };
    write_json_atomic(&dir.join(DB_FILE), &db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Confidence, DetectionMethod, Location, PatternCategory, PatternMetadata,
        PatternStatus, Severity,
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
    fn round_trip_with_index() {
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

        let raw = std::fs::read_to_string(dir.path().join(DB_FILE)).unwrap();
        let db: UnifiedDb = serde_json::from_str(&raw).unwrap();
        assert_eq!(db.index["discovered/api"], vec!["api/route-structure/a"]);
        assert_eq!(db.index["approved/api"], vec!["api/route-structure/b"]);

        let loaded = load_all(dir.path()).unwrap();
        assert_eq!(loaded, map);
    }

    #[test]
    fn corrupt_index_is_an_internal_error() {
        let dir = TempDir::new().unwrap();
        let db = serde_json::json!({
            "version": DB_VERSION,
            "patterns": {},
            "index": {"discovered/api": ["api/route-structure/ghost"]},
            "last_updated": "2024-01-01T00:00:00Z"
        });
        std::fs::write(
            dir.path().join(DB_FILE),
            serde_json::to_string(&db).unwrap(),
        )
        .unwrap();
        let err = load_all(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
