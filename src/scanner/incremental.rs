//! Incremental scan manifest
//!
//! After every committed scan the scanner writes a manifest recording, per
//! file, a content hash and the form counts the observe phase produced.
//! The next incremental scan re-runs detectors only on files whose hash
//! changed, provided the project-wide form counts (and therefore every
//! dominance decision) are unchanged. When the counts shift, the scan falls
//! back to a full detect pass, because a flipped dominant form can change
//! the verdict on files that did not themselves change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::detectors::FormObservation;
use crate::error::Result;

/// Per-file record in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Hex sha-256 of the file content at last scan
    pub content_hash: String,
    /// File size in bytes at last scan
    pub size: u64,
    /// Form counts the observe phase produced for this file
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub form_counts: BTreeMap<String, BTreeMap<String, usize>>,
}

/// The scan manifest, persisted as `.drift/manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanManifest {
    /// Manifest schema version
    pub version: String,
    /// Drift schema version the project is on
    pub schema_version: u32,
    /// When the last committed scan ran
    pub last_scan: DateTime<Utc>,
    /// Per-file records, keyed by project-relative path
    pub files: BTreeMap<PathBuf, FileEntry>,
}

impl ScanManifest {
    /// Current manifest schema version.
    pub const CURRENT_VERSION: &'static str = "2.0";
    /// Current drift schema version.
    pub const CURRENT_SCHEMA: u32 = 2;

    /// An empty manifest stamped `now`.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
            schema_version: Self::CURRENT_SCHEMA,
            last_scan: now,
            files: BTreeMap::new(),
        }
    }

    /// Loads a manifest, returning `None` when the file is absent.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Writes the manifest with a temp-then-rename commit.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Files whose hash differs from (or is absent in) this manifest, plus
    /// files the manifest knows that are gone from the new set.
    pub fn changed_files(
        &self,
        current: &BTreeMap<PathBuf, String>,
    ) -> (BTreeSet<PathBuf>, BTreeSet<PathBuf>) {
        let mut changed = BTreeSet::new();
        for (path, hash) in current {
            match self.files.get(path) {
                Some(entry) if &entry.content_hash == hash => {}
                _ => {
                    changed.insert(path.clone());
                }
            }
        }
        let removed = self
            .files
            .keys()
            .filter(|path| !current.contains_key(*path))
            .cloned()
            .collect();
        (changed, removed)
    }

    /// Project-wide form counts summed over every file in the manifest.
    pub fn total_form_counts(&self) -> BTreeMap<String, BTreeMap<String, usize>> {
        let mut totals: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        for entry in self.files.values() {
            for (key, forms) in &entry.form_counts {
                let slot = totals.entry(key.clone()).or_default();
                for (form, count) in forms {
                    *slot.entry(form.clone()).or_insert(0) += count;
                }
            }
        }
        totals
    }
}

/// Hex sha-256 of file content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Folds a flat observation list into per-file form counts.
pub fn count_observations(
    observations: &[FormObservation],
) -> BTreeMap<String, BTreeMap<String, usize>> {
    let mut counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for obs in observations {
        *counts
            .entry(obs.key.clone())
            .or_default()
            .entry(obs.form.clone())
            .or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(hash: &str) -> FileEntry {
        FileEntry {
            content_hash: hash.into(),
            size: 10,
            form_counts: BTreeMap::new(),
        }
    }

    #[test]
    fn hash_is_stable_and_hex() {
        let a = content_hash("res.json({ data });");
        let b = content_hash("res.json({ data });");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("res.json([]);"));
    }

    #[test]
    fn changed_and_removed_files_are_split() {
        let mut manifest = ScanManifest::empty(Utc::now());
        manifest.files.insert(PathBuf::from("a.ts"), entry("h1"));
        manifest.files.insert(PathBuf::from("b.ts"), entry("h2"));
        manifest.files.insert(PathBuf::from("gone.ts"), entry("h3"));

        let current: BTreeMap<PathBuf, String> = [
            (PathBuf::from("a.ts"), "h1".to_string()),   // unchanged
            (PathBuf::from("b.ts"), "h2-new".to_string()), // edited
            (PathBuf::from("new.ts"), "h4".to_string()), // added
        ]
        .into();

        let (changed, removed) = manifest.changed_files(&current);
        assert_eq!(
            changed,
            BTreeSet::from([PathBuf::from("b.ts"), PathBuf::from("new.ts")])
        );
        assert_eq!(removed, BTreeSet::from([PathBuf::from("gone.ts")]));
    }

    #[test]
    fn manifest_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".drift/manifest.json");
        let mut manifest = ScanManifest::empty(Utc::now());
        let mut counts = BTreeMap::new();
        counts.insert(
            "route-url-casing".to_string(),
            BTreeMap::from([("kebab".to_string(), 3usize)]),
        );
        manifest.files.insert(
            PathBuf::from("src/routes.ts"),
            FileEntry {
                content_hash: content_hash("x"),
                size: 1,
                form_counts: counts,
            },
        );
        manifest.save(&path).unwrap();
        let loaded = ScanManifest::load(&path).unwrap().unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(
            loaded.total_form_counts()["route-url-casing"]["kebab"],
            3
        );
    }

    #[test]
    fn missing_manifest_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(ScanManifest::load(&dir.path().join("manifest.json"))
            .unwrap()
            .is_none());
    }
}
