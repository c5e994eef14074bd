//! Variant manager
//!
//! Variants live in `patterns/variants/<pattern-id>.json`, one file per
//! pattern (slashes in the id become double underscores). Coverage lookup
//! is an O(1) map hit on the pattern id followed by a linear scan of that
//! pattern's variants.

use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Location, Variant, VariantScope};

use super::write_json_atomic;

/// Input for creating a variant.
#[derive(Debug, Clone)]
pub struct VariantInput {
    /// Pattern the variant excepts
    pub pattern_id: String,
    /// Short human name
    pub name: String,
    /// Why the deviation is sanctioned
    pub reason: String,
    /// Scope of the exception
    pub scope: VariantScope,
    /// Extra covered locations beyond the scope
    pub locations: Vec<Location>,
}

fn file_stem(pattern_id: &str) -> String {
    pattern_id.replace('/', "__")
}

/// Owns all persisted variants, indexed by pattern id.
pub struct VariantManager {
    dir: PathBuf,
    by_pattern: HashMap<String, Vec<Variant>>,
}

impl VariantManager {
    /// Creates a manager rooted at `patterns/variants`.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            by_pattern: HashMap::new(),
        }
    }

    /// Loads every variant file. Absent directory means no variants.
    pub fn load(&mut self) -> Result<()> {
        self.by_pattern.clear();
        if !self.dir.is_dir() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let variants: Vec<Variant> = serde_json::from_str(&content)?;
            if let Some(first) = variants.first() {
                self.by_pattern
                    .insert(first.pattern_id.clone(), variants);
            }
        }
        Ok(())
    }

    /// Creates and persists a variant. Reasons are mandatory: a sanctioned
    /// deviation with no rationale is indistinguishable from drift.
    pub fn create(&mut self, input: VariantInput) -> Result<Variant> {
        if input.reason.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "variant reason must not be empty".into(),
            ));
        }
        let variant = Variant {
            id: Uuid::new_v4().to_string(),
            pattern_id: input.pattern_id.clone(),
            name: input.name,
            reason: input.reason,
            scope: input.scope,
            locations: input.locations,
            created_at: Utc::now(),
        };
        self.by_pattern
            .entry(input.pattern_id.clone())
            .or_default()
            .push(variant.clone());
        self.persist_pattern(&input.pattern_id)?;
        Ok(variant)
    }

    /// Deletes one variant by id.
    pub fn delete(&mut self, variant_id: &str) -> Result<()> {
        for (pattern_id, variants) in self.by_pattern.iter_mut() {
            let before = variants.len();
            variants.retain(|v| v.id != variant_id);
            if variants.len() != before {
                let pattern_id = pattern_id.clone();
                self.persist_pattern(&pattern_id)?;
                return Ok(());
            }
        }
        Err(Error::NotFound {
            kind: "variant",
            name: variant_id.to_string(),
        })
    }

    /// Deletes every variant of a pattern (used when the pattern itself is
    /// deleted).
    pub fn delete_for_pattern(&mut self, pattern_id: &str) -> Result<()> {
        if self.by_pattern.remove(pattern_id).is_some() {
            let path = self.path_for(pattern_id);
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Whether any variant of the pattern covers the location.
    pub fn is_location_covered(&self, pattern_id: &str, location: &Location) -> bool {
        self.by_pattern
            .get(pattern_id)
            .map(|variants| variants.iter().any(|v| v.covers(location)))
            .unwrap_or(false)
    }

    /// All variants of one pattern.
    pub fn for_pattern(&self, pattern_id: &str) -> Vec<Variant> {
        self.by_pattern
            .get(pattern_id)
            .cloned()
            .unwrap_or_default()
    }

    /// All variants across patterns.
    pub fn all(&self) -> Vec<Variant> {
        let mut variants: Vec<Variant> = self
            .by_pattern
            .values()
            .flat_map(|v| v.iter().cloned())
            .collect();
        variants.sort_by(|a, b| (&a.pattern_id, &a.id).cmp(&(&b.pattern_id, &b.id)));
        variants
    }

    fn path_for(&self, pattern_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(pattern_id)))
    }

    fn persist_pattern(&self, pattern_id: &str) -> Result<()> {
        let path = self.path_for(pattern_id);
        match self.by_pattern.get(pattern_id) {
            Some(variants) if !variants.is_empty() => write_json_atomic(&path, variants),
            _ => {
                if path.is_file() {
                    std::fs::remove_file(path)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, VariantManager) {
        let dir = TempDir::new().unwrap();
        let manager = VariantManager::new(dir.path().join("variants"));
        (dir, manager)
    }

    #[test]
    fn create_persists_and_reloads() {
        let (dir, mut manager) = manager();
        manager
            .create(VariantInput {
                pattern_id: "api/route-structure/url-casing".into(),
                name: "legacy".into(),
                reason: "grandfathered module".into(),
                scope: VariantScope::Directory("src/legacy".into()),
                locations: Vec::new(),
            })
            .unwrap();

        let mut reloaded = VariantManager::new(dir.path().join("variants"));
        reloaded.load().unwrap();
        let variants = reloaded.for_pattern("api/route-structure/url-casing");
        assert_eq!(variants.len(), 1);
        assert!(reloaded.is_location_covered(
            "api/route-structure/url-casing",
            &Location::new("src/legacy/old.ts", 1, 1)
        ));
    }

    #[test]
    fn empty_reason_is_rejected() {
        let (_dir, mut manager) = manager();
        let err = manager
            .create(VariantInput {
                pattern_id: "api/route-structure/url-casing".into(),
                name: "legacy".into(),
                reason: "  ".into(),
                scope: VariantScope::Global,
                locations: Vec::new(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn delete_removes_file_when_last_variant_goes() {
        let (dir, mut manager) = manager();
        let variant = manager
            .create(VariantInput {
                pattern_id: "api/route-structure/url-casing".into(),
                name: "legacy".into(),
                reason: "grandfathered".into(),
                scope: VariantScope::Global,
                locations: Vec::new(),
            })
            .unwrap();
        let file = dir
            .path()
            .join("variants/api__route-structure__url-casing.json");
        assert!(file.is_file());

        manager.delete(&variant.id).unwrap();
        assert!(!file.is_file());
        assert!(manager.delete("missing-id").is_err());
    }
}
