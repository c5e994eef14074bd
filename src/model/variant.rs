//! Sanctioned deviations from a pattern

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::Location;

/// Scope of a variant: how broadly the exception applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "scope", content = "value")]
pub enum VariantScope {
    /// Covers every location of the pattern
    Global,
    /// Covers locations whose path starts with the given directory
    Directory(String),
    /// Covers locations in exactly the given file
    File(String),
}

impl VariantScope {
    /// Whether this scope covers the given file path.
    pub fn covers_path(&self, path: &Path) -> bool {
        match self {
            VariantScope::Global => true,
            VariantScope::Directory(dir) => path.starts_with(dir),
            VariantScope::File(file) => path == Path::new(file),
        }
    }
}

/// An intentional, user-declared deviation from a pattern. Locations covered
/// by a variant are filtered out of the pattern's violations before
/// surfacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Unique variant id
    pub id: String,
    /// Id of the pattern this variant excepts
    pub pattern_id: String,
    /// Short human name
    pub name: String,
    /// Why the deviation is sanctioned
    pub reason: String,
    /// How broadly the exception applies
    #[serde(flatten)]
    pub scope: VariantScope,
    /// Specific covered locations, in addition to the scope
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    /// When the variant was created
    pub created_at: DateTime<Utc>,
}

impl Variant {
    /// Whether this variant covers the given location.
    pub fn covers(&self, location: &Location) -> bool {
        if self.scope.covers_path(&location.file) {
            return true;
        }
        self.locations.iter().any(|l| l.key() == location.key())
    }
}
