//! Store layout migration
//!
//! Converts the pattern store between the layered and unified layouts.
//! The existing `patterns/` tree is backed up under
//! `backups/<timestamp>/patterns/` before anything is written; a failed
//! migration restores the backup byte-for-byte.

use chrono::Utc;
use std::path::Path;

use crate::config::StoreLayout;
use crate::error::{Error, Result};

use super::{layered, unified};

/// Recursively copies a directory tree.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn remove_layout_files(patterns_dir: &Path, layout: StoreLayout) -> Result<()> {
    match layout {
        StoreLayout::Layered => {
            for status in crate::model::PatternStatus::ALL {
                let dir = patterns_dir.join(status.as_str());
                if dir.is_dir() {
                    std::fs::remove_dir_all(dir)?;
                }
            }
        }
        StoreLayout::Unified => {
            let db = patterns_dir.join(unified::DB_FILE);
            if db.is_file() {
                std::fs::remove_file(db)?;
            }
        }
    }
    Ok(())
}

/// Migrates the store under `drift_dir` from one layout to the other.
///
/// Returns the backup identifier (the timestamped directory name under
/// `backups/`). Migrating to the layout already in use is an error.
pub fn migrate_layout(
    drift_dir: &Path,
    from: StoreLayout,
    to: StoreLayout,
) -> Result<String> {
    if from == to {
        return Err(Error::InvalidArgument(
            "store is already in the requested layout".into(),
        ));
    }
    let patterns_dir = drift_dir.join("patterns");
    std::fs::create_dir_all(&patterns_dir)?;

    let patterns = match from {
        StoreLayout::Layered => layered::load_all(&patterns_dir)?,
        StoreLayout::Unified => unified::load_all(&patterns_dir)?,
    };

    let backup_id = Utc::now().format("%Y%m%d-%H%M%S%.3f").to_string();
    let backup_dir = drift_dir.join("backups").join(&backup_id).join("patterns");
    copy_tree(&patterns_dir, &backup_dir)?;

    let outcome = (|| -> Result<()> {
        match to {
            StoreLayout::Layered => layered::save_all(&patterns_dir, &patterns)?,
            StoreLayout::Unified => unified::save_all(&patterns_dir, &patterns)?,
        }
        remove_layout_files(&patterns_dir, from)
    })();

    if let Err(e) = outcome {
        // Roll back: wipe the half-written tree and restore the backup.
        let _ = std::fs::remove_dir_all(&patterns_dir);
        copy_tree(&backup_dir, &patterns_dir)?;
        return Err(e);
    }
    Ok(backup_id)
}

/// Restores `patterns/` from a backup produced by [`migrate_layout`].
pub fn restore_backup(drift_dir: &Path, backup_id: &str) -> Result<()> {
    let backup_dir = drift_dir.join("backups").join(backup_id).join("patterns");
    if !backup_dir.is_dir() {
        return Err(Error::NotFound {
            kind: "backup",
            name: backup_id.to_string(),
        });
    }
    let patterns_dir = drift_dir.join("patterns");
    if patterns_dir.is_dir() {
        std::fs::remove_dir_all(&patterns_dir)?;
    }
    copy_tree(&backup_dir, &patterns_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PatternCategory, PatternStatus};
    use crate::store::PatternStore;
    use chrono::Utc;
    use tempfile::TempDir;

    fn seeded_store(drift: &Path, layout: StoreLayout) -> PatternStore {
        let mut store = PatternStore::new(drift, layout);
        store.initialize().unwrap();
        store
            .commit_scan(
                vec![
                    crate::store::tests::sample_pattern(
                        "api/route-structure/url-casing",
                        PatternCategory::Api,
                    ),
                    crate::store::tests::sample_pattern(
                        "logging/structure/log-transport",
                        PatternCategory::Logging,
                    ),
                ],
                2,
                Utc::now(),
            )
            .unwrap();
        store.approve("api/route-structure/url-casing", None).unwrap();
        store
    }

    #[test]
    fn layered_to_unified_preserves_queries() {
        let dir = TempDir::new().unwrap();
        let drift = dir.path().join(".drift");
        let store = seeded_store(&drift, StoreLayout::Layered);
        let before_approved = store.get_by_status(PatternStatus::Approved);
        let before_api = store.get_by_category(PatternCategory::Api);
        drop(store);

        migrate_layout(&drift, StoreLayout::Layered, StoreLayout::Unified).unwrap();

        let mut migrated = PatternStore::new(&drift, StoreLayout::Unified);
        migrated.initialize().unwrap();
        assert_eq!(migrated.get_by_status(PatternStatus::Approved), before_approved);
        assert_eq!(migrated.get_by_category(PatternCategory::Api), before_api);
        // The layered partition directories are gone.
        assert!(!drift.join("patterns/discovered").is_dir());
    }

    #[test]
    fn rollback_restores_byte_identical_files() {
        let dir = TempDir::new().unwrap();
        let drift = dir.path().join(".drift");
        seeded_store(&drift, StoreLayout::Layered);

        let approved = drift.join("patterns/approved/api.json");
        let original = std::fs::read_to_string(&approved).unwrap();

        let backup_id =
            migrate_layout(&drift, StoreLayout::Layered, StoreLayout::Unified).unwrap();
        assert!(!approved.is_file());

        restore_backup(&drift, &backup_id).unwrap();
        assert_eq!(std::fs::read_to_string(&approved).unwrap(), original);
    }

    #[test]
    fn same_layout_migration_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = migrate_layout(dir.path(), StoreLayout::Layered, StoreLayout::Layered)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
