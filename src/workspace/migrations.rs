//! Schema migrations
//!
//! The drift schema version lives in `manifest.json`. Migrations apply
//! sequentially from the stored version to the current one; the whole
//! `.drift` tree (minus `backups/`) is backed up first, and any failure
//! restores the backup. Backup retention is count-based.

use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::scanner::ScanManifest;

/// One migration step.
struct Migration {
    from: u32,
    to: u32,
    description: &'static str,
    apply: fn(&Path) -> Result<()>,
}

/// v1 kept pattern files directly under `patterns/` with every record
/// implicitly discovered; v2 partitions by status.
fn migrate_v1_to_v2(drift_dir: &Path) -> Result<()> {
    let patterns_dir = drift_dir.join("patterns");
    if !patterns_dir.is_dir() {
        return Ok(());
    }
    let discovered = patterns_dir.join("discovered");
    std::fs::create_dir_all(&discovered)?;
    for entry in std::fs::read_dir(&patterns_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
            let target = discovered.join(entry.file_name());
            std::fs::rename(&path, &target)?;
        }
    }
    Ok(())
}

static MIGRATIONS: &[Migration] = &[Migration {
    from: 1,
    to: 2,
    description: "partition pattern files by status",
    apply: migrate_v1_to_v2,
}];

/// How many schema backups are retained.
const BACKUP_RETENTION: usize = 5;

fn backup_tree(drift_dir: &Path, backup_id: &str) -> Result<PathBuf> {
    let backup_root = drift_dir.join("backups").join(backup_id);
    std::fs::create_dir_all(&backup_root)?;
    for entry in std::fs::read_dir(drift_dir)? {
        let entry = entry?;
        if entry.file_name() == "backups" {
            continue;
        }
        let target = backup_root.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(backup_root)
}

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

fn restore_tree(drift_dir: &Path, backup_root: &Path) -> Result<()> {
    for entry in std::fs::read_dir(drift_dir)? {
        let entry = entry?;
        if entry.file_name() == "backups" {
            continue;
        }
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    for entry in std::fs::read_dir(backup_root)? {
        let entry = entry?;
        let target = drift_dir.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn prune_backups(drift_dir: &Path) -> Result<()> {
    let backups_dir = drift_dir.join("backups");
    if !backups_dir.is_dir() {
        return Ok(());
    }
    let mut backups: Vec<PathBuf> = std::fs::read_dir(&backups_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    backups.sort();
    while backups.len() > BACKUP_RETENTION {
        let oldest = backups.remove(0);
        std::fs::remove_dir_all(oldest)?;
    }
    Ok(())
}

/// Migrates the drift schema from `from` to `to`, sequentially, with a
/// pre-migration backup and rollback on failure. Returns the backup id.
pub fn migrate_schema(drift_dir: &Path, from: u32, to: u32) -> Result<String> {
    if from == to {
        return Err(Error::InvalidArgument(format!(
            "schema is already at version {}",
            from
        )));
    }
    if from > to {
        return Err(Error::InvalidArgument(
            "downgrade migrations are not supported".into(),
        ));
    }

    // The chain must exist before anything is touched.
    let mut chain = Vec::new();
    let mut version = from;
    while version < to {
        let step = MIGRATIONS
            .iter()
            .find(|m| m.from == version)
            .ok_or_else(|| {
                Error::InvalidArgument(format!("no migration from schema version {}", version))
            })?;
        chain.push(step);
        version = step.to;
    }

    let backup_id = Utc::now().format("%Y%m%d-%H%M%S%.3f").to_string();
    let backup_root = backup_tree(drift_dir, &backup_id)?;

    for step in chain {
        log::info!(
            "applying schema migration {} -> {}: {}",
            step.from,
            step.to,
            step.description
        );
        if let Err(e) = (step.apply)(drift_dir) {
            restore_tree(drift_dir, &backup_root)?;
            return Err(e);
        }
    }

    // Stamp the manifest with the new version.
    let manifest_path = drift_dir.join("manifest.json");
    let mut manifest = ScanManifest::load(&manifest_path)?
        .unwrap_or_else(|| ScanManifest::empty(Utc::now()));
    manifest.schema_version = to;
    if let Err(e) = manifest.save(&manifest_path) {
        restore_tree(drift_dir, &backup_root)?;
        return Err(e);
    }

    prune_backups(drift_dir)?;
    Ok(backup_id)
}
