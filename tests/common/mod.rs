//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use drift_rs::language::Language;
use drift_rs::walker::WalkedFile;

/// Writes a throwaway project and returns walked files for it.
pub fn write_project(files: &[(&str, &str)]) -> (TempDir, Vec<WalkedFile>) {
    let dir = TempDir::new().unwrap();
    let mut walked = Vec::new();
    for (rel, content) in files {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        walked.push(WalkedFile {
            absolute_path: path,
            relative_path: PathBuf::from(rel),
            language: Language::from_path(Path::new(rel)),
        });
    }
    (dir, walked)
}

/// Initializes a `.drift` workspace in a throwaway project and writes the
/// given source files.
pub fn init_project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (rel, content) in files {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
    }
    let mut manager =
        drift_rs::workspace::WorkspaceManager::open(dir.path().join(".drift")).unwrap();
    manager.init_project(dir.path(), false).unwrap();
    dir
}
