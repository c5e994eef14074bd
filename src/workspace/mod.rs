//! Workspace management
//!
//! Project initialization (`.drift/` scaffold), a registry for switching
//! between projects, a TTL-cached workspace context for fast summaries,
//! and schema migrations with backup and rollback.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::DriftConfig;
use crate::error::{Error, Result};
use crate::model::PatternStatus;
use crate::scanner::ScanManifest;
use crate::store::PatternStore;

mod migrations;

pub use migrations::migrate_schema;

/// A registered project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Stable project id
    pub id: String,
    /// Display name (defaults to the directory name)
    pub name: String,
    /// Absolute project root
    pub root: PathBuf,
}

impl Project {
    /// The project's `.drift` directory.
    pub fn drift_dir(&self) -> PathBuf {
        self.root.join(".drift")
    }
}

/// Cached summary of the active project.
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    /// The active project
    pub project: Project,
    /// Its configuration
    pub config: DriftConfig,
    /// Last scan manifest, when one exists
    pub manifest: Option<ScanManifest>,
    /// Pattern counts per status
    pub pattern_counts: BTreeMap<PatternStatus, usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectRegistry {
    projects: Vec<Project>,
    active: Option<String>,
}

/// Context cache time-to-live.
const CONTEXT_TTL: Duration = Duration::from_secs(60);

/// Supervises initialization, project switching, and the context cache.
pub struct WorkspaceManager {
    registry_path: PathBuf,
    registry: ProjectRegistry,
    cache: Option<(Instant, WorkspaceContext)>,
    ttl: Duration,
}

impl WorkspaceManager {
    /// Opens (or creates) the registry stored at
    /// `<state_dir>/registry.json`.
    pub fn open(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        let registry_path = state_dir.join("registry.json");
        let registry = if registry_path.is_file() {
            serde_json::from_str(&std::fs::read_to_string(&registry_path)?)?
        } else {
            ProjectRegistry::default()
        };
        Ok(Self {
            registry_path,
            registry,
            cache: None,
            ttl: CONTEXT_TTL,
        })
    }

    /// Overrides the context cache TTL.
    pub fn with_context_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn persist_registry(&self) -> Result<()> {
        crate::store::write_json_atomic(&self.registry_path, &self.registry)
    }

    /// Initializes a project: creates the `.drift` scaffold and
    /// `config.json`, registers the project, and makes it active.
    ///
    /// Re-initializing an existing project is an error unless `force` is
    /// set, in which case the config is rewritten and stores are left
    /// untouched.
    pub fn init_project(&mut self, root: impl Into<PathBuf>, force: bool) -> Result<Project> {
        let root = root.into();
        let drift_dir = root.join(".drift");
        let config_path = drift_dir.join("config.json");
        if config_path.is_file() && !force {
            return Err(Error::InvalidArgument(format!(
                "{} is already initialized (use force to reinitialize)",
                root.display()
            )));
        }

        for sub in [
            "patterns/discovered",
            "patterns/approved",
            "patterns/ignored",
            "patterns/variants",
            "history/snapshots",
            "lake/callgraph",
            "boundaries",
            "backups",
        ] {
            std::fs::create_dir_all(drift_dir.join(sub))?;
        }

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        let config = DriftConfig::new(Uuid::new_v4().to_string(), name.clone());
        config.save(&config_path)?;

        let manifest_path = drift_dir.join("manifest.json");
        if !manifest_path.is_file() {
            ScanManifest::empty(Utc::now()).save(&manifest_path)?;
        }

        let project = Project {
            id: config.project.id.clone(),
            name,
            root,
        };
        self.registry.projects.retain(|p| p.root != project.root);
        self.registry.projects.push(project.clone());
        self.registry.active = Some(project.id.clone());
        self.persist_registry()?;
        self.invalidate();
        Ok(project)
    }

    /// Switches the active project by id, name, or root path.
    pub fn switch_project(&mut self, reference: &str) -> Result<Project> {
        let reference_path = Path::new(reference);
        let found = self
            .registry
            .projects
            .iter()
            .find(|p| p.id == reference || p.name == reference || p.root == reference_path)
            .cloned()
            .ok_or_else(|| Error::project_not_found(reference))?;
        self.registry.active = Some(found.id.clone());
        self.persist_registry()?;
        self.invalidate();
        Ok(found)
    }

    /// The active project.
    pub fn active_project(&self) -> Result<Project> {
        let id = self
            .registry
            .active
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("no active project; run init first".into()))?;
        self.registry
            .projects
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| Error::project_not_found(id))
    }

    /// All registered projects.
    pub fn projects(&self) -> &[Project] {
        &self.registry.projects
    }

    /// Loads the workspace context, cached for the TTL. `force_refresh`
    /// bypasses the cache.
    pub fn load_context(&mut self, force_refresh: bool) -> Result<WorkspaceContext> {
        if !force_refresh {
            if let Some((loaded_at, context)) = &self.cache {
                if loaded_at.elapsed() < self.ttl {
                    return Ok(context.clone());
                }
            }
        }
        let project = self.active_project()?;
        let drift_dir = project.drift_dir();
        let config = DriftConfig::from_file(drift_dir.join("config.json"))?;
        let manifest = ScanManifest::load(&drift_dir.join("manifest.json"))?;

        let mut store = PatternStore::new(&drift_dir, config.scan.store_layout);
        store.initialize()?;
        let mut pattern_counts = BTreeMap::new();
        for status in PatternStatus::ALL {
            pattern_counts.insert(status, store.get_by_status(status).len());
        }

        let context = WorkspaceContext {
            project,
            config,
            manifest,
            pattern_counts,
        };
        self.cache = Some((Instant::now(), context.clone()));
        Ok(context)
    }

    /// Drops the cached context. Called after every committing mutation.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Runs schema migrations for the active project up to the current
    /// schema version. Returns the backup id when a migration ran.
    pub fn migrate_active(&mut self) -> Result<Option<String>> {
        let project = self.active_project()?;
        let drift_dir = project.drift_dir();
        let manifest = ScanManifest::load(&drift_dir.join("manifest.json"))?;
        let from = manifest.map(|m| m.schema_version).unwrap_or(1);
        if from >= ScanManifest::CURRENT_SCHEMA {
            return Ok(None);
        }
        let backup = migrate_schema(&drift_dir, from, ScanManifest::CURRENT_SCHEMA)?;
        self.invalidate();
        Ok(Some(backup))
    }
}
