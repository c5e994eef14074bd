//! Detector registry
//!
//! Holds detector descriptors and factories keyed by unique id. Detectors
//! may be registered eagerly or through a factory that is only invoked the
//! first time the detector is actually needed. Lifecycle hooks run
//! synchronously and are isolated: a panicking hook is logged and the
//! detector stays registered.

use glob::Pattern;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{LazyLock, OnceLock};

use crate::detectors::{Detector, DetectorMeta};
use crate::error::{Error, Result};
use crate::language::Language;
use crate::model::{DetectionMethod, PatternCategory};

static ID_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]*(/[a-z][a-z0-9-]*)+$").expect("detector id regex")
});

/// Options accepted by [`DetectorRegistry::register`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterOptions {
    /// Replace an existing detector with the same id instead of failing
    pub override_existing: bool,
    /// Start disabled
    pub disabled: bool,
    /// Query ordering priority; higher runs first
    pub priority: i32,
}

/// Filters accepted by [`DetectorRegistry::query`]. Empty fields match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct DetectorQuery {
    /// Match this category
    pub category: Option<PatternCategory>,
    /// Match this subcategory
    pub subcategory: Option<String>,
    /// Match detectors that handle this language
    pub language: Option<Language>,
    /// Match this detection method
    pub detection_method: Option<DetectionMethod>,
    /// Match this enabled state
    pub enabled: Option<bool>,
    /// Glob over detector ids
    pub id_pattern: Option<String>,
}

/// Lifecycle hooks observed by hosts (LSP servers, dashboards). Hooks are
/// invoked synchronously and must not panic; a panic is caught, logged, and
/// otherwise ignored.
pub trait RegistryHooks: Send + Sync {
    /// A detector was registered or replaced.
    fn on_register(&self, _meta: &DetectorMeta) {}
    /// A detector was removed.
    fn on_unload(&self, _id: &str) {}
    /// A source file changed; detectors with caches may invalidate.
    fn on_file_change(&self, _path: &Path) {}
}

type DetectorFactory = Box<dyn Fn() -> Detector + Send + Sync>;

struct Entry {
    info: DetectorMeta,
    priority: i32,
    enabled: bool,
    built: OnceLock<Detector>,
    factory: Option<DetectorFactory>,
}

impl Entry {
    fn detector(&self) -> &Detector {
        self.built.get_or_init(|| {
            let factory = self
                .factory
                .as_ref()
                .expect("entry has neither instance nor factory");
            factory()
        })
    }
}

/// Registry of detectors, keyed by id.
pub struct DetectorRegistry {
    entries: HashMap<String, Entry>,
    hooks: Vec<Box<dyn RegistryHooks>>,
}

impl DetectorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            hooks: Vec::new(),
        }
    }

    /// Creates a registry pre-loaded with the shipped catalogue.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for detector in Detector::default_catalogue() {
            registry
                .register(detector, RegisterOptions::default())
                .expect("default catalogue ids are unique and well-formed");
        }
        registry
    }

    /// Attaches a lifecycle hook.
    pub fn add_hooks(&mut self, hooks: Box<dyn RegistryHooks>) {
        self.hooks.push(hooks);
    }

    fn validate_id(id: &str) -> Result<()> {
        if ID_SHAPE.is_match(id) {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "detector id '{}' must be kebab-case segments separated by '/'",
                id
            )))
        }
    }

    /// Registers a built detector.
    ///
    /// Fails with a duplicate-id error when the id is already present and
    /// `override_existing` is not set; overriding replaces the detector and
    /// leaves the registry size unchanged.
    pub fn register(&mut self, detector: Detector, options: RegisterOptions) -> Result<()> {
        let meta = detector.meta().clone();
        Self::validate_id(&meta.id)?;
        if self.entries.contains_key(&meta.id) && !options.override_existing {
            return Err(Error::InvalidArgument(format!(
                "duplicate detector id '{}' (pass override to replace)",
                meta.id
            )));
        }
        let built = OnceLock::new();
        built.set(detector).ok().expect("fresh cell");
        self.entries.insert(
            meta.id.clone(),
            Entry {
                info: meta.clone(),
                priority: options.priority,
                enabled: !options.disabled,
                built,
                factory: None,
            },
        );
        self.fire(|hooks| hooks.on_register(&meta));
        Ok(())
    }

    /// Registers a factory; the detector is constructed on first use.
    pub fn register_factory(
        &mut self,
        info: DetectorMeta,
        factory: DetectorFactory,
        options: RegisterOptions,
    ) -> Result<()> {
        Self::validate_id(&info.id)?;
        if self.entries.contains_key(&info.id) && !options.override_existing {
            return Err(Error::InvalidArgument(format!(
                "duplicate detector id '{}' (pass override to replace)",
                info.id
            )));
        }
        self.entries.insert(
            info.id.clone(),
            Entry {
                info: info.clone(),
                priority: options.priority,
                enabled: !options.disabled,
                built: OnceLock::new(),
                factory: Some(factory),
            },
        );
        self.fire(|hooks| hooks.on_register(&info));
        Ok(())
    }

    /// Removes a detector, firing `on_unload`.
    pub fn unregister(&mut self, id: &str) -> Result<()> {
        if self.entries.remove(id).is_none() {
            return Err(Error::NotFound {
                kind: "detector",
                name: id.to_string(),
            });
        }
        self.fire(|hooks| hooks.on_unload(id));
        Ok(())
    }

    /// Fetches a detector by id, constructing it if it was factory-registered.
    pub fn get(&self, id: &str) -> Option<&Detector> {
        self.entries.get(id).map(Entry::detector)
    }

    /// The descriptor for an id, without forcing construction.
    pub fn info(&self, id: &str) -> Option<&DetectorMeta> {
        self.entries.get(id).map(|e| &e.info)
    }

    /// Whether the id is currently enabled.
    pub fn is_enabled(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(|e| e.enabled)
    }

    /// Enables or disables a detector. Idempotent.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        let entry = self.entries.get_mut(id).ok_or_else(|| Error::NotFound {
            kind: "detector",
            name: id.to_string(),
        })?;
        entry.enabled = enabled;
        Ok(())
    }

    /// Number of registered detectors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queries detectors, ordered by descending priority then id.
    ///
    /// The ordering is stable across process restarts given the same
    /// registrations.
    pub fn query(&self, query: &DetectorQuery) -> Vec<&Detector> {
        let id_glob = query
            .id_pattern
            .as_deref()
            .and_then(|p| Pattern::new(p).ok());
        let mut hits: Vec<(&String, &Entry)> = self
            .entries
            .iter()
            .filter(|(id, entry)| {
                let info = &entry.info;
                query.category.map_or(true, |c| info.category == c)
                    && query
                        .subcategory
                        .as_deref()
                        .map_or(true, |s| info.subcategory == s)
                    && query.language.map_or(true, |lang| {
                        info.languages.is_empty() || info.languages.contains(&lang)
                    })
                    && query.detection_method.map_or(true, |m| info.method == m)
                    && query.enabled.map_or(true, |e| entry.enabled == e)
                    && id_glob.as_ref().map_or(true, |g| g.matches(id))
            })
            .collect();
        hits.sort_by(|(id_a, a), (id_b, b)| {
            b.priority.cmp(&a.priority).then_with(|| id_a.cmp(id_b))
        });
        hits.into_iter().map(|(_, entry)| entry.detector()).collect()
    }

    /// All enabled detectors that apply to the given file, in query order.
    pub fn enabled_for_file(&self, path: &Path, language: Language) -> Vec<&Detector> {
        self.query(&DetectorQuery {
            enabled: Some(true),
            ..Default::default()
        })
        .into_iter()
        .filter(|d| d.applies_to(path, language))
        .collect()
    }

    /// Notifies hooks that a file changed.
    pub fn notify_file_change(&self, path: &Path) {
        self.fire(|hooks| hooks.on_file_change(path));
    }

    fn fire<F: Fn(&dyn RegistryHooks)>(&self, f: F) {
        for hooks in &self.hooks {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                f(hooks.as_ref())
            }));
            if result.is_err() {
                log::warn!("registry hook panicked; detector state unchanged");
            }
        }
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
