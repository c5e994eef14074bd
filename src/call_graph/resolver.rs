//! Cross-file symbol resolution
//!
//! Binds call sites to nodes through three tiers: exact same-file (or
//! fully qualified) match, import-aware local-name match, then a
//! method-name heuristic over receiver candidates. A tier that produces
//! two or more candidates does not bind; ambiguous edges stay unresolved
//! rather than guessing, and the resolution rate reports the honesty.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::edge::ResolutionTier;
use super::extract::{CallSite, FileExtraction};
use super::node::CallNode;

/// Symbol index over every extracted file.
pub struct SymbolResolver {
    /// every qualified name, for exact matches of explicitly qualified calls
    by_qualified: HashSet<String>,
    /// short name -> qualified names declaring it
    by_name: HashMap<String, Vec<String>>,
    /// (file, short name) -> qualified name
    by_file_name: HashMap<(PathBuf, String), String>,
    /// file -> local name -> import source
    imports: HashMap<PathBuf, HashMap<String, String>>,
}

impl SymbolResolver {
    /// Builds the index from all extractions.
    pub fn new(extractions: &[FileExtraction]) -> Self {
        let mut by_qualified = HashSet::new();
        let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
        let mut by_file_name = HashMap::new();
        let mut imports: HashMap<PathBuf, HashMap<String, String>> = HashMap::new();

        for extraction in extractions {
            for function in &extraction.functions {
                let qualified = CallNode::qualify(&extraction.file, &function.name);
                by_qualified.insert(qualified.clone());
                by_name
                    .entry(function.name.clone())
                    .or_default()
                    .push(qualified.clone());
                by_file_name
                    .insert((extraction.file.clone(), function.name.clone()), qualified);
            }
            let file_imports = imports.entry(extraction.file.clone()).or_default();
            for import in &extraction.imports {
                file_imports.insert(import.local_name.clone(), import.source.clone());
            }
        }

        for ids in by_name.values_mut() {
            ids.sort();
            ids.dedup();
        }

        Self {
            by_qualified,
            by_name,
            by_file_name,
            imports,
        }
    }

    /// Attempts to bind one call site from `file`. Returns the callee's
    /// qualified name and the tier that found it.
    pub fn resolve(&self, file: &Path, call: &CallSite) -> Option<(String, ResolutionTier)> {
        // Tier 1: a declaration in the same file, or an explicitly
        // qualified name that exists verbatim.
        if let Some(qualified) = self
            .by_file_name
            .get(&(file.to_path_buf(), call.callee_name.clone()))
        {
            return Some((qualified.clone(), ResolutionTier::Exact));
        }
        if self.by_qualified.contains(&call.callee_name) {
            return Some((call.callee_name.clone(), ResolutionTier::Exact));
        }

        // Tier 2: the name (or its receiver) was imported; match the
        // import source against declaring files.
        if let Some(file_imports) = self.imports.get(file) {
            if let Some(source) = file_imports.get(&call.callee_name) {
                if let Some(qualified) =
                    self.unique_in_module(source, &call.callee_name, file)
                {
                    return Some((qualified, ResolutionTier::Import));
                }
            }
            if let Some(receiver) = &call.receiver {
                if let Some(source) = file_imports.get(receiver) {
                    if let Some(qualified) =
                        self.unique_in_module(source, &call.callee_name, file)
                    {
                        return Some((qualified, ResolutionTier::Import));
                    }
                }
            }
        }

        // Tier 3: a globally unique short name. With a receiver present we
        // are looking at a method; without one, any callable counts.
        let candidates = self.by_name.get(&call.callee_name)?;
        if candidates.len() == 1 {
            return Some((candidates[0].clone(), ResolutionTier::Heuristic));
        }
        None
    }

    /// The single declaration of `name` in the module `source` refers to,
    /// if exactly one file matches.
    fn unique_in_module(&self, source: &str, name: &str, from_file: &Path) -> Option<String> {
        let normalized = normalize_module(source, from_file);
        let candidates: Vec<&String> = self
            .by_name
            .get(name)?
            .iter()
            .filter(|qualified| {
                let module = qualified.rsplit_once("::").map(|(m, _)| m).unwrap_or("");
                module_matches(module, &normalized)
            })
            .collect();
        match candidates.as_slice() {
            [single] => Some((*single).clone()),
            _ => None,
        }
    }
}

/// Normalizes an import specifier to path segments comparable with
/// qualified-name prefixes.
fn normalize_module(source: &str, from_file: &Path) -> String {
    let mut spec = source.replace("::", "/").replace('.', "/");
    // Relative specifiers resolve against the importing file's directory.
    if source.starts_with("./") || source.starts_with("../") {
        let dir = from_file.parent().unwrap_or(Path::new(""));
        let mut base: Vec<String> = dir
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        for segment in source.split('/') {
            match segment {
                "." | "" => {}
                ".." => {
                    base.pop();
                }
                other => base.push(other.to_string()),
            }
        }
        spec = base.join("/");
    }
    spec.trim_matches('/').to_string()
}

/// Whether a qualified-name module prefix matches a normalized specifier.
/// Suffix matching tolerates roots the specifier does not spell out
/// (`services/users` matches `src/services/users`).
fn module_matches(module: &str, normalized: &str) -> bool {
    if normalized.is_empty() {
        return false;
    }
    let module = module.replace('\\', "/");
    module == normalized
        || module.ends_with(&format!("/{}", normalized))
        || normalized.ends_with(&module)
}
