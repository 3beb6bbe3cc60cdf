//! Module resolution, provided by the embedder.
//!
//! The engine consumes a [`ModuleLoader`] trait: resolve a specifier
//! relative to the importing module into a canonical path, then load the
//! source text. The engine caches compiled modules by canonical path.

use std::path::{Path, PathBuf};

use ahash::AHashMap;

/// Resolves module specifiers to source text.
pub trait ModuleLoader {
    /// Resolves `specifier` (as written in the import) against the
    /// `referrer` module's canonical path into a canonical path.
    fn resolve(&self, specifier: &str, referrer: &str) -> Result<String, String>;

    /// Loads the source text for a canonical path.
    fn load(&self, canonical: &str) -> Result<String, String>;
}

/// In-memory loader for tests and embedded module sets.
///
/// Specifiers resolve to themselves; sources come from a registered map.
#[derive(Debug, Default)]
pub struct MapLoader {
    modules: AHashMap<String, String>,
}

impl MapLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) -> &mut Self {
        self.modules.insert(name.into(), source.into());
        self
    }
}

impl ModuleLoader for MapLoader {
    fn resolve(&self, specifier: &str, _referrer: &str) -> Result<String, String> {
        if self.modules.contains_key(specifier) {
            Ok(specifier.to_owned())
        } else {
            Err(format!("module not found: {specifier}"))
        }
    }

    fn load(&self, canonical: &str) -> Result<String, String> {
        self.modules
            .get(canonical)
            .cloned()
            .ok_or_else(|| format!("module not found: {canonical}"))
    }
}

/// Filesystem loader used by the CLI: specifiers are paths relative to the
/// referrer's directory.
#[derive(Debug, Default)]
pub struct FsLoader;

impl ModuleLoader for FsLoader {
    fn resolve(&self, specifier: &str, referrer: &str) -> Result<String, String> {
        let base = Path::new(referrer).parent().unwrap_or_else(|| Path::new("."));
        let joined: PathBuf = if Path::new(specifier).is_absolute() {
            PathBuf::from(specifier)
        } else {
            base.join(specifier)
        };
        joined
            .canonicalize()
            .map(|p| p.to_string_lossy().into_owned())
            .map_err(|err| format!("cannot resolve {specifier}: {err}"))
    }

    fn load(&self, canonical: &str) -> Result<String, String> {
        std::fs::read_to_string(canonical).map_err(|err| format!("cannot read {canonical}: {err}"))
    }
}

/// The loader installed when the host never set one: every import fails.
#[derive(Debug, Default)]
pub struct NoLoader;

impl ModuleLoader for NoLoader {
    fn resolve(&self, specifier: &str, _referrer: &str) -> Result<String, String> {
        Err(format!("no module loader installed (importing {specifier})"))
    }

    fn load(&self, canonical: &str) -> Result<String, String> {
        Err(format!("no module loader installed (loading {canonical})"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_loader_round_trip() {
        let mut loader = MapLoader::new();
        loader.insert("b", "export let x = 1;");
        let canonical = loader.resolve("b", "a").expect("resolvable");
        assert_eq!(loader.load(&canonical).expect("loadable"), "export let x = 1;");
        assert!(loader.resolve("missing", "a").is_err());
    }
}
