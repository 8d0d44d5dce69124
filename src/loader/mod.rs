//! Module identity, loading and the active-generation registry
//!
//! A module is named by its path relative to the watch root with the
//! extension dropped and separators turned into dots, so
//! `game/sub/enemy.mod` under `game/` is `sub.enemy`.

use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::runtime::{Interpreter, Value};
use rustc_hash::FxHashMap as HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Module identifier derived from a file path
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive the identifier for `path` relative to `root`
    pub fn from_path(root: &Path, path: &Path) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let mut parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if let Some(last) = parts.last_mut() {
            if let Some(stem) = Path::new(last.as_str()).file_stem() {
                *last = stem.to_string_lossy().into_owned();
            }
        }
        Self(parts.join("."))
    }

    /// File that holds this module under `root`
    pub fn to_path(&self, root: &Path, extension: &str) -> PathBuf {
        let mut path = root.to_path_buf();
        for part in self.0.split('.') {
            path.push(part);
        }
        path.set_extension(extension);
        path
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Produces a fresh value graph for a module
///
/// Loading must not touch the active generation: a failed load leaves
/// the registry exactly as it was.
pub trait ModuleLoader {
    fn load(&self, id: &ModuleId, path: &Path, fs: &dyn FileSystem) -> Result<Value>;
}

/// Loads module source files with the built-in interpreter
#[derive(Default)]
pub struct ScriptLoader {
    interpreter: Interpreter,
}

impl ScriptLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModuleLoader for ScriptLoader {
    fn load(&self, id: &ModuleId, path: &Path, fs: &dyn FileSystem) -> Result<Value> {
        let source = fs.read_to_string(path)?;
        tracing::trace!(module = %id, bytes = source.len(), "evaluating module source");
        self.interpreter
            .load_module(&source, &path.display().to_string())
    }
}

/// The single active generation of every loaded module
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<ModuleId, Value>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ModuleId) -> Option<&Value> {
        self.modules.get(id)
    }

    /// Make `value` the active generation, returning the one it replaced
    pub fn insert(&mut self, id: ModuleId, value: Value) -> Option<Value> {
        self.modules.insert(id, value)
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    /// Loaded module names, sorted
    pub fn names(&self) -> Vec<ModuleId> {
        let mut names: Vec<ModuleId> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Error for a module name with no file behind it
pub(crate) fn module_not_found(id: &ModuleId, path: &Path) -> Error {
    Error::ModuleError(format!(
        "module '{}' not found (expected {})",
        id,
        path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use std::time::SystemTime;

    #[test]
    fn test_module_id_from_path() {
        let root = Path::new("game");
        assert_eq!(ModuleId::from_path(root, Path::new("game/a.mod")).as_str(), "a");
        assert_eq!(
            ModuleId::from_path(root, Path::new("game/sub/b.mod")).as_str(),
            "sub.b"
        );
        assert_eq!(ModuleId::from_path(root, Path::new("other/c.mod")).as_str(), "other.c");
    }

    #[test]
    fn test_module_id_to_path() {
        let id = ModuleId::new("sub.b");
        assert_eq!(id.to_path(Path::new("game"), "mod"), PathBuf::from("game/sub/b.mod"));
    }

    #[test]
    fn test_script_loader_reads_through_fs() {
        let fs = MemoryFileSystem::new();
        fs.write("game/a.mod", "value = 1", SystemTime::UNIX_EPOCH);
        let loader = ScriptLoader::new();
        let id = ModuleId::new("a");

        let module = loader.load(&id, Path::new("game/a.mod"), &fs).unwrap();
        assert_eq!(module.get("value"), Value::Number(1.0));

        let err = loader.load(&id, Path::new("game/missing.mod"), &fs).unwrap_err();
        assert!(matches!(err, Error::IoError { .. }));
    }

    #[test]
    fn test_registry_keeps_one_generation() {
        let mut registry = ModuleRegistry::new();
        let first = Value::new_table();
        let second = Value::new_table();
        assert!(registry.insert(ModuleId::new("a"), first.clone()).is_none());
        assert_eq!(registry.insert(ModuleId::new("a"), second.clone()), Some(first));
        assert_eq!(registry.get(&ModuleId::new("a")), Some(&second));
        assert_eq!(registry.len(), 1);
    }
}
