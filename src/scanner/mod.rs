//! Modification-time change detection
//!
//! The scanner walks the watch root and compares every module file's
//! current modification time against the last one recorded for it. It
//! never updates records itself; the supervisor resets a record after
//! each swap attempt.

use crate::fs::FileSystem;
use rustc_hash::FxHashMap as HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Last known state of one tracked source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub path: PathBuf,
    /// `None` when the file could not be stat'ed at reset time
    pub last_known: Option<SystemTime>,
}

/// Records for every tracked file, keyed by path
#[derive(Debug, Default)]
pub struct FileRegistry {
    records: HashMap<PathBuf, ModuleRecord>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<&ModuleRecord> {
        self.records.get(path)
    }

    /// Record the file's current modification time
    pub fn reset(&mut self, path: &Path, fs: &dyn FileSystem) {
        let last_known = fs.modified(path);
        tracing::trace!(path = %path.display(), ?last_known, "reset file record");
        self.records.insert(
            path.to_path_buf(),
            ModuleRecord {
                path: path.to_path_buf(),
                last_known,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Finds module files whose modification time moved
#[derive(Debug, Clone)]
pub struct ChangeScanner {
    root: PathBuf,
    extension: String,
}

impl ChangeScanner {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Every tracked module file under the root, in discovery order
    pub fn module_files(&self, fs: &dyn FileSystem) -> Vec<PathBuf> {
        let mut files = Vec::new();
        self.walk(fs, &self.root, &mut files);
        files
    }

    /// Files that are new or whose modification time differs from their record
    ///
    /// A file that disappears between listing and stat is treated as
    /// unchanged.
    pub fn scan(&self, fs: &dyn FileSystem, registry: &FileRegistry) -> Vec<PathBuf> {
        let changed: Vec<PathBuf> = self
            .module_files(fs)
            .into_iter()
            .filter(|path| {
                let Some(current) = fs.modified(path) else {
                    tracing::debug!(path = %path.display(), "file vanished during scan");
                    return false;
                };
                match registry.get(path) {
                    None => true,
                    Some(record) => record.last_known != Some(current),
                }
            })
            .collect();

        if !changed.is_empty() {
            tracing::debug!(count = changed.len(), "scan found changed files");
        }
        changed
    }

    fn walk(&self, fs: &dyn FileSystem, dir: &Path, out: &mut Vec<PathBuf>) {
        let mut names = match fs.list_entries(dir) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "cannot list directory");
                return;
            }
        };
        names.sort();

        for name in names {
            if name.starts_with('.') {
                continue;
            }
            let path = dir.join(&name);
            if fs.is_dir(&path) {
                self.walk(fs, &path, out);
            } else if self.is_module_file(&path) {
                out.push(path);
            }
        }
    }

    fn is_module_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn tree() -> MemoryFileSystem {
        let fs = MemoryFileSystem::new();
        fs.write("game/b.mod", "b = 1", at(1));
        fs.write("game/a.mod", "a = 1", at(1));
        fs.write("game/sub/c.mod", "c = 1", at(1));
        fs.write("game/notes.txt", "ignored", at(1));
        fs.write("game/.hidden.mod", "h = 1", at(1));
        fs.write("game/.git/x.mod", "x = 1", at(1));
        fs
    }

    #[test]
    fn test_unseen_files_change_once() {
        let fs = tree();
        let scanner = ChangeScanner::new("game", "mod");
        let mut registry = FileRegistry::new();

        let changed = scanner.scan(&fs, &registry);
        assert_eq!(
            changed,
            vec![
                PathBuf::from("game/a.mod"),
                PathBuf::from("game/b.mod"),
                PathBuf::from("game/sub/c.mod"),
            ]
        );

        for path in &changed {
            registry.reset(path, &fs);
        }
        assert!(scanner.scan(&fs, &registry).is_empty());
    }

    #[test]
    fn test_changed_timestamp_is_reported() {
        let fs = tree();
        let scanner = ChangeScanner::new("game", "mod");
        let mut registry = FileRegistry::new();
        for path in scanner.module_files(&fs) {
            registry.reset(&path, &fs);
        }

        fs.touch(Path::new("game/sub/c.mod"), at(2));
        assert_eq!(scanner.scan(&fs, &registry), vec![PathBuf::from("game/sub/c.mod")]);

        // older timestamps count too, e.g. a restored backup
        fs.touch(Path::new("game/sub/c.mod"), at(0));
        assert_eq!(scanner.scan(&fs, &registry).len(), 1);
    }

    #[test]
    fn test_scan_does_not_touch_records() {
        let fs = tree();
        let scanner = ChangeScanner::new("game", "mod");
        let registry = FileRegistry::new();
        scanner.scan(&fs, &registry);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_root_scans_empty() {
        let fs = MemoryFileSystem::new();
        let scanner = ChangeScanner::new("nowhere", "mod");
        assert!(scanner.scan(&fs, &FileRegistry::new()).is_empty());
    }

    /// Lists `game/gone.mod` but has no timestamp for it, as when a file
    /// is deleted between the directory listing and the stat
    struct VanishingFs {
        inner: MemoryFileSystem,
    }

    impl FileSystem for VanishingFs {
        fn list_entries(&self, path: &Path) -> std::io::Result<Vec<String>> {
            let mut names = self.inner.list_entries(path)?;
            if path == Path::new("game") {
                names.push("gone.mod".to_string());
            }
            Ok(names)
        }

        fn is_dir(&self, path: &Path) -> bool {
            self.inner.is_dir(path)
        }

        fn modified(&self, path: &Path) -> Option<SystemTime> {
            self.inner.modified(path)
        }

        fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
            self.inner.read_to_string(path)
        }
    }

    #[test]
    fn test_file_vanishing_after_listing_is_unchanged() {
        let fs = VanishingFs { inner: tree() };
        let scanner = ChangeScanner::new("game", "mod");
        let mut registry = FileRegistry::new();
        registry.reset(Path::new("game/a.mod"), &fs);

        assert!(scanner.module_files(&fs).contains(&PathBuf::from("game/gone.mod")));
        let changed = scanner.scan(&fs, &registry);
        assert_eq!(
            changed,
            vec![PathBuf::from("game/b.mod"), PathBuf::from("game/sub/c.mod")]
        );
    }

    #[test]
    fn test_deleted_file_is_not_listed() {
        let fs = tree();
        let scanner = ChangeScanner::new("game", "mod");
        fs.remove(Path::new("game/b.mod"));

        let changed = scanner.scan(&fs, &FileRegistry::new());
        assert!(!changed.contains(&PathBuf::from("game/b.mod")));
    }
}
