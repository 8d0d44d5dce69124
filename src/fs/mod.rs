//! File system access used by the scanner and the script loader
//!
//! The supervisor never touches `std::fs` directly. Embedders with an
//! archive or virtual file system implement [`FileSystem`]; tests use
//! [`MemoryFileSystem`] for exact control over modification times.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::SystemTime;

/// Directory enumeration, timestamps and file contents
pub trait FileSystem {
    /// Names of the direct children of `path`, in no particular order
    fn list_entries(&self, path: &Path) -> io::Result<Vec<String>>;

    fn is_dir(&self, path: &Path) -> bool;

    /// Last modification time; `None` if the file vanished or cannot be read
    fn modified(&self, path: &Path) -> Option<SystemTime>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// The real file system
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn list_entries(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        path.metadata().and_then(|m| m.modified()).ok()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: String,
    modified: SystemTime,
}

/// In-memory file system with explicit modification times
///
/// Clones share the same files, so a test can keep a handle and edit
/// files while a supervisor owns another.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    files: Rc<RefCell<BTreeMap<PathBuf, MemoryFile>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file; parent directories exist implicitly
    pub fn write(&self, path: impl Into<PathBuf>, contents: impl Into<String>, modified: SystemTime) {
        self.files.borrow_mut().insert(
            path.into(),
            MemoryFile {
                contents: contents.into(),
                modified,
            },
        );
    }

    /// Change a file's modification time without touching its contents
    pub fn touch(&self, path: &Path, modified: SystemTime) -> bool {
        match self.files.borrow_mut().get_mut(path) {
            Some(file) => {
                file.modified = modified;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.files.borrow_mut().remove(path).is_some()
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}: no such file or directory", path.display()),
        )
    }
}

impl FileSystem for MemoryFileSystem {
    fn list_entries(&self, path: &Path) -> io::Result<Vec<String>> {
        let files = self.files.borrow();
        let mut names: Vec<String> = Vec::new();
        for file in files.keys() {
            let Ok(rest) = file.strip_prefix(path) else { continue };
            if let Some(first) = rest.components().next() {
                let name = first.as_os_str().to_string_lossy().into_owned();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        if names.is_empty() {
            return Err(Self::not_found(path));
        }
        Ok(names)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .borrow()
            .keys()
            .any(|f| f != path && f.starts_with(path))
    }

    fn modified(&self, path: &Path) -> Option<SystemTime> {
        self.files.borrow().get(path).map(|f| f.modified)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .borrow()
            .get(path)
            .map(|f| f.contents.clone())
            .ok_or_else(|| Self::not_found(path))
    }
}
