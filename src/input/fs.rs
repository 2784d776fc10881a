//! Filesystem access for the migrations root
//!
//! All paths handed to a [`Filesystem`] are relative to the migrations root.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Minimal filesystem surface used by discovery and scaffolding.
pub trait Filesystem {
    /// Every `.sql` file under the root, recursively, as relative paths.
    ///
    /// A missing root yields no files.
    fn sql_files(&self) -> io::Result<Vec<PathBuf>>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// What exists at `path`, or `None` if nothing does.
    fn kind(&self, path: &Path) -> Option<EntryKind>;

    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Create a file that must not already exist.
    fn create_new(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Where `path` lives, for messages.
    fn display_path(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// Check if a path has a `.sql` extension.
pub(crate) fn is_sql_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("sql"))
        .unwrap_or(false)
}

/// A migrations root on disk.
#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collect(&self, rel: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
        for entry in std::fs::read_dir(self.root.join(rel))? {
            let entry = entry?;
            let rel_path = rel.join(entry.file_name());
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.collect(&rel_path, out)?;
            } else if is_sql_file(&rel_path) {
                out.push(rel_path);
            }
        }
        Ok(())
    }
}

impl Filesystem for DiskFs {
    fn sql_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if self.root.is_dir() {
            self.collect(Path::new(""), &mut files)?;
        }
        files.sort();
        Ok(files)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(self.root.join(path))
    }

    fn kind(&self, path: &Path) -> Option<EntryKind> {
        let meta = std::fs::metadata(self.root.join(path)).ok()?;
        Some(if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        })
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(self.root.join(path))
    }

    fn create_new(&self, path: &Path, contents: &str) -> io::Result<()> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    }

    fn display_path(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Dir,
    File(String),
}

/// In-memory migrations root. The root directory always exists.
#[derive(Debug, Default)]
pub struct MemoryFs {
    entries: RefCell<BTreeMap<PathBuf, Entry>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, creating its parent directories.
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let path = path.into();
        {
            let mut entries = self.entries.borrow_mut();
            for ancestor in path.ancestors().skip(1) {
                if !ancestor.as_os_str().is_empty() {
                    entries.insert(ancestor.to_path_buf(), Entry::Dir);
                }
            }
            entries.insert(path, Entry::File(contents.into()));
        }
        self
    }

    /// Number of files currently stored.
    pub fn file_count(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|e| matches!(e, Entry::File(_)))
            .count()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

impl Filesystem for MemoryFs {
    fn sql_files(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .entries
            .borrow()
            .iter()
            .filter(|(path, entry)| matches!(entry, Entry::File(_)) && is_sql_file(path))
            .map(|(path, _)| path.clone())
            .collect())
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        match self.entries.borrow().get(path) {
            Some(Entry::File(contents)) => Ok(contents.clone()),
            Some(Entry::Dir) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn kind(&self, path: &Path) -> Option<EntryKind> {
        if path.as_os_str().is_empty() {
            return Some(EntryKind::Dir);
        }
        self.entries.borrow().get(path).map(|entry| match entry {
            Entry::Dir => EntryKind::Dir,
            Entry::File(_) => EntryKind::File,
        })
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let mut entries = self.entries.borrow_mut();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            if let Some(Entry::File(_)) = entries.get(ancestor) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("file exists: {}", ancestor.display()),
                ));
            }
        }
        for ancestor in path.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                entries.insert(ancestor.to_path_buf(), Entry::Dir);
            }
        }
        Ok(())
    }

    fn create_new(&self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if self.kind(parent) != Some(EntryKind::Dir) {
                return Err(not_found(parent));
            }
        }
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {}", path.display()),
            ));
        }
        entries.insert(path.to_path_buf(), Entry::File(contents.to_string()));
        Ok(())
    }
}
