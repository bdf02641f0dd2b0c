//! In-memory project file set.
//!
//! The engine never reads the filesystem during a compile pass: the host
//! supplies a projection of the file tree as `(path, content)` pairs with
//! '/'-delimited, project-relative paths. [`ProjectFiles::load_dir`] exists
//! for the CLI, which seeds the set from a directory once and then keeps it
//! current from watch events.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A single source file as supplied by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Project-relative, '/'-delimited path, e.g. `src/App.tsx`. Unique.
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// True if the path participates in a compile pass.
pub fn is_compilable(path: &str) -> bool {
    path.ends_with(".ts") || path.ends_with(".tsx")
}

/// The full file tree of one project, keyed by path.
///
/// Backed by a `BTreeMap` so iteration order (and therefore bundle layout)
/// is deterministic for identical inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFiles {
    files: BTreeMap<String, String>,
}

impl ProjectFiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files(files: impl IntoIterator<Item = SourceFile>) -> Self {
        let mut set = Self::new();
        for file in files {
            set.files.insert(file.path, file.content);
        }
        set
    }

    /// Insert or replace a file. Returns `true` if the content changed.
    pub fn upsert(&mut self, path: impl Into<String>, content: impl Into<String>) -> bool {
        let path = path.into();
        let content = content.into();
        match self.files.get(&path) {
            Some(existing) if *existing == content => false,
            _ => {
                self.files.insert(path, content);
                true
            }
        }
    }

    /// Remove a file. Returns `true` if it existed.
    pub fn remove(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// All files, in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    /// The `.ts`/`.tsx` files a compile pass operates on, in path order.
    pub fn compilable(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(path, _)| is_compilable(path))
    }

    /// Seed a file set from a directory on disk.
    ///
    /// Hidden entries and `node_modules` are skipped; paths are normalized
    /// to '/' separators relative to `root`.
    pub fn load_dir(root: &Path) -> Result<Self, Error> {
        if !root.is_dir() {
            return Err(Error::ProjectNotFound(root.to_path_buf()));
        }

        let mut set = Self::new();
        let walker = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !(name.starts_with('.') && entry.depth() > 0) && name != "node_modules"
            });

        for entry in walker {
            let entry = entry.map_err(|e| Error::other(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let content =
                std::fs::read_to_string(entry.path()).map_err(|source| Error::FileRead {
                    path: entry.path().to_path_buf(),
                    source,
                })?;
            set.files.insert(path, content);
        }

        Ok(set)
    }
}
