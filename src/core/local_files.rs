use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

/// What a directory entry is, judged without following symbolic links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

/// Entry returned from directory listing
#[derive(Debug, Clone)]
pub struct Entry {
    pub path: PathBuf,
    pub name: String,
    pub kind: EntryKind,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Filesystem operations used while clearing and populating site directories.
///
/// Removal and listing return `io::Result` so callers can record the OS-level
/// cause (locked file, permission denied) per entry.
pub trait FileSystem {
    fn list(&self, dir: &Path) -> io::Result<Vec<Entry>>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    fn remove_link(&self, path: &Path) -> io::Result<()>;
    fn ensure_dir(&self, dir: &Path) -> Result<()>;
}

/// Local filesystem implementation
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for LocalFs {
    fn list(&self, dir: &Path) -> io::Result<Vec<Entry>> {
        let mut result = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            // DirEntry::file_type does not traverse symlinks
            let file_type = entry.file_type()?;
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            result.push(Entry {
                path: entry.path(),
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn remove_link(&self, path: &Path) -> io::Result<()> {
        // Windows directory symlinks and junctions are removed with remove_dir
        fs::remove_file(path).or_else(|err| fs::remove_dir(path).map_err(|_| err))
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            fs::create_dir_all(dir).map_err(|e| {
                Error::internal_io(
                    e.to_string(),
                    Some(format!("create directory {}", dir.display())),
                )
            })?;
        }
        Ok(())
    }
}

/// Convenience function to get local filesystem
pub fn local() -> LocalFs {
    LocalFs::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_local_fs_list_reports_kinds_sorted_by_name() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "text").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        let entries = local().list(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a");
        assert!(entries[0].is_dir());
        assert_eq!(entries[1].name, "b.txt");
        assert_eq!(entries[1].kind, EntryKind::File);
    }

    #[test]
    fn test_local_fs_list_missing_dir_is_not_found() {
        let dir = tempdir().unwrap();
        let err = local().list(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_local_fs_symlink_is_not_followed() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("keep.txt"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let fs_impl = local();
        let entries = fs_impl.list(dir.path()).unwrap();
        assert_eq!(entries[0].kind, EntryKind::Symlink);

        fs_impl.remove_link(&entries[0].path).unwrap();
        assert!(!dir.path().join("link").exists());
        assert!(outside.path().join("keep.txt").exists());
    }

    #[test]
    fn test_ensure_dir_creates_nested_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        local().ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        local().ensure_dir(&nested).unwrap();
    }
}
