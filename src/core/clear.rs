//! Best-effort clearing of a site directory.
//!
//! Only the immediate children of the target are enumerated. Preserved
//! children are skipped without descending into them; everything else is
//! removed (directories with their whole subtree). A child that cannot be
//! removed, typically because a running web server holds it open, is
//! recorded and the remaining siblings are still processed.
//!
//! Symbolic links are removed as links and never followed, so a link that
//! points outside the site cannot cause anything outside it to be deleted.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::local_files::{EntryKind, FileSystem};
use crate::preserve::PreserveRule;

/// An entry that could not be removed while clearing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearEntryError {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub reason: String,
    pub cause: String,
}

impl ClearEntryError {
    fn new(path: &Path, kind: EntryKind, err: &io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            reason: reason_for(err).to_string(),
            cause: err.to_string(),
        }
    }
}

fn reason_for(err: &io::Error) -> &'static str {
    match err.kind() {
        io::ErrorKind::PermissionDenied => "permission_denied",
        io::ErrorKind::NotFound => "not_found",
        _ if is_sharing_violation(err) => "in_use",
        _ => "io_error",
    }
}

// ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
fn is_sharing_violation(err: &io::Error) -> bool {
    cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33))
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub removed: usize,
    pub preserved: Vec<String>,
    pub errors: Vec<ClearEntryError>,
}

impl ClearReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Remove the contents of `path`, keeping entries matched by `rule`.
///
/// Never removes `path` itself. A missing directory is a no-op.
pub fn clear_directory(fs: &dyn FileSystem, path: &Path, rule: &PreserveRule) -> ClearReport {
    let mut report = ClearReport::default();

    let entries = match fs.list(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
        Err(e) => {
            eprintln!("[clear] Warning: unable to list {}: {}", path.display(), e);
            report
                .errors
                .push(ClearEntryError::new(path, EntryKind::Dir, &e));
            return report;
        }
    };

    for entry in entries {
        if rule.matches(&entry.name) {
            log_status!("clear", "Preserving {}", entry.path.display());
            report.preserved.push(entry.name);
            continue;
        }

        let result = match entry.kind {
            EntryKind::File => fs.remove_file(&entry.path),
            EntryKind::Dir => fs.remove_dir_all(&entry.path),
            EntryKind::Symlink => fs.remove_link(&entry.path),
        };

        match result {
            Ok(()) => report.removed += 1,
            // Vanished between listing and removal
            Err(e) if e.kind() == io::ErrorKind::NotFound => report.removed += 1,
            Err(e) => {
                eprintln!(
                    "[clear] Warning: unable to delete {}: {} (it may still be in use by another process)",
                    entry.path.display(),
                    e
                );
                report
                    .errors
                    .push(ClearEntryError::new(&entry.path, entry.kind, &e));
            }
        }
    }

    report
}
