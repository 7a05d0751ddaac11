//! Artifact path resolution with glob pattern support.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Resolve the staged archive inside `staging_dir`.
///
/// - If `filename` contains no glob chars (`*`, `?`, `[`, `]`), returns the joined path after an existence check
/// - If it is a glob, expands it and returns the most recently modified file
/// - Returns `artifact.unavailable` if nothing matches
pub fn resolve_artifact_path(staging_dir: &Path, filename: &str) -> Result<PathBuf> {
    let joined = staging_dir.join(filename);

    if !contains_glob_chars(filename) {
        if joined.is_file() {
            return Ok(joined);
        }
        return Err(Error::artifact_unavailable(
            None,
            Some(joined.display().to_string()),
            format!("Artifact not found: {}", joined.display()),
        ));
    }

    let pattern = joined.to_string_lossy().into_owned();
    let entries: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| {
            Error::config_invalid_value(
                "artifact_filename",
                Some(filename.to_string()),
                format!("Invalid glob pattern: {}", e),
            )
        })?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();

    let newest = entries
        .into_iter()
        .max_by_key(|p| p.metadata().and_then(|m| m.modified()).ok());

    match newest {
        Some(path) => {
            log_status!("deploy", "Resolved '{}' -> '{}'", pattern, path.display());
            Ok(path)
        }
        None => Err(Error::artifact_unavailable(
            None,
            Some(pattern.clone()),
            format!("No files match pattern: {}", pattern),
        )),
    }
}

fn contains_glob_chars(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[') || s.contains(']')
}
