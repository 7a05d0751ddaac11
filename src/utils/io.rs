//! File I/O primitives with consistent error handling.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Read file contents with standardized error handling.
///
/// Wraps `fs::read_to_string` with consistent `Error::internal_io` formatting.
pub fn read_file(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(operation.to_string())))
}

/// Write bytes to a uniquely named file in `dir`, creating `dir` if needed.
///
/// The file is deleted when the returned handle is dropped.
pub fn write_temp_file(dir: &Path, prefix: &str, content: &[u8], operation: &str) -> Result<NamedTempFile> {
    fs::create_dir_all(dir)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} (mkdir)", operation))))?;

    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .tempfile_in(dir)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} (create)", operation))))?;

    file.write_all(content)
        .and_then(|_| file.flush())
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("{} (write)", operation))))?;

    Ok(file)
}

/// Hex-encoded SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("hash {}", path.display()))))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("hash {}", path.display()))))?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn read_file_succeeds_for_existing_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "test content").unwrap();

        let content = read_file(temp.path(), "test read").unwrap();
        assert!(content.contains("test content"));
    }

    #[test]
    fn read_file_returns_error_for_missing_file() {
        let result = read_file(Path::new("/nonexistent/path.txt"), "test read");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.code.as_str(), "internal.io_error");
    }

    #[test]
    fn write_temp_file_is_removed_on_drop() {
        let dir = tempdir().unwrap();
        let downloads = dir.path().join("downloads");

        let file = write_temp_file(&downloads, "shop-run-7-", b"zip bytes", "test write").unwrap();
        let path = file.path().to_path_buf();
        assert!(path.starts_with(&downloads));
        assert_eq!(fs::read(&path).unwrap(), b"zip bytes");

        drop(file);
        assert!(!path.exists());
        assert_eq!(fs::read_dir(&downloads).unwrap().count(), 0);
    }

    #[test]
    fn sha256_file_matches_known_digest() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"abc").unwrap();

        assert_eq!(
            sha256_file(temp.path()).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
