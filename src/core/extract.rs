//! Archive extraction strategies.
//!
//! The archive format is sniffed from the file signature and mapped to an
//! [`Extractor`]. Site deployment only talks to the trait, so adding a format
//! means adding an implementation and a signature here.

use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use sevenz_rust::{Password, SevenZArchiveEntry, SevenZReader};
use zip::ZipArchive;

use crate::error::{Error, Result};

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_ARCHIVE: &[u8] = b"PK\x05\x06";
const ZIP_SPANNED: &[u8] = b"PK\x07\x08";
const SEVEN_ZIP: &[u8] = b"7z\xBC\xAF\x27\x1C";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArchiveFormat {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "7z")]
    SevenZip,
}

impl ArchiveFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::SevenZip => "7z",
        }
    }

    /// Identify an archive by its leading bytes.
    pub fn detect(archive: &Path) -> Result<Self> {
        let mut file = File::open(archive).map_err(|e| extract_error(archive, "open archive", e))?;
        let mut header = Vec::with_capacity(SEVEN_ZIP.len());
        file.by_ref()
            .take(SEVEN_ZIP.len() as u64)
            .read_to_end(&mut header)
            .map_err(|e| extract_error(archive, "read archive header", e))?;

        if [ZIP_LOCAL_HEADER, ZIP_EMPTY_ARCHIVE, ZIP_SPANNED]
            .iter()
            .any(|magic| header.starts_with(magic))
        {
            return Ok(ArchiveFormat::Zip);
        }
        if header.starts_with(SEVEN_ZIP) {
            return Ok(ArchiveFormat::SevenZip);
        }

        Err(Error::artifact_extract_failed(
            archive.display().to_string(),
            "not a recognized archive (unknown file signature)",
        ))
    }
}

/// What an archive contains, gathered without writing anything.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub format: ArchiveFormat,
    pub entries: usize,
    pub uncompressed_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractStats {
    pub files: usize,
    pub directories: usize,
    pub bytes_written: u64,
}

pub trait Extractor {
    fn format(&self) -> ArchiveFormat;

    /// Read every entry and verify it, without touching the filesystem.
    fn inspect(&self, archive: &Path) -> Result<ArchiveSummary>;

    /// Unpack every entry under `destination`, overwriting same-named files.
    ///
    /// Not transactional: on failure, entries written so far stay in place.
    fn extract(&self, archive: &Path, destination: &Path) -> Result<ExtractStats>;
}

/// Pick the extractor for `archive` based on its signature.
pub fn extractor_for(archive: &Path) -> Result<Box<dyn Extractor>> {
    match ArchiveFormat::detect(archive)? {
        ArchiveFormat::Zip => Ok(Box::new(ZipExtractor)),
        ArchiveFormat::SevenZip => Ok(Box::new(SevenZipExtractor)),
    }
}

fn extract_error(archive: &Path, context: &str, err: impl Display) -> Error {
    Error::artifact_extract_failed(
        archive.display().to_string(),
        format!("{}: {}", context, err),
    )
}

pub struct ZipExtractor;

impl ZipExtractor {
    fn open(archive: &Path) -> Result<ZipArchive<File>> {
        let file = File::open(archive).map_err(|e| extract_error(archive, "open archive", e))?;
        ZipArchive::new(file).map_err(|e| extract_error(archive, "read zip directory", e))
    }
}

/// Entry path relative to the destination, rejecting absolute paths and `..`.
fn enclosed_path(archive: &Path, entry: &zip::read::ZipFile<'_>) -> Result<PathBuf> {
    entry
        .enclosed_name()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| {
            extract_error(
                archive,
                "unsafe entry path",
                format!("'{}' escapes the destination", entry.name()),
            )
        })
}

impl Extractor for ZipExtractor {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn inspect(&self, archive: &Path) -> Result<ArchiveSummary> {
        let mut zip = Self::open(archive)?;
        let mut uncompressed_bytes = 0;

        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| extract_error(archive, "read entry", e))?;
            enclosed_path(archive, &entry)?;
            // Reading to the end verifies the entry checksum
            uncompressed_bytes += io::copy(&mut entry, &mut io::sink())
                .map_err(|e| extract_error(archive, &format!("verify '{}'", entry.name()), e))?;
        }

        Ok(ArchiveSummary {
            format: ArchiveFormat::Zip,
            entries: zip.len(),
            uncompressed_bytes,
        })
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<ExtractStats> {
        let mut zip = Self::open(archive)?;
        let mut stats = ExtractStats::default();

        fs::create_dir_all(destination).map_err(|e| {
            extract_error(
                archive,
                &format!("create destination {}", destination.display()),
                e,
            )
        })?;

        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| extract_error(archive, "read entry", e))?;
            let target = destination.join(enclosed_path(archive, &entry)?);

            if entry.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|e| extract_error(archive, &format!("create {}", target.display()), e))?;
                stats.directories += 1;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    extract_error(archive, &format!("create {}", parent.display()), e)
                })?;
            }

            let mut out = File::create(&target)
                .map_err(|e| extract_error(archive, &format!("write {}", target.display()), e))?;
            stats.bytes_written += io::copy(&mut entry, &mut out)
                .map_err(|e| extract_error(archive, &format!("write {}", target.display()), e))?;
            stats.files += 1;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode().map(|m| m & 0o777).filter(|m| *m != 0) {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&target, fs::Permissions::from_mode(mode)).map_err(|e| {
                    extract_error(archive, &format!("set permissions on {}", target.display()), e)
                })?;
            }
        }

        log_status!(
            "extract",
            "Unpacked {} file(s) into {}",
            stats.files,
            destination.display()
        );

        Ok(stats)
    }
}

/// Relative path for a stored entry name, or `None` if it is absolute or climbs out with `..`.
fn safe_entry_path(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut path = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(path)
}

pub struct SevenZipExtractor;

impl SevenZipExtractor {
    fn open(archive: &Path) -> Result<SevenZReader<File>> {
        SevenZReader::open(archive, Password::empty())
            .map_err(|e| extract_error(archive, "read 7z header", e))
    }

    /// Run `handle` for every entry, stopping at the first error it returns.
    fn each_entry<F>(archive: &Path, mut handle: F) -> Result<()>
    where
        F: FnMut(&SevenZArchiveEntry, &mut dyn Read) -> Result<()>,
    {
        let mut reader = Self::open(archive)?;
        let mut failure = None;

        reader
            .for_each_entries(|entry, data| match handle(entry, data) {
                Ok(()) => Ok(true),
                Err(err) => {
                    failure = Some(err);
                    Ok(false)
                }
            })
            .map_err(|e| extract_error(archive, "read 7z entries", e))?;

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn entry_path(archive: &Path, entry: &SevenZArchiveEntry) -> Result<PathBuf> {
        safe_entry_path(entry.name()).ok_or_else(|| {
            extract_error(
                archive,
                "unsafe entry path",
                format!("'{}' escapes the destination", entry.name()),
            )
        })
    }
}

impl Extractor for SevenZipExtractor {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::SevenZip
    }

    fn inspect(&self, archive: &Path) -> Result<ArchiveSummary> {
        let mut entries = 0;
        let mut uncompressed_bytes = 0;

        Self::each_entry(archive, |entry, data| {
            Self::entry_path(archive, entry)?;
            // Reading to the end verifies the entry checksum
            uncompressed_bytes += io::copy(data, &mut io::sink())
                .map_err(|e| extract_error(archive, &format!("verify '{}'", entry.name()), e))?;
            entries += 1;
            Ok(())
        })?;

        Ok(ArchiveSummary {
            format: ArchiveFormat::SevenZip,
            entries,
            uncompressed_bytes,
        })
    }

    fn extract(&self, archive: &Path, destination: &Path) -> Result<ExtractStats> {
        let mut stats = ExtractStats::default();

        fs::create_dir_all(destination).map_err(|e| {
            extract_error(
                archive,
                &format!("create destination {}", destination.display()),
                e,
            )
        })?;

        Self::each_entry(archive, |entry, data| {
            let target = destination.join(Self::entry_path(archive, entry)?);

            if entry.is_directory() {
                fs::create_dir_all(&target)
                    .map_err(|e| extract_error(archive, &format!("create {}", target.display()), e))?;
                stats.directories += 1;
                return Ok(());
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    extract_error(archive, &format!("create {}", parent.display()), e)
                })?;
            }

            let mut out = File::create(&target)
                .map_err(|e| extract_error(archive, &format!("write {}", target.display()), e))?;
            stats.bytes_written += io::copy(data, &mut out)
                .map_err(|e| extract_error(archive, &format!("write {}", target.display()), e))?;
            stats.files += 1;
            Ok(())
        })?;

        log_status!(
            "extract",
            "Unpacked {} file(s) into {}",
            stats.files,
            destination.display()
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, Option<&str>)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            match content {
                Some(content) => {
                    zip.start_file(*name, FileOptions::default()).unwrap();
                    zip.write_all(content.as_bytes()).unwrap();
                }
                None => zip.add_directory(*name, FileOptions::default()).unwrap(),
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn detects_zip_signature() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("release.bin");
        write_zip(&archive, &[("index.html", Some("<html/>"))]);

        assert_eq!(ArchiveFormat::detect(&archive).unwrap(), ArchiveFormat::Zip);
    }

    /// Build a .7z from `(relative path, content)` pairs.
    fn write_7z(path: &Path, files: &[(&str, &str)]) {
        let source = tempdir().unwrap();
        for (name, content) in files {
            let file = source.path().join(name);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, content).unwrap();
        }
        sevenz_rust::compress_to_path(source.path(), path).unwrap();
    }

    #[test]
    fn detects_seven_zip_signature() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("release.bin");
        write_7z(&archive, &[("index.html", "<html/>")]);

        assert_eq!(
            ArchiveFormat::detect(&archive).unwrap(),
            ArchiveFormat::SevenZip
        );
        let extractor = extractor_for(&archive).unwrap();
        assert_eq!(extractor.format(), ArchiveFormat::SevenZip);
    }

    #[test]
    fn seven_zip_extracts_nested_files() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("release.7z");
        write_7z(
            &archive,
            &[
                ("index.html", "<html/>"),
                ("bin/app.dll", "dll"),
                ("css/site.css", "body{}"),
            ],
        );
        let dest = dir.path().join("site");

        let stats = SevenZipExtractor.extract(&archive, &dest).unwrap();

        assert_eq!(stats.files, 3);
        assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), "<html/>");
        assert_eq!(fs::read_to_string(dest.join("bin/app.dll")).unwrap(), "dll");
        assert_eq!(fs::read_to_string(dest.join("css/site.css")).unwrap(), "body{}");
    }

    #[test]
    fn seven_zip_overwrites_existing_files() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("release.7z");
        write_7z(&archive, &[("index.html", "new")]);
        let dest = dir.path().join("site");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("index.html"), "old and longer").unwrap();

        SevenZipExtractor.extract(&archive, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), "new");
    }

    #[test]
    fn seven_zip_inspect_reads_without_writing() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("release.7z");
        write_7z(&archive, &[("a.txt", "aaaa"), ("b.txt", "bb")]);

        let summary = SevenZipExtractor.inspect(&archive).unwrap();

        assert_eq!(summary.format, ArchiveFormat::SevenZip);
        assert!(summary.entries >= 2);
        assert_eq!(summary.uncompressed_bytes, 6);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn corrupt_seven_zip_fails_with_extract_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("release.7z");
        let mut bytes = SEVEN_ZIP.to_vec();
        bytes.extend_from_slice(&[0u8; 26]);
        fs::write(&archive, bytes).unwrap();

        let extractor = extractor_for(&archive).unwrap();
        let err = extractor.inspect(&archive).unwrap_err();
        assert_eq!(err.code.as_str(), "artifact.extract_failed");

        let err = extractor
            .extract(&archive, &dir.path().join("site"))
            .unwrap_err();
        assert_eq!(err.code.as_str(), "artifact.extract_failed");
        assert!(!dir.path().join("site").join("index.html").exists());
    }

    #[test]
    fn entry_paths_cannot_escape_destination() {
        assert_eq!(
            safe_entry_path("bin/app.dll"),
            Some(PathBuf::from("bin").join("app.dll"))
        );
        assert_eq!(
            safe_entry_path("bin\\app.dll"),
            Some(PathBuf::from("bin").join("app.dll"))
        );
        assert_eq!(safe_entry_path("./index.html"), Some(PathBuf::from("index.html")));
        assert_eq!(safe_entry_path("../outside.txt"), None);
        assert_eq!(safe_entry_path("bin/../../outside.txt"), None);
        assert_eq!(safe_entry_path("/etc/passwd"), None);
        assert_eq!(safe_entry_path("..\\outside.txt"), None);
    }

    #[test]
    fn extracts_files_and_directories() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("release.zip");
        write_zip(
            &archive,
            &[
                ("index.html", Some("<html/>")),
                ("bin/", None),
                ("bin/app.dll", Some("dll")),
                ("css/site.css", Some("body{}")),
            ],
        );
        let dest = dir.path().join("site");

        let stats = ZipExtractor.extract(&archive, &dest).unwrap();

        assert_eq!(stats.files, 3);
        assert_eq!(stats.directories, 1);
        assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), "<html/>");
        assert_eq!(fs::read_to_string(dest.join("bin/app.dll")).unwrap(), "dll");
        assert!(dest.join("css").is_dir());
    }

    #[test]
    fn overwrites_existing_files() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("release.zip");
        write_zip(&archive, &[("index.html", Some("new"))]);
        let dest = dir.path().join("site");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("index.html"), "old and longer").unwrap();

        ZipExtractor.extract(&archive, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("index.html")).unwrap(), "new");
    }

    #[test]
    fn inspect_counts_entries_without_writing() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("release.zip");
        write_zip(&archive, &[("a.txt", Some("aaaa")), ("b.txt", Some("bb"))]);

        let summary = ZipExtractor.inspect(&archive).unwrap();

        assert_eq!(summary.entries, 2);
        assert_eq!(summary.uncompressed_bytes, 6);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_archive_fails_with_extract_error() {
        let dir = tempdir().unwrap();
        let err = ZipExtractor
            .extract(&dir.path().join("missing.zip"), &dir.path().join("site"))
            .unwrap_err();

        assert_eq!(err.code.as_str(), "artifact.extract_failed");
        assert!(err.details["error"].as_str().unwrap().contains("open archive"));
    }

    #[test]
    fn corrupt_archive_fails_with_extract_error() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("release.zip");
        fs::write(&archive, b"PK\x03\x04 this is not really a zip").unwrap();

        let err = ZipExtractor
            .extract(&archive, &dir.path().join("site"))
            .unwrap_err();
        assert_eq!(err.code.as_str(), "artifact.extract_failed");

        let err = ZipExtractor.inspect(&archive).unwrap_err();
        assert_eq!(err.code.as_str(), "artifact.extract_failed");
    }

    #[test]
    fn unknown_signature_is_rejected() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("release.zip");
        fs::write(&archive, b"plain text").unwrap();

        let err = extractor_for(&archive).err().unwrap();
        assert_eq!(err.code.as_str(), "artifact.extract_failed");
    }
}
