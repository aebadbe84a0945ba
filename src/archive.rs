//! Archive extraction
//!
//! Downloaded and imported packages arrive as `.zip` or `.tar.gz` archives.
//! Entries that would land outside the destination directory are skipped.

use crate::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::Archive;
use zip::ZipArchive;

/// Archive formats recognised by [`DefaultExtractor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// Detect the format from the file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else {
            None
        }
    }
}

/// Unpacks an archive into a directory
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `dest` and return the files written
    fn extract(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>>;
}

/// Extractor for zip and gzipped tar archives
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExtractor;

impl ArchiveExtractor for DefaultExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
        if !archive.is_file() {
            return Err(Error::NotFound(format!(
                "Archive not found: {}",
                archive.display()
            )));
        }

        let kind = ArchiveKind::from_path(archive).ok_or_else(|| {
            Error::Other(format!("Unsupported file type: {}", archive.display()))
        })?;

        fs::create_dir_all(dest)?;
        tracing::debug!("Extracting {} into {}", archive.display(), dest.display());

        match kind {
            ArchiveKind::Zip => extract_zip(archive, dest),
            ArchiveKind::TarGz => extract_tar_gz(archive, dest),
        }
    }
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut written = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        // Zip Slip: skip entries escaping the destination
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("Skipping unsafe archive entry '{}'", entry.name());
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out_file = File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;
        written.push(out_path);
    }

    Ok(written)
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let tar_gz = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(tar_gz));
    let mut written = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = entry.path()?.into_owned();
        let is_file = entry.header().entry_type().is_file();

        if !entry.unpack_in(dest)? {
            tracing::warn!("Skipping unsafe archive entry '{}'", relative.display());
            continue;
        }

        if is_file {
            written.push(dest.join(relative));
        }
    }

    Ok(written)
}
