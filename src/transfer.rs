//! Tracked file transfer
//!
//! Copies or moves a package tree into the game while honoring exclusion
//! rules, and reports every destination file it wrote so the caller can
//! record it. [`delete_tracked`] is the inverse: it removes exactly a
//! recorded set of files and prunes directories that became empty, never
//! touching the protected content root.
//!
//! # Examples
//!
//! ```no_run
//! use sessionmm::transfer::{copy_tree, delete_tracked, TransferOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = TransferOptions::default().exclude_folder("Data");
//! let written = copy_tree("/downloads/coolmap", "/games/Session/SessionGame/Content", &options)?;
//!
//! // ...later
//! delete_tracked(&written, "/games/Session/SessionGame/Content")?;
//! # Ok(())
//! # }
//! ```

use crate::config::InstallConfig;
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Exclusion rules for [`copy_tree`] / [`move_tree`]
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// File names that are skipped
    pub exclude_files: Vec<String>,
    /// Directory names that are skipped along with everything below them
    pub exclude_folders: Vec<String>,
    /// Compare `exclude_files` by substring containment instead of equality
    pub substring_match: bool,
}

impl TransferOptions {
    pub fn exclude_file(mut self, name: impl Into<String>) -> Self {
        self.exclude_files.push(name.into());
        self
    }

    pub fn exclude_folder(mut self, name: impl Into<String>) -> Self {
        self.exclude_folders.push(name.into());
        self
    }

    fn skips_file(&self, name: &str) -> bool {
        if self.substring_match {
            self.exclude_files.iter().any(|ex| name.contains(ex.as_str()))
        } else {
            self.exclude_files.iter().any(|ex| ex == name)
        }
    }

    fn skips_folder(&self, name: &str) -> bool {
        self.exclude_folders.iter().any(|ex| ex == name)
    }
}

impl From<&InstallConfig> for TransferOptions {
    fn from(config: &InstallConfig) -> Self {
        Self {
            exclude_files: config.exclude_files.clone(),
            exclude_folders: config.exclude_folders.clone(),
            substring_match: config.contains_search,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Copy,
    Move,
}

/// Copy `source` into `dest`, overwriting existing files.
///
/// Returns the destination path of every file written, in transfer order.
pub fn copy_tree<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    dest: Q,
    options: &TransferOptions,
) -> Result<Vec<PathBuf>> {
    transfer_tree(source.as_ref(), dest.as_ref(), options, Mode::Copy)
}

/// Move `source` into `dest`. An existing destination file is removed first,
/// so a move never fails because of a collision.
///
/// Returns the destination path of every file written, in transfer order.
/// Excluded files stay behind in `source`.
pub fn move_tree<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    dest: Q,
    options: &TransferOptions,
) -> Result<Vec<PathBuf>> {
    transfer_tree(source.as_ref(), dest.as_ref(), options, Mode::Move)
}

fn transfer_tree(
    source: &Path,
    dest: &Path,
    options: &TransferOptions,
    mode: Mode,
) -> Result<Vec<PathBuf>> {
    if !source.is_dir() {
        return Err(Error::NotFound(format!(
            "Source directory does not exist: {}",
            source.display()
        )));
    }

    tracing::info!(
        "{} {} -> {}",
        if mode == Mode::Move { "Moving" } else { "Copying" },
        source.display(),
        dest.display()
    );

    let mut written = Vec::new();
    transfer_dir(source, dest, options, mode, &mut written)?;

    tracing::info!("Transferred {} files", written.len());
    Ok(written)
}

fn transfer_dir(
    source: &Path,
    dest: &Path,
    options: &TransferOptions,
    mode: Mode,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    let (files, dirs) = list_dir(source)?;

    for file in files {
        let name = file_name(&file);
        if options.skips_file(&name) {
            tracing::debug!("Skipping excluded file {}", file.display());
            continue;
        }

        // Only materialize the destination once something lands in it
        if !dest.is_dir() {
            fs::create_dir_all(dest)?;
        }

        let target = dest.join(&name);
        match mode {
            Mode::Copy => {
                fs::copy(&file, &target).map_err(|e| transfer_error(&file, &target, e))?;
            }
            Mode::Move => {
                if target.exists() {
                    fs::remove_file(&target)?;
                }
                move_file(&file, &target)?;
            }
        }

        tracing::debug!("{} -> {}", file.display(), target.display());
        written.push(target);
    }

    for dir in dirs {
        let name = file_name(&dir);
        if options.skips_folder(&name) {
            tracing::debug!("Skipping excluded folder {}", dir.display());
            continue;
        }
        transfer_dir(&dir, &dest.join(&name), options, mode, written)?;
    }

    Ok(())
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    // rename fails across filesystems; fall back to copy + delete
    fs::copy(from, to).map_err(|e| transfer_error(from, to, e))?;
    fs::remove_file(from)?;
    Ok(())
}

fn transfer_error(from: &Path, to: &Path, e: std::io::Error) -> Error {
    Error::Other(format!(
        "Failed to transfer '{}' to '{}': {}",
        from.display(),
        to.display(),
        e
    ))
}

/// Split a directory's entries into files and subdirectories, each sorted by name
fn list_dir(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            dirs.push(entry.path());
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }

    files.sort();
    dirs.sort();
    Ok((files, dirs))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Every regular file below `dir`, files of a directory before its subdirectories.
///
/// A missing directory yields an empty list.
pub fn files_in_dir<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Vec::new();
    }

    WalkDir::new(dir)
        .sort_by(|a, b| {
            // files first, then directories, each alphabetically
            let a_dir = a.file_type().is_dir();
            let b_dir = b.file_type().is_dir();
            a_dir.cmp(&b_dir).then_with(|| a.file_name().cmp(b.file_name()))
        })
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Outcome of [`delete_tracked`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub files_deleted: usize,
    pub dirs_removed: usize,
}

/// Delete every existing path in `paths`, then prune directories left empty.
///
/// Missing paths are skipped, so calling this twice is harmless. Pruning walks
/// up from each affected directory and stops at `protected_root`, which is never
/// removed. Directories outside `protected_root` are never pruned.
pub fn delete_tracked<P: AsRef<Path>, R: AsRef<Path>>(
    paths: &[P],
    protected_root: R,
) -> Result<DeleteReport> {
    let protected_root = protected_root.as_ref();
    let mut report = DeleteReport::default();
    let mut touched_dirs = BTreeSet::new();

    for path in paths {
        let path = path.as_ref();
        if !path.is_file() {
            continue;
        }

        if let Some(parent) = path.parent() {
            touched_dirs.insert(parent.to_path_buf());
        }

        fs::remove_file(path).map_err(|e| {
            Error::Other(format!("Failed to delete files: {}: {}", path.display(), e))
        })?;
        tracing::debug!("Deleted {}", path.display());
        report.files_deleted += 1;
    }

    for dir in touched_dirs {
        report.dirs_removed += prune_empty_dirs(&dir, protected_root);
    }

    tracing::info!(
        "Deleted {} files, removed {} empty directories",
        report.files_deleted,
        report.dirs_removed
    );
    Ok(report)
}

/// Remove `start` and its ancestors while they hold no files, stopping at
/// `protected_root`. Errors are logged and end the walk for this directory only.
fn prune_empty_dirs(start: &Path, protected_root: &Path) -> usize {
    let mut removed = 0;
    let mut current = start.to_path_buf();

    if !current.starts_with(protected_root) {
        tracing::warn!(
            "Not pruning {}: outside of {}",
            current.display(),
            protected_root.display()
        );
        return 0;
    }

    while current != protected_root && current.is_dir() && files_in_dir(&current).is_empty() {
        // Only empty subdirectories remain below `current`
        if let Err(e) = fs::remove_dir_all(&current) {
            tracing::warn!("Failed to remove empty directory {}: {}", current.display(), e);
            break;
        }
        tracing::debug!("Removed empty directory {}", current.display());
        removed += 1;

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    removed
}
