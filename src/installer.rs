//! Map and texture installation
//!
//! Installing copies (folder imports) or moves (extracted archives) a
//! package's files into the game's `SessionGame/Content` folder and records
//! exactly which files were written. Uninstalling deletes that recorded set
//! and prunes folders left empty, never touching the content root itself.
//!
//! # Examples
//!
//! ```no_run
//! use sessionmm::{Config, GamePaths, Installer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let installer = Installer::new(GamePaths::new("/games/Session"), &config.install);
//!
//! // Install with progress callback
//! let record = installer.install_map("downloads/coolmap.zip", None, None)?;
//! println!("Installed {} ({} files)", record.identity, record.file_paths.len());
//!
//! installer.uninstall_map(&record.identity)?;
//! # Ok(())
//! # }
//! ```

use crate::archive::{ArchiveExtractor, DefaultExtractor};
use crate::config::InstallConfig;
use crate::metadata::{InstallRecord, MetadataStore};
use crate::paths::GamePaths;
use crate::texture::{TextureInstallRecord, TextureStore};
use crate::transfer::{copy_tree, delete_tracked, move_tree, DeleteReport, TransferOptions};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Progress callback for install operations
///
/// Called with:
/// - `message`: Description of current operation (e.g., "Copying files...")
/// - `current`: Current step
/// - `total`: Total number of steps
pub type ProgressCallback = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

const INSTALL_STEPS: u64 = 3;

fn report(progress: &Option<ProgressCallback>, message: &str, current: u64) {
    if let Some(cb) = progress {
        cb(message, current, INSTALL_STEPS);
    }
}

/// Installs and removes content packages for one game installation
pub struct Installer {
    paths: GamePaths,
    options: TransferOptions,
    metadata: MetadataStore,
    textures: TextureStore,
    extractor: Box<dyn ArchiveExtractor>,
}

impl Installer {
    pub fn new(paths: GamePaths, install: &InstallConfig) -> Self {
        Self {
            metadata: MetadataStore::new(&paths),
            textures: TextureStore::new(&paths),
            options: TransferOptions::from(install),
            extractor: Box::new(DefaultExtractor),
            paths,
        }
    }

    pub fn with_extractor(mut self, extractor: impl ArchiveExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn paths(&self) -> &GamePaths {
        &self.paths
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn textures(&self) -> &TextureStore {
        &self.textures
    }

    /// Installed maps, hidden ones only when `include_hidden` is set
    pub fn list_maps(&self, include_hidden: bool) -> Vec<InstallRecord> {
        self.metadata
            .list_all()
            .into_iter()
            .filter(|r| include_hidden || !r.hidden)
            .collect()
    }

    /// Install a map from a folder or an archive file.
    ///
    /// `asset_id` marks a catalog install and becomes the record's identity.
    pub fn install_map<P: AsRef<Path>>(
        &self,
        source: P,
        asset_id: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> Result<InstallRecord> {
        let source = source.as_ref();

        if source.is_dir() {
            self.install_map_from_folder(source, asset_id, progress)
        } else if source.is_file() {
            self.install_map_from_archive(source, asset_id, progress)
        } else {
            Err(Error::NotFound(format!(
                "Package not found: {}",
                source.display()
            )))
        }
    }

    /// Copy a map folder into the game. The folder is left as it was.
    pub fn install_map_from_folder<P: AsRef<Path>>(
        &self,
        folder: P,
        asset_id: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> Result<InstallRecord> {
        let folder = folder.as_ref();
        self.paths.validate()?;

        let source = content_root_of(folder);
        let mut record = self.metadata.create_record(&source)?;

        report(&progress, "Copying files...", 1);
        let written = copy_tree(&source, self.paths.content(), &self.options)?;

        record.original_import_path = Some(folder.to_path_buf());
        self.finish_map_install(record, written, asset_id, &progress)
    }

    /// Extract an archive and move its files into the game
    pub fn install_map_from_archive<P: AsRef<Path>>(
        &self,
        archive: P,
        asset_id: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> Result<InstallRecord> {
        let archive = archive.as_ref();
        self.paths.validate()?;

        let temp = self.prepare_temp_dir()?;
        let result = self.install_extracted_map(archive, &temp, asset_id, &progress);
        self.remove_temp_dir(&temp);
        result
    }

    fn install_extracted_map(
        &self,
        archive: &Path,
        temp: &Path,
        asset_id: Option<&str>,
        progress: &Option<ProgressCallback>,
    ) -> Result<InstallRecord> {
        report(progress, "Extracting...", 0);
        self.extractor.extract(archive, temp)?;

        let source = content_root_of(temp);
        let record = self.metadata.create_record(&source)?;

        report(progress, "Moving files...", 1);
        let written = move_tree(&source, self.paths.content(), &self.options)?;

        self.finish_map_install(record, written, asset_id, progress)
    }

    fn finish_map_install(
        &self,
        mut record: InstallRecord,
        written: Vec<PathBuf>,
        asset_id: Option<&str>,
        progress: &Option<ProgressCallback>,
    ) -> Result<InstallRecord> {
        record.file_paths = written;
        if let Some(asset_id) = asset_id {
            record = record.with_asset_id(asset_id);
        }

        report(progress, "Saving install record...", 2);
        self.metadata.save_record(&record)?;
        report(progress, "Installed", INSTALL_STEPS);

        tracing::info!(
            "Installed map '{}' ({} files)",
            record.identity,
            record.file_paths.len()
        );
        Ok(record)
    }

    /// Delete the files recorded for `identity` and then its record.
    ///
    /// A record without tracked files is left in place and reported as
    /// [`Error::ManualCleanupRequired`].
    pub fn uninstall_map(&self, identity: &str) -> Result<DeleteReport> {
        let record = self.metadata.load_record(identity)?;

        if !record.has_tracked_files() {
            return Err(Error::ManualCleanupRequired(identity.to_string()));
        }

        let report = self.delete_files(&record.file_paths)?;
        self.metadata.delete_record(identity)?;

        tracing::info!(
            "Uninstalled map '{}' ({} files, {} folders)",
            identity,
            report.files_deleted,
            report.dirs_removed
        );
        Ok(report)
    }

    /// Update the display name and/or hidden flag of an installed map
    pub fn set_display(
        &self,
        identity: &str,
        display_name: Option<&str>,
        hidden: Option<bool>,
    ) -> Result<InstallRecord> {
        self.metadata.set_display(identity, display_name, hidden)
    }

    /// Install a texture pack from a folder or archive.
    ///
    /// Files are copied into the content root. An earlier install of the same
    /// asset is removed once the new pack has been found and extracted.
    pub fn install_texture<P: AsRef<Path>>(
        &self,
        source: P,
        display_name: Option<&str>,
        progress: Option<ProgressCallback>,
    ) -> Result<TextureInstallRecord> {
        let source = source.as_ref();
        self.paths.validate()?;

        let asset_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::PathInvalid(format!("{} has no file name", source.display())))?;

        let temp = if source.is_dir() {
            None
        } else if source.is_file() {
            let temp = self.prepare_temp_dir()?;
            if let Err(e) = self.extractor.extract(source, &temp) {
                self.remove_temp_dir(&temp);
                return Err(e);
            }
            Some(temp)
        } else {
            return Err(Error::NotFound(format!(
                "Texture not found: {}",
                source.display()
            )));
        };

        let staged = content_root_of(temp.as_deref().unwrap_or(source));
        let result = self.replace_texture_files(&asset_name, &staged, &progress);
        if let Some(temp) = &temp {
            self.remove_temp_dir(temp);
        }
        let written = result?;

        let mut record = TextureInstallRecord::new(asset_name, display_name.unwrap_or_default());
        record.file_paths = written;

        report(&progress, "Saving install record...", 2);
        self.textures.upsert(record.clone())?;
        report(&progress, "Installed", INSTALL_STEPS);

        tracing::info!(
            "Installed texture '{}' ({} files)",
            record.asset_name,
            record.file_paths.len()
        );
        Ok(record)
    }

    /// Remove the files of an earlier install of `asset_name`, then copy the
    /// staged pack into the content root
    fn replace_texture_files(
        &self,
        asset_name: &str,
        staged: &Path,
        progress: &Option<ProgressCallback>,
    ) -> Result<Vec<PathBuf>> {
        if let Some(existing) = self.textures.find(asset_name)? {
            tracing::info!("Replacing texture '{}'", asset_name);
            self.delete_files(&existing.file_paths)?;
        }

        report(progress, "Copying files...", 1);
        copy_tree(staged, self.paths.content(), &self.options).map_err(|e| {
            // The old files are gone; a stale entry would point at nothing
            if let Err(remove_err) = self.textures.remove(asset_name) {
                tracing::warn!("Failed to drop record for '{}': {}", asset_name, remove_err);
            }
            e
        })
    }

    pub fn uninstall_texture(&self, asset_name: &str) -> Result<DeleteReport> {
        let record = self
            .textures
            .find(asset_name)?
            .ok_or_else(|| Error::NotFound(format!("No installed texture '{}'", asset_name)))?;

        if record.file_paths.is_empty() {
            return Err(Error::ManualCleanupRequired(asset_name.to_string()));
        }

        let report = self.delete_files(&record.file_paths)?;
        self.textures.remove(asset_name)?;

        tracing::info!("Uninstalled texture '{}'", asset_name);
        Ok(report)
    }

    /// Delete tracked files after checking that all of them live under the content root
    fn delete_files(&self, files: &[PathBuf]) -> Result<DeleteReport> {
        let content = self.paths.content();

        if let Some(outside) = files.iter().find(|f| !f.starts_with(&content)) {
            return Err(Error::PathInvalid(format!(
                "Tracked file '{}' is outside '{}'",
                outside.display(),
                content.display()
            )));
        }

        delete_tracked(files, &content)
    }

    fn prepare_temp_dir(&self) -> Result<PathBuf> {
        let temp = self.paths.temp_unzip();
        if temp.exists() {
            fs::remove_dir_all(&temp)?;
        }
        fs::create_dir_all(&temp)?;
        Ok(temp)
    }

    fn remove_temp_dir(&self, temp: &Path) {
        if let Err(e) = fs::remove_dir_all(temp) {
            tracing::warn!("Failed to remove {}: {}", temp.display(), e);
        }
    }
}

/// Packages that ship their own `Content` folder are installed from it
fn content_root_of(folder: &Path) -> PathBuf {
    let nested = folder.join("Content");
    if nested.is_dir() {
        nested
    } else {
        folder.to_path_buf()
    }
}
