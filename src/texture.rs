//! Install records for texture replacements
//!
//! Unlike maps, textures are tracked in one aggregate file holding a JSON
//! array of entries. The file is always read and written as a whole.

use crate::paths::GamePaths;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the aggregate texture record file inside the metadata directory
pub const TEXTURE_RECORDS_FILE: &str = "installed_textures.json";

/// Files written for one installed texture asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureInstallRecord {
    #[serde(default)]
    pub file_paths: Vec<PathBuf>,

    /// Archive (or folder) name the texture came from; unique per entry
    pub asset_name: String,

    #[serde(default)]
    pub display_name: String,
}

impl TextureInstallRecord {
    pub fn new(asset_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            file_paths: Vec::new(),
            asset_name: asset_name.into(),
            display_name: display_name.into(),
        }
    }

    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.asset_name
        } else {
            &self.display_name
        }
    }
}

/// Aggregate store of texture records
pub struct TextureStore {
    path: PathBuf,
}

impl TextureStore {
    pub fn new(paths: &GamePaths) -> Self {
        Self::at(paths.meta_dir().join(TEXTURE_RECORDS_FILE))
    }

    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries. A missing file means nothing is installed.
    pub fn load(&self) -> Result<Vec<TextureInstallRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content)
            .map_err(|e| Error::ParseFailure(format!("{}: {}", self.path.display(), e)))
    }

    pub fn save(&self, records: &[TextureInstallRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn find(&self, asset_name: &str) -> Result<Option<TextureInstallRecord>> {
        Ok(self
            .load()?
            .into_iter()
            .find(|r| r.asset_name == asset_name))
    }

    /// Add `record`, replacing any entry for the same asset
    pub fn upsert(&self, record: TextureInstallRecord) -> Result<()> {
        let mut records = self.load()?;
        records.retain(|r| r.asset_name != record.asset_name);
        tracing::debug!("Storing texture record for '{}'", record.asset_name);
        records.push(record);
        self.save(&records)
    }

    /// Remove and return the entry for `asset_name`
    pub fn remove(&self, asset_name: &str) -> Result<Option<TextureInstallRecord>> {
        let mut records = self.load()?;
        let position = records.iter().position(|r| r.asset_name == asset_name);

        match position {
            Some(index) => {
                let removed = records.remove(index);
                self.save(&records)?;
                Ok(Some(removed))
            }
            None => Ok(None),
        }
    }
}
