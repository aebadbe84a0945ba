//! Install records for maps
//!
//! Every installed map gets one JSON sidecar file in the metadata directory
//! (`<Content>/ModManagerMetaData/<dir>_<map>_meta.json`). The sidecar records
//! the map's identity and the exact list of files that were written for it,
//! which is what uninstall deletes.
//!
//! # Examples
//!
//! ```no_run
//! use sessionmm::{GamePaths, MetadataStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let paths = GamePaths::new("/games/Session");
//! let store = MetadataStore::new(&paths);
//!
//! for record in store.list_all() {
//!     println!("{} ({} files)", record.identity, record.file_paths.len());
//! }
//! # Ok(())
//! # }
//! ```

use crate::paths::GamePaths;
use crate::transfer::files_in_dir;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix every sidecar file name ends with
pub const SIDECAR_SUFFIX: &str = "_meta.json";

/// Extension of the file that marks a folder as the root of a map package
pub const MAP_FILE_EXTENSION: &str = "umap";

/// Decides whether a candidate marker file really identifies a package
pub trait MarkerValidator: Send + Sync {
    fn is_valid(&self, path: &Path) -> bool;
}

/// Accepts any non-empty `.umap` file
#[derive(Debug, Clone, Copy, Default)]
pub struct MapFileValidator;

impl MarkerValidator for MapFileValidator {
    fn is_valid(&self, path: &Path) -> bool {
        has_map_extension(path) && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
    }
}

fn has_map_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(MAP_FILE_EXTENSION))
        .unwrap_or(false)
}

/// Sidecar record for one installed map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRecord {
    /// Record key: the catalog asset id if the map came from a catalog, else the map name
    pub identity: String,

    /// Name of the map file (without extension) that identified the package
    #[serde(default)]
    pub item_name: String,

    /// Folder holding the map file, as it exists after install
    pub source_directory: PathBuf,

    /// Every file written during install. Empty means the files are unknown.
    #[serde(default)]
    pub file_paths: Vec<PathBuf>,

    #[serde(default)]
    pub hidden: bool,

    #[serde(default)]
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image_path: Option<PathBuf>,

    /// Folder the map was copied from, for imports from a local folder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_import_path: Option<PathBuf>,
}

impl InstallRecord {
    /// Sidecar file name: `<enclosing dir>_<map name>_meta.json`
    pub fn sidecar_file_name(&self) -> String {
        let dir_name = self
            .source_directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let item = if self.item_name.is_empty() {
            &self.identity
        } else {
            &self.item_name
        };
        format!("{}_{}{}", dir_name, item, SIDECAR_SUFFIX)
    }

    /// Name shown to the user
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.identity
        } else {
            &self.display_name
        }
    }

    /// Files are tracked and can be removed automatically
    pub fn has_tracked_files(&self) -> bool {
        !self.file_paths.is_empty()
    }

    /// Use a catalog asset id as this record's identity
    pub fn with_asset_id(mut self, asset_id: impl Into<String>) -> Self {
        let asset_id = asset_id.into();
        self.identity = asset_id.clone();
        self.asset_id = Some(asset_id);
        self
    }
}

/// Reads and writes sidecar records in the metadata directory
pub struct MetadataStore {
    meta_dir: PathBuf,
    content_root: PathBuf,
    validator: Box<dyn MarkerValidator>,
}

impl MetadataStore {
    pub fn new(paths: &GamePaths) -> Self {
        Self::with_dirs(paths.meta_dir(), paths.content())
    }

    pub fn with_dirs<P: Into<PathBuf>, Q: Into<PathBuf>>(meta_dir: P, content_root: Q) -> Self {
        Self {
            meta_dir: meta_dir.into(),
            content_root: content_root.into(),
            validator: Box::new(MapFileValidator),
        }
    }

    pub fn with_validator(mut self, validator: impl MarkerValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    fn ensure_meta_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.meta_dir)?;
        Ok(())
    }

    /// First valid marker file under `folder`.
    ///
    /// Files of a directory are checked before its subdirectories; entries are
    /// visited in name order. Symbolic links are not followed.
    pub fn find_marker(&self, folder: &Path) -> Option<PathBuf> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for entry in fs::read_dir(folder).ok()?.filter_map(|e| e.ok()) {
            // Symlinks are neither; following them could loop forever
            match entry.file_type() {
                Ok(t) if t.is_dir() => dirs.push(entry.path()),
                Ok(t) if t.is_file() => files.push(entry.path()),
                _ => {}
            }
        }
        files.sort();
        dirs.sort();

        if let Some(marker) = files
            .into_iter()
            .find(|f| has_map_extension(f) && self.validator.is_valid(f))
        {
            return Some(marker);
        }

        dirs.iter().find_map(|dir| self.find_marker(dir))
    }

    /// Build a record describing `source_folder` as it will look once
    /// installed into the content root.
    ///
    /// Fails with [`Error::NotFound`] when no valid marker exists under the folder.
    pub fn create_record<P: AsRef<Path>>(&self, source_folder: P) -> Result<InstallRecord> {
        let source_folder = source_folder.as_ref();

        let marker = self.find_marker(source_folder).ok_or_else(|| {
            Error::NotFound(format!(
                "No valid .{} file found in {}",
                MAP_FILE_EXTENSION,
                source_folder.display()
            ))
        })?;

        let item_name = marker
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let marker_dir = marker.parent().unwrap_or(source_folder);

        let file_paths = files_in_dir(source_folder)
            .iter()
            .map(|f| rebase_path(source_folder, f, &self.content_root))
            .collect::<Result<Vec<_>>>()?;

        Ok(InstallRecord {
            identity: item_name.clone(),
            item_name,
            source_directory: rebase_path(source_folder, marker_dir, &self.content_root)?,
            file_paths,
            hidden: false,
            display_name: String::new(),
            asset_id: None,
            preview_image_path: None,
            original_import_path: None,
        })
    }

    /// Write `record` to its sidecar file, replacing any other sidecar that
    /// holds the same identity.
    pub fn save_record(&self, record: &InstallRecord) -> Result<PathBuf> {
        self.ensure_meta_dir()?;

        let path = self.meta_dir.join(record.sidecar_file_name());

        for (existing_path, existing) in self.list_with_paths() {
            if existing.identity == record.identity && existing_path != path {
                tracing::debug!("Replacing stale record {}", existing_path.display());
                fs::remove_file(&existing_path)?;
            }
        }

        if let Ok(existing) = self.load_record_file(&path) {
            if existing.identity != record.identity {
                tracing::warn!(
                    "{} held the record for '{}'; it is replaced by '{}'",
                    path.display(),
                    existing.identity,
                    record.identity
                );
            }
        }

        let content = serde_json::to_string_pretty(record)?;
        fs::write(&path, content)?;
        tracing::info!("Saved install record for '{}'", record.identity);
        Ok(path)
    }

    /// Load the record stored for `identity`
    pub fn load_record(&self, identity: &str) -> Result<InstallRecord> {
        self.list_with_paths()
            .into_iter()
            .map(|(_, record)| record)
            .find(|r| r.identity == identity)
            .ok_or_else(|| Error::NotFound(format!("No install record for '{}'", identity)))
    }

    /// Load a single sidecar file. Unparsable content is a [`Error::ParseFailure`].
    pub fn load_record_file<P: AsRef<Path>>(&self, path: P) -> Result<InstallRecord> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Record file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            tracing::warn!("Failed to parse record {}: {}", path.display(), e);
            Error::ParseFailure(format!("{}: {}", path.display(), e))
        })
    }

    /// Remove the sidecar for `identity`. Returns whether one existed.
    pub fn delete_record(&self, identity: &str) -> Result<bool> {
        let mut deleted = false;
        for (path, record) in self.list_with_paths() {
            if record.identity == identity {
                fs::remove_file(&path)?;
                deleted = true;
            }
        }

        if deleted {
            tracing::info!("Deleted install record for '{}'", identity);
        }
        Ok(deleted)
    }

    /// All readable records. Unparsable sidecars are logged and skipped.
    pub fn list_all(&self) -> Vec<InstallRecord> {
        self.list_with_paths().into_iter().map(|(_, r)| r).collect()
    }

    fn list_with_paths(&self) -> Vec<(PathBuf, InstallRecord)> {
        let entries = match fs::read_dir(&self.meta_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut sidecars: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .map(|n| n.to_string_lossy().ends_with(SIDECAR_SUFFIX))
                        .unwrap_or(false)
            })
            .collect();
        sidecars.sort();

        sidecars
            .into_iter()
            .filter_map(|path| match self.load_record_file(&path) {
                Ok(record) => Some((path, record)),
                Err(e) => {
                    tracing::warn!("Skipping unreadable record {}: {}", path.display(), e);
                    None
                }
            })
            .collect()
    }

    /// Record whose catalog asset id is `asset_id`
    pub fn find_by_asset_id(&self, asset_id: &str) -> Option<InstallRecord> {
        self.list_all()
            .into_iter()
            .find(|r| r.asset_id.as_deref() == Some(asset_id))
    }

    /// Update the user-editable presentation flags of a record
    pub fn set_display(
        &self,
        identity: &str,
        display_name: Option<&str>,
        hidden: Option<bool>,
    ) -> Result<InstallRecord> {
        let mut record = self.load_record(identity)?;

        if let Some(name) = display_name {
            record.display_name = name.to_string();
        }
        if let Some(hidden) = hidden {
            record.hidden = hidden;
        }

        self.save_record(&record)?;
        Ok(record)
    }
}

/// Replace the `source_folder` prefix of `path` with `new_root`.
///
/// Falls back to locating `source_folder` as a substring of `path` when the
/// two do not share a literal prefix.
pub fn rebase_path(source_folder: &Path, path: &Path, new_root: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(source_folder) {
        return Ok(new_root.join(relative));
    }

    let source = source_folder.to_string_lossy();
    let full = path.to_string_lossy();
    let start = full.find(source.as_ref()).ok_or_else(|| {
        Error::PathInvalid(format!(
            "'{}' is not inside '{}'",
            path.display(),
            source_folder.display()
        ))
    })?;

    let rest = full[start + source.len()..].trim_start_matches(['/', '\\']);
    if rest.is_empty() {
        Ok(new_root.to_path_buf())
    } else {
        Ok(new_root.join(rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn setup() -> (TempDir, MetadataStore, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let content = temp_dir.path().join("Content");
        let store = MetadataStore::with_dirs(content.join("Meta"), &content);
        (temp_dir, store, content)
    }

    fn record(identity: &str, dir: &Path) -> InstallRecord {
        InstallRecord {
            identity: identity.to_string(),
            item_name: identity.to_string(),
            source_directory: dir.to_path_buf(),
            file_paths: vec![dir.join(format!("{}.umap", identity))],
            hidden: false,
            display_name: String::new(),
            asset_id: None,
            preview_image_path: None,
            original_import_path: None,
        }
    }

    struct RejectAll;

    impl MarkerValidator for RejectAll {
        fn is_valid(&self, _path: &Path) -> bool {
            false
        }
    }

    // ============================================================================
    // create_record tests
    // ============================================================================

    #[test]
    fn test_create_record_map_at_top_level() {
        let (temp_dir, store, content) = setup();
        let source = temp_dir.path().join("cool_valid_map");
        for name in ["coolmap.umap", "coolmap.uexp", "coolmap_BuiltData.uasset"] {
            write(&source.join(name), "data");
        }

        let record = store.create_record(&source).unwrap();

        assert_eq!(record.identity, "coolmap");
        assert_eq!(record.source_directory, content);
        let mut files = record.file_paths.clone();
        files.sort();
        assert_eq!(
            files,
            vec![
                content.join("coolmap.uexp"),
                content.join("coolmap.umap"),
                content.join("coolmap_BuiltData.uasset"),
            ]
        );
    }

    #[test]
    fn test_create_record_map_in_subfolder() {
        let (temp_dir, store, content) = setup();
        let source = temp_dir.path().join("some_folder");
        write(&source.join("readme.txt"), "hi");
        write(&source.join("cool_valid_map").join("coolmap.umap"), "data");
        write(&source.join("cool_valid_map").join("coolmap.uexp"), "data");

        let record = store.create_record(&source).unwrap();

        assert_eq!(record.identity, "coolmap");
        assert_eq!(record.source_directory, content.join("cool_valid_map"));
        assert_eq!(record.file_paths.len(), 3);
        assert!(record
            .file_paths
            .contains(&content.join("cool_valid_map").join("coolmap.uexp")));
        assert_eq!(record.sidecar_file_name(), "cool_valid_map_coolmap_meta.json");
    }

    #[test]
    fn test_create_record_files_before_subdirectories() {
        let (temp_dir, store, _) = setup();
        let source = temp_dir.path().join("pkg");
        write(&source.join("aaa").join("deep.umap"), "data");
        write(&source.join("zzz.umap"), "data");

        let record = store.create_record(&source).unwrap();
        assert_eq!(record.identity, "zzz");
    }

    #[cfg(unix)]
    #[test]
    fn test_find_marker_ignores_symlink_loop() {
        let (temp_dir, store, _) = setup();
        let source = temp_dir.path().join("Looping");
        write(&source.join("Zone").join("Zone.umap"), "map");
        std::os::unix::fs::symlink(&source, source.join("AAA_loop")).unwrap();

        let marker = store.find_marker(&source).unwrap();
        assert!(marker.ends_with("Zone/Zone.umap"));

        let empty = temp_dir.path().join("OnlyLoop");
        fs::create_dir_all(&empty).unwrap();
        std::os::unix::fs::symlink(&empty, empty.join("self")).unwrap();
        assert!(store.find_marker(&empty).is_none());
    }

    #[test]
    fn test_create_record_skips_invalid_markers() {
        let (temp_dir, store, _) = setup();
        let source = temp_dir.path().join("pkg");
        write(&source.join("empty.umap"), "");
        write(&source.join("sub").join("real.umap"), "data");

        let record = store.create_record(&source).unwrap();
        assert_eq!(record.identity, "real");
    }

    #[test]
    fn test_create_record_not_found() {
        let (temp_dir, store, _) = setup();
        let source = temp_dir.path().join("pkg");
        write(&source.join("notes.txt"), "no map here");

        let result = store.create_record(&source);
        assert!(matches!(result, Err(Error::NotFound(_))));

        let store = store.with_validator(RejectAll);
        write(&source.join("map.umap"), "data");
        assert!(matches!(store.create_record(&source), Err(Error::NotFound(_))));
    }

    // ============================================================================
    // save / load / delete / list tests
    // ============================================================================

    #[test]
    fn test_save_and_load_record() {
        let (_temp_dir, store, content) = setup();
        let mut rec = record("coolmap", &content.join("cool"));
        rec.display_name = "Cool Map".to_string();

        let path = store.save_record(&rec).unwrap();
        assert!(path.ends_with("cool_coolmap_meta.json"));

        let loaded = store.load_record("coolmap").unwrap();
        assert_eq!(loaded, rec);
    }

    #[test]
    fn test_sidecar_json_shape() {
        let (_temp_dir, store, content) = setup();
        let rec = record("coolmap", &content).with_asset_id("coolmap.zip");

        let path = store.save_record(&rec).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(json["identity"], "coolmap.zip");
        assert_eq!(json["assetId"], "coolmap.zip");
        assert!(json["filePaths"].is_array());
        assert!(json["sourceDirectory"].is_string());
        assert_eq!(json["hidden"], false);
        assert!(json.get("previewImagePath").is_none());
    }

    #[test]
    fn test_save_replaces_existing_identity() {
        let (_temp_dir, store, content) = setup();
        let first = record("coolmap", &content.join("old_dir"));
        store.save_record(&first).unwrap();

        let mut second = record("coolmap", &content.join("new_dir"));
        second.file_paths = vec![content.join("new_dir").join("only.umap")];
        store.save_record(&second).unwrap();

        let all = store.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].file_paths, second.file_paths);
    }

    #[test]
    fn test_sidecar_collision_keeps_latest_identity() {
        let (_temp_dir, store, content) = setup();
        let dir = content.join("Park");
        let first = record("Park", &dir);
        let second = record("Park", &dir).with_asset_id("4242");

        let first_path = store.save_record(&first).unwrap();
        let second_path = store.save_record(&second).unwrap();
        assert_eq!(first_path, second_path);

        assert!(matches!(store.load_record("Park"), Err(Error::NotFound(_))));
        assert_eq!(store.load_record("4242").unwrap().item_name, "Park");
        assert_eq!(store.list_all().len(), 1);
    }

    #[test]
    fn test_load_missing_record() {
        let (_temp_dir, store, _) = setup();
        assert!(matches!(store.load_record("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_load_corrupt_record_file() {
        let (_temp_dir, store, _) = setup();
        let path = store.meta_dir().join("bad_map_meta.json");
        write(&path, "{ not json");

        assert!(matches!(
            store.load_record_file(&path),
            Err(Error::ParseFailure(_))
        ));
    }

    #[test]
    fn test_list_all_skips_corrupt_records() {
        let (_temp_dir, store, content) = setup();
        store.save_record(&record("one", &content)).unwrap();
        store.save_record(&record("two", &content)).unwrap();
        write(&store.meta_dir().join("broken_x_meta.json"), "garbage");
        write(&store.meta_dir().join("notes.txt"), "ignored");

        let mut ids: Vec<String> = store.list_all().into_iter().map(|r| r.identity).collect();
        ids.sort();
        assert_eq!(ids, vec!["one", "two"]);
    }

    #[test]
    fn test_list_all_without_meta_dir() {
        let (_temp_dir, store, _) = setup();
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn test_delete_record() {
        let (_temp_dir, store, content) = setup();
        store.save_record(&record("coolmap", &content)).unwrap();

        assert!(store.delete_record("coolmap").unwrap());
        assert!(!store.delete_record("coolmap").unwrap());
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn test_set_display_only_touches_flags() {
        let (_temp_dir, store, content) = setup();
        let rec = record("coolmap", &content);
        store.save_record(&rec).unwrap();

        let updated = store.set_display("coolmap", Some("Renamed"), Some(true)).unwrap();
        assert_eq!(updated.display_name, "Renamed");
        assert!(updated.hidden);
        assert_eq!(updated.file_paths, rec.file_paths);
        assert_eq!(updated.label(), "Renamed");

        let reloaded = store.load_record("coolmap").unwrap();
        assert_eq!(reloaded, updated);
    }

    #[test]
    fn test_find_by_asset_id() {
        let (_temp_dir, store, content) = setup();
        store
            .save_record(&record("coolmap", &content).with_asset_id("pack_42.zip"))
            .unwrap();

        assert!(store.find_by_asset_id("pack_42.zip").is_some());
        assert!(store.find_by_asset_id("other.zip").is_none());
    }

    // ============================================================================
    // rebase_path tests
    // ============================================================================

    #[test]
    fn test_rebase_path() {
        let source = Path::new("/tmp/import/map");
        let root = Path::new("/games/Session/SessionGame/Content");

        assert_eq!(
            rebase_path(source, Path::new("/tmp/import/map/sub/a.umap"), root).unwrap(),
            root.join("sub").join("a.umap")
        );
        assert_eq!(rebase_path(source, source, root).unwrap(), root);
        assert!(matches!(
            rebase_path(source, Path::new("/other/a.umap"), root),
            Err(Error::PathInvalid(_))
        ));
    }
}
