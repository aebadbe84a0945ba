//! Process-wide state passed to callers
//!
//! [`ModContext`] owns the loaded configuration, the resolved game paths, the
//! installer and (once started) the download queue. Commands receive it
//! explicitly instead of reaching for global state.

use crate::archive::ArchiveKind;
use crate::catalog::AssetCatalog;
use crate::config::Config;
use crate::download::{
    validate_url, DownloadEvent, DownloadQueue, DownloadTask, TransferBackend,
};
use crate::installer::Installer;
use crate::metadata::InstallRecord;
use crate::paths::GamePaths;
use crate::patcher::QuantityPatcher;
use crate::texture::TextureInstallRecord;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to do with a finished download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadKind {
    /// Install as a map; the asset id defaults to the archive's file name
    Map { asset_id: Option<String> },
    Texture { display_name: Option<String> },
}

/// Result of a download followed by an install
#[derive(Debug, Clone)]
pub enum Installed {
    Map(InstallRecord),
    Texture(TextureInstallRecord),
}

pub struct ModContext {
    config: Config,
    installer: Arc<Installer>,
    downloads: Option<DownloadQueue>,
}

impl ModContext {
    /// Build a context for the game at `game_path`, falling back to the
    /// configured path. The game root must look like a valid installation.
    pub fn new(config: Config, game_path: Option<&Path>) -> Result<Self> {
        let root = match game_path {
            Some(path) => PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned()),
            None => config
                .game_root()
                .ok_or_else(|| Error::InvalidGamePath(String::new()))?,
        };

        let paths = GamePaths::new(root);
        paths.validate()?;
        tracing::debug!("Using game at {}", paths.root().display());

        Ok(Self {
            installer: Arc::new(Installer::new(paths, &config.install)),
            config,
            downloads: None,
        })
    }

    /// Start the download queue on the current tokio runtime
    pub fn with_downloads(mut self, backend: Arc<dyn TransferBackend>) -> Self {
        self.downloads = Some(DownloadQueue::spawn(backend));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &GamePaths {
        self.installer.paths()
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    pub fn downloads(&self) -> Result<&DownloadQueue> {
        self.downloads
            .as_ref()
            .ok_or_else(|| Error::Other("Download queue has not been started".to_string()))
    }

    pub fn patcher(&self) -> Result<QuantityPatcher> {
        QuantityPatcher::from_config(&self.config.patch)
    }

    /// Download `url` through the queue, then install the archive.
    ///
    /// `on_event` sees every event of the transfer. The archive is deleted
    /// after a successful install when `downloads.delete_after_install` is set.
    pub async fn download_and_install<F>(
        &self,
        url: &str,
        kind: DownloadKind,
        on_event: F,
    ) -> Result<Installed>
    where
        F: FnMut(&DownloadEvent),
    {
        let parsed = validate_url(url)?;
        let file_name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string())
            .ok_or_else(|| Error::PathInvalid(format!("No file name in URL '{}'", url)))?;

        self.download_as(url, file_name, kind, on_event).await
    }

    /// Download and install the catalog asset `asset_id`.
    ///
    /// Maps are recorded under the asset's ID; other categories install as
    /// texture packs named after the asset.
    pub async fn download_asset<F>(
        &self,
        catalog: &AssetCatalog,
        asset_id: &str,
        on_event: F,
    ) -> Result<Installed>
    where
        F: FnMut(&DownloadEvent),
    {
        let asset = catalog
            .get_asset(asset_id)
            .ok_or_else(|| Error::NotFound(format!("No asset '{}' in the catalog", asset_id)))?;

        let url = asset.download_url()?;
        validate_url(&url)?;

        let kind = if asset.is_map() {
            DownloadKind::Map {
                asset_id: Some(asset.id.clone()),
            }
        } else {
            DownloadKind::Texture {
                display_name: Some(asset.label().to_string()),
            }
        };

        tracing::info!("Installing catalog asset '{}' from {}", asset.id, url);
        self.download_as(&url, archive_name(&asset.id, &url), kind, on_event)
            .await
    }

    async fn download_as<F>(
        &self,
        url: &str,
        file_name: String,
        kind: DownloadKind,
        mut on_event: F,
    ) -> Result<Installed>
    where
        F: FnMut(&DownloadEvent),
    {
        let destination = self.config.download_dir()?.join(&file_name);

        let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
        let task = DownloadTask::new(url, &destination).with_events(events_tx);
        if self.downloads()?.enqueue(task).await?.is_none() {
            return Err(Error::Other(format!(
                "{} is already being downloaded",
                destination.display()
            )));
        }

        let archive = loop {
            let event = events
                .recv()
                .await
                .ok_or_else(|| Error::Other("Download ended without a result".to_string()))?;
            on_event(&event);

            match event {
                DownloadEvent::Completed(path) => break path,
                DownloadEvent::Failed(message) => {
                    return Err(Error::Other(format!("Download failed: {}", message)))
                }
                DownloadEvent::Cancelled => {
                    return Err(Error::Other("Download cancelled".to_string()))
                }
                _ => {}
            }
        };

        let installer = self.installer.clone();
        let install_path = archive.clone();
        let installed = tokio::task::spawn_blocking(move || match kind {
            DownloadKind::Map { asset_id } => {
                let asset_id = asset_id.unwrap_or(file_name);
                installer
                    .install_map(&install_path, Some(asset_id.as_str()), None)
                    .map(Installed::Map)
            }
            DownloadKind::Texture { display_name } => installer
                .install_texture(&install_path, display_name.as_deref(), None)
                .map(Installed::Texture),
        })
        .await
        .map_err(|e| Error::Other(format!("Install task failed: {}", e)))??;

        if self.config.downloads.delete_after_install {
            if let Err(e) = fs::remove_file(&archive) {
                tracing::warn!("Failed to delete {}: {}", archive.display(), e);
            }
        }

        Ok(installed)
    }
}

/// File the archive of a catalog asset is saved as: the asset ID when it
/// already names an archive, otherwise the URL's last segment
fn archive_name(asset_id: &str, url: &str) -> String {
    let from_id = asset_id.replace(['/', '\\'], "_");
    if ArchiveKind::from_path(Path::new(&from_id)).is_some() {
        return from_id;
    }

    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| ArchiveKind::from_path(Path::new(name)).is_some())
        .unwrap_or(from_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{CancelHandle, TransferEvent, TransferRequest, TransferSink};
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    /// Backend that "downloads" by writing a prepared zip to the destination
    struct LocalBackend {
        payload: Vec<u8>,
    }

    impl TransferBackend for LocalBackend {
        fn start(&self, request: TransferRequest, sink: TransferSink) -> CancelHandle {
            let result = fs::create_dir_all(request.destination.parent().unwrap())
                .and_then(|_| fs::write(&request.destination, &self.payload));
            match result {
                Ok(()) => {
                    sink.progress(self.payload.len() as u64, Some(self.payload.len() as u64));
                    sink.finish(TransferEvent::Completed);
                }
                Err(e) => sink.finish(TransferEvent::Failed(e.to_string())),
            }
            CancelHandle::new()
        }
    }

    fn map_zip() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("coolmap/coolmap.umap", options).unwrap();
        writer.write_all(b"map").unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn game_and_config(temp_dir: &TempDir) -> Config {
        let game = temp_dir.path().join("Session");
        fs::create_dir_all(game.join("Engine")).unwrap();
        fs::create_dir_all(game.join("SessionGame").join("Content")).unwrap();

        let mut config = Config::default();
        config.game.path = Some(game.to_string_lossy().into_owned());
        config.downloads.directory = Some(
            temp_dir
                .path()
                .join("downloads")
                .to_string_lossy()
                .into_owned(),
        );
        config
    }

    #[test]
    fn test_new_requires_game_path() {
        let err = ModContext::new(Config::default(), None).err().unwrap();
        assert!(matches!(err, Error::InvalidGamePath(_)));
    }

    #[test]
    fn test_new_prefers_explicit_path() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = game_and_config(&temp_dir);
        let game = PathBuf::from(config.game.path.take().unwrap());

        let context = ModContext::new(config, Some(game.as_path())).unwrap();
        assert_eq!(context.paths().root(), game.as_path());
        assert!(context.downloads().is_err());
    }

    #[tokio::test]
    async fn test_download_and_install_map() {
        let temp_dir = TempDir::new().unwrap();
        let config = game_and_config(&temp_dir);
        let context = ModContext::new(config, None)
            .unwrap()
            .with_downloads(Arc::new(LocalBackend { payload: map_zip() }));

        let mut seen = Vec::new();
        let installed = context
            .download_and_install(
                "https://maps.example.com/files/coolmap.zip",
                DownloadKind::Map { asset_id: None },
                |event| seen.push(event.clone()),
            )
            .await
            .unwrap();

        let Installed::Map(record) = installed else {
            panic!("expected a map install");
        };
        assert_eq!(record.identity, "coolmap.zip");
        assert!(context
            .paths()
            .content()
            .join("coolmap")
            .join("coolmap.umap")
            .is_file());
        assert!(seen.iter().any(|e| matches!(e, DownloadEvent::Completed(_))));
        // Deleted after install by default
        assert!(!temp_dir.path().join("downloads").join("coolmap.zip").exists());
    }

    #[tokio::test]
    async fn test_download_kept_when_configured() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = game_and_config(&temp_dir);
        config.downloads.delete_after_install = false;
        let context = ModContext::new(config, None)
            .unwrap()
            .with_downloads(Arc::new(LocalBackend { payload: map_zip() }));

        context
            .download_and_install(
                "https://maps.example.com/coolmap.zip",
                DownloadKind::Map {
                    asset_id: Some("catalog-7".to_string()),
                },
                |_| {},
            )
            .await
            .unwrap();

        assert!(temp_dir.path().join("downloads").join("coolmap.zip").exists());
        assert!(context
            .installer()
            .metadata()
            .find_by_asset_id("catalog-7")
            .is_some());
    }

    #[tokio::test]
    async fn test_download_rejects_url_without_file_name() {
        let temp_dir = TempDir::new().unwrap();
        let context = ModContext::new(game_and_config(&temp_dir), None)
            .unwrap()
            .with_downloads(Arc::new(LocalBackend { payload: Vec::new() }));

        let result = context
            .download_and_install("https://maps.example.com/", DownloadKind::Map { asset_id: None }, |_| {})
            .await;
        assert!(matches!(result, Err(Error::PathInvalid(_))));
    }

    // ============================================================================
    // Catalog installs
    // ============================================================================

    fn test_catalog() -> AssetCatalog {
        AssetCatalog::from_json(
            r#"{
                "Assets": [
                    {
                        "ID": "coolmap_v2.zip",
                        "Name": "Cool Map",
                        "Category": "Maps",
                        "Version": 2,
                        "DownloadLink": "rsmm://Url/https$maps.example.com/coolmap.zip"
                    },
                    {
                        "ID": "griptape-17",
                        "Name": "Flame Grip",
                        "Category": "Griptapes",
                        "DownloadLink": "rsmm://Url/https$maps.example.com/grip.zip"
                    },
                    {
                        "ID": "mega-map",
                        "Category": "Maps",
                        "DownloadLink": "rsmm://MegaSharedFolder/link,file,hint"
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_download_asset_records_catalog_id() {
        let temp_dir = TempDir::new().unwrap();
        let context = ModContext::new(game_and_config(&temp_dir), None)
            .unwrap()
            .with_downloads(Arc::new(LocalBackend { payload: map_zip() }));

        let installed = context
            .download_asset(&test_catalog(), "coolmap_v2.zip", |_| {})
            .await
            .unwrap();

        let Installed::Map(record) = installed else {
            panic!("expected a map install");
        };
        assert_eq!(record.identity, "coolmap_v2.zip");
        assert_eq!(record.asset_id.as_deref(), Some("coolmap_v2.zip"));
        assert_eq!(record.item_name, "coolmap");
    }

    #[tokio::test]
    async fn test_download_asset_installs_texture_categories() {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("Griptape/flame.uasset", options).unwrap();
        writer.write_all(b"tex").unwrap();
        let payload = writer.finish().unwrap().into_inner();

        let temp_dir = TempDir::new().unwrap();
        let context = ModContext::new(game_and_config(&temp_dir), None)
            .unwrap()
            .with_downloads(Arc::new(LocalBackend { payload }));

        let installed = context
            .download_asset(&test_catalog(), "griptape-17", |_| {})
            .await
            .unwrap();

        let Installed::Texture(record) = installed else {
            panic!("expected a texture install");
        };
        assert_eq!(record.asset_name, "grip.zip");
        assert_eq!(record.label(), "Flame Grip");
    }

    #[tokio::test]
    async fn test_download_asset_rejects_unknown_and_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let context = ModContext::new(game_and_config(&temp_dir), None)
            .unwrap()
            .with_downloads(Arc::new(LocalBackend { payload: map_zip() }));
        let catalog = test_catalog();

        let missing = context.download_asset(&catalog, "nope", |_| {}).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        let mega = context.download_asset(&catalog, "mega-map", |_| {}).await;
        assert!(mega.is_err());
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(archive_name("park.zip", "https://h.com/x.zip"), "park.zip");
        assert_eq!(archive_name("park", "https://h.com/files/x.tar.gz"), "x.tar.gz");
        assert_eq!(archive_name("a/b.zip", "https://h.com/"), "a_b.zip");
        assert_eq!(archive_name("park", "https://h.com/download"), "park");
    }
}
