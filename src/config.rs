//! User configuration management
//!
//! This module handles reading and writing SessionMM configuration files.
//! Configuration is stored in TOML format at `~/.sessionmm/config.toml`.
//!
//! # Examples
//!
//! ```no_run
//! use sessionmm::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load config
//! let config = Config::load()?;
//!
//! println!("Delete downloads after install: {}", config.downloads.delete_after_install);
//!
//! // Modify and save
//! let mut config = config;
//! config.game.path = Some("/games/Session".into());
//! config.save()?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Stock files a package must never overwrite.
pub const DEFAULT_EXCLUDE_FILES: &[&str] = &["DefaultEngine.ini", "DefaultGame.ini"];

/// Stock content folders shipped with the game; packages that bundle copies
/// of these folders have them skipped during install.
pub const DEFAULT_EXCLUDE_FOLDERS: &[&str] = &[
    "Animation",
    "Art",
    "Audio",
    "Challenges",
    "Character",
    "Cinematics",
    "Customization",
    "Data",
    "FilmerMode",
    "KickStarter",
    "Localization",
    "MainHUB",
    "Menus",
    "Mixer",
    "Movies",
    "ObjectPlacement",
    "Paks",
    "PartyGames",
    "Skateboard",
    "Skeletons",
    "Splash",
    "TEMP",
    "Transit",
    "Tutorial",
    "VideoEditor",
];

/// Serialized `Quantity` IntProperty tag header that precedes every
/// placeable-item count in the object placement inventory.
pub const DEFAULT_QUANTITY_MARKER: &str =
    "5175616E74697479000C000000496E7450726F706572747900040000000000000000";

/// Community catalog every fresh config subscribes to
pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/rodriada000/SessionCustomMapReleases/master/DefaultSMMCatalog.json";

/// User configuration file (`~/.sessionmm/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Game installation settings
    #[serde(default)]
    pub game: GameConfig,

    /// Install rules
    #[serde(default)]
    pub install: InstallConfig,

    /// Download settings
    #[serde(default)]
    pub downloads: DownloadConfig,

    /// Binary patch settings
    #[serde(default)]
    pub patch: PatchConfig,

    /// Asset catalog subscriptions
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameConfig {
    /// Root folder of the game installation (contains `Engine/` and `SessionGame/`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// File names skipped when copying a package into the game
    #[serde(default = "default_exclude_files")]
    pub exclude_files: Vec<String>,

    /// Folder names skipped (with everything below them) when copying a package
    #[serde(default = "default_exclude_folders")]
    pub exclude_folders: Vec<String>,

    /// Match `exclude_files` by substring instead of exact name
    #[serde(default)]
    pub contains_search: bool,
}

fn default_exclude_files() -> Vec<String> {
    DEFAULT_EXCLUDE_FILES.iter().map(|s| s.to_string()).collect()
}

fn default_exclude_folders() -> Vec<String> {
    DEFAULT_EXCLUDE_FOLDERS.iter().map(|s| s.to_string()).collect()
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            exclude_files: default_exclude_files(),
            exclude_folders: default_exclude_folders(),
            contains_search: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Where downloaded archives are stored before install
    /// (defaults to `~/.sessionmm/downloads`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    /// Remove the downloaded archive once it has been installed
    #[serde(default = "default_delete_after_install")]
    pub delete_after_install: bool,
}

fn default_delete_after_install() -> bool {
    true
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: None,
            delete_after_install: default_delete_after_install(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchConfig {
    /// Hex-encoded marker preceding each quantity field
    #[serde(default = "default_quantity_marker")]
    pub quantity_marker: String,

    /// Write the patched file to a temp file and rename it over the original
    /// instead of writing every address in place
    #[serde(default)]
    pub atomic_writes: bool,
}

fn default_quantity_marker() -> String {
    DEFAULT_QUANTITY_MARKER.to_string()
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            quantity_marker: default_quantity_marker(),
            atomic_writes: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog sources, merged in order; `http(s)` URLs or local JSON files
    #[serde(default = "default_catalog_urls")]
    pub urls: Vec<String>,
}

fn default_catalog_urls() -> Vec<String> {
    vec![DEFAULT_CATALOG_URL.to_string()]
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            urls: default_catalog_urls(),
        }
    }
}

impl PatchConfig {
    /// Decode `quantity_marker` into raw bytes
    pub fn marker_bytes(&self) -> Result<Vec<u8>> {
        let marker = hex::decode(self.quantity_marker.trim()).map_err(|e| {
            Error::ParseFailure(format!("quantity marker '{}': {}", self.quantity_marker, e))
        })?;

        if marker.is_empty() {
            return Err(Error::Other("Quantity marker must not be empty".to_string()));
        }

        Ok(marker)
    }
}

impl Config {
    /// Get the config directory
    ///
    /// Uses SESSIONMM_CONFIG_DIR if set, otherwise ~/.sessionmm
    pub fn config_dir() -> Result<PathBuf> {
        // Check for custom config directory (useful for testing)
        if let Ok(config_dir) = std::env::var("SESSIONMM_CONFIG_DIR") {
            return Ok(PathBuf::from(config_dir));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| Error::Other("Could not find home directory".to_string()))?;

        Ok(home.join(".sessionmm"))
    }

    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from file, or create default if it doesn't exist
    ///
    /// Environment variable overrides:
    /// - `SESSIONMM_GAME_PATH`: Overrides `game.path`
    /// - `SESSIONMM_CONFIG_DIR`: Overrides the config directory location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;

        let mut config = if !path.exists() {
            Self::default()
        } else {
            let content = fs::read_to_string(&path)?;
            toml::from_str(&content)?
        };

        if let Ok(game_path) = std::env::var("SESSIONMM_GAME_PATH") {
            if !game_path.is_empty() {
                config.game.path = Some(game_path);
            }
        }

        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Configured game root with a leading `~` expanded
    pub fn game_root(&self) -> Option<PathBuf> {
        self.game
            .path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }

    /// Directory downloaded archives are written to
    pub fn download_dir(&self) -> Result<PathBuf> {
        match self.downloads.directory.as_deref() {
            Some(dir) => Ok(PathBuf::from(shellexpand::tilde(dir).into_owned())),
            None => Ok(Self::config_dir()?.join("downloads")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.game.path.is_none());
        assert!(config.downloads.delete_after_install);
        assert!(!config.patch.atomic_writes);
        assert!(config.install.exclude_folders.contains(&"Data".to_string()));
        assert_eq!(config.install.exclude_files.len(), 2);
        assert_eq!(config.catalog.urls, vec![DEFAULT_CATALOG_URL.to_string()]);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"[game]
path = "/games/Session"

[downloads]
delete_after_install = false
"#,
        )
        .unwrap();

        assert_eq!(config.game.path.as_deref(), Some("/games/Session"));
        assert!(!config.downloads.delete_after_install);
        assert_eq!(config.patch.quantity_marker, DEFAULT_QUANTITY_MARKER);
        assert_eq!(config.install.exclude_folders.len(), DEFAULT_EXCLUDE_FOLDERS.len());
        assert_eq!(config.catalog.urls.len(), 1);
    }

    #[test]
    fn test_catalog_urls_from_toml() {
        let config: Config = toml::from_str(
            r#"[catalog]
urls = []
"#,
        )
        .unwrap();
        assert!(config.catalog.urls.is_empty());
    }

    #[test]
    fn test_marker_bytes() {
        let patch = PatchConfig {
            quantity_marker: "0a0B".to_string(),
            atomic_writes: false,
        };
        assert_eq!(patch.marker_bytes().unwrap(), vec![0x0A, 0x0B]);

        let bad = PatchConfig {
            quantity_marker: "xyz".to_string(),
            atomic_writes: false,
        };
        assert!(bad.marker_bytes().is_err());

        let empty = PatchConfig {
            quantity_marker: "".to_string(),
            atomic_writes: false,
        };
        assert!(empty.marker_bytes().is_err());
    }

    #[test]
    fn test_default_marker_is_valid_hex() {
        let marker = PatchConfig::default().marker_bytes().unwrap();
        assert!(marker.starts_with(b"Quantity"));
    }
}
