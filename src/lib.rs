//! SessionMM - A content manager for the skateboarding game Session
//!
//! SessionMM installs custom maps and texture packs into the game's
//! `SessionGame/Content` folder and removes them again without leaving files
//! behind. It provides:
//!
//! - Folder and archive (zip, tar.gz) imports with stock-file exclusion rules
//! - One JSON install record per map listing exactly the files written
//! - Uninstall that deletes only tracked files and prunes emptied folders
//! - A single-flight download queue feeding installs
//! - Asset catalogs resolving catalog IDs to downloads
//! - Patching of the placeable object count in the object placement inventory
//!
//! # Examples
//!
//! ```no_run
//! use sessionmm::{Config, ModContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let context = ModContext::new(Config::load()?, None)?;
//!
//! let record = context.installer().install_map("downloads/coolmap.zip", None, None)?;
//! println!("Installed {} ({} files)", record.identity, record.file_paths.len());
//!
//! for map in context.installer().list_maps(false) {
//!     println!("{}", map.label());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`transfer`] - Copy/move directory trees and delete tracked files
//! - [`metadata`] - Per-map install records
//! - [`texture`] - Aggregate texture install records
//! - [`archive`] - Archive extraction
//! - [`patcher`] - Object count patching
//! - [`download`] - Single-flight download queue and HTTP backend
//! - [`catalog`] - Asset catalogs and download links
//! - [`installer`] - Install and uninstall maps and textures
//! - [`context`] - Configuration, game paths and services for one process
//! - [`paths`] - Game directory layout and detection
//! - [`config`] - User configuration management
//! - [`error`] - Error types and result handling

pub mod archive;
pub mod catalog;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod installer;
pub mod metadata;
pub mod paths;
pub mod patcher;
pub mod texture;
pub mod transfer;

pub use archive::{ArchiveExtractor, DefaultExtractor};
pub use catalog::{Asset, AssetCatalog};
pub use config::Config;
pub use context::{DownloadKind, Installed, ModContext};
pub use download::{DownloadEvent, DownloadQueue, DownloadTask, HttpBackend};
pub use error::{Error, Result};
pub use installer::{Installer, ProgressCallback};
pub use metadata::{InstallRecord, MarkerValidator, MetadataStore};
pub use paths::{detect_game_path, GamePaths};
pub use patcher::{decode_quantity, encode_quantity, find_quantity_addresses, QuantityPatcher};
pub use texture::{TextureInstallRecord, TextureStore};
pub use transfer::{copy_tree, delete_tracked, move_tree, DeleteReport, TransferOptions};
