//! Game directory layout and install detection
//!
//! All install, uninstall and patch operations are rooted at the game's
//! `SessionGame/Content` folder. [`GamePaths`] derives every location the
//! manager touches from the game root, and [`detect_game_path`] looks for the
//! game in the usual Steam library folders.
//!
//! # Examples
//!
//! ```no_run
//! use sessionmm::GamePaths;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let paths = GamePaths::new("/games/Session");
//! paths.validate()?;
//! println!("Content: {}", paths.content().display());
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Folder (under the content root) holding one sidecar record per installed map
pub const META_FOLDER_NAME: &str = "ModManagerMetaData";

const STEAM_GAME_DIR: &str = "Session";

/// Locations inside a game installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamePaths {
    root: PathBuf,
}

impl GamePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        // Trailing separators would make equality checks against the content root fail
        let root: PathBuf = root.as_ref().components().collect();
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_game(&self) -> PathBuf {
        self.root.join("SessionGame")
    }

    /// The protected content root. Packages install into it; pruning never removes it.
    pub fn content(&self) -> PathBuf {
        self.session_game().join("Content")
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.content().join(META_FOLDER_NAME)
    }

    /// Scratch folder archives are extracted into before their files are moved
    pub fn temp_unzip(&self) -> PathBuf {
        self.session_game().join("Temp_Unzipped")
    }

    /// Save file holding the placeable-object inventory quantities
    pub fn object_placement_file(&self) -> PathBuf {
        self.content()
            .join("ObjectPlacement")
            .join("Blueprints")
            .join("PBP_ObjectPlacementInventory.uexp")
    }

    /// Check that the root looks like a game installation
    pub fn validate(&self) -> Result<()> {
        if is_valid_game_root(&self.root) {
            Ok(())
        } else {
            Err(Error::InvalidGamePath(format!(
                " at '{}'",
                self.root.display()
            )))
        }
    }
}

fn is_valid_game_root(path: &Path) -> bool {
    path.join("Engine").is_dir() && path.join("SessionGame").join("Content").is_dir()
}

/// Search Steam library folders for the game
pub fn detect_game_path() -> Option<PathBuf> {
    steam_roots()
        .into_iter()
        .flat_map(|steam| steam_library_folders(&steam))
        .map(|library| library.join("steamapps").join("common").join(STEAM_GAME_DIR))
        .find(|candidate| is_valid_game_root(candidate))
}

fn steam_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    if let Some(path) = steam_path_from_registry() {
        roots.push(path);
    }

    if cfg!(windows) {
        if let Ok(program_files) = env::var("ProgramFiles(x86)") {
            roots.push(PathBuf::from(program_files).join("Steam"));
        }
    } else if let Some(home) = dirs::home_dir() {
        roots.push(home.join(".steam").join("steam"));
        roots.push(home.join(".local").join("share").join("Steam"));
    }

    roots.retain(|p| p.is_dir());
    roots.dedup();
    roots
}

/// The Steam root itself plus every extra library listed in `libraryfolders.vdf`
fn steam_library_folders(steam_root: &Path) -> Vec<PathBuf> {
    let mut libraries = vec![steam_root.to_path_buf()];

    let vdf = steam_root.join("steamapps").join("libraryfolders.vdf");
    if let Ok(content) = fs::read_to_string(&vdf) {
        for line in content.lines() {
            let line = line.trim();
            if !line.starts_with("\"path\"") {
                continue;
            }
            // "path"		"D:\\SteamLibrary"
            if let Some(value) = line.split('"').nth(3) {
                let library = PathBuf::from(value.replace("\\\\", "\\"));
                if !libraries.contains(&library) {
                    libraries.push(library);
                }
            }
        }
    }

    libraries
}

#[cfg(windows)]
fn steam_path_from_registry() -> Option<PathBuf> {
    use winreg::enums::*;
    use winreg::RegKey;

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let steam_key = hkcu.open_subkey("Software\\Valve\\Steam").ok()?;
    let steam_path: String = steam_key.get_value("SteamPath").ok()?;
    Some(PathBuf::from(steam_path))
}

#[cfg(not(windows))]
fn steam_path_from_registry() -> Option<PathBuf> {
    None
}
