//! Asset catalogs
//!
//! A catalog is a JSON document listing downloadable assets (maps and texture
//! packs) keyed by ID. Users subscribe to any number of catalogs; they are
//! merged into one view where the highest `Version` of each asset wins.
//!
//! Download links use the `rsmm://<Location>/<target>` form, where a `$` in
//! the target stands for `://`:
//!
//! ```
//! use sessionmm::catalog::{parse_download_link, DownloadLocation};
//!
//! let link = parse_download_link("rsmm://Url/https$example.com/maps/park.zip").unwrap();
//! assert_eq!(link.location, DownloadLocation::Url);
//! assert_eq!(link.target, "https://example.com/maps/park.zip");
//! ```

use crate::config::CatalogConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const LINK_SCHEME: &str = "rsmm://";

/// Category name of assets installed as maps; everything else is a texture pack
pub const MAP_CATEGORY: &str = "Maps";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One downloadable asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Asset {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub version: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
    #[serde(default)]
    pub download_link: String,
}

impl Asset {
    pub fn is_map(&self) -> bool {
        self.category.eq_ignore_ascii_case(MAP_CATEGORY)
    }

    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Plain `http(s)` URL this asset downloads from.
    ///
    /// Only [`DownloadLocation::Url`] links can be fetched directly.
    pub fn download_url(&self) -> Result<String> {
        let link = parse_download_link(&self.download_link).ok_or_else(|| {
            Error::ParseFailure(format!(
                "download link '{}' of asset '{}'",
                self.download_link, self.id
            ))
        })?;

        match link.location {
            DownloadLocation::Url => Ok(link.target),
            other => Err(Error::Other(format!(
                "Asset '{}' is hosted on {:?}, which cannot be downloaded directly",
                self.id, other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssetCatalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl AssetCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::ParseFailure(format!("asset catalog: {}", e)))
    }

    pub fn get_asset(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    /// Fold `other` into this catalog. An asset already present is replaced
    /// only when `other` carries a strictly higher version; new assets are
    /// appended in `other`'s order.
    pub fn merge(mut self, other: AssetCatalog) -> AssetCatalog {
        for asset in other.assets {
            match self.assets.iter_mut().find(|a| a.id == asset.id) {
                Some(existing) => {
                    if asset.version > existing.version {
                        *existing = asset;
                    }
                }
                None => self.assets.push(asset),
            }
        }
        self
    }

    /// Assets whose category matches `category`, ignoring case
    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Asset> + 'a {
        self.assets
            .iter()
            .filter(move |a| a.category.eq_ignore_ascii_case(category))
    }
}

/// Host a download link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadLocation {
    Url,
    MegaSharedFolder,
    GDrive,
}

impl DownloadLocation {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Url" => Some(Self::Url),
            "MegaSharedFolder" => Some(Self::MegaSharedFolder),
            "GDrive" => Some(Self::GDrive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub location: DownloadLocation,
    pub target: String,
}

/// Parse a catalog download link.
///
/// The `rsmm://` prefix is optional and matched case-insensitively. The
/// first `$` in the target becomes `://`. Returns `None` when the link has
/// no `/` after the location name or names an unknown location.
pub fn parse_download_link(link: &str) -> Option<DownloadLink> {
    let link = match link.get(..LINK_SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(LINK_SCHEME) => &link[LINK_SCHEME.len()..],
        _ => link,
    };

    let (location, target) = link.split_once('/')?;
    let location = DownloadLocation::from_name(location)?;

    let target = match target.split_once('$') {
        Some((scheme, rest)) => format!("{}://{}", scheme, rest),
        None => target.to_string(),
    };

    Some(DownloadLink { location, target })
}

/// Load one catalog from an `http(s)` URL or a local JSON file
pub fn fetch_catalog(source: &str) -> Result<AssetCatalog> {
    if source.starts_with("http://") || source.starts_with("https://") {
        tracing::debug!("Fetching catalog {}", source);
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()?;

        let response = client.get(source).send().map_err(|e| {
            if e.is_connect() {
                Error::Other(format!("Cannot connect to catalog at {}", source))
            } else if e.is_timeout() {
                Error::Other(format!("Catalog request to {} timed out", source))
            } else {
                Error::Other(format!("Failed to fetch catalog: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Other(format!(
                "Catalog {} returned HTTP {}",
                source,
                status.as_u16()
            )));
        }

        AssetCatalog::from_json(&response.text()?)
    } else {
        let path = shellexpand::tilde(source).into_owned();
        let path = Path::new(&path);
        if !path.is_file() {
            return Err(Error::NotFound(format!("Catalog file not found: {}", source)));
        }
        AssetCatalog::from_json(&fs::read_to_string(path)?)
    }
}

/// Fetch and merge every subscribed catalog.
///
/// A source that fails is skipped with a warning; the call fails only when
/// every source fails.
pub fn load_subscribed(config: &CatalogConfig) -> Result<AssetCatalog> {
    if config.urls.is_empty() {
        return Err(Error::Other(
            "No catalogs subscribed\n\n\
             Add one with: sessionmm catalog add <url>"
                .to_string(),
        ));
    }

    let mut merged = AssetCatalog::default();
    let mut loaded = 0;
    let mut last_error = None;

    for source in &config.urls {
        match fetch_catalog(source) {
            Ok(catalog) => {
                loaded += 1;
                merged = merged.merge(catalog);
            }
            Err(e) => {
                tracing::warn!("Skipping catalog {}: {}", source, e);
                last_error = Some(e);
            }
        }
    }

    match (loaded, last_error) {
        (0, Some(e)) => Err(e),
        _ => Ok(merged),
    }
}
