use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use folio_state::ArtistAttribute;
use serde::{Deserialize, Serialize};

use crate::{CatalogError, CatalogResult, sort::SortKeys};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub cache: Cache,
    /// Extra sort keys, or replacements for the built-in ones, by name.
    #[serde(default)]
    pub sort_keys: BTreeMap<String, Vec<ArtistAttribute>>,
}
impl Config {
    pub const FILENAME: &str = "folio.toml";

    /// Reads the config at `path`, falling back to the defaults if there is no file.
    pub fn load(path: &Path) -> CatalogResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| {
                CatalogError::Config(format!("failed to parse {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found at {}, using defaults", path.display());
                Ok(Config::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> CatalogResult<()> {
        let contents = toml::to_string(self)
            .map_err(|e| CatalogError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        tracing::info!("saved config to {}", path.display());
        Ok(())
    }

    pub fn sort_keys(&self) -> SortKeys {
        SortKeys::with_overrides(&self.sort_keys)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct General {
    /// Edge of the square that cover bitmaps are scaled to fit, in pixels.
    pub cover_size: u32,
    /// Number of elements each loading step processes.
    pub chunk_size: usize,
    pub sort_key: String,
    pub sort_reverse: bool,
}
impl Default for General {
    fn default() -> Self {
        Self {
            cover_size: 128,
            chunk_size: 50,
            sort_key: "name".to_string(),
            sort_reverse: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Cache {
    /// Where stored covers live.
    pub dir: PathBuf,
    /// Where temporary files are created; the system temporary directory if unset.
    pub scratch_dir: Option<PathBuf>,
    pub remote_timeout_secs: u64,
}
impl Cache {
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}
impl Default for Cache {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cover-art-cache"),
            scratch_dir: None,
            remote_timeout_secs: 10,
        }
    }
}
