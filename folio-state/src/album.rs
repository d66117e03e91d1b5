use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{CacheKey, CoverSource};

/// An album ID: the album name together with the artist that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlbumId {
    /// The owning artist's name.
    pub artist: SmolStr,
    /// The album name.
    pub name: SmolStr,
}
impl std::fmt::Display for AlbumId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.name)
    }
}

/// An album, as the catalog cares about it
#[derive(Debug, Clone)]
pub struct Album {
    /// The album name
    pub name: SmolStr,
    /// The album artist name; this is the album's group key
    pub artist: SmolStr,
    /// The release year of the album
    pub year: Option<i32>,
    /// Where the album's artwork comes from
    pub cover_source: CoverSource,
}
impl Album {
    /// Creates an album with no year and no artwork.
    pub fn new(name: impl Into<SmolStr>, artist: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            artist: artist.into(),
            year: None,
            cover_source: CoverSource::None,
        }
    }

    /// The album's identity.
    pub fn id(&self) -> AlbumId {
        AlbumId {
            artist: self.artist.clone(),
            name: self.name.clone(),
        }
    }

    /// The key under which this album's cover is cached.
    pub fn cover_key(&self) -> CacheKey {
        CacheKey::album(self.artist.clone(), self.name.clone())
    }
}
impl PartialEq for Album {
    fn eq(&self, other: &Self) -> bool {
        (&self.artist, &self.name) == (&other.artist, &other.name)
    }
}
impl Eq for Album {}
