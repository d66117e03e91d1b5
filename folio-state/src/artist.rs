use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{CacheKey, CoverSource};

/// An artist, as the catalog cares about it.
///
/// Artists are identified by their name alone; two artists with the same name are the
/// same artist, even if their other fields differ.
#[derive(Debug, Clone)]
pub struct Artist {
    /// The artist name. Unique and case-sensitive.
    pub name: SmolStr,
    /// The name to sort by, if it differs from the display name.
    pub sort_name: Option<SmolStr>,
    /// The number of albums currently credited to this artist.
    pub album_count: u32,
    /// Where the artist's artwork comes from.
    pub cover_source: CoverSource,
}
impl Artist {
    /// Creates an artist with no albums and no artwork.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            sort_name: None,
            album_count: 0,
            cover_source: CoverSource::None,
        }
    }

    /// The key under which this artist's cover is cached.
    pub fn cover_key(&self) -> CacheKey {
        CacheKey::artist(self.name.clone())
    }

    /// The sort name if there is one, falling back to the name.
    pub fn effective_sort_name(&self) -> &str {
        self.sort_name.as_deref().unwrap_or(&self.name)
    }
}
impl PartialEq for Artist {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Artist {}

/// An attribute of an [`Artist`] that can take part in a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtistAttribute {
    /// [`Artist::name`]
    Name,
    /// [`Artist::effective_sort_name`]
    SortName,
    /// [`Artist::album_count`]
    AlbumCount,
}
impl ArtistAttribute {
    /// All attributes, in declaration order.
    pub const ALL: [ArtistAttribute; 3] = [
        ArtistAttribute::Name,
        ArtistAttribute::SortName,
        ArtistAttribute::AlbumCount,
    ];

    /// The name used for this attribute in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtistAttribute::Name => "name",
            ArtistAttribute::SortName => "sort_name",
            ArtistAttribute::AlbumCount => "album_count",
        }
    }
}
impl std::fmt::Display for ArtistAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
