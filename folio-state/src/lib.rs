//! Representations of the catalog's entities: artists, albums, and the cover art that
//! decorates them, along with the raw entries the catalog is built from.
//!
//! Separated out to allow for use in other utilities.
#![deny(missing_docs)]

use serde::{Deserialize, Serialize};

mod album;
pub use album::{Album, AlbumId};

mod artist;
pub use artist::{Artist, ArtistAttribute};

mod cover_art;
pub use cover_art::{Bitmap, CacheKey, CoverImage, CoverKind, CoverRequest, CoverSource};

/// A single row from the underlying media database, before it has been turned into
/// catalog entities.
///
/// Each entry names an album and the artist it is grouped under; several entries may
/// share the same artist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    /// The album name.
    pub album: String,
    /// The album artist; this is the group key.
    pub artist: String,
    /// The name the artist should be sorted by, if different from their name.
    #[serde(default)]
    pub artist_sort_name: Option<String>,
    /// The release year of the album.
    #[serde(default)]
    pub year: Option<i32>,
    /// Where the album's artwork can be found.
    #[serde(default)]
    pub album_cover: CoverSource,
    /// Where the artist's artwork can be found.
    #[serde(default)]
    pub artist_cover: CoverSource,
}
impl RawEntry {
    /// Creates an entry with no sort name, year, or artwork.
    pub fn new(album: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            album: album.into(),
            artist: artist.into(),
            artist_sort_name: None,
            year: None,
            album_cover: CoverSource::None,
            artist_cover: CoverSource::None,
        }
    }
}
