use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// What kind of entity a cover belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CoverKind {
    /// An artist's cover.
    Artist,
    /// An album's cover.
    Album,
}
impl CoverKind {
    /// The prefix used when displaying keys of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverKind::Artist => "artist",
            CoverKind::Album => "album",
        }
    }
}

/// A cache key: addresses a resolved cover independently of where the image came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// The cover of the named artist.
    Artist(SmolStr),
    /// The cover of an album, identified by its artist and name.
    Album {
        /// The owning artist.
        artist: SmolStr,
        /// The album name.
        album: SmolStr,
    },
}
impl CacheKey {
    /// Key for an artist's cover.
    pub fn artist(name: impl Into<SmolStr>) -> Self {
        CacheKey::Artist(name.into())
    }

    /// Key for an album's cover.
    pub fn album(artist: impl Into<SmolStr>, album: impl Into<SmolStr>) -> Self {
        CacheKey::Album {
            artist: artist.into(),
            album: album.into(),
        }
    }

    /// The kind of entity this key addresses.
    pub fn kind(&self) -> CoverKind {
        match self {
            CacheKey::Artist(_) => CoverKind::Artist,
            CacheKey::Album { .. } => CoverKind::Album,
        }
    }

    /// A filesystem-safe name derived from the key's contents.
    ///
    /// The fields are NUL-separated before hashing so that `("a - b", "c")` and
    /// `("a", "b - c")` do not collide.
    pub fn file_stem(&self) -> String {
        let material = match self {
            CacheKey::Artist(name) => format!("artist\0{name}"),
            CacheKey::Album { artist, album } => format!("album\0{artist}\0{album}"),
        };
        format!("{:x}", md5::compute(material.as_bytes()))
    }
}
impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Artist(name) => write!(f, "{}:{name}", self.kind().as_str()),
            CacheKey::Album { artist, album } => {
                write!(f, "{}:{artist}/{album}", self.kind().as_str())
            }
        }
    }
}

/// Where a cover image comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverSource {
    /// No artwork is known.
    #[default]
    None,
    /// A file on the local filesystem.
    LocalPath(PathBuf),
    /// A remote resource that has to be fetched.
    RemoteUri(String),
}
impl CoverSource {
    /// Returns the request that would resolve this source, if there is anything to resolve.
    pub fn to_request(&self) -> Option<CoverRequest> {
        match self {
            CoverSource::None => None,
            CoverSource::LocalPath(path) => Some(CoverRequest::LocalPath(path.clone())),
            CoverSource::RemoteUri(uri) => Some(CoverRequest::RemoteUri(uri.clone())),
        }
    }
}

/// A request to resolve a cover.
#[derive(Debug, Clone)]
pub enum CoverRequest {
    /// An image that is already in memory.
    Bitmap(Arc<image::DynamicImage>),
    /// An image file on the local filesystem.
    LocalPath(PathBuf),
    /// An image that has to be fetched from a remote URI.
    RemoteUri(String),
}

/// Pixel data for a resolved cover.
#[derive(Clone)]
pub struct Bitmap {
    /// The image scaled to fit the display size the cache was configured with.
    pub display: Arc<image::RgbaImage>,
    /// The full-resolution image the display version was derived from.
    pub original: Arc<image::DynamicImage>,
}
impl Bitmap {
    /// Scales `original` to fit within a `display_size` square, preserving aspect ratio.
    pub fn from_original(original: Arc<image::DynamicImage>, display_size: u32) -> Self {
        let display = original
            .resize(
                display_size,
                display_size,
                image::imageops::FilterType::Triangle,
            )
            .to_rgba8();
        Self {
            display: Arc::new(display),
            original,
        }
    }
}
impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("display", &self.display.dimensions())
            .field(
                "original",
                &(self.original.width(), self.original.height()),
            )
            .finish()
    }
}

static UNKNOWN_COVER: LazyLock<Arc<CoverImage>> = LazyLock::new(|| {
    Arc::new(CoverImage {
        source: CoverSource::None,
        bitmap: None,
    })
});

/// A cover image. Immutable once constructed; a new cover replaces the old one wholesale.
#[derive(Debug)]
pub struct CoverImage {
    source: CoverSource,
    bitmap: Option<Bitmap>,
}
impl CoverImage {
    /// A resolved cover.
    pub fn new(source: CoverSource, bitmap: Bitmap) -> Self {
        Self {
            source,
            bitmap: Some(bitmap),
        }
    }

    /// The shared placeholder used for every cover that has not been resolved yet.
    pub fn unknown() -> Arc<CoverImage> {
        UNKNOWN_COVER.clone()
    }

    /// Whether `cover` is the shared placeholder.
    pub fn is_unknown(cover: &Arc<CoverImage>) -> bool {
        Arc::ptr_eq(cover, &UNKNOWN_COVER)
    }

    /// Where this cover came from.
    pub fn source(&self) -> &CoverSource {
        &self.source
    }

    /// The resolved pixel data, if any.
    pub fn bitmap(&self) -> Option<&Bitmap> {
        self.bitmap.as_ref()
    }

    /// The local path of the source, if it was a local file.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.source {
            CoverSource::LocalPath(path) => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_display() {
        assert_eq!(CacheKey::artist("Bowie").to_string(), "artist:Bowie");
        assert_eq!(CacheKey::album("Bowie", "Low").to_string(), "album:Bowie/Low");
    }

    #[test]
    fn test_file_stem_is_unambiguous() {
        let a = CacheKey::album("a - b", "c");
        let b = CacheKey::album("a", "b - c");
        assert_ne!(a.file_stem(), b.file_stem());
        assert_ne!(
            CacheKey::artist("x").file_stem(),
            CacheKey::album("x", "").file_stem()
        );
        assert_eq!(a.file_stem(), CacheKey::album("a - b", "c").file_stem());
    }

    #[test]
    fn test_unknown_is_shared() {
        let a = CoverImage::unknown();
        let b = CoverImage::unknown();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(CoverImage::is_unknown(&a));
        assert!(a.bitmap().is_none());
    }

    #[test]
    fn test_bitmap_fits_display_size() {
        let original = Arc::new(image::DynamicImage::new_rgba8(400, 200));
        let bitmap = Bitmap::from_original(original.clone(), 100);
        assert_eq!(bitmap.display.dimensions(), (100, 50));
        assert!(Arc::ptr_eq(&bitmap.original, &original));
    }
}
