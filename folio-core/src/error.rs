use smol_str::SmolStr;
use thiserror::Error;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    /// An artist with this name is already in the catalog.
    #[error("duplicate key: {0}")]
    DuplicateKey(SmolStr),

    /// The entity being operated on is not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// A caller asked for structural work on a node the model has never seen.
    /// This is a programming error, distinct from [`CatalogError::NotFound`].
    #[error("unknown node: {0}")]
    UnknownNode(SmolStr),

    #[error("unknown sort key: {0}")]
    UnknownSortKey(String),

    #[error("failed to create collator: {0}")]
    Collation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// A remote cover fetch that did not produce an image.
///
/// These are never returned from [`crate::CoverCache::resolve`]; they surface through
/// the cache's update events instead.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("not a decodable image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("{0}")]
    Backend(String),
}

/// A single element that could not be processed during a chunked run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("element {index}: {reason}")]
pub struct TransformFailure {
    /// Position of the element in the input sequence.
    pub index: usize,
    pub reason: String,
}
impl TransformFailure {
    pub fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}
