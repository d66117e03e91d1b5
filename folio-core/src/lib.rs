pub mod backend;
pub mod chunked_loader;
pub mod config;
pub mod cover_cache;
pub mod events;
pub mod item_source;
pub mod model;
pub mod ordered_index;
pub mod sort;
pub mod tokio_thread;

mod error;
pub use error::{CatalogError, CatalogResult, FetchError, TransformFailure};

mod library;
pub use library::{Library, LibraryEvent, LoadPass};

pub use backend::{CacheBackend, DiskCacheBackend, FetchCallback, RemoteFetcher};
pub use chunked_loader::{ChunkProcessor, ChunkedLoader, GenerationCounter, Progress, Step};
pub use config::Config;
pub use cover_cache::{CoverCache, CoverState, CoverUpdated, Resolution};
pub use events::{SubscriptionId, Subscribers};
pub use item_source::{AlbumCollection, ItemSource};
pub use model::{CatalogEvent, CatalogModel, Entity, NodeId, TreePath};
pub use ordered_index::{Comparator, OrderedIndex};
pub use sort::{Collation, SortKey, SortKeys};

pub use folio_state;
