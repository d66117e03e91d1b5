use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
};

use folio_state::{Bitmap, CacheKey, CoverImage, CoverRequest, CoverSource};
use image::DynamicImage;

use crate::{CatalogResult, FetchError, backend::CacheBackend, events::Subscribers};

/// What [`CoverCache::resolve`] could tell straight away.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A fetch is running; a [`CoverUpdated`] will follow.
    Pending,
    Cached(Arc<CoverImage>),
    /// The request could not be resolved. Carries the cover that is still shown.
    Failed(Arc<CoverImage>),
}

/// Sent whenever the cover for a key settles. `image` is `None` if resolution failed,
/// in which case holders keep what they had.
#[derive(Debug, Clone)]
pub struct CoverUpdated {
    pub key: CacheKey,
    pub image: Option<Arc<CoverImage>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverState {
    Empty,
    Fetching,
    Resolved,
    Failed,
}

enum Status {
    Fetching { uri: String, request: u64 },
    Resolved,
    Failed,
}

struct Entry {
    /// What holders should show; survives failures and refetches.
    current: Option<Arc<CoverImage>>,
    status: Status,
}

struct FetchCompletion {
    key: CacheKey,
    request: u64,
    result: Result<Vec<u8>, FetchError>,
}

pub struct CoverCache<B: CacheBackend> {
    backend: B,
    entries: HashMap<CacheKey, Entry>,
    completed_tx: mpsc::Sender<FetchCompletion>,
    completed_rx: mpsc::Receiver<FetchCompletion>,
    display_size: u32,
    scratch_dir: PathBuf,
    next_request: u64,
    events: Subscribers<CoverUpdated>,
}
impl<B: CacheBackend> CoverCache<B> {
    /// `display_size` is the edge of the square that display bitmaps are scaled to fit.
    /// Temporary files are created in `scratch_dir`.
    pub fn new(backend: B, display_size: u32, scratch_dir: impl Into<PathBuf>) -> Self {
        let (completed_tx, completed_rx) = mpsc::channel();
        Self {
            backend,
            entries: HashMap::new(),
            completed_tx,
            completed_rx,
            display_size,
            scratch_dir: scratch_dir.into(),
            next_request: 0,
            events: Subscribers::new(),
        }
    }

    pub fn events(&self) -> &Subscribers<CoverUpdated> {
        &self.events
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn display_size(&self) -> u32 {
        self.display_size
    }

    /// The placeholder shown for anything without a resolved cover.
    pub fn get_unknown(&self) -> Arc<CoverImage> {
        CoverImage::unknown()
    }

    /// The cover currently shown for `key`.
    pub fn get(&self, key: &CacheKey) -> Arc<CoverImage> {
        self.entries
            .get(key)
            .and_then(|entry| entry.current.clone())
            .unwrap_or_else(CoverImage::unknown)
    }

    pub fn state(&self, key: &CacheKey) -> CoverState {
        match self.entries.get(key).map(|entry| &entry.status) {
            None => CoverState::Empty,
            Some(Status::Fetching { .. }) => CoverState::Fetching,
            Some(Status::Resolved) => CoverState::Resolved,
            Some(Status::Failed) => CoverState::Failed,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.entries
            .values()
            .any(|entry| matches!(entry.status, Status::Fetching { .. }))
    }

    /// Resolves `request` as the cover for `key`.
    ///
    /// In-memory bitmaps and local files are stored through the backend and resolved
    /// before this returns. Remote URIs are fetched in the background; asking for the
    /// URI that is already being fetched for `key` joins that fetch, while asking for a
    /// different one abandons it. Whatever was shown for `key` stays shown until the
    /// new cover is ready.
    pub fn resolve(&mut self, key: &CacheKey, request: CoverRequest) -> Resolution {
        match request {
            CoverRequest::Bitmap(original) => {
                let stored = self.store_bitmap(key, &original);
                let source = match stored {
                    Ok(path) => CoverSource::LocalPath(path),
                    Err(e) => {
                        tracing::warn!("Failed to store cover for {key}: {e}");
                        CoverSource::None
                    }
                };
                self.resolve_with(key, source, original)
            }
            CoverRequest::LocalPath(path) => match decode_file(&path) {
                Ok(original) => {
                    if let Err(e) = self.backend.store_by_key(key, &path) {
                        tracing::warn!("Failed to store cover for {key}: {e}");
                    }
                    self.resolve_with(key, CoverSource::LocalPath(path), Arc::new(original))
                }
                Err(e) => {
                    tracing::warn!("Failed to load cover for {key} from {}: {e}", path.display());
                    let update = self.fail(key);
                    self.events.emit(&update);
                    Resolution::Failed(self.get(key))
                }
            },
            CoverRequest::RemoteUri(uri) => self.fetch(key, uri),
        }
    }

    /// Applies every fetch that has completed since the last call, returning (and
    /// announcing) the resulting updates. Results for fetches that were superseded are
    /// dropped.
    pub fn update(&mut self) -> Vec<CoverUpdated> {
        let completions: Vec<_> = self.completed_rx.try_iter().collect();
        let updates: Vec<_> = completions
            .into_iter()
            .filter_map(|completion| self.complete(completion))
            .collect();
        for update in &updates {
            self.events.emit(update);
        }
        updates
    }

    fn fetch(&mut self, key: &CacheKey, uri: String) -> Resolution {
        if let Some(Entry {
            status: Status::Fetching { uri: in_flight, .. },
            ..
        }) = self.entries.get(key)
            && *in_flight == uri
        {
            tracing::debug!("Joining in-flight fetch of {key}");
            return Resolution::Pending;
        }

        let request = self.next_request;
        self.next_request += 1;

        let previous = self.entries.get(key).and_then(|entry| entry.current.clone());
        let warm = match previous {
            Some(_) => None,
            None => self.warm_start(key),
        };
        self.entries.insert(
            key.clone(),
            Entry {
                current: previous.or_else(|| warm.clone()),
                status: Status::Fetching {
                    uri: uri.clone(),
                    request,
                },
            },
        );
        if let Some(warm) = warm {
            self.events.emit(&CoverUpdated {
                key: key.clone(),
                image: Some(warm),
            });
        }

        tracing::debug!("Fetching cover for {key} from {uri}");
        let completed_tx = self.completed_tx.clone();
        let completion_key = key.clone();
        self.backend.fetch_remote(
            &uri,
            Box::new(move |result| {
                // The cache may be gone by now, in which case nobody wants the result.
                let _ = completed_tx.send(FetchCompletion {
                    key: completion_key,
                    request,
                    result,
                });
            }),
        );
        Resolution::Pending
    }

    fn complete(&mut self, completion: FetchCompletion) -> Option<CoverUpdated> {
        let FetchCompletion {
            key,
            request,
            result,
        } = completion;

        let uri = match self.entries.get(&key).map(|entry| &entry.status) {
            Some(Status::Fetching {
                uri,
                request: expected,
            }) if *expected == request => uri.clone(),
            _ => {
                tracing::debug!("Discarding stale fetch result for {key}");
                return None;
            }
        };

        let decoded =
            result.and_then(|bytes| image::load_from_memory(&bytes).map_err(FetchError::from));
        let original = match decoded {
            Ok(original) => Arc::new(original),
            Err(e) => {
                tracing::warn!("Failed to fetch cover for {key} from {uri}: {e}");
                return Some(self.fail(&key));
            }
        };

        if let Err(e) = self.store_bitmap(&key, &original) {
            tracing::warn!("Failed to store cover for {key}: {e}");
        }
        let image = self.install(&key, CoverSource::RemoteUri(uri), original);
        Some(CoverUpdated {
            key,
            image: Some(image),
        })
    }

    fn resolve_with(
        &mut self,
        key: &CacheKey,
        source: CoverSource,
        original: Arc<DynamicImage>,
    ) -> Resolution {
        let image = self.install(key, source, original);
        self.events.emit(&CoverUpdated {
            key: key.clone(),
            image: Some(image.clone()),
        });
        Resolution::Cached(image)
    }

    /// Swaps in a new cover for `key` in one step.
    fn install(
        &mut self,
        key: &CacheKey,
        source: CoverSource,
        original: Arc<DynamicImage>,
    ) -> Arc<CoverImage> {
        let image = Arc::new(CoverImage::new(
            source,
            Bitmap::from_original(original, self.display_size),
        ));
        self.entries.insert(
            key.clone(),
            Entry {
                current: Some(image.clone()),
                status: Status::Resolved,
            },
        );
        image
    }

    fn fail(&mut self, key: &CacheKey) -> CoverUpdated {
        let current = self.entries.get(key).and_then(|entry| entry.current.clone());
        self.entries.insert(
            key.clone(),
            Entry {
                current,
                status: Status::Failed,
            },
        );
        CoverUpdated {
            key: key.clone(),
            image: None,
        }
    }

    /// Hands `original` to the backend as a PNG file. The file only exists for the
    /// duration of the call.
    fn store_bitmap(&mut self, key: &CacheKey, original: &DynamicImage) -> CatalogResult<PathBuf> {
        let mut scratch = tempfile::Builder::new()
            .prefix("folio-cover-")
            .suffix(".png")
            .tempfile_in(&self.scratch_dir)?;
        original.write_to(scratch.as_file_mut(), image::ImageFormat::Png)?;
        self.backend.store_by_key(key, scratch.path())
    }

    fn warm_start(&self, key: &CacheKey) -> Option<Arc<CoverImage>> {
        let path = self.backend.load_by_key(key)?;
        match decode_file(&path) {
            Ok(original) => {
                tracing::debug!("Showing stored cover for {key} while fetching");
                Some(Arc::new(CoverImage::new(
                    CoverSource::LocalPath(path),
                    Bitmap::from_original(Arc::new(original), self.display_size),
                )))
            }
            Err(e) => {
                tracing::debug!("Ignoring unreadable stored cover for {key}: {e}");
                None
            }
        }
    }
}

fn decode_file(path: &Path) -> image::ImageResult<DynamicImage> {
    image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
}
