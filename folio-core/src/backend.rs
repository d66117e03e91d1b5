use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use folio_state::CacheKey;
use tokio::sync::mpsc::error::TrySendError;

use crate::{CatalogError, CatalogResult, FetchError, tokio_thread::TokioThread};

/// Called exactly once with the outcome of a remote fetch, from whichever thread
/// finished it.
pub type FetchCallback = Box<dyn FnOnce(Result<Vec<u8>, FetchError>) + Send>;

/// Storage and network access for a [`crate::CoverCache`]. The layout of stored
/// artifacts belongs to the backend.
pub trait CacheBackend {
    /// Copies the artifact at `source` into storage under `key` and returns where it
    /// now lives. `source` may be deleted as soon as this returns.
    fn store_by_key(&mut self, key: &CacheKey, source: &Path) -> CatalogResult<PathBuf>;

    /// Starts fetching `uri` without blocking. `done` may be called before this
    /// returns.
    fn fetch_remote(&mut self, uri: &str, done: FetchCallback);

    /// A previously stored artifact for `key`, if there is one.
    fn load_by_key(&self, _key: &CacheKey) -> Option<PathBuf> {
        None
    }
}

/// Stores covers as files named after [`CacheKey::file_stem`] and fetches remote
/// covers over HTTP.
pub struct DiskCacheBackend {
    cache_dir: PathBuf,
    fetcher: RemoteFetcher,
}
impl DiskCacheBackend {
    pub fn new(cache_dir: impl Into<PathBuf>, fetcher: RemoteFetcher) -> CatalogResult<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir, fetcher })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.file_stem())
    }
}
impl CacheBackend for DiskCacheBackend {
    fn store_by_key(&mut self, key: &CacheKey, source: &Path) -> CatalogResult<PathBuf> {
        let destination = self.path_for(key);

        // Stage next to the destination so that readers never see a partial file.
        let mut staged = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
        std::io::copy(&mut File::open(source)?, staged.as_file_mut())?;
        staged.persist(&destination).map_err(|e| e.error)?;

        tracing::debug!("Stored cover for {key} at {}", destination.display());
        Ok(destination)
    }

    fn fetch_remote(&mut self, uri: &str, done: FetchCallback) {
        self.fetcher.fetch(uri, done);
    }

    fn load_by_key(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.path_for(key);
        path.is_file().then_some(path)
    }
}

/// Runs HTTP fetches on a background tokio runtime.
pub struct RemoteFetcher {
    tokio: TokioThread,
    client: reqwest::Client,
}
impl RemoteFetcher {
    pub fn new(timeout: Duration) -> CatalogResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            tokio: TokioThread::new()?,
            client,
        })
    }

    pub fn fetch(&self, uri: &str, done: FetchCallback) {
        let client = self.client.clone();
        let target = uri.to_string();

        // Shared with the task so the callback can still be reached if the task never
        // gets to run.
        let done = Arc::new(Mutex::new(Some(done)));
        let task_done = done.clone();
        let task = async move {
            let result = fetch_bytes(&client, &target).await;
            if let Some(done) = take_callback(&task_done) {
                done(result);
            }
        };

        let reason = match self.tokio.spawn(task) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => "too many fetches queued",
            Err(TrySendError::Closed(_)) => "runtime thread has stopped",
        };
        tracing::warn!("Cannot fetch {uri}: {reason}");
        if let Some(done) = take_callback(&done) {
            done(Err(FetchError::Backend(reason.to_string())));
        }
    }
}

fn take_callback(slot: &Mutex<Option<FetchCallback>>) -> Option<FetchCallback> {
    slot.lock().ok().and_then(|mut callback| callback.take())
}

async fn fetch_bytes(client: &reqwest::Client, uri: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(uri).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    Ok(response.bytes().await?.to_vec())
}
