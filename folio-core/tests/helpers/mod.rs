//! Shared fixtures for the folio-core integration tests.
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io::Cursor,
    path::{Path, PathBuf},
};

use folio_core::{
    CacheBackend, CatalogError, CatalogResult, Config, FetchCallback, FetchError, Library,
    folio_state::{CacheKey, CoverSource, RawEntry},
};
use tempfile::TempDir;

/// A cache backend that stores into a temporary directory and leaves remote fetches
/// pending until a test completes them.
pub struct FakeBackend {
    pub dir: TempDir,
    pub fetched: Vec<String>,
    pub pending: VecDeque<(String, FetchCallback)>,
    pub fail_store: bool,
}
impl FakeBackend {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            fetched: vec![],
            pending: VecDeque::new(),
            fail_store: false,
        }
    }

    /// Completes the oldest pending fetch, returning its URI.
    pub fn complete_next(&mut self, result: Result<Vec<u8>, FetchError>) -> String {
        let (uri, done) = self.pending.pop_front().expect("no fetch is pending");
        done(result);
        uri
    }
}
impl CacheBackend for FakeBackend {
    fn store_by_key(&mut self, key: &CacheKey, source: &Path) -> CatalogResult<PathBuf> {
        if self.fail_store {
            return Err(CatalogError::Io(std::io::Error::other("store refused")));
        }
        let destination = self.dir.path().join(key.file_stem());
        std::fs::copy(source, &destination)?;
        Ok(destination)
    }

    fn fetch_remote(&mut self, uri: &str, done: FetchCallback) {
        self.fetched.push(uri.to_string());
        self.pending.push_back((uri.to_string(), done));
    }
}

/// A library over a [`FakeBackend`], with temporary files going to `scratch`.
pub fn library(scratch: &TempDir, chunk_size: usize) -> Library<FakeBackend> {
    let mut config = Config::default();
    config.general.chunk_size = chunk_size;
    config.general.cover_size = 32;
    config.cache.scratch_dir = Some(scratch.path().to_path_buf());
    Library::from_config(&config, FakeBackend::new()).unwrap()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Cursor::new(vec![]);
    image::DynamicImage::new_rgba8(width, height)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

pub fn entry(album: &str, artist: &str) -> RawEntry {
    RawEntry::new(album, artist)
}

pub fn entry_with_artist_cover(album: &str, artist: &str, cover: CoverSource) -> RawEntry {
    RawEntry {
        artist_cover: cover,
        ..RawEntry::new(album, artist)
    }
}

pub fn entry_with_album_cover(album: &str, artist: &str, cover: CoverSource) -> RawEntry {
    RawEntry {
        album_cover: cover,
        ..RawEntry::new(album, artist)
    }
}

pub fn scratch_is_empty(scratch: &TempDir) -> bool {
    std::fs::read_dir(scratch.path()).unwrap().next().is_none()
}
