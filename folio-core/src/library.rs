use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use folio_state::{Album, AlbumId, Artist, CacheKey, CoverImage, RawEntry};
use smol_str::SmolStr;

use crate::{
    CatalogError, CatalogResult, TransformFailure,
    backend::CacheBackend,
    chunked_loader::{ChunkProcessor, ChunkedLoader, GenerationCounter, Progress, Step},
    config::Config,
    cover_cache::{CoverCache, CoverState, Resolution},
    events::Subscribers,
    item_source::{AlbumCollection, ItemSource},
    model::CatalogModel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPass {
    /// Raw entries are turned into artists and albums.
    Entities,
    /// Artists are added to the catalog.
    Catalog,
}
impl LoadPass {
    /// Maps progress within this pass onto progress of the whole load.
    fn overall(self, fraction: f32) -> f32 {
        match self {
            LoadPass::Entities => fraction * 0.5,
            LoadPass::Catalog => 0.5 + fraction * 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LibraryEvent {
    LoadProgress {
        pass: LoadPass,
        /// Progress within `pass`.
        fraction: f32,
        /// Progress of the load as a whole.
        overall: f32,
    },
    LoadFinished {
        artists: usize,
        albums: usize,
        failures: usize,
    },
}

/// Artists and albums built from raw entries, before they reach the catalog.
#[derive(Default)]
struct Drafts {
    artists: Vec<Artist>,
    artist_positions: HashMap<SmolStr, usize>,
    albums: Vec<Arc<Album>>,
    seen: HashSet<AlbumId>,
}

enum Load {
    Entities(ChunkedLoader<std::vec::IntoIter<RawEntry>, Drafts>),
    Catalog {
        loader: ChunkedLoader<std::vec::IntoIter<Arc<Artist>>, usize>,
        albums: usize,
    },
}

/// Owns the catalog, the cover cache and the album collection, and keeps them in step.
///
/// Nothing here runs on its own: the host calls [`Library::tick`] from its event loop.
pub struct Library<B: CacheBackend> {
    model: CatalogModel,
    covers: CoverCache<B>,
    albums: AlbumCollection,

    load: Option<Load>,
    load_generation: GenerationCounter,
    chunk_size: usize,
    failures: Vec<TransformFailure>,
    /// Artists removed along with their last album, kept so they can come back intact.
    retired: HashMap<SmolStr, Arc<Artist>>,
    events: Subscribers<LibraryEvent>,
}
impl<B: CacheBackend> Library<B> {
    pub fn new(model: CatalogModel, covers: CoverCache<B>, chunk_size: usize) -> Self {
        Self {
            model,
            covers,
            albums: AlbumCollection::new(),

            load: None,
            load_generation: GenerationCounter::new(),
            chunk_size,
            failures: vec![],
            retired: HashMap::new(),
            events: Subscribers::new(),
        }
    }

    /// Builds the catalog and cover cache described by `config` around `backend`.
    pub fn from_config(config: &Config, backend: B) -> CatalogResult<Self> {
        let mut model = CatalogModel::new(config.sort_keys(), config.general.chunk_size)?;
        // Fail early on a bad key; there is nothing to rebuild yet.
        model.sort(Some(&config.general.sort_key), config.general.sort_reverse)?;
        model.finish_rebuild();

        let covers = CoverCache::new(
            backend,
            config.general.cover_size,
            config.cache.scratch_dir(),
        );
        Ok(Self::new(model, covers, config.general.chunk_size))
    }

    pub fn model(&self) -> &CatalogModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut CatalogModel {
        &mut self.model
    }

    pub fn covers(&self) -> &CoverCache<B> {
        &self.covers
    }

    pub fn covers_mut(&mut self) -> &mut CoverCache<B> {
        &mut self.covers
    }

    pub fn albums(&self) -> &AlbumCollection {
        &self.albums
    }

    pub fn events(&self) -> &Subscribers<LibraryEvent> {
        &self.events
    }

    /// Entries rejected by the most recent load.
    pub fn failures(&self) -> &[TransformFailure] {
        &self.failures
    }

    /// Replaces the library's contents with `entries`, abandoning any load in progress.
    /// The work happens over subsequent calls to [`Library::tick`].
    pub fn start_load(&mut self, entries: Vec<RawEntry>) {
        let token = self.load_generation.advance();
        if self.load.take().is_some() {
            tracing::debug!("Abandoning previous load");
        }

        self.model.clear();
        self.albums.clear();
        self.failures.clear();
        self.retired.clear();

        tracing::info!("Loading {} entries", entries.len());
        self.load = Some(Load::Entities(ChunkedLoader::new(
            entries,
            self.chunk_size,
            Drafts::default(),
            token,
        )));
    }

    /// Overall progress of the current load, if there is one.
    pub fn progress(&self) -> Option<f32> {
        match self.load.as_ref()? {
            Load::Entities(loader) => Some(LoadPass::Entities.overall(loader.progress().fraction())),
            Load::Catalog { loader, .. } => {
                Some(LoadPass::Catalog.overall(loader.progress().fraction()))
            }
        }
    }

    /// Does one step of pending work: applies finished cover fetches, then advances the
    /// load and any catalog rebuild by one chunk each. Returns whether a load or rebuild
    /// is still under way.
    pub fn tick(&mut self) -> bool {
        for update in self.covers.update() {
            self.model.on_cover_updated(&update.key, update.image.as_ref());
        }
        self.advance_load();
        self.model.advance_rebuild();
        self.is_busy()
    }

    /// Ticks until no load or rebuild remains. Cover fetches may still be running.
    pub fn run_until_loaded(&mut self) {
        while self.tick() {}
    }

    pub fn is_busy(&self) -> bool {
        self.load.is_some() || self.model.is_rebuilding()
    }

    /// Nothing left to do, including cover fetches.
    pub fn is_idle(&self) -> bool {
        !self.is_busy() && !self.covers.has_pending()
    }

    pub fn sort(&mut self, key: Option<&str>, reverse: bool) -> CatalogResult<()> {
        self.model.sort(key, reverse)
    }

    /// Expands an artist and starts resolving covers for its albums.
    pub fn expand(&mut self, name: &str) -> CatalogResult<usize> {
        let count = self
            .model
            .materialize_children(name, Some(&self.albums as &dyn ItemSource))?;

        for album in self.model.children(name).unwrap_or_default() {
            let key = album.cover_key();
            if self.covers.state(&key) == CoverState::Empty
                && let Some(request) = album.cover_source.to_request()
            {
                let resolution = self.covers.resolve(&key, request);
                show_cover(&mut self.model, &self.covers, &key, resolution);
            } else {
                let shown = self.covers.get(&key);
                if !CoverImage::is_unknown(&shown) {
                    self.model.on_cover_updated(&key, Some(&shown));
                }
            }
        }
        Ok(count)
    }

    /// Adds an album, creating its artist if needed. An artist that lost its last album
    /// earlier comes back as it was, cover included.
    pub fn add_album(&mut self, album: Album) -> CatalogResult<()> {
        let album = Arc::new(album);
        if !self.albums.insert(album.clone()) {
            return Err(CatalogError::DuplicateKey(album.id().to_string().into()));
        }

        match self.model.get(&album.artist).cloned() {
            Some(existing) => {
                let mut artist = Artist::clone(&existing);
                artist.album_count += 1;
                self.model.update(Arc::new(artist))?;
                self.model.item_added(album);
            }
            None => {
                let mut artist = match self.retired.remove(&album.artist) {
                    Some(retired) => Artist::clone(&retired),
                    None => Artist::new(album.artist.clone()),
                };
                artist.album_count = 1;
                let artist = Arc::new(artist);
                self.model.add(artist.clone())?;
                self.show_artist_cover(&artist);
            }
        }
        self.model.on_external_filter_changed(&self.albums);
        Ok(())
    }

    /// Removes an album. An artist left without albums is removed too.
    pub fn remove_album(&mut self, id: &AlbumId) -> CatalogResult<Arc<Album>> {
        let album = self
            .albums
            .remove(id)
            .ok_or_else(|| CatalogError::NotFound(format!("album `{id}`")))?;

        self.model.item_removed(id);
        if let Some(existing) = self.model.get(&id.artist).cloned() {
            if self.albums.has_artist(&id.artist) {
                let mut artist = Artist::clone(&existing);
                artist.album_count = artist.album_count.saturating_sub(1);
                self.model.update(Arc::new(artist))?;
            } else {
                let artist = self.model.remove(&id.artist)?;
                self.retired.insert(artist.name.clone(), artist);
            }
        }
        self.model.on_external_filter_changed(&self.albums);
        Ok(album)
    }

    /// Shows the artist's cover, resolving it first if nothing has been asked for yet.
    fn show_artist_cover(&mut self, artist: &Artist) {
        let key = artist.cover_key();
        if self.covers.state(&key) == CoverState::Empty
            && let Some(request) = artist.cover_source.to_request()
        {
            let resolution = self.covers.resolve(&key, request);
            show_cover(&mut self.model, &self.covers, &key, resolution);
        } else {
            let shown = self.covers.get(&key);
            if !CoverImage::is_unknown(&shown) {
                self.model.on_cover_updated(&key, Some(&shown));
            }
        }
    }

    fn advance_load(&mut self) {
        let Some(load) = self.load.take() else {
            return;
        };

        match load {
            Load::Entities(mut loader) => {
                let mut finished = None;
                let step = loader.advance(&mut EntityPass {
                    events: &self.events,
                    failures: &mut self.failures,
                    finished: &mut finished,
                });
                match (step, finished) {
                    (Step::Continue, _) => self.load = Some(Load::Entities(loader)),
                    (Step::Done, Some(drafts)) => self.begin_catalog_pass(drafts),
                    _ => {}
                }
            }
            Load::Catalog { mut loader, albums } => {
                let mut added = None;
                let step = loader.advance(&mut CatalogPass {
                    model: &mut self.model,
                    covers: &mut self.covers,
                    events: &self.events,
                    failures: &mut self.failures,
                    finished: &mut added,
                });
                match (step, added) {
                    (Step::Continue, _) => self.load = Some(Load::Catalog { loader, albums }),
                    (Step::Done, Some(artists)) => self.finish_load(artists, albums),
                    _ => {}
                }
            }
        }
    }

    fn begin_catalog_pass(&mut self, drafts: Drafts) {
        let albums = drafts.albums.len();
        for album in drafts.albums {
            self.albums.insert(album);
        }
        let artists: Vec<Arc<Artist>> = drafts.artists.into_iter().map(Arc::new).collect();
        tracing::debug!("Built {} artists and {albums} albums", artists.len());

        self.load = Some(Load::Catalog {
            loader: ChunkedLoader::new(
                artists,
                self.chunk_size,
                0,
                self.load_generation.token(),
            ),
            albums,
        });
    }

    fn finish_load(&mut self, artists: usize, albums: usize) {
        self.model.on_external_filter_changed(&self.albums);
        tracing::info!(
            "Loaded {artists} artists and {albums} albums ({} entries rejected)",
            self.failures.len()
        );
        self.events.emit(&LibraryEvent::LoadFinished {
            artists,
            albums,
            failures: self.failures.len(),
        });
    }
}

/// Shows whatever the cache has for `key` after a resolve, which may be an interim
/// cover while a fetch runs.
fn show_cover<B: CacheBackend>(
    model: &mut CatalogModel,
    covers: &CoverCache<B>,
    key: &CacheKey,
    resolution: Resolution,
) {
    let shown = match resolution {
        Resolution::Cached(image) => image,
        Resolution::Pending | Resolution::Failed(_) => covers.get(key),
    };
    if !CoverImage::is_unknown(&shown) {
        model.on_cover_updated(key, Some(&shown));
    }
}

fn record_failure(failures: &mut Vec<TransformFailure>, failure: TransformFailure) {
    tracing::warn!("Rejected {failure}");
    failures.push(failure);
}

fn emit_progress(events: &Subscribers<LibraryEvent>, pass: LoadPass, progress: Progress) {
    let fraction = progress.fraction();
    events.emit(&LibraryEvent::LoadProgress {
        pass,
        fraction,
        overall: pass.overall(fraction),
    });
}

struct EntityPass<'a> {
    events: &'a Subscribers<LibraryEvent>,
    failures: &'a mut Vec<TransformFailure>,
    finished: &'a mut Option<Drafts>,
}
impl ChunkProcessor<RawEntry, Drafts> for EntityPass<'_> {
    fn process(&mut self, entry: RawEntry, drafts: &mut Drafts) -> Result<(), String> {
        let artist_name = entry.artist.trim();
        let album_name = entry.album.trim();
        if artist_name.is_empty() {
            return Err(format!("album `{album_name}` has no artist"));
        }
        if album_name.is_empty() {
            return Err(format!("entry for `{artist_name}` has no album name"));
        }

        let mut album = Album::new(album_name, artist_name);
        album.year = entry.year;
        album.cover_source = entry.album_cover;
        if !drafts.seen.insert(album.id()) {
            return Err(format!("duplicate album `{}`", album.id()));
        }

        let position = match drafts.artist_positions.get(artist_name) {
            Some(position) => *position,
            None => {
                drafts.artists.push(Artist::new(artist_name));
                let position = drafts.artists.len() - 1;
                drafts
                    .artist_positions
                    .insert(artist_name.into(), position);
                position
            }
        };
        let artist = &mut drafts.artists[position];
        artist.album_count += 1;
        if artist.sort_name.is_none() {
            artist.sort_name = entry.artist_sort_name.map(SmolStr::from);
        }
        if artist.cover_source.to_request().is_none() {
            artist.cover_source = entry.artist_cover;
        }

        drafts.albums.push(Arc::new(album));
        Ok(())
    }

    fn after_chunk(&mut self, _drafts: &Drafts, progress: Progress) {
        emit_progress(self.events, LoadPass::Entities, progress);
    }

    fn on_error(&mut self, failure: TransformFailure) {
        record_failure(self.failures, failure);
    }

    fn on_finish(&mut self, drafts: Drafts) {
        *self.finished = Some(drafts);
    }
}

struct CatalogPass<'a, B: CacheBackend> {
    model: &'a mut CatalogModel,
    covers: &'a mut CoverCache<B>,
    events: &'a Subscribers<LibraryEvent>,
    failures: &'a mut Vec<TransformFailure>,
    finished: &'a mut Option<usize>,
}
impl<B: CacheBackend> ChunkProcessor<Arc<Artist>, usize> for CatalogPass<'_, B> {
    fn process(&mut self, artist: Arc<Artist>, added: &mut usize) -> Result<(), String> {
        self.model
            .add(artist.clone())
            .map_err(|e| e.to_string())?;
        *added += 1;

        if let Some(request) = artist.cover_source.to_request() {
            let key = artist.cover_key();
            let resolution = self.covers.resolve(&key, request);
            show_cover(self.model, self.covers, &key, resolution);
        }
        Ok(())
    }

    fn after_chunk(&mut self, _added: &usize, progress: Progress) {
        emit_progress(self.events, LoadPass::Catalog, progress);
    }

    fn on_error(&mut self, failure: TransformFailure) {
        record_failure(self.failures, failure);
    }

    fn on_finish(&mut self, added: usize) {
        *self.finished = Some(added);
    }
}
