//! The two-level artist → album tree that views read from.
//!
//! Artists live in two [`OrderedIndex`]es sharing one comparator: the raw index holds
//! every artist that has been placed, and the visible index holds the subset that passes
//! visibility. Since the comparator never ties two distinct artists, the visible index
//! is always the raw index with the hidden artists taken out, and every position handed
//! to a view refers to the visible index.
//!
//! Albums are not indexed until an artist is expanded; before then the artist carries a
//! single placeholder child.
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use folio_state::{Album, AlbumId, Artist, CacheKey, CoverImage};
use smol_str::SmolStr;

use crate::{
    CatalogError, CatalogResult,
    chunked_loader::{ChunkProcessor, ChunkedLoader, GenerationCounter, Progress, Step},
    events::Subscribers,
    item_source::ItemSource,
    ordered_index::OrderedIndex,
    sort::{Collation, SortKey, SortKeys},
};

mod filter;
pub use filter::{FilterState, Predicate};

mod node;
pub use node::{Entity, NodeId, TreePath};
use node::{Children, GroupNode, ItemNode};

/// Structural notifications for views. Every path is a position in the filtered tree,
/// valid at the moment the event is delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEvent {
    RowInserted(TreePath),
    RowRemoved(TreePath),
    /// The row's data (usually its cover) changed in place.
    RowUpdated(TreePath),
    /// Every row is gone; a rebuild will insert them again.
    Cleared,
    RebuildProgress(f32),
    RebuildFinished,
}

type Rebuild = ChunkedLoader<std::vec::IntoIter<Arc<Artist>>, ()>;

pub struct CatalogModel {
    collation: Collation,
    sort_keys: SortKeys,
    sort_key: SortKey,
    chunk_size: usize,

    index: OrderedIndex<Arc<Artist>>,
    visible: OrderedIndex<Arc<Artist>>,
    nodes: HashMap<SmolStr, GroupNode>,
    filters: FilterState,

    rebuild: Option<Rebuild>,
    generation: GenerationCounter,
    events: Subscribers<CatalogEvent>,
}
impl CatalogModel {
    /// Creates an empty model sorted by name. `chunk_size` is the number of artists a
    /// rebuild places per step.
    pub fn new(sort_keys: SortKeys, chunk_size: usize) -> CatalogResult<Self> {
        let collation = Collation::new()?;
        let sort_key = sort_keys.get("name")?;
        let comparator = collation.artist_comparator(&sort_key);

        Ok(Self {
            collation,
            sort_keys,
            sort_key,
            chunk_size,

            index: OrderedIndex::new(comparator.clone()),
            visible: OrderedIndex::new(comparator),
            nodes: HashMap::new(),
            filters: FilterState::default(),

            rebuild: None,
            generation: GenerationCounter::new(),
            events: Subscribers::new(),
        })
    }

    pub fn events(&self) -> &Subscribers<CatalogEvent> {
        &self.events
    }

    pub fn collation(&self) -> &Collation {
        &self.collation
    }

    /// Adds an artist with an unexpanded child list and places it immediately, even
    /// while a rebuild is running.
    pub fn add(&mut self, artist: Arc<Artist>) -> CatalogResult<NodeId> {
        if self.nodes.contains_key(&artist.name) {
            return Err(CatalogError::DuplicateKey(artist.name.clone()));
        }

        let name = artist.name.clone();
        let passes_filters = self.filters.matches(&artist);
        self.nodes
            .insert(name.clone(), GroupNode::new(artist, passes_filters));
        self.place(&name);
        Ok(NodeId(name))
    }

    /// Removes an artist along with any expanded albums. Only the artist's own row
    /// removal is announced.
    pub fn remove(&mut self, name: &str) -> CatalogResult<Arc<Artist>> {
        let node = self
            .nodes
            .remove(name)
            .ok_or_else(|| CatalogError::NotFound(format!("artist `{name}`")))?;

        if node.in_view {
            let (position, _) = self.visible.remove(&node.artist)?;
            self.events
                .emit(&CatalogEvent::RowRemoved(TreePath::group(position)));
        }
        if node.placed {
            self.index.remove(&node.artist)?;
        }
        Ok(node.artist)
    }

    /// Replaces the data of an existing artist, keeping its children, cover and shown
    /// flag. The row moves if the new data sorts differently, and is announced as
    /// updated if it stays put.
    pub fn update(&mut self, artist: Arc<Artist>) -> CatalogResult<()> {
        let name = artist.name.clone();
        let node = self
            .nodes
            .get_mut(&name)
            .ok_or_else(|| CatalogError::NotFound(format!("artist `{name}`")))?;
        let previous = std::mem::replace(&mut node.artist, artist.clone());
        node.passes_filters = self.filters.matches(&artist);

        if !node.placed {
            // A rebuild has yet to reach it and will not recognise the new data.
            self.place(&name);
            return Ok(());
        }

        self.index.remove(&previous)?;
        self.index.insert(artist.clone());
        let removed = if node.in_view {
            Some(self.visible.remove(&previous)?.0)
        } else {
            None
        };
        node.in_view = node.should_show();
        let inserted = node.in_view.then(|| self.visible.insert(artist));

        match (removed, inserted) {
            (Some(from), Some(to)) if from == to => {
                self.events
                    .emit(&CatalogEvent::RowUpdated(TreePath::group(to)));
            }
            _ => {
                if let Some(from) = removed {
                    self.events
                        .emit(&CatalogEvent::RowRemoved(TreePath::group(from)));
                }
                if let Some(to) = inserted {
                    self.events
                        .emit(&CatalogEvent::RowInserted(TreePath::group(to)));
                }
            }
        }
        Ok(())
    }

    /// Removes every artist and abandons any rebuild in flight.
    pub fn clear(&mut self) {
        self.generation.advance();
        self.rebuild = None;
        self.nodes.clear();
        self.index.drain();
        self.visible.drain();
        self.events.emit(&CatalogEvent::Cleared);
    }

    /// Replaces the artist's placeholder with its albums from `source`, sorted by year
    /// and then name. Without a source the artist ends up with no children. Returns the
    /// number of children; calling it again on an expanded artist does nothing.
    pub fn materialize_children(
        &mut self,
        name: &str,
        source: Option<&dyn ItemSource>,
    ) -> CatalogResult<usize> {
        let Some(node) = self.nodes.get_mut(name) else {
            tracing::error!("Attempted to expand unknown artist `{name}`");
            return Err(CatalogError::UnknownNode(name.into()));
        };
        if let Children::Expanded(items) = &node.children {
            return Ok(items.len());
        }

        let mut albums = source
            .map(|source| source.items_in_group(name))
            .unwrap_or_default();
        let comparator = self.collation.album_comparator();
        albums.sort_by(|a, b| comparator.compare(a, b));
        let count = albums.len();

        node.children = Children::Expanded(
            albums
                .into_iter()
                .map(|album| ItemNode {
                    album,
                    cover: CoverImage::unknown(),
                })
                .collect(),
        );

        let group = node
            .in_view
            .then(|| self.visible.position_of(&node.artist))
            .flatten();
        if let Some(group) = group {
            self.events
                .emit(&CatalogEvent::RowRemoved(TreePath::item(group, 0)));
            for item in 0..count {
                self.events
                    .emit(&CatalogEvent::RowInserted(TreePath::item(group, item)));
            }
        }
        Ok(count)
    }

    /// Shows or hides an artist. Unknown names are ignored.
    pub fn set_visible(&mut self, name: &str, visible: bool) {
        let Some(node) = self.nodes.get_mut(name) else {
            return;
        };
        node.shown = visible;
        refresh_visibility(node, &mut self.visible, &self.events);
    }

    /// Recomputes which artists are shown from the current contents of `source`: an
    /// artist is shown when at least one album in the source belongs to it.
    pub fn on_external_filter_changed(&mut self, source: &dyn ItemSource) {
        let mut populated = HashSet::new();
        source.for_each_item(&mut |album| {
            populated.insert(album.artist.clone());
        });
        self.update_visibility(|node| node.shown = populated.contains(&node.artist.name));
    }

    /// Adds or replaces a named filter, then re-evaluates every artist.
    pub fn replace_filter(&mut self, name: impl Into<String>, predicate: Predicate) {
        self.filters.replace(name, predicate);
        self.reapply_filters();
    }

    pub fn remove_filter(&mut self, name: &str) -> bool {
        let removed = self.filters.remove(name);
        if removed {
            self.reapply_filters();
        }
        removed
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    /// Switches to the sort key named `key` (in ascending order), or keeps the current
    /// one if `key` is `None`; `reverse` then flips the direction. Any rebuild in flight
    /// is cancelled and a new one started from scratch. Expanded artists collapse.
    pub fn sort(&mut self, key: Option<&str>, reverse: bool) -> CatalogResult<()> {
        let mut comparator = match key {
            Some(name) => {
                let sort_key = self.sort_keys.get(name)?;
                let comparator = self.collation.artist_comparator(&sort_key);
                self.sort_key = sort_key;
                comparator
            }
            None => self.index.comparator().clone(),
        };
        if reverse {
            comparator = comparator.reversed();
        }

        let token = self.generation.advance();
        if let Some(rebuild) = self.rebuild.take() {
            tracing::debug!(
                "Cancelling rebuild of generation {} at {:?}",
                rebuild.generation(),
                rebuild.progress()
            );
        }

        let mut pending: Vec<Arc<Artist>> =
            self.nodes.values().map(|node| node.artist.clone()).collect();
        pending.sort_by(|a, b| comparator.compare(a, b));

        self.index.drain();
        self.visible.drain();
        self.index.rebind(comparator.clone());
        self.visible.rebind(comparator);
        for node in self.nodes.values_mut() {
            node.placed = false;
            node.in_view = false;
            node.children = Children::Unexpanded;
        }
        self.events.emit(&CatalogEvent::Cleared);

        tracing::debug!(
            "Rebuilding {} artists by `{}` (generation {})",
            pending.len(),
            self.sort_key.name,
            token.generation()
        );
        self.rebuild = Some(ChunkedLoader::new(pending, self.chunk_size, (), token));
        Ok(())
    }

    /// Places the next chunk of artists for the rebuild started by [`CatalogModel::sort`].
    /// Returns [`Step::Done`] when there is no rebuild to advance.
    pub fn advance_rebuild(&mut self) -> Step {
        let Some(mut rebuild) = self.rebuild.take() else {
            return Step::Done;
        };
        let step = rebuild.advance(&mut RebuildPass { model: self });
        if step == Step::Continue {
            self.rebuild = Some(rebuild);
        }
        step
    }

    /// Drives the current rebuild to its end.
    pub fn finish_rebuild(&mut self) {
        while self.advance_rebuild() == Step::Continue {}
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuild.is_some()
    }

    pub fn rebuild_progress(&self) -> Option<Progress> {
        self.rebuild.as_ref().map(|rebuild| rebuild.progress())
    }

    pub fn sort_key(&self) -> &SortKey {
        &self.sort_key
    }

    pub fn is_reversed(&self) -> bool {
        self.index.comparator().is_reversed()
    }

    /// Swaps in a newly resolved cover for whatever entity `key` addresses. `None`
    /// means the fetch failed and the current cover stays. Returns whether a cover was
    /// replaced.
    pub fn on_cover_updated(&mut self, key: &CacheKey, image: Option<&Arc<CoverImage>>) -> bool {
        let Some(image) = image else {
            return false;
        };

        match key {
            CacheKey::Artist(name) => {
                let Some(node) = self.nodes.get_mut(name) else {
                    return false;
                };
                node.cover = image.clone();
                if let Some(group) = visible_position(node, &self.visible) {
                    self.events
                        .emit(&CatalogEvent::RowUpdated(TreePath::group(group)));
                }
                true
            }
            CacheKey::Album { artist, album } => {
                let Some(node) = self.nodes.get_mut(artist) else {
                    return false;
                };
                let Some(item) = node.child_position(album) else {
                    return false;
                };
                if let Children::Expanded(items) = &mut node.children {
                    items[item].cover = image.clone();
                }
                if let Some(group) = visible_position(node, &self.visible) {
                    self.events
                        .emit(&CatalogEvent::RowUpdated(TreePath::item(group, item)));
                }
                true
            }
        }
    }

    /// Slots a new album into its artist's children if the artist is expanded. Returns
    /// whether the tree changed.
    pub fn item_added(&mut self, album: Arc<Album>) -> bool {
        let Some(node) = self.nodes.get_mut(&album.artist) else {
            return false;
        };
        let Children::Expanded(items) = &mut node.children else {
            return false;
        };
        if items.iter().any(|item| item.album.name == album.name) {
            return false;
        }

        let comparator = self.collation.album_comparator();
        let item = items.partition_point(|existing| {
            comparator.compare(&existing.album, &album) != std::cmp::Ordering::Greater
        });
        items.insert(
            item,
            ItemNode {
                album,
                cover: CoverImage::unknown(),
            },
        );
        if let Some(group) = visible_position(node, &self.visible) {
            self.events
                .emit(&CatalogEvent::RowInserted(TreePath::item(group, item)));
        }
        true
    }

    /// Takes an album out of its artist's children if the artist is expanded. Returns
    /// whether the tree changed.
    pub fn item_removed(&mut self, id: &AlbumId) -> bool {
        let Some(node) = self.nodes.get_mut(&id.artist) else {
            return false;
        };
        let Some(item) = node.child_position(&id.name) else {
            return false;
        };
        if let Children::Expanded(items) = &mut node.children {
            items.remove(item);
        }
        if let Some(group) = visible_position(node, &self.visible) {
            self.events
                .emit(&CatalogEvent::RowRemoved(TreePath::item(group, item)));
        }
        true
    }

    // Lookups

    pub fn get(&self, name: &str) -> Option<&Arc<Artist>> {
        self.nodes.get(name).map(|node| &node.artist)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Number of artists, placed or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Position of the artist among all placed artists.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        let node = self.nodes.get(name)?;
        if !node.placed {
            return None;
        }
        self.index.position_of(&node.artist)
    }

    pub fn artist_at(&self, position: usize) -> Option<&Arc<Artist>> {
        self.index.get(position)
    }

    pub fn raw_len(&self) -> usize {
        self.index.len()
    }

    /// Position of the artist in the filtered tree.
    pub fn filtered_position_of(&self, name: &str) -> Option<usize> {
        visible_position(self.nodes.get(name)?, &self.visible)
    }

    pub fn filtered_artist_at(&self, position: usize) -> Option<&Arc<Artist>> {
        self.visible.get(position)
    }

    pub fn filtered_len(&self) -> usize {
        self.visible.len()
    }

    /// The artists of the filtered tree, in order.
    pub fn filtered(&self) -> impl Iterator<Item = &Arc<Artist>> {
        self.visible.iter()
    }

    pub fn path_of_album(&self, id: &AlbumId) -> Option<TreePath> {
        let node = self.nodes.get(&id.artist)?;
        let item = node.child_position(&id.name)?;
        Some(TreePath::item(visible_position(node, &self.visible)?, item))
    }

    /// The entity at `path` in the filtered tree.
    pub fn entity_at(&self, path: TreePath) -> Option<Entity> {
        let artist = self.visible.get(path.group)?;
        let Some(item) = path.item else {
            return Some(Entity::Artist(artist.clone()));
        };
        match &self.nodes.get(&artist.name)?.children {
            Children::Unexpanded => (item == 0).then_some(Entity::Placeholder),
            Children::Expanded(items) => items
                .get(item)
                .map(|item| Entity::Album(item.album.clone())),
        }
    }

    /// Number of child rows under the filtered artist at `group`, counting the
    /// placeholder of an unexpanded artist.
    pub fn child_count(&self, group: usize) -> usize {
        self.visible
            .get(group)
            .and_then(|artist| self.nodes.get(&artist.name))
            .map_or(0, GroupNode::child_rows)
    }

    pub fn is_expanded(&self, name: &str) -> bool {
        self.nodes
            .get(name)
            .is_some_and(|node| matches!(node.children, Children::Expanded(_)))
    }

    /// The albums of an expanded artist, in display order.
    pub fn children(&self, name: &str) -> Option<Vec<Arc<Album>>> {
        match &self.nodes.get(name)?.children {
            Children::Unexpanded => None,
            Children::Expanded(items) => Some(items.iter().map(|item| item.album.clone()).collect()),
        }
    }

    /// Resolves a cache key back to the entity it decorates. Albums are only found once
    /// their artist has been expanded.
    pub fn lookup(&self, key: &CacheKey) -> Option<Entity> {
        match key {
            CacheKey::Artist(name) => self.get(name).cloned().map(Entity::Artist),
            CacheKey::Album { artist, album } => {
                let Children::Expanded(items) = &self.nodes.get(artist)?.children else {
                    return None;
                };
                items
                    .iter()
                    .find(|item| item.album.name == *album)
                    .map(|item| Entity::Album(item.album.clone()))
            }
        }
    }

    /// The cover currently shown for the row at `path`.
    pub fn cover_at(&self, path: TreePath) -> Option<Arc<CoverImage>> {
        let artist = self.visible.get(path.group)?;
        let node = self.nodes.get(&artist.name)?;
        match (path.item, &node.children) {
            (None, _) => Some(node.cover.clone()),
            (Some(0), Children::Unexpanded) => Some(CoverImage::unknown()),
            (Some(_), Children::Unexpanded) => None,
            (Some(item), Children::Expanded(items)) => {
                items.get(item).map(|item| item.cover.clone())
            }
        }
    }

    pub fn cover_of(&self, name: &str) -> Option<Arc<CoverImage>> {
        self.nodes.get(name).map(|node| node.cover.clone())
    }

    fn place(&mut self, name: &str) {
        let Some(node) = self.nodes.get_mut(name) else {
            return;
        };
        if node.placed {
            return;
        }
        node.placed = true;
        self.index.insert(node.artist.clone());
        refresh_visibility(node, &mut self.visible, &self.events);
    }

    fn reapply_filters(&mut self) {
        let filters = std::mem::take(&mut self.filters);
        self.update_visibility(|node| node.passes_filters = filters.matches(&node.artist));
        self.filters = filters;
    }

    /// Applies `update` to every artist, then brings the filtered projection up to date
    /// in one walk over the raw index. The row events are emitted after the projection
    /// is consistent again, in an order that a view can apply one by one.
    fn update_visibility(&mut self, mut update: impl FnMut(&mut GroupNode)) {
        for node in self.nodes.values_mut() {
            update(node);
        }

        let mut pending = vec![];
        let mut position = 0;
        for artist in &self.index {
            let Some(node) = self.nodes.get_mut(&artist.name) else {
                continue;
            };
            let show = node.should_show();
            match (node.in_view, show) {
                (true, false) => {
                    pending.push(CatalogEvent::RowRemoved(TreePath::group(position)));
                }
                (false, true) => {
                    pending.push(CatalogEvent::RowInserted(TreePath::group(position)));
                    position += 1;
                }
                (true, true) => position += 1,
                (false, false) => {}
            }
            node.in_view = show;
        }

        self.visible.drain();
        self.visible.extend_sorted(
            self.index
                .iter()
                .filter(|artist| self.nodes.get(&artist.name).is_some_and(|node| node.in_view))
                .cloned(),
        );

        for event in &pending {
            self.events.emit(event);
        }
    }
}

fn visible_position(node: &GroupNode, visible: &OrderedIndex<Arc<Artist>>) -> Option<usize> {
    if !node.in_view {
        return None;
    }
    visible.position_of(&node.artist)
}

/// Moves a single artist in or out of the filtered projection to match its flags.
fn refresh_visibility(
    node: &mut GroupNode,
    visible: &mut OrderedIndex<Arc<Artist>>,
    events: &Subscribers<CatalogEvent>,
) {
    let show = node.should_show();
    if show == node.in_view {
        return;
    }
    node.in_view = show;

    if show {
        let position = visible.insert(node.artist.clone());
        events.emit(&CatalogEvent::RowInserted(TreePath::group(position)));
    } else if let Ok((position, _)) = visible.remove(&node.artist) {
        events.emit(&CatalogEvent::RowRemoved(TreePath::group(position)));
    }
}

struct RebuildPass<'a> {
    model: &'a mut CatalogModel,
}
impl ChunkProcessor<Arc<Artist>, ()> for RebuildPass<'_> {
    fn process(&mut self, artist: Arc<Artist>, _state: &mut ()) -> Result<(), String> {
        // The artist may have been removed, or removed and added again, since the
        // rebuild began.
        let current = self
            .model
            .nodes
            .get(&artist.name)
            .is_some_and(|node| Arc::ptr_eq(&node.artist, &artist) && !node.placed);
        if current {
            self.model.place(&artist.name);
        }
        Ok(())
    }

    fn after_chunk(&mut self, _state: &(), progress: Progress) {
        self.model
            .events
            .emit(&CatalogEvent::RebuildProgress(progress.fraction()));
    }

    fn on_finish(&mut self, _state: ()) {
        tracing::debug!("Rebuild finished with {} artists", self.model.index.len());
        self.model.events.emit(&CatalogEvent::RebuildFinished);
    }
}
