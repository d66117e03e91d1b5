use std::{collections::HashMap, sync::Arc};

use folio_state::{Album, AlbumId};
use smol_str::SmolStr;

/// The collection the catalog's items are drawn from.
pub trait ItemSource {
    /// Every item whose group key is `group`.
    fn items_in_group(&self, group: &str) -> Vec<Arc<Album>>;

    /// Visits every item currently in the collection.
    fn for_each_item(&self, visit: &mut dyn FnMut(&Arc<Album>));
}

/// An in-memory [`ItemSource`], indexed by artist.
#[derive(Default)]
pub struct AlbumCollection {
    by_artist: HashMap<SmolStr, Vec<Arc<Album>>>,
    len: usize,
}
impl AlbumCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false`, leaving the collection untouched, if an album with the same ID is
    /// already present.
    pub fn insert(&mut self, album: Arc<Album>) -> bool {
        let albums = self.by_artist.entry(album.artist.clone()).or_default();
        if albums.iter().any(|existing| existing.name == album.name) {
            return false;
        }
        albums.push(album);
        self.len += 1;
        true
    }

    pub fn remove(&mut self, id: &AlbumId) -> Option<Arc<Album>> {
        let albums = self.by_artist.get_mut(&id.artist)?;
        let position = albums.iter().position(|album| album.name == id.name)?;
        let album = albums.remove(position);
        if albums.is_empty() {
            self.by_artist.remove(&id.artist);
        }
        self.len -= 1;
        Some(album)
    }

    pub fn get(&self, id: &AlbumId) -> Option<&Arc<Album>> {
        self.by_artist
            .get(&id.artist)?
            .iter()
            .find(|album| album.name == id.name)
    }

    pub fn has_artist(&self, artist: &str) -> bool {
        self.by_artist.contains_key(artist)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.by_artist.clear();
        self.len = 0;
    }
}
impl ItemSource for AlbumCollection {
    fn items_in_group(&self, group: &str) -> Vec<Arc<Album>> {
        self.by_artist.get(group).cloned().unwrap_or_default()
    }

    fn for_each_item(&self, visit: &mut dyn FnMut(&Arc<Album>)) {
        for album in self.by_artist.values().flatten() {
            visit(album);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut albums = AlbumCollection::new();
        assert!(albums.insert(Arc::new(Album::new("Low", "Bowie"))));
        assert!(albums.insert(Arc::new(Album::new("Heroes", "Bowie"))));
        assert!(!albums.insert(Arc::new(Album::new("Low", "Bowie"))));
        assert_eq!(albums.len(), 2);
        assert_eq!(albums.items_in_group("Bowie").len(), 2);
        assert!(albums.items_in_group("Abba").is_empty());

        let low = Album::new("Low", "Bowie").id();
        assert!(albums.remove(&low).is_some());
        assert!(albums.remove(&low).is_none());
        assert!(albums.has_artist("Bowie"));

        albums.remove(&Album::new("Heroes", "Bowie").id());
        assert!(!albums.has_artist("Bowie"));
        assert!(albums.is_empty());
    }
}
