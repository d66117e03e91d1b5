use std::sync::Arc;

use folio_state::{Album, Artist, CoverImage};
use smol_str::SmolStr;

/// A stable handle to an artist's node. Artists are unique by name, so the name is the
/// handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(pub SmolStr);
impl NodeId {
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// A position in the filtered tree: an artist row, or one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreePath {
    pub group: usize,
    pub item: Option<usize>,
}
impl TreePath {
    pub fn group(group: usize) -> Self {
        Self { group, item: None }
    }

    pub fn item(group: usize, item: usize) -> Self {
        Self {
            group,
            item: Some(item),
        }
    }
}

/// What a row in the tree holds.
#[derive(Debug, Clone)]
pub enum Entity {
    Artist(Arc<Artist>),
    Album(Arc<Album>),
    /// Stands in for the children of an artist that has not been expanded yet.
    Placeholder,
}

pub(crate) enum Children {
    Unexpanded,
    Expanded(Vec<ItemNode>),
}

pub(crate) struct ItemNode {
    pub album: Arc<Album>,
    pub cover: Arc<CoverImage>,
}

pub(crate) struct GroupNode {
    pub artist: Arc<Artist>,
    pub children: Children,
    /// Set through `set_visible` and by the derived has-any-item rule.
    pub shown: bool,
    /// Result of the named filters.
    pub passes_filters: bool,
    /// Whether the artist currently sits in the raw index; false while a rebuild has yet
    /// to reach it.
    pub placed: bool,
    /// Whether the artist currently sits in the filtered projection.
    pub in_view: bool,
    pub cover: Arc<CoverImage>,
}
impl GroupNode {
    pub fn new(artist: Arc<Artist>, passes_filters: bool) -> Self {
        Self {
            artist,
            children: Children::Unexpanded,
            shown: true,
            passes_filters,
            placed: false,
            in_view: false,
            cover: CoverImage::unknown(),
        }
    }

    pub fn should_show(&self) -> bool {
        self.placed && self.shown && self.passes_filters
    }

    /// Rows under this node as the view sees them; an unexpanded node has one, the
    /// placeholder.
    pub fn child_rows(&self) -> usize {
        match &self.children {
            Children::Unexpanded => 1,
            Children::Expanded(items) => items.len(),
        }
    }

    pub fn child_position(&self, album: &str) -> Option<usize> {
        match &self.children {
            Children::Unexpanded => None,
            Children::Expanded(items) => items.iter().position(|item| item.album.name == album),
        }
    }
}
