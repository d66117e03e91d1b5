use std::collections::BTreeMap;

use folio_state::Artist;

pub type Predicate = Box<dyn Fn(&Artist) -> bool>;

/// Named predicates over artists. An artist passes when every predicate accepts it.
#[derive(Default)]
pub struct FilterState {
    filters: BTreeMap<String, Predicate>,
}
impl FilterState {
    /// Adds `predicate` under `name`, replacing any predicate of the same name.
    pub fn replace(&mut self, name: impl Into<String>, predicate: Predicate) {
        self.filters.insert(name.into(), predicate);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.filters.remove(name).is_some()
    }

    pub fn matches(&self, artist: &Artist) -> bool {
        self.filters.values().all(|predicate| predicate(artist))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
