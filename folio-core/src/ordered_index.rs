use std::{cmp::Ordering, rc::Rc};

use crate::{CatalogError, CatalogResult};

/// An ordering over `T` that can be flipped without rebuilding the underlying function.
pub struct Comparator<T> {
    compare: Rc<dyn Fn(&T, &T) -> Ordering>,
    reversed: bool,
}
impl<T> Clone for Comparator<T> {
    fn clone(&self) -> Self {
        Self {
            compare: self.compare.clone(),
            reversed: self.reversed,
        }
    }
}
impl<T> Comparator<T> {
    pub fn new(compare: impl Fn(&T, &T) -> Ordering + 'static) -> Self {
        Self {
            compare: Rc::new(compare),
            reversed: false,
        }
    }

    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        let ordering = (self.compare)(a, b);
        if self.reversed {
            ordering.reverse()
        } else {
            ordering
        }
    }

    /// The same ordering, flipped.
    pub fn reversed(&self) -> Self {
        Self {
            compare: self.compare.clone(),
            reversed: !self.reversed,
        }
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }
}
impl<T: Ord + 'static> Comparator<T> {
    pub fn natural() -> Self {
        Self::new(T::cmp)
    }
}

/// A sequence kept sorted by a replaceable [`Comparator`].
///
/// Insertion binary-searches for the slot after any elements that compare equal, so
/// equal elements keep their insertion order. Replacing the comparator with
/// [`OrderedIndex::rebind`] or [`OrderedIndex::reverse`] does not reorder existing
/// elements; the owner is expected to [`OrderedIndex::drain`] and reinsert them.
/// Until that happens, lookups fall back to a linear scan, and the next
/// [`OrderedIndex::insert`] sorts the existing elements first.
pub struct OrderedIndex<T> {
    items: Vec<T>,
    comparator: Comparator<T>,
    sorted: bool,
}
impl<T: PartialEq> OrderedIndex<T> {
    pub fn new(comparator: Comparator<T>) -> Self {
        Self {
            items: vec![],
            comparator,
            sorted: true,
        }
    }

    /// Inserts `item` and returns the position it landed at.
    pub fn insert(&mut self, item: T) -> usize {
        if !self.sorted {
            let comparator = &self.comparator;
            self.items.sort_by(|a, b| comparator.compare(a, b));
            self.sorted = true;
        }
        let position = self
            .items
            .partition_point(|existing| self.comparator.compare(existing, &item) != Ordering::Greater);
        self.items.insert(position, item);
        position
    }

    /// Appends items that are expected to arrive in comparator order. Any item that
    /// would break the order goes through [`OrderedIndex::insert`] instead.
    pub fn extend_sorted(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            let in_order = self
                .items
                .last()
                .is_none_or(|last| self.comparator.compare(last, &item) != Ordering::Greater);
            if in_order && self.sorted {
                self.items.push(item);
            } else {
                self.insert(item);
            }
        }
    }

    /// Removes `item`, returning the position it occupied along with the stored element.
    pub fn remove(&mut self, item: &T) -> CatalogResult<(usize, T)> {
        let position = self
            .position_of(item)
            .ok_or_else(|| CatalogError::NotFound("item is not in the index".to_string()))?;
        Ok((position, self.items.remove(position)))
    }

    pub fn position_of(&self, item: &T) -> Option<usize> {
        if !self.sorted {
            return self.items.iter().position(|existing| existing == item);
        }

        let start = self
            .items
            .partition_point(|existing| self.comparator.compare(existing, item) == Ordering::Less);
        self.items[start..]
            .iter()
            .take_while(|existing| self.comparator.compare(existing, item) == Ordering::Equal)
            .position(|existing| existing == item)
            .map(|offset| start + offset)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.position_of(item).is_some()
    }

    /// Replaces the comparator. Existing elements keep their current order.
    pub fn rebind(&mut self, comparator: Comparator<T>) {
        self.comparator = comparator;
        self.sorted = self.items.len() <= 1;
    }

    /// Flips the direction of the current comparator. Existing elements keep their
    /// current order.
    pub fn reverse(&mut self) {
        self.rebind(self.comparator.reversed());
    }

    pub fn comparator(&self) -> &Comparator<T> {
        &self.comparator
    }

    /// Takes every element out, in current order, leaving the index empty and sorted.
    pub fn drain(&mut self) -> Vec<T> {
        self.sorted = true;
        std::mem::take(&mut self.items)
    }
}
impl<T> OrderedIndex<T> {
    pub fn get(&self, position: usize) -> Option<&T> {
        self.items.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
impl<'a, T> IntoIterator for &'a OrderedIndex<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
