use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Rc<RefCell<dyn FnMut(&E)>>;
type Entries<E> = Rc<RefCell<Vec<Entry<E>>>>;

struct Entry<E> {
    id: SubscriptionId,
    /// Cleared on unsubscribe, so a dispatch holding a copy of the list can skip it.
    alive: Rc<Cell<bool>>,
    callback: Callback<E>,
}
impl<E> Clone for Entry<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            alive: self.alive.clone(),
            callback: self.callback.clone(),
        }
    }
}

fn remove_entry<E>(entries: &RefCell<Vec<Entry<E>>>, id: SubscriptionId) -> bool {
    let mut entries = entries.borrow_mut();
    let Some(position) = entries.iter().position(|entry| entry.id == id) else {
        return false;
    };
    entries.remove(position).alive.set(false);
    true
}

/// A list of callbacks interested in events of type `E`.
///
/// Callbacks run synchronously, in registration order, on the emitting thread. The list
/// is copied before dispatch, so a callback may subscribe or unsubscribe (through an
/// [`Unsubscriber`]) without disturbing the dispatch in progress: anything it removes is
/// skipped, anything it adds first hears about the next event.
pub struct Subscribers<E> {
    next_id: Cell<u64>,
    entries: Entries<E>,
}
impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self {
            next_id: Cell::new(0),
            entries: Rc::new(RefCell::new(Vec::new())),
        }
    }
}
impl<E> Subscribers<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl FnMut(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.entries.borrow_mut().push(Entry {
            id,
            alive: Rc::new(Cell::new(true)),
            callback: Rc::new(RefCell::new(callback)),
        });
        id
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        remove_entry(&self.entries, id)
    }

    /// A handle that lets a callback remove subscriptions without owning the list.
    pub fn unsubscriber(&self) -> Unsubscriber<E> {
        Unsubscriber {
            entries: Rc::downgrade(&self.entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<_> = self.entries.borrow().clone();
        for entry in snapshot {
            if !entry.alive.get() {
                continue;
            }
            // A callback that triggers an emission which reaches itself is not re-entered.
            let Ok(mut callback) = entry.callback.try_borrow_mut() else {
                tracing::debug!("Skipping re-entrant dispatch to subscriber {:?}", entry.id);
                continue;
            };
            callback(event);
        }
    }
}

pub struct Unsubscriber<E> {
    entries: Weak<RefCell<Vec<Entry<E>>>>,
}
impl<E> Unsubscriber<E> {
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some(entries) = self.entries.upgrade() else {
            return false;
        };
        remove_entry(&entries, id)
    }
}
