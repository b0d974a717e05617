//! Slot arenas owning every node of a module.
//!
//! Slots are never reused. Destroying a node tombstones its slot, so a stale
//! handle can never alias a newer node and every access through it panics.
//! Because indices only grow, handle order is creation order.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A typed handle into an [`Arena`].
pub struct Handle<T> {
    index: u32,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl<T> Handle<T> {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            _phantom: PhantomData,
        }
    }

    /// Returns the zero-based creation index of this handle.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// An append-only arena whose slots can be tombstoned.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    live: usize,
    what: &'static str,
}

impl<T> Arena<T> {
    /// Creates an empty arena. `what` names the node kind in panic messages.
    pub fn new(what: &'static str) -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            what,
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Appends a node and returns its handle.
    pub fn alloc(&mut self, value: T) -> Handle<T> {
        let index = u32::try_from(self.slots.len()).unwrap_or_else(|_| {
            panic!("{} arena overflow: {} slots exceeds u32::MAX", self.what, self.slots.len())
        });
        self.slots.push(Some(value));
        self.live += 1;
        Handle::new(index)
    }

    pub fn is_alive(&self, handle: Handle<T>) -> bool {
        matches!(self.slots.get(handle.index()), Some(Some(_)))
    }

    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.slots.get(handle.index()).and_then(Option::as_ref)
    }

    /// Returns the node, panicking if it was destroyed.
    pub fn get(&self, handle: Handle<T>) -> &T {
        match self.slots.get(handle.index()) {
            Some(Some(value)) => value,
            Some(None) => panic!("use of destroyed {} {:?}", self.what, handle),
            None => panic!("{} handle {:?} does not belong to this module", self.what, handle),
        }
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> &mut T {
        let what = self.what;
        match self.slots.get_mut(handle.index()) {
            Some(Some(value)) => value,
            Some(None) => panic!("use of destroyed {} {:?}", what, handle),
            None => panic!("{} handle {:?} does not belong to this module", what, handle),
        }
    }

    /// Tombstones the slot and returns the node it held.
    pub fn free(&mut self, handle: Handle<T>) -> T {
        let what = self.what;
        let slot = match self.slots.get_mut(handle.index()) {
            Some(slot) => slot,
            None => panic!("{} handle {:?} does not belong to this module", what, handle),
        };
        match slot.take() {
            Some(value) => {
                self.live -= 1;
                value
            }
            None => panic!("{} {:?} destroyed twice", what, handle),
        }
    }

    /// Iterates over live `(handle, &node)` pairs in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (Handle::new(i as u32), v)))
    }
}
