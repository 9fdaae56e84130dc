//! Local list state updated ahead of server confirmation.
//!
//! Every [`Patch`] applied to an [`OptimisticList`] yields a [`Compensation`]
//! that restores the previous state if the server rejects the change.

use std::fmt;
use std::sync::Mutex;

use tracing::debug;

use crate::domain::posts::{PostKey, PostView};
use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::optimistic";

pub trait Keyed {
    type Key: Clone + PartialEq + fmt::Debug + fmt::Display + Send;

    fn key(&self) -> Self::Key;
}

impl Keyed for PostView {
    type Key = PostKey;

    fn key(&self) -> PostKey {
        self.key
    }
}

#[derive(Debug, Clone)]
pub enum Patch<T: Keyed> {
    /// Replace the item with the same key, or prepend it when absent.
    Upsert(T),
    Remove(T::Key),
}

/// Inverse of an applied [`Patch`].
#[derive(Debug, Clone)]
#[must_use = "a compensation must be reverted or dropped explicitly"]
pub enum Compensation<T: Keyed> {
    Noop,
    /// Undo an insert.
    Remove(T::Key),
    /// Put `item` back at `index`, replacing whatever now holds its key.
    Restore { index: usize, item: T },
}

impl<T: Keyed + Clone> Compensation<T> {
    pub fn revert(self, list: &OptimisticList<T>) {
        list.revert(self);
    }
}

pub struct OptimisticList<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for OptimisticList<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Keyed + Clone> OptimisticList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }

    pub fn snapshot(&self) -> Vec<T> {
        mutex_lock(&self.items, SOURCE, "optimistic.snapshot").clone()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.items, SOURCE, "optimistic.len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &T::Key) -> Option<T> {
        mutex_lock(&self.items, SOURCE, "optimistic.get")
            .iter()
            .find(|item| item.key() == *key)
            .cloned()
    }

    /// Swap in the authoritative list from the server.
    pub fn replace_all(&self, items: Vec<T>) {
        *mutex_lock(&self.items, SOURCE, "optimistic.replace_all") = items;
    }

    pub fn apply(&self, patch: Patch<T>) -> Compensation<T> {
        let mut items = mutex_lock(&self.items, SOURCE, "optimistic.apply");
        match patch {
            Patch::Upsert(item) => {
                let key = item.key();
                match items.iter().position(|existing| existing.key() == key) {
                    Some(index) => {
                        let previous = std::mem::replace(&mut items[index], item);
                        debug!(target = SOURCE, key = %key, index, "optimistic replace");
                        Compensation::Restore {
                            index,
                            item: previous,
                        }
                    }
                    None => {
                        items.insert(0, item);
                        debug!(target = SOURCE, key = %key, "optimistic insert");
                        Compensation::Remove(key)
                    }
                }
            }
            Patch::Remove(key) => match items.iter().position(|item| item.key() == key) {
                Some(index) => {
                    let item = items.remove(index);
                    debug!(target = SOURCE, key = %key, index, "optimistic remove");
                    Compensation::Restore { index, item }
                }
                None => Compensation::Noop,
            },
        }
    }

    pub fn revert(&self, compensation: Compensation<T>) {
        let mut items = mutex_lock(&self.items, SOURCE, "optimistic.revert");
        match compensation {
            Compensation::Noop => {}
            Compensation::Remove(key) => {
                items.retain(|item| item.key() != key);
                debug!(target = SOURCE, key = %key, "reverted optimistic insert");
            }
            Compensation::Restore { index, item } => {
                let key = item.key();
                items.retain(|existing| existing.key() != key);
                let index = index.min(items.len());
                items.insert(index, item);
                debug!(target = SOURCE, key = %key, index, "restored optimistic snapshot");
            }
        }
    }

    /// Replace the entry stored under `key` (typically a temporary key) with
    /// the confirmed item. Returns `false` when the key is no longer present.
    pub fn reconcile(&self, key: &T::Key, confirmed: T) -> bool {
        let mut items = mutex_lock(&self.items, SOURCE, "optimistic.reconcile");
        match items.iter().position(|item| item.key() == *key) {
            Some(index) => {
                items[index] = confirmed;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u32,
        label: &'static str,
    }

    impl Keyed for Item {
        type Key = u32;

        fn key(&self) -> u32 {
            self.id
        }
    }

    fn item(id: u32, label: &'static str) -> Item {
        Item { id, label }
    }

    fn list() -> OptimisticList<Item> {
        OptimisticList::from_items(vec![item(1, "a"), item(2, "b"), item(3, "c")])
    }

    fn ids(list: &OptimisticList<Item>) -> Vec<u32> {
        list.snapshot().iter().map(|item| item.id).collect()
    }

    #[test]
    fn insert_is_visible_then_reverted() {
        let list = list();
        let compensation = list.apply(Patch::Upsert(item(9, "new")));
        assert_eq!(ids(&list), [9, 1, 2, 3]);

        compensation.revert(&list);
        assert_eq!(ids(&list), [1, 2, 3]);
    }

    #[test]
    fn replace_restores_previous_value() {
        let list = list();
        let compensation = list.apply(Patch::Upsert(item(2, "edited")));
        assert_eq!(list.get(&2).map(|i| i.label), Some("edited"));

        compensation.revert(&list);
        assert_eq!(list.get(&2).map(|i| i.label), Some("b"));
        assert_eq!(ids(&list), [1, 2, 3]);
    }

    #[test]
    fn failed_remove_restores_original_position() {
        let list = list();
        let compensation = list.apply(Patch::Remove(2));
        assert_eq!(ids(&list), [1, 3]);

        list.revert(compensation);
        assert_eq!(ids(&list), [1, 2, 3]);
    }

    #[test]
    fn removing_unknown_key_is_noop() {
        let list = list();
        let compensation = list.apply(Patch::Remove(42));
        assert!(matches!(compensation, Compensation::Noop));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn reconcile_swaps_temporary_entry() {
        let list = list();
        let _ = list.apply(Patch::Upsert(item(100, "temp")));

        assert!(list.reconcile(&100, item(4, "saved")));
        assert_eq!(ids(&list), [4, 1, 2, 3]);
        assert!(!list.reconcile(&100, item(5, "late")));
    }
}
