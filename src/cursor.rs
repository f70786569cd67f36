use std::fmt;
use std::mem;

use crate::node::{self, Link};
use crate::tree;
use crate::AcidMap;

/// A stable handle to a position in an [`AcidMap`].
///
/// A cursor keeps the entry it points at reachable even when that entry
/// is removed from the map: the entry is detached from the live tree but
/// its storage stays where it is, and the cursor can still read it and
/// step forward or backward to the neighbor the entry had at the moment
/// of removal. Stepping off a removed entry skips over any neighbors
/// that were themselves removed in the meantime, landing on the first
/// entry that is still present, or past the end.
///
/// Cursors borrow the map, so a cursor can never outlive it, and the
/// borrow is shared: any number of cursors can coexist with further
/// insertions and removals.
///
/// # Examples
///
/// ```
/// let map = acid_map::AcidMap::new();
/// for k in 1..=5 {
///     map.insert(k, k * 10);
/// }
///
/// let mut cur = map.find(&3);
/// map.remove(&3);
/// map.remove(&4);
///
/// // the removed entry is still readable through the cursor
/// assert!(cur.is_removed());
/// assert_eq!(cur.entry(), Some((3, 30)));
///
/// // advancing skips the removed neighbor and lands on a live entry
/// cur.move_next();
/// assert_eq!(cur.key(), Some(5));
/// ```
pub struct Cursor<'a, K, V> {
    pub(crate) map: &'a AcidMap<K, V>,
    pub(crate) node: Link<K, V>,
}

impl<'a, K, V> Cursor<'a, K, V> {
    pub(crate) fn new(map: &'a AcidMap<K, V>, node: Link<K, V>) -> Cursor<'a, K, V> {
        if let Some(n) = node {
            unsafe { node::acquire(n) };
        }
        Cursor { map, node }
    }

    /// Returns `true` if the cursor sits past the last entry.
    pub fn is_end(&self) -> bool {
        self.node.is_none()
    }

    /// Returns `true` if the entry this cursor points at has been
    /// removed from the map. The entry stays readable through the
    /// cursor until the cursor moves away or is dropped.
    pub fn is_removed(&self) -> bool {
        match self.node {
            Some(n) => {
                let _tree = self.map.tree.borrow();
                unsafe { (*n.as_ptr()).removed }
            }
            None => false,
        }
    }

    /// The key of the entry under the cursor, or `None` past the end.
    pub fn key(&self) -> Option<K>
    where
        K: Clone,
    {
        let n = self.node?;
        let _tree = self.map.tree.borrow();
        Some(unsafe { (*n.as_ptr()).key.clone() })
    }

    /// The value of the entry under the cursor, or `None` past the end.
    pub fn value(&self) -> Option<V>
    where
        V: Clone,
    {
        let n = self.node?;
        let _tree = self.map.tree.borrow();
        Some(unsafe { (*n.as_ptr()).value.clone() })
    }

    /// The entry under the cursor, or `None` past the end.
    pub fn entry(&self) -> Option<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let n = self.node?;
        let _tree = self.map.tree.borrow();
        unsafe { Some(((*n.as_ptr()).key.clone(), (*n.as_ptr()).value.clone())) }
    }

    /// Replaces the value of the entry under the cursor, returning the
    /// previous one. Returns `None` (and drops `value`) past the end.
    /// Works on removed entries too; the change is visible to every
    /// cursor still holding that entry.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::new();
    /// map.insert("k", 1);
    ///
    /// let cur = map.find("k");
    /// assert_eq!(cur.set_value(2), Some(1));
    /// assert_eq!(map.get("k"), Some(2));
    /// ```
    pub fn set_value(&self, value: V) -> Option<V> {
        let n = self.node?;
        let _tree = self.map.tree.borrow_mut();
        Some(unsafe { mem::replace(&mut (*n.as_ptr()).value, value) })
    }

    /// Steps to the next entry in key order. From a live entry this is
    /// the in-order successor; from a removed entry it is the successor
    /// the entry had when it was removed, skipping neighbors that have
    /// been removed since. Stepping past the largest entry parks the
    /// cursor at the end; stepping from the end does nothing.
    pub fn move_next(&mut self) {
        let Some(current) = self.node else {
            return;
        };
        let target = {
            let _tree = self.map.tree.borrow();
            unsafe {
                let mut next = if (*current.as_ptr()).removed {
                    (*current.as_ptr()).next_hint
                } else {
                    tree::successor(current)
                };
                while let Some(n) = next {
                    if !(*n.as_ptr()).removed {
                        break;
                    }
                    next = (*n.as_ptr()).next_hint;
                }
                next
            }
        };
        // acquire before release: the old node's hint chain may be the
        // only thing keeping the target alive
        if let Some(n) = target {
            unsafe { node::acquire(n) };
        }
        unsafe { node::release(current) };
        self.node = target;
    }

    /// Steps to the previous entry in key order, the mirror of
    /// [`move_next`](Cursor::move_next). Stepping back from the end
    /// lands on the largest entry; stepping back from the smallest
    /// parks the cursor at the end.
    pub fn move_prev(&mut self) {
        let target = {
            let tree = self.map.tree.borrow();
            match self.node {
                Some(current) => unsafe {
                    let mut prev = if (*current.as_ptr()).removed {
                        (*current.as_ptr()).prev_hint
                    } else {
                        tree::predecessor(current)
                    };
                    while let Some(n) = prev {
                        if !(*n.as_ptr()).removed {
                            break;
                        }
                        prev = (*n.as_ptr()).prev_hint;
                    }
                    prev
                },
                None => tree.root.map(|root| unsafe { tree::max_node(root) }),
            }
        };
        if let Some(n) = target {
            unsafe { node::acquire(n) };
        }
        if let Some(current) = self.node {
            unsafe { node::release(current) };
        }
        self.node = target;
    }
}

impl<'a, K, V> Clone for Cursor<'a, K, V> {
    fn clone(&self) -> Cursor<'a, K, V> {
        Cursor::new(self.map, self.node)
    }
}

impl<'a, K, V> Drop for Cursor<'a, K, V> {
    fn drop(&mut self) {
        if let Some(n) = self.node {
            unsafe { node::release(n) };
        }
    }
}

/// Cursors compare equal when they sit on the same entry; all cursors
/// past the end compare equal to each other.
impl<'a, K, V> PartialEq for Cursor<'a, K, V> {
    fn eq(&self, other: &Cursor<'a, K, V>) -> bool {
        self.node == other.node
    }
}

impl<'a, K, V> Eq for Cursor<'a, K, V> {}

impl<'a, K, V> fmt::Debug for Cursor<'a, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("end", &self.is_end())
            .field("removed", &self.is_removed())
            .finish()
    }
}
