#![cfg_attr(
    test,
    deny(
        missing_docs,
        future_incompatible,
        nonstandard_style,
        rust_2018_idioms,
        trivial_casts,
        trivial_numeric_casts,
        unused_qualifications,
    )
)]

//! An ordered map whose positions survive mutation.
//!
//! [`AcidMap`] is a sorted associative container backed by a
//! height-balanced (AVL) search tree. What sets it apart from
//! `BTreeMap` is the [`Cursor`]: a handle to a position in the map that
//! stays valid across arbitrary insertions and removals, including
//! removal of the very entry it points at. A cursor on a removed entry
//! can still read it, and stepping the cursor lands on the neighbor the
//! entry had at the moment it was removed, skipping anything removed
//! since.
//!
//! To make that possible every operation takes `&self`, so cursors and
//! mutations can be interleaved freely on one thread. Lookups return
//! cloned keys and values rather than references, so no borrow of the
//! tree ever escapes to the caller; it can be a good idea to wrap
//! expensive values in `Rc` so that clones stay cheap. The map is a
//! single-threaded structure and is deliberately neither `Send` nor
//! `Sync`.
//!
//! Reads and writes are serialized through an internal
//! [`RefCell`](std::cell::RefCell), so key comparisons and clones must
//! not call back into the same map; doing so panics rather than
//! corrupting the tree.
//!
//! # Examples
//!
//! ```
//! let map = acid_map::AcidMap::new();
//!
//! // insertion never overwrites: the flag reports whether the
//! // entry was actually added
//! let (_, inserted) = map.insert(1, "one");
//! assert!(inserted);
//! let (existing, inserted) = map.insert(1, "uno");
//! assert!(!inserted);
//! assert_eq!(existing.value(), Some("one"));
//!
//! map.insert(2, "two");
//! map.insert(3, "three");
//!
//! // a cursor survives removal of its entry
//! let mut cur = map.find(&2);
//! map.remove(&2);
//! assert_eq!(cur.entry(), Some((2, "two")));
//! cur.move_next();
//! assert_eq!(cur.key(), Some(3));
//! ```

use std::borrow::Borrow;
use std::cell::RefCell;
use std::fmt;

mod cursor;
mod node;
mod tree;
pub mod verify;

#[cfg(feature = "serde")]
mod serde;

pub use cursor::Cursor;

use tree::Tree;

/// An ordered map from keys to values with mutation-stable cursors.
///
/// Keys are kept unique and sorted by their `Ord` implementation; the
/// backing tree is rebalanced on every insertion and removal, so all
/// operations finish in logarithmic time. Lookup methods accept any
/// borrowed form of the key type, exactly like `BTreeMap`.
///
/// See the [crate docs](crate) for the cursor model and the aliasing
/// rules, and [`Cursor`] for what a position handle can do.
pub struct AcidMap<K, V> {
    pub(crate) tree: RefCell<Tree<K, V>>,
}

impl<K, V> AcidMap<K, V> {
    /// Creates an empty map. Nothing is allocated until the first
    /// insertion.
    ///
    /// # Examples
    ///
    /// ```
    /// let map: acid_map::AcidMap<u64, u64> = acid_map::AcidMap::new();
    /// assert!(map.is_empty());
    /// ```
    pub fn new() -> AcidMap<K, V> {
        AcidMap {
            tree: RefCell::new(Tree { root: None, len: 0 }),
        }
    }

    /// The number of entries currently in the map. Entries that were
    /// removed but are still held by cursors do not count.
    pub fn len(&self) -> usize {
        self.tree.borrow().len
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> AcidMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    /// Returns a clone of the value associated with `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::new();
    /// map.insert(1, 10);
    ///
    /// assert_eq!(map.get(&1), Some(10));
    /// assert_eq!(map.get(&2), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let tree = self.tree.borrow();
        let (_, found) = tree.search(key);
        found.map(|n| unsafe { (*n.as_ptr()).value.clone() })
    }

    /// Returns a clone of the entry stored under `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let tree = self.tree.borrow();
        let (_, found) = tree.search(key);
        found.map(|n| unsafe { ((*n.as_ptr()).key.clone(), (*n.as_ptr()).value.clone()) })
    }

    /// Returns `true` if the map contains an entry for `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::new();
    /// map.insert(1, 10);
    ///
    /// assert!(map.contains_key(&1));
    /// assert!(!map.contains_key(&2));
    /// ```
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let tree = self.tree.borrow();
        let (_, found) = tree.search(key);
        found.is_some()
    }

    /// The number of entries matching `key`: either 0 or 1, since the
    /// map never stores two entries with equal keys.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        usize::from(self.contains_key(key))
    }

    /// The smallest entry in the map.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::new();
    /// map.insert(2, "b");
    /// map.insert(1, "a");
    ///
    /// assert_eq!(map.first(), Some((1, "a")));
    /// ```
    pub fn first(&self) -> Option<(K, V)> {
        let tree = self.tree.borrow();
        let n = tree.root.map(|root| unsafe { tree::min_node(root) })?;
        Some(unsafe { ((*n.as_ptr()).key.clone(), (*n.as_ptr()).value.clone()) })
    }

    /// The largest entry in the map.
    pub fn last(&self) -> Option<(K, V)> {
        let tree = self.tree.borrow();
        let n = tree.root.map(|root| unsafe { tree::max_node(root) })?;
        Some(unsafe { ((*n.as_ptr()).key.clone(), (*n.as_ptr()).value.clone()) })
    }

    /// Inserts `key` with `value` unless an entry for the key already
    /// exists. Returns the cursor at the entry, plus `true` when the
    /// insertion happened. On a duplicate the stored value is left
    /// untouched, `value` is dropped, and the cursor points at the
    /// existing entry.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::new();
    ///
    /// let (_, inserted) = map.insert(1, 10);
    /// assert!(inserted);
    ///
    /// let (cur, inserted) = map.insert(1, 11);
    /// assert!(!inserted);
    /// assert_eq!(cur.value(), Some(10));
    /// ```
    pub fn insert(&self, key: K, value: V) -> (Cursor<'_, K, V>, bool) {
        let mut tree = self.tree.borrow_mut();
        let (parent, found) = tree.search(&key);
        if let Some(existing) = found {
            return (Cursor::new(self, Some(existing)), false);
        }
        let new = node::construct(key, value);
        unsafe { tree.attach(parent, new) };
        (Cursor::new(self, Some(new)), true)
    }

    /// Returns the cursor at the entry for `key`, inserting one with
    /// the value produced by `make` if the key is absent. The closure
    /// runs only after the key turns out to be absent, so an expensive
    /// value is not built just to be thrown away.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::new();
    /// map.insert("a", vec![1]);
    ///
    /// // present: the closure is not called
    /// let cur = map.get_or_insert_with("a", || unreachable!());
    /// assert_eq!(cur.value(), Some(vec![1]));
    ///
    /// // absent: the closure builds the value
    /// let cur = map.get_or_insert_with("b", Vec::new);
    /// assert_eq!(cur.value(), Some(vec![]));
    /// ```
    pub fn get_or_insert_with<F>(&self, key: K, make: F) -> Cursor<'_, K, V>
    where
        F: FnOnce() -> V,
    {
        {
            let tree = self.tree.borrow();
            let (_, found) = tree.search(&key);
            if let Some(existing) = found {
                return Cursor::new(self, Some(existing));
            }
        }
        let value = make();
        // the closure ran unborrowed, so look the slot up again in case
        // it inserted this key itself
        let mut tree = self.tree.borrow_mut();
        let (parent, found) = tree.search(&key);
        if let Some(existing) = found {
            return Cursor::new(self, Some(existing));
        }
        let new = node::construct(key, value);
        unsafe { tree.attach(parent, new) };
        Cursor::new(self, Some(new))
    }

    /// Returns the cursor at the entry for `key`, inserting the default
    /// value first if the key is absent.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::<&str, u64>::new();
    ///
    /// assert_eq!(map.get_or_insert_default("hits").set_value(1), Some(0));
    /// assert_eq!(map.get("hits"), Some(1));
    /// assert_eq!(map.get_or_insert_default("misses").value(), Some(0));
    /// ```
    pub fn get_or_insert_default(&self, key: K) -> Cursor<'_, K, V>
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Removes the entry for `key`, returning a clone of its value.
    /// Cursors pointing at the entry keep it readable until they move
    /// away or are dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::new();
    /// map.insert(1, 10);
    ///
    /// assert_eq!(map.remove(&1), Some(10));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut tree = self.tree.borrow_mut();
        let (_, found) = tree.search(key);
        let target = found?;
        let value = unsafe { (*target.as_ptr()).value.clone() };
        unsafe { tree.remove_node(target) };
        Some(value)
    }

    /// Removes the entry under `pos` and returns the cursor at its
    /// in-order successor, or the end cursor when the largest entry was
    /// removed. The successor is captured before the entry is detached.
    /// If the entry under `pos` was already removed, this just steps
    /// the cursor forward; a cursor at the end comes straight back.
    ///
    /// # Panics
    ///
    /// Panics if `pos` belongs to a different map.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::new();
    /// for k in 1..=3 {
    ///     map.insert(k, ());
    /// }
    ///
    /// let cur = map.find(&2);
    /// let next = map.remove_at(cur);
    /// assert_eq!(next.key(), Some(3));
    /// assert_eq!(map.get(&2), None);
    /// ```
    pub fn remove_at<'a>(&'a self, pos: Cursor<'a, K, V>) -> Cursor<'a, K, V> {
        assert!(
            std::ptr::eq(self, pos.map),
            "cursor belongs to a different map"
        );
        let Some(target) = pos.node else {
            return pos;
        };
        if pos.is_removed() {
            let mut stepped = pos;
            stepped.move_next();
            return stepped;
        }
        let mut tree = self.tree.borrow_mut();
        let next = unsafe { tree::successor(target) };
        let succ = Cursor::new(self, next);
        // give the handle's share back before detaching, so an
        // otherwise unobserved entry is freed instead of tombstoned
        drop(pos);
        unsafe { tree.remove_node(target) };
        succ
    }

    /// Returns the cursor at the entry for `key`, or the end cursor
    /// when the key is absent.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::new();
    /// map.insert(1, 10);
    ///
    /// assert_eq!(map.find(&1).value(), Some(10));
    /// assert!(map.find(&2).is_end());
    /// ```
    pub fn find<Q>(&self, key: &Q) -> Cursor<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let found = {
            let tree = self.tree.borrow();
            let (_, found) = tree.search(key);
            found
        };
        Cursor::new(self, found)
    }

    /// The cursor at the smallest entry, or the end cursor for an
    /// empty map.
    pub fn cursor_first(&self) -> Cursor<'_, K, V> {
        let node = {
            let tree = self.tree.borrow();
            tree.root.map(|root| unsafe { tree::min_node(root) })
        };
        Cursor::new(self, node)
    }

    /// The cursor at the largest entry, or the end cursor for an empty
    /// map.
    pub fn cursor_last(&self) -> Cursor<'_, K, V> {
        let node = {
            let tree = self.tree.borrow();
            tree.root.map(|root| unsafe { tree::max_node(root) })
        };
        Cursor::new(self, node)
    }

    /// The cursor past the last entry. All end cursors of a map compare
    /// equal, so this is the sentinel to test against when walking with
    /// [`Cursor::move_next`].
    pub fn end(&self) -> Cursor<'_, K, V> {
        Cursor::new(self, None)
    }

    /// Removes every entry, smallest key first. Cursors held across
    /// the call keep their entries readable and, once stepped, walk
    /// through the removals to the end.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::new();
    /// for k in 1..=3 {
    ///     map.insert(k, ());
    /// }
    ///
    /// let cur = map.find(&2);
    /// map.clear();
    ///
    /// assert!(map.is_empty());
    /// assert_eq!(cur.key(), Some(2));
    /// ```
    pub fn clear(&self) {
        let mut tree = self.tree.borrow_mut();
        unsafe { tree.clear() };
    }

    /// Iterates over clones of the entries in key order. The iterator
    /// is double-ended and is itself backed by cursors, so the map may
    /// be mutated mid-iteration: entries removed after the iterator was
    /// created are skipped once it reaches them, entries inserted
    /// behind its position are not revisited, and no entry is ever
    /// yielded twice, no matter how the two ends and removals
    /// interleave.
    ///
    /// # Examples
    ///
    /// ```
    /// let map = acid_map::AcidMap::new();
    /// for k in [3, 1, 2] {
    ///     map.insert(k, k * 10);
    /// }
    ///
    /// let entries: Vec<_> = map.iter().collect();
    /// assert_eq!(entries, [(1, 10), (2, 20), (3, 30)]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        let front = self.cursor_first();
        let back = self.cursor_last();
        let finished = front.is_end();
        Iter {
            front,
            back,
            finished,
        }
    }
}

impl<K, V> Default for AcidMap<K, V> {
    fn default() -> AcidMap<K, V> {
        AcidMap::new()
    }
}

impl<K, V> fmt::Debug for AcidMap<K, V>
where
    K: Ord + Clone + fmt::Debug,
    V: Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AcidMap ")?;
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> Clone for AcidMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    fn clone(&self) -> AcidMap<K, V> {
        self.iter().collect()
    }
}

impl<K, V> PartialEq for AcidMap<K, V>
where
    K: Ord + Clone,
    V: Clone + PartialEq,
{
    fn eq(&self, other: &AcidMap<K, V>) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K, V> Eq for AcidMap<K, V>
where
    K: Ord + Clone,
    V: Clone + Eq,
{
}

impl<K, V> FromIterator<(K, V)> for AcidMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> AcidMap<K, V> {
        let map = AcidMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<K, V> Extend<(K, V)> for AcidMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V> IntoIterator for &'a AcidMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    type Item = (K, V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

/// An iterator over an [`AcidMap`], yielding cloned entries in key
/// order. Created by [`AcidMap::iter`].
///
/// Both ends are ordinary cursors, so the iterator stays valid if the
/// map is mutated while it is live. Exhaustion is decided by key
/// order rather than node identity: a removal can collapse one end's
/// cursor through tombstone hints right past the other end, so before
/// yielding, each end checks that it has not overtaken the opposite
/// cursor's key. A key handed out by one end is never handed out by
/// the other.
pub struct Iter<'a, K, V> {
    front: Cursor<'a, K, V>,
    back: Cursor<'a, K, V>,
    finished: bool,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        if self.finished {
            return None;
        }
        let Some(entry) = self.front.entry() else {
            self.finished = true;
            return None;
        };
        // the back cursor may have walked past us through removals
        match self.back.key() {
            Some(back_key) if entry.0 <= back_key => {}
            _ => {
                self.finished = true;
                return None;
            }
        }
        if self.front == self.back {
            self.finished = true;
        } else {
            self.front.move_next();
        }
        Some(entry)
    }
}

impl<'a, K, V> DoubleEndedIterator for Iter<'a, K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    fn next_back(&mut self) -> Option<(K, V)> {
        if self.finished {
            return None;
        }
        let Some(entry) = self.back.entry() else {
            self.finished = true;
            return None;
        };
        // the front cursor may have walked past us through removals
        match self.front.key() {
            Some(front_key) if front_key <= entry.0 => {}
            _ => {
                self.finished = true;
                return None;
            }
        }
        if self.front == self.back {
            self.finished = true;
        } else {
            self.back.move_prev();
        }
        Some(entry)
    }
}

#[test]
fn basic_map() {
    let map = AcidMap::default();

    let n = 64_usize;
    for i in 0..=n {
        assert_eq!(map.get(&i), None);
        map.insert(i, i);
        assert_eq!(map.get(&i), Some(i), "failed to get key {i}");
    }

    assert_eq!(map.len(), n + 1);

    for (i, (k, _v)) in map.iter().enumerate() {
        assert_eq!(i, k);
    }

    for (i, (k, _v)) in map.iter().rev().enumerate() {
        assert_eq!(n - i, k);
    }

    assert_eq!(map.first(), Some((0, 0)));
    assert_eq!(map.last(), Some((n, n)));

    for i in 0..=n {
        assert_eq!(map.remove(&i), Some(i));
    }

    assert!(map.is_empty());
    assert_eq!(map.iter().count(), 0);
}
