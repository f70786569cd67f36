use std::borrow::Borrow;
use std::cmp::Ordering;

use crate::node::{self, Link, NodePtr};

/// The AVL tree skeleton: a root link plus a count of live entries.
///
/// Structure is kept with raw parent and child links. Every method that
/// touches them is unsafe and relies on the map facade serializing
/// access through its `RefCell`; nothing here runs user code except key
/// comparisons during `search`.
pub(crate) struct Tree<K, V> {
    pub(crate) root: Link<K, V>,
    pub(crate) len: usize,
}

impl<K: Ord, V> Tree<K, V> {
    /// Descends from the root comparing keys. Returns the last node
    /// visited before the final step (the parent a new node would hang
    /// off) and the matching node, if any. An insertion can splice a
    /// node under the returned parent without repeating the descent.
    pub(crate) fn search<Q>(&self, key: &Q) -> (Link<K, V>, Link<K, V>)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut parent = None;
        let mut current = self.root;
        unsafe {
            while let Some(n) = current {
                match key.cmp((*n.as_ptr()).key.borrow()) {
                    Ordering::Equal => break,
                    Ordering::Less => {
                        parent = current;
                        current = (*n.as_ptr()).left;
                    }
                    Ordering::Greater => {
                        parent = current;
                        current = (*n.as_ptr()).right;
                    }
                }
            }
        }
        (parent, current)
    }

    /// Links a freshly constructed node under `parent` (as returned by
    /// `search` for the node's key) and restores balance along the path
    /// back to the root.
    pub(crate) unsafe fn attach(&mut self, parent: Link<K, V>, new: NodePtr<K, V>) {
        self.len += 1;
        let Some(p) = parent else {
            debug_assert!(self.root.is_none());
            self.root = Some(new);
            return;
        };
        (*new.as_ptr()).parent = Some(p);
        if (*new.as_ptr()).key < (*p.as_ptr()).key {
            (*p.as_ptr()).left = Some(new);
        } else {
            (*p.as_ptr()).right = Some(new);
        }
        self.rebalance_upward(Some(p));
    }

    /// Unlinks `target` from the live tree and hands its storage over to
    /// the share count. If anyone besides the tree is holding the node,
    /// its in-order neighbors are captured first so the node stays
    /// navigable; otherwise it is freed on the spot.
    pub(crate) unsafe fn remove_node(&mut self, target: NodePtr<K, V>) {
        if (*target.as_ptr()).shares.get() > 1 {
            let next = successor(target);
            let prev = predecessor(target);
            if let Some(n) = next {
                node::acquire(n);
            }
            if let Some(p) = prev {
                node::acquire(p);
            }
            (*target.as_ptr()).next_hint = next;
            (*target.as_ptr()).prev_hint = prev;
        }
        self.detach(target);
        (*target.as_ptr()).removed = true;
        node::release(target);
    }

    /// Classical BST deletion: splice out a node with at most one child,
    /// or promote the in-order successor into the slot of a node with
    /// two. The detached node's own links are left exactly as they were,
    /// so they describe the tree at the moment of removal.
    unsafe fn detach(&mut self, target: NodePtr<K, V>) {
        let parent = (*target.as_ptr()).parent;
        let left = (*target.as_ptr()).left;
        let right = (*target.as_ptr()).right;
        let replacement;
        let rebalance_from;

        if left.is_none() || right.is_none() {
            replacement = left.or(right);
            if let Some(r) = replacement {
                (*r.as_ptr()).parent = parent;
            }
            replace_child(parent, target, replacement);
            rebalance_from = parent;
        } else {
            let promoted = min_node(right.unwrap());
            let promoted_parent = (*promoted.as_ptr()).parent;
            (*promoted.as_ptr()).left = left;
            (*left.unwrap().as_ptr()).parent = Some(promoted);
            replace_child(parent, target, Some(promoted));
            if right == Some(promoted) {
                rebalance_from = Some(promoted);
            } else {
                let orphan = (*promoted.as_ptr()).right;
                if let Some(o) = orphan {
                    (*o.as_ptr()).parent = promoted_parent;
                }
                (*promoted_parent.unwrap().as_ptr()).left = orphan;
                (*promoted.as_ptr()).right = right;
                (*right.unwrap().as_ptr()).parent = Some(promoted);
                rebalance_from = promoted_parent;
            }
            (*promoted.as_ptr()).parent = parent;
            replacement = Some(promoted);
        }

        if self.root == Some(target) {
            self.root = replacement;
        }
        self.len -= 1;
        self.rebalance_upward(rebalance_from);
    }

    /// Removes every live entry, smallest key first, through the same
    /// path ordinary removal takes. Entries watched by a cursor become
    /// tombstones instead of being freed.
    pub(crate) unsafe fn clear(&mut self) {
        let mut current = self.root.map(|root| min_node(root));
        while let Some(n) = current {
            current = successor(n);
            self.remove_node(n);
        }
        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len, 0);
    }

    /// Walks from `start` to the root, restoring heights and the AVL
    /// balance bound at every step. Each rebalanced subtree is hooked
    /// back into whichever side of its parent it occupied before.
    unsafe fn rebalance_upward(&mut self, start: Link<K, V>) {
        let mut current = start;
        while let Some(n) = current {
            match (*n.as_ptr()).parent {
                Some(p) => {
                    let was_left = (*p.as_ptr()).left == Some(n);
                    let subtree = rebalance_subtree(n);
                    if was_left {
                        (*p.as_ptr()).left = Some(subtree);
                    } else {
                        (*p.as_ptr()).right = Some(subtree);
                    }
                    current = Some(p);
                }
                None => {
                    self.root = Some(rebalance_subtree(n));
                    return;
                }
            }
        }
    }
}

unsafe fn replace_child<K, V>(parent: Link<K, V>, old: NodePtr<K, V>, new: Link<K, V>) {
    let Some(p) = parent else {
        return;
    };
    if (*p.as_ptr()).left == Some(old) {
        (*p.as_ptr()).left = new;
    } else {
        (*p.as_ptr()).right = new;
    }
}

unsafe fn rebalance_subtree<K, V>(mut node: NodePtr<K, V>) -> NodePtr<K, V> {
    let balance = balance_factor(node);
    if balance == 2 {
        let left = (*node.as_ptr()).left.unwrap();
        if balance_factor(left) == -1 {
            (*node.as_ptr()).left = Some(rotate_left(left));
        }
        node = rotate_right(node);
    } else if balance == -2 {
        let right = (*node.as_ptr()).right.unwrap();
        if balance_factor(right) == 1 {
            (*node.as_ptr()).right = Some(rotate_right(right));
        }
        node = rotate_left(node);
    }
    update_height(node);
    node
}

unsafe fn rotate_left<K, V>(node: NodePtr<K, V>) -> NodePtr<K, V> {
    let pivot = (*node.as_ptr()).right.unwrap();
    (*node.as_ptr()).right = (*pivot.as_ptr()).left;
    if let Some(moved) = (*pivot.as_ptr()).left {
        (*moved.as_ptr()).parent = Some(node);
    }
    (*pivot.as_ptr()).left = Some(node);
    (*pivot.as_ptr()).parent = (*node.as_ptr()).parent;
    (*node.as_ptr()).parent = Some(pivot);
    update_height(node);
    update_height(pivot);
    pivot
}

unsafe fn rotate_right<K, V>(node: NodePtr<K, V>) -> NodePtr<K, V> {
    let pivot = (*node.as_ptr()).left.unwrap();
    (*node.as_ptr()).left = (*pivot.as_ptr()).right;
    if let Some(moved) = (*pivot.as_ptr()).right {
        (*moved.as_ptr()).parent = Some(node);
    }
    (*pivot.as_ptr()).right = Some(node);
    (*pivot.as_ptr()).parent = (*node.as_ptr()).parent;
    (*node.as_ptr()).parent = Some(pivot);
    update_height(node);
    update_height(pivot);
    pivot
}

unsafe fn height<K, V>(link: Link<K, V>) -> i8 {
    link.map_or(0, |n| (*n.as_ptr()).height)
}

unsafe fn update_height<K, V>(node: NodePtr<K, V>) {
    let left = height((*node.as_ptr()).left);
    let right = height((*node.as_ptr()).right);
    (*node.as_ptr()).height = 1 + left.max(right);
}

unsafe fn balance_factor<K, V>(node: NodePtr<K, V>) -> i8 {
    height((*node.as_ptr()).left) - height((*node.as_ptr()).right)
}

pub(crate) unsafe fn min_node<K, V>(mut node: NodePtr<K, V>) -> NodePtr<K, V> {
    while let Some(left) = (*node.as_ptr()).left {
        node = left;
    }
    node
}

pub(crate) unsafe fn max_node<K, V>(mut node: NodePtr<K, V>) -> NodePtr<K, V> {
    while let Some(right) = (*node.as_ptr()).right {
        node = right;
    }
    node
}

/// The in-order successor of a live node: the minimum of the right
/// subtree when there is one, otherwise the nearest ancestor reached
/// from a left child.
pub(crate) unsafe fn successor<K, V>(node: NodePtr<K, V>) -> Link<K, V> {
    if let Some(right) = (*node.as_ptr()).right {
        return Some(min_node(right));
    }
    let mut current = node;
    while let Some(parent) = (*current.as_ptr()).parent {
        if (*parent.as_ptr()).left == Some(current) {
            return Some(parent);
        }
        current = parent;
    }
    None
}

pub(crate) unsafe fn predecessor<K, V>(node: NodePtr<K, V>) -> Link<K, V> {
    if let Some(left) = (*node.as_ptr()).left {
        return Some(max_node(left));
    }
    let mut current = node;
    while let Some(parent) = (*current.as_ptr()).parent {
        if (*parent.as_ptr()).right == Some(current) {
            return Some(parent);
        }
        current = parent;
    }
    None
}

impl<K, V> Drop for Tree<K, V> {
    fn drop(&mut self) {
        // Cursors borrow the map, so by the time the tree drops only
        // live nodes remain, each holding exactly the tree's share.
        unsafe fn drop_subtree<K, V>(node: NodePtr<K, V>) {
            let node = Box::from_raw(node.as_ptr());
            debug_assert_eq!(node.shares.get(), 1);
            if let Some(left) = node.left {
                drop_subtree(left);
            }
            if let Some(right) = node.right {
                drop_subtree(right);
            }
        }
        if let Some(root) = self.root.take() {
            unsafe { drop_subtree(root) }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::node::Link;
    use crate::verify;
    use crate::AcidMap;

    fn key_of<K: Clone, V>(link: Link<K, V>) -> Option<K> {
        link.map(|n| unsafe { (*n.as_ptr()).key.clone() })
    }

    fn root_shape(map: &AcidMap<i32, ()>) -> (i32, Option<i32>, Option<i32>, i8) {
        let tree = map.tree.borrow();
        let root = tree.root.unwrap();
        unsafe {
            (
                (*root.as_ptr()).key,
                key_of((*root.as_ptr()).left),
                key_of((*root.as_ptr()).right),
                (*root.as_ptr()).height,
            )
        }
    }

    #[test]
    fn balanced_batch_keeps_its_natural_shape() {
        let map = AcidMap::new();
        for k in [5, 3, 8, 1, 4, 7, 9] {
            map.insert(k, ());
        }
        let keys: Vec<i32> = map.iter().map(|(k, ())| k).collect();
        assert_eq!(keys, [1, 3, 4, 5, 7, 8, 9]);
        let (root, _, _, height) = root_shape(&map);
        assert_eq!(root, 5);
        assert_eq!(height, 3);
        assert!(verify::verify(&map));
    }

    #[test]
    fn left_rotation_at_root() {
        let map = AcidMap::new();
        for k in [1, 2, 3] {
            map.insert(k, ());
        }
        assert_eq!(root_shape(&map), (2, Some(1), Some(3), 2));
        assert!(verify::verify(&map));
    }

    #[test]
    fn right_rotation_at_root() {
        let map = AcidMap::new();
        for k in [3, 2, 1] {
            map.insert(k, ());
        }
        assert_eq!(root_shape(&map), (2, Some(1), Some(3), 2));
        assert!(verify::verify(&map));
    }

    #[test]
    fn left_right_rotation_at_root() {
        let map = AcidMap::new();
        for k in [3, 1, 2] {
            map.insert(k, ());
        }
        assert_eq!(root_shape(&map), (2, Some(1), Some(3), 2));
        assert!(verify::verify(&map));
    }

    #[test]
    fn right_left_rotation_at_root() {
        let map = AcidMap::new();
        for k in [1, 3, 2] {
            map.insert(k, ());
        }
        assert_eq!(root_shape(&map), (2, Some(1), Some(3), 2));
        assert!(verify::verify(&map));
    }

    #[test]
    fn descending_insert_stays_balanced() {
        let map = AcidMap::new();
        for k in (1..=10).rev() {
            map.insert(k, ());
        }
        let keys: Vec<i32> = map.iter().map(|(k, ())| k).collect();
        assert_eq!(keys, (1..=10).collect::<Vec<_>>());
        let (_, _, _, height) = root_shape(&map);
        assert!(height <= 5, "tree of 10 grew to height {height}");
        assert!(verify::verify(&map));
    }

    #[test]
    fn removal_rebalances_every_shape() {
        let map = AcidMap::new();
        for k in 1..=32 {
            map.insert(k, ());
        }
        for k in 1..=32 {
            assert_eq!(map.remove(&k), Some(()));
            assert!(verify::verify(&map), "invalid after removing {k}");
        }
        assert!(map.is_empty());
    }

    #[test]
    fn removal_of_inner_nodes_promotes_successors() {
        let map = AcidMap::new();
        for k in [8, 4, 12, 2, 6, 10, 14, 1, 3, 5, 7, 9, 11, 13, 15] {
            map.insert(k, ());
        }
        // both two-child cases: 14's successor is its own right child,
        // 8's successor sits at the bottom of its right subtree
        assert_eq!(map.remove(&14), Some(()));
        assert!(verify::verify(&map));
        assert_eq!(map.remove(&8), Some(()));
        assert!(verify::verify(&map));
        let keys: Vec<i32> = map.iter().map(|(k, ())| k).collect();
        assert_eq!(keys, [1, 2, 3, 4, 5, 6, 7, 9, 10, 11, 12, 13, 15]);
    }
}
