use std::cell::Cell;
use std::ptr::NonNull;

pub(crate) type NodePtr<K, V> = NonNull<Node<K, V>>;
pub(crate) type Link<K, V> = Option<NodePtr<K, V>>;

/// A tree node. Its lifetime is governed by a per-node share count:
/// the live tree holds one share, every cursor pointing at the node
/// holds one, and every removal hint targeting the node holds one.
/// Storage is freed when the count reaches zero, which can only happen
/// after the node has been unlinked from the live tree.
pub(crate) struct Node<K, V> {
    pub(crate) left: Link<K, V>,
    pub(crate) right: Link<K, V>,
    pub(crate) parent: Link<K, V>,
    pub(crate) height: i8,
    pub(crate) shares: Cell<u32>,
    pub(crate) removed: bool,
    /// In-order neighbors captured at the moment of removal, each owning
    /// a share of its target. `None` until the node is removed while a
    /// cursor is still watching it.
    pub(crate) next_hint: Link<K, V>,
    pub(crate) prev_hint: Link<K, V>,
    pub(crate) key: K,
    pub(crate) value: V,
}

/// Allocates a fresh leaf holding the tree's share.
pub(crate) fn construct<K, V>(key: K, value: V) -> NodePtr<K, V> {
    let node = Box::new(Node {
        left: None,
        right: None,
        parent: None,
        height: 1,
        shares: Cell::new(1),
        removed: false,
        next_hint: None,
        prev_hint: None,
        key,
        value,
    });
    NonNull::new(Box::into_raw(node)).unwrap()
}

pub(crate) unsafe fn acquire<K, V>(node: NodePtr<K, V>) {
    let shares = &(*node.as_ptr()).shares;
    shares.set(shares.get() + 1);
}

/// Drops one share of `node`, freeing it if that was the last one.
/// Freeing a node releases the shares held by its removal hints, so the
/// unwinding is iterative: a cursor abandoned after a large `clear` can
/// be the last holder of an arbitrarily long hint chain.
pub(crate) unsafe fn release<K, V>(node: NodePtr<K, V>) {
    let Some(freed) = decrement(node) else {
        return;
    };
    let mut queue: Vec<NodePtr<K, V>> = Vec::new();
    queue.extend(freed.next_hint);
    queue.extend(freed.prev_hint);
    drop(freed);
    while let Some(target) = queue.pop() {
        if let Some(freed) = decrement(target) {
            queue.extend(freed.next_hint);
            queue.extend(freed.prev_hint);
        }
    }
}

unsafe fn decrement<K, V>(node: NodePtr<K, V>) -> Option<Box<Node<K, V>>> {
    let shares = &(*node.as_ptr()).shares;
    let remaining = shares.get() - 1;
    shares.set(remaining);
    if remaining > 0 {
        return None;
    }
    let node = Box::from_raw(node.as_ptr());
    debug_assert!(node.removed, "freed a node still owned by the tree");
    Some(node)
}
