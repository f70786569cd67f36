//! Structural checks for the live tree.
//!
//! The test suite (and the fuzz targets) call [`verify`] after batches
//! of mutations to prove the tree still honors every invariant it is
//! supposed to. The checks never mutate the map.

use std::fmt::{self, Write};

use crate::node::{Link, NodePtr};
use crate::AcidMap;

/// Walks the live tree and checks its structural invariants: search
/// order and key uniqueness, parent and child links agreeing on every
/// edge, stored heights matching recomputed ones, the AVL balance
/// bound, and the entry count. A description of every violation is
/// written to `out`. Returns `true` when the tree is sound.
pub fn verify_into<K, V>(map: &AcidMap<K, V>, out: &mut dyn Write) -> bool
where
    K: Ord + fmt::Debug,
{
    let tree = map.tree.borrow();
    let mut check = Checker {
        out,
        ok: true,
        live: 0,
    };
    unsafe {
        if let Some(root) = tree.root {
            if (*root.as_ptr()).parent.is_some() {
                check.fail(format_args!(
                    "root {:?} has a parent link",
                    (*root.as_ptr()).key
                ));
            }
            visit(&mut check, root);
            let mut prev = None;
            in_order(&mut check, root, &mut prev);
        }
        if check.live != tree.len {
            let (len, live) = (tree.len, check.live);
            check.fail(format_args!(
                "len is {} but {} nodes are reachable",
                len, live
            ));
        }
    }
    check.ok
}

/// Like [`verify_into`], but reports violations on stderr.
pub fn verify<K, V>(map: &AcidMap<K, V>) -> bool
where
    K: Ord + fmt::Debug,
{
    let mut report = String::new();
    let ok = verify_into(map, &mut report);
    if !ok {
        eprint!("{report}");
    }
    ok
}

struct Checker<'a> {
    out: &'a mut dyn Write,
    ok: bool,
    live: usize,
}

impl<'a> Checker<'a> {
    fn fail(&mut self, violation: fmt::Arguments<'_>) {
        self.ok = false;
        let _ = writeln!(self.out, "{violation}");
    }
}

unsafe fn visit<K, V>(check: &mut Checker<'_>, node: NodePtr<K, V>)
where
    K: Ord + fmt::Debug,
{
    check.live += 1;

    if (*node.as_ptr()).removed {
        check.fail(format_args!(
            "removed node {:?} is still reachable",
            (*node.as_ptr()).key
        ));
    }

    for child in [(*node.as_ptr()).left, (*node.as_ptr()).right] {
        if let Some(c) = child {
            if (*c.as_ptr()).parent != Some(node) {
                check.fail(format_args!(
                    "node {:?} does not point back at its parent {:?}",
                    (*c.as_ptr()).key,
                    (*node.as_ptr()).key
                ));
            }
        }
    }

    let left_height = deep_height((*node.as_ptr()).left);
    let right_height = deep_height((*node.as_ptr()).right);
    let computed = 1 + left_height.max(right_height);
    if (*node.as_ptr()).height != computed {
        check.fail(format_args!(
            "node {:?} stores height {} but its subtrees give {}",
            (*node.as_ptr()).key,
            (*node.as_ptr()).height,
            computed
        ));
    }

    let balance = left_height - right_height;
    if !(-1..=1).contains(&balance) {
        check.fail(format_args!(
            "node {:?} is out of balance: left height {}, right height {}",
            (*node.as_ptr()).key,
            left_height,
            right_height
        ));
    }

    if let Some(left) = (*node.as_ptr()).left {
        visit(check, left);
    }
    if let Some(right) = (*node.as_ptr()).right {
        visit(check, right);
    }
}

unsafe fn in_order<K, V>(check: &mut Checker<'_>, node: NodePtr<K, V>, prev: &mut Link<K, V>)
where
    K: Ord + fmt::Debug,
{
    if let Some(left) = (*node.as_ptr()).left {
        in_order(check, left, prev);
    }
    if let Some(p) = *prev {
        if (*p.as_ptr()).key >= (*node.as_ptr()).key {
            check.fail(format_args!(
                "keys out of order: {:?} visited before {:?}",
                (*p.as_ptr()).key,
                (*node.as_ptr()).key
            ));
        }
    }
    *prev = Some(node);
    if let Some(right) = (*node.as_ptr()).right {
        in_order(check, right, prev);
    }
}

unsafe fn deep_height<K, V>(link: Link<K, V>) -> i8 {
    match link {
        None => 0,
        Some(n) => 1 + deep_height((*n.as_ptr()).left).max(deep_height((*n.as_ptr()).right)),
    }
}
