//! The property the crate exists for: cursors keep working across
//! structural mutation, including removal of the entry they sit on.

use acid_map::{verify, AcidMap};

fn filled(n: u64) -> AcidMap<u64, u64> {
    let map = AcidMap::new();
    for k in 1..=n {
        map.insert(k, k * 10);
    }
    map
}

#[test]
fn cursor_survives_removal_of_its_entry() {
    let map = filled(7);

    let mut cur = map.find(&4);
    assert!(!cur.is_removed());
    assert_eq!(cur.entry(), Some((4, 40)));

    assert_eq!(map.remove(&4), Some(40));

    assert!(cur.is_removed());
    assert_eq!(cur.entry(), Some((4, 40)));
    assert_eq!(map.get(&4), None);

    cur.move_next();
    assert_eq!(cur.key(), Some(5));
    assert!(!cur.is_removed());

    assert!(verify::verify(&map));
    assert_eq!(map.len(), 6);
}

#[test]
fn cursor_skips_chains_of_removed_entries() {
    let map = filled(10);

    let mut cur = map.find(&3);
    for k in 3..=6 {
        assert_eq!(map.remove(&k), Some(k * 10));
    }

    assert!(cur.is_removed());
    assert_eq!(cur.entry(), Some((3, 30)));

    cur.move_next();
    assert_eq!(cur.key(), Some(7));

    assert!(verify::verify(&map));
}

#[test]
fn cursor_walks_backward_through_removals() {
    let map = filled(10);

    let mut cur = map.find(&8);
    for k in 5..=8 {
        assert_eq!(map.remove(&k), Some(k * 10));
    }

    assert_eq!(cur.entry(), Some((8, 80)));
    cur.move_prev();
    assert_eq!(cur.key(), Some(4));

    // stepping back from the end lands on the largest live entry
    let mut back = map.end();
    back.move_prev();
    assert_eq!(back.key(), Some(10));
}

#[test]
fn cursor_unaffected_by_surrounding_churn() {
    let map = filled(50);

    let cur = map.find(&25);

    for k in 51..=200 {
        map.insert(k, k * 10);
    }
    for k in 1..=20 {
        map.remove(&k);
    }
    for k in 100..=200 {
        map.remove(&k);
    }

    assert!(!cur.is_removed());
    assert_eq!(cur.entry(), Some((25, 250)));
    assert!(verify::verify(&map));

    let mut cur = cur;
    cur.move_next();
    assert_eq!(cur.key(), Some(26));
}

#[test]
fn advance_lands_on_entries_inserted_after_removal() {
    let map = filled(3);

    let mut cur = map.find(&2);
    map.remove(&2);

    // advancing follows the neighbor captured at removal time, then
    // continues in live key order, picking up later insertions
    map.insert(5, 50);

    cur.move_next();
    assert_eq!(cur.key(), Some(3));
    cur.move_next();
    assert_eq!(cur.key(), Some(5));
    cur.move_next();
    assert!(cur.is_end());
}

#[test]
fn clear_leaves_held_cursors_readable() {
    let map = filled(5);

    let mut cur = map.find(&2);
    let clone = cur.clone();

    map.clear();

    assert!(map.is_empty());
    assert_eq!(map.len(), 0);
    assert!(map.cursor_first() == map.end());
    assert!(verify::verify(&map));

    assert!(cur.is_removed());
    assert_eq!(cur.entry(), Some((2, 20)));
    assert_eq!(clone.entry(), Some((2, 20)));

    cur.move_next();
    assert!(cur.is_end());
    assert_eq!(clone.entry(), Some((2, 20)));
}

#[test]
fn map_reusable_after_clear() {
    let map = filled(16);
    map.clear();

    for k in [4, 2, 6] {
        map.insert(k, k);
    }
    assert_eq!(map.len(), 3);
    assert_eq!(map.iter().map(|(k, _)| k).collect::<Vec<_>>(), [2, 4, 6]);
    assert!(verify::verify(&map));
}

#[test]
fn remove_at_returns_cursor_at_successor() {
    let map = filled(5);

    let cur = map.find(&3);
    let next = map.remove_at(cur);
    assert_eq!(next.key(), Some(4));
    assert_eq!(map.get(&3), None);
    assert_eq!(map.len(), 4);

    // removing the largest entry hands back the end cursor
    let last = map.find(&5);
    let end = map.remove_at(last);
    assert!(end.is_end());

    // a cursor whose entry was already removed just steps forward
    let stale = map.find(&1);
    map.remove(&1);
    let next = map.remove_at(stale);
    assert_eq!(next.key(), Some(2));

    assert!(verify::verify(&map));
}

#[test]
fn draining_with_remove_at_visits_everything() {
    let map = filled(9);

    let mut cur = map.cursor_first();
    let mut seen = Vec::new();
    while !cur.is_end() {
        seen.push(cur.key().unwrap());
        cur = map.remove_at(cur);
    }

    assert_eq!(seen, (1..=9).collect::<Vec<_>>());
    assert!(map.is_empty());
    assert!(verify::verify(&map));
}

#[test]
fn two_cursors_share_one_removed_entry() {
    let map = filled(4);

    let mut a = map.find(&2);
    let b = a.clone();
    assert!(a == b);

    map.remove(&2);

    assert_eq!(a.entry(), Some((2, 20)));
    assert_eq!(b.entry(), Some((2, 20)));

    a.move_next();
    assert_eq!(a.key(), Some(3));
    assert!(a != b);
    assert_eq!(b.entry(), Some((2, 20)));
}

#[test]
fn set_value_is_visible_through_other_handles() {
    let map = filled(3);

    let cur = map.find(&2);
    let other = map.find(&2);

    assert_eq!(cur.set_value(99), Some(20));
    assert_eq!(map.get(&2), Some(99));
    assert_eq!(other.value(), Some(99));

    // values of removed entries stay writable for whoever still holds them
    map.remove(&2);
    assert_eq!(cur.set_value(100), Some(99));
    assert_eq!(other.value(), Some(100));
    assert_eq!(map.get(&2), None);
}

#[test]
fn end_cursors_compare_equal() {
    let map = filled(2);

    assert!(map.end() == map.end());
    assert!(map.find(&99) == map.end());
    assert!(map.find(&1) != map.end());

    let empty: AcidMap<u64, u64> = AcidMap::new();
    assert!(empty.cursor_first() == empty.end());
    assert!(empty.cursor_last().is_end());
}

#[test]
fn alternating_ends_never_repeat_entries() {
    let map = filled(3);

    let mut iter = map.iter();
    assert_eq!(iter.next(), Some((1, 10)));

    // the front cursor is parked on 2; removing 2 and 3 collapses its
    // next step straight past the back cursor
    map.remove(&2);
    map.remove(&3);

    let mut seen = vec![(1, 10)];
    seen.extend(iter.next());
    while let Some(entry) = iter.next_back() {
        seen.push(entry);
    }
    seen.extend(iter.next());

    let mut keys: Vec<u64> = seen.iter().map(|(k, _v)| *k).collect();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), seen.len(), "iterator repeated an entry: {seen:?}");
}

#[test]
fn ends_meet_over_a_removed_middle() {
    let map = filled(6);

    let mut iter = map.iter();
    assert_eq!(iter.next(), Some((1, 10)));
    assert_eq!(iter.next_back(), Some((6, 60)));

    map.remove(&3);
    map.remove(&4);

    assert_eq!(iter.next(), Some((2, 20)));
    assert_eq!(iter.next_back(), Some((5, 50)));
    assert_eq!(iter.next(), None);
    assert_eq!(iter.next_back(), None);
}

#[test]
fn iteration_tolerates_concurrent_removal() {
    let map = filled(6);

    let mut iter = map.iter();
    assert_eq!(iter.next(), Some((1, 10)));

    // the iterator's front cursor sits on 2; removing 2 and 3 makes the
    // next step skip to 4
    map.remove(&2);
    map.remove(&3);

    assert_eq!(iter.next(), Some((2, 20)));
    assert_eq!(iter.next(), Some((4, 40)));
    assert_eq!(iter.next(), Some((5, 50)));
    assert_eq!(iter.next(), Some((6, 60)));
    assert_eq!(iter.next(), None);
}
