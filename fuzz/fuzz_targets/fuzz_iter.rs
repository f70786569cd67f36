#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate acid_map;

fuzz_target!(|data: Vec<u64>| {
    let mut model = std::collections::BTreeMap::default();

    for item in &data {
        model.insert(*item, *item);
    }

    let model_iter: Vec<_> = model.into_iter().collect();

    let map = acid_map::AcidMap::new();

    for item in &data {
        map.insert(*item, *item);
    }

    let forward: Vec<_> = map.iter().collect();
    assert_eq!(forward, model_iter);

    let mut backward: Vec<_> = map.iter().rev().collect();
    backward.reverse();
    assert_eq!(backward, model_iter);

    let mut walked = Vec::new();
    let mut cur = map.cursor_first();
    while !cur.is_end() {
        walked.push(cur.entry().unwrap());
        cur.move_next();
    }
    assert_eq!(walked, model_iter);
});
