#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate acid_map;

// A cursor parked anywhere must keep yielding strictly increasing keys
// no matter which entries are removed underneath it, and must reach the
// end without touching freed memory.
fuzz_target!(|data: (Vec<u16>, Vec<u16>)| {
    let (inserts, removes) = data;

    let map = acid_map::AcidMap::new();
    let mut model = std::collections::BTreeMap::new();

    for k in &inserts {
        map.insert(*k, u64::from(*k));
        model.insert(*k, u64::from(*k));
    }

    let parked: Vec<_> = removes.iter().map(|k| map.find(k)).collect();

    for k in &removes {
        assert_eq!(map.remove(k), model.remove(k));
        assert!(acid_map::verify::verify(&map));
    }

    for cur in parked {
        let mut cur = cur;
        let mut last_key = None;
        while !cur.is_end() {
            let key = cur.key().unwrap();
            if let Some(last) = last_key {
                assert!(key > last, "cursor went backwards: {last} then {key}");
            }
            if !cur.is_removed() {
                assert_eq!(model.get(&key).copied(), cur.value());
            }
            last_key = Some(key);
            cur.move_next();
        }
    }

    let expected: Vec<_> = model.into_iter().collect();
    let actual: Vec<_> = map.iter().collect();
    assert_eq!(actual, expected);
});
