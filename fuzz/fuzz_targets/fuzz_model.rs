#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate acid_map;
extern crate arbitrary;

use arbitrary::Arbitrary;

const KEYSPACE: u64 = 255;

#[derive(Debug)]
enum Op {
    Insert { key: u64, value: u64 },
    Remove { key: u64 },
    Get { key: u64 },
}

impl<'a> Arbitrary<'a> for Op {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(match u.int_in_range(0..=2).unwrap_or(0) {
            0 => Op::Insert {
                key: u.int_in_range(0..=KEYSPACE).unwrap_or(0),
                value: u.int_in_range(0..=KEYSPACE).unwrap_or(0),
            },
            1 => Op::Remove {
                key: u.int_in_range(0..=KEYSPACE).unwrap_or(0),
            },
            _ => Op::Get {
                key: u.int_in_range(0..=KEYSPACE).unwrap_or(0),
            },
        })
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let map = acid_map::AcidMap::new();
    let mut model = std::collections::BTreeMap::new();

    for op in ops {
        match op {
            Op::Insert { key, value } => {
                let (_, inserted) = map.insert(key, value);
                assert_eq!(inserted, !model.contains_key(&key));
                model.entry(key).or_insert(value);
            }
            Op::Remove { key } => {
                assert_eq!(map.remove(&key), model.remove(&key));
            }
            Op::Get { key } => {
                assert_eq!(map.get(&key), model.get(&key).copied());
            }
        };

        assert!(acid_map::verify::verify(&map));
    }

    let expected: Vec<_> = model.into_iter().collect();
    let actual: Vec<_> = map.iter().collect();
    assert_eq!(actual, expected);
});
