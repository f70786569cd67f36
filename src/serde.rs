use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::AcidMap;

impl<K, V> Serialize for AcidMap<K, V>
where
    K: Serialize + Ord + Clone,
    V: Serialize + Clone,
{
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // iter() clones entries out, so the serializer never holds a
        // borrow of the tree and the map stays usable mid-serialization
        s.collect_map(self.iter())
    }
}

struct Entries<K, V>(PhantomData<AcidMap<K, V>>);

impl<'de, K, V> Visitor<'de> for Entries<K, V>
where
    K: Deserialize<'de> + Ord + Clone,
    V: Deserialize<'de> + Clone,
{
    type Value = AcidMap<K, V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map with ordered, unique keys")
    }

    fn visit_map<M>(self, mut entries: M) -> Result<AcidMap<K, V>, M::Error>
    where
        M: MapAccess<'de>,
    {
        let map = AcidMap::new();
        // insertion never overwrites, so a repeated key in the input
        // surfaces here instead of silently dropping a value
        while let Some(key) = entries.next_key()? {
            let (_, inserted) = map.insert(key, entries.next_value()?);
            if !inserted {
                return Err(de::Error::custom("duplicate key in map input"));
            }
        }
        Ok(map)
    }
}

impl<'de, K, V> Deserialize<'de> for AcidMap<K, V>
where
    K: Deserialize<'de> + Ord + Clone,
    V: Deserialize<'de> + Clone,
{
    fn deserialize<D>(d: D) -> Result<AcidMap<K, V>, D::Error>
    where
        D: Deserializer<'de>,
    {
        d.deserialize_map(Entries(PhantomData))
    }
}
