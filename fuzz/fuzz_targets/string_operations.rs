#![no_main]
use libfuzzer_sys::fuzz_target;
use mapped_btree_store::BtreeIndex;
use std::collections::BTreeMap;

fn check<const ORDER: usize>(operations: Vec<(String, Option<String>)>) {
    let mut m: BTreeMap<String, String> = BTreeMap::default();
    let mut t: BtreeIndex<String, ORDER> = BtreeIndex::new();

    for (key, value) in operations {
        match value {
            Some(value) => assert_eq!(
                m.insert(key.clone(), value.clone()),
                t.set(key.as_bytes(), value)
            ),
            None => assert_eq!(m.remove(&key), t.del(key.as_bytes())),
        }
    }

    // Check len() and count()
    assert_eq!(m.len(), t.len());
    assert_eq!(m.len(), t.count());

    // Check that the maps are equal
    let m: Vec<_> = m.into_iter().map(|(k, v)| (k.into_bytes(), v)).collect();
    let t: Vec<_> = t.iter().map(|(k, v)| (k.to_vec(), v.clone())).collect();
    assert_eq!(m, t);
}

fuzz_target!(|data: (Vec<(String, Option<String>)>, u8)| {
    match data.1 % 3 {
        0 => check::<3>(data.0),
        1 => check::<4>(data.0),
        _ => check::<32>(data.0),
    }
});
