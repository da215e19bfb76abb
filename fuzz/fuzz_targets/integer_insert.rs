#![no_main]
use libfuzzer_sys::fuzz_target;

use mapped_btree_store::BtreeIndex;
use std::collections::BTreeMap;

fuzz_target!(|data: Vec<(u32, u32)>| {
    let mut m = BTreeMap::default();
    let mut fixture: BtreeIndex<u32, 5> = BtreeIndex::new();

    for (key, value) in data {
        // Big endian keys sort like the integers
        m.insert(key, value);
        fixture.set(&key.to_be_bytes(), value);
    }

    // Check len() function
    assert_eq!(m.len(), fixture.len());

    // get query for each entry
    for (k, v1) in m.iter() {
        assert!(fixture.contains_key(&k.to_be_bytes()));
        assert_eq!(Some(v1), fixture.get(&k.to_be_bytes()));
    }

    let m: Vec<_> = m.into_iter().collect();
    let fixture_result: Vec<_> = fixture
        .iter()
        .map(|(k, v)| (u32::from_be_bytes([k[0], k[1], k[2], k[3]]), *v))
        .collect();

    assert_eq!(m, fixture_result);
});
