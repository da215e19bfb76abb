#![no_main]
use fake::{Fake, StringFaker};
use libfuzzer_sys::fuzz_target;
use mapped_btree_store::BtreeIndex;
use rand::SeedableRng;

fuzz_target!(|seed: u64| {
    // Create an index with random entries
    let n_entries = 2000;
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    const ASCII: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let id_faker = StringFaker::with(Vec::from(ASCII), 8..16);
    let name_faker = fake::faker::name::en::Name();

    let mut btree: BtreeIndex<String> = BtreeIndex::new();

    for _ in 0..n_entries {
        let key: String = id_faker.fake_with_rng(&mut rng);
        btree.set(key.as_bytes(), name_faker.fake_with_rng(&mut rng));
    }
    // Generate and insert a known key/value
    let search_key: String = id_faker.fake_with_rng(&mut rng);
    let search_value: String = name_faker.fake_with_rng(&mut rng);

    btree.set(search_key.as_bytes(), search_value.clone());

    assert_eq!(Some(&search_value), btree.get(search_key.as_bytes()));

    // Removing the key again leaves every other entry in place
    assert_eq!(Some(search_value), btree.del(search_key.as_bytes()));
    assert_eq!(None, btree.get(search_key.as_bytes()));
});
