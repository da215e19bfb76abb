use debug_tree::TreeBuilder;
use fake::{Fake, StringFaker};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rayon::prelude::*;
use std::{cmp::Ordering, collections::BTreeMap};

use super::*;

fn print_tree<V: std::fmt::Debug, const ORDER: usize>(t: &BtreeIndex<V, ORDER>) {
    let mut b = TreeBuilder::new();
    if let Some(root) = t.root {
        print_tree_node(&mut b, t, root);
    }
    b.print();
}

fn print_tree_node<V: std::fmt::Debug, const ORDER: usize>(
    builder: &mut TreeBuilder,
    t: &BtreeIndex<V, ORDER>,
    node: NodeId,
) {
    match t.node(node) {
        Node::Leaf(leaf) => {
            let mut branch =
                builder.add_branch(&format!("(leaf {} with {} keys)", node, leaf.keys.len()));
            for (i, key) in leaf.keys.iter().enumerate() {
                builder.add_leaf(&format!(
                    "{} => {:?} ({}. key)",
                    String::from_utf8_lossy(key),
                    leaf.values[i],
                    i
                ));
            }
            branch.release();
        }
        Node::Internal(internal) => {
            let mut branch = builder.add_branch(&format!(
                "(node {} with {} keys and {} children)",
                node,
                internal.keys.len(),
                internal.children.len()
            ));
            for (i, child) in internal.children.iter().enumerate() {
                print_tree_node(builder, t, *child);
                if i < internal.keys.len() {
                    builder.add_leaf(&format!(
                        "{} ({}. key)",
                        String::from_utf8_lossy(&internal.keys[i]),
                        i
                    ));
                }
            }
            branch.release();
        }
    }
}

fn check_order<V, const ORDER: usize>(t: &BtreeIndex<V, ORDER>) {
    let mut previous: Option<&[u8]> = None;
    for (k, _v) in t.iter() {
        if let Some(previous) = previous {
            assert_eq!(Ordering::Less, previous.cmp(k));
        }
        previous = Some(k);
    }
}

/// Checks occupancy, parent links and separators of every node below `id`.
/// Returns the smallest and the largest key of the subtree.
fn check_node<V, const ORDER: usize>(
    t: &BtreeIndex<V, ORDER>,
    id: NodeId,
    parent: Option<NodeId>,
) -> (Vec<u8>, Vec<u8>) {
    let node = t.node(id);
    assert_eq!(parent, node.parent());
    assert!(node.num_keys() <= ORDER - 1);
    if parent.is_some() {
        let min_keys = if node.is_leaf() {
            cut(ORDER - 1)
        } else {
            cut(ORDER) - 1
        };
        assert!(
            node.num_keys() >= min_keys,
            "node {} has only {} keys",
            id,
            node.num_keys()
        );
    }
    match node {
        Node::Leaf(leaf) => {
            assert_eq!(leaf.keys.len(), leaf.values.len());
            assert!(!leaf.keys.is_empty());
            for w in leaf.keys.windows(2) {
                assert_eq!(Ordering::Less, w[0].cmp(&w[1]));
            }
            (leaf.keys[0].clone(), leaf.keys[leaf.keys.len() - 1].clone())
        }
        Node::Internal(internal) => {
            assert_eq!(internal.keys.len() + 1, internal.children.len());
            let mut min = None;
            let mut max = Vec::new();
            for (i, child) in internal.children.iter().enumerate() {
                let (child_min, child_max) = check_node(t, *child, Some(id));
                if i > 0 {
                    // all keys of the right subtree are at least the separator
                    assert!(internal.keys[i - 1] <= child_min);
                }
                if i < internal.keys.len() {
                    assert!(child_max < internal.keys[i]);
                }
                if min.is_none() {
                    min = Some(child_min);
                }
                max = child_max;
            }
            (min.unwrap_or_default(), max)
        }
    }
}

fn check_invariants<V, const ORDER: usize>(t: &BtreeIndex<V, ORDER>) {
    if let Some(root) = t.root {
        check_node(t, root, None);
    }
    check_order(t);
    assert_eq!(t.len(), t.count());
    assert_eq!(t.len(), t.iter().count());
}

fn str_levels<V, const ORDER: usize>(t: &BtreeIndex<V, ORDER>) -> Vec<Vec<Vec<String>>> {
    t.levels()
        .into_iter()
        .map(|level| {
            level
                .into_iter()
                .map(|keys| {
                    keys.into_iter()
                        .map(|k| String::from_utf8_lossy(k).to_string())
                        .collect()
                })
                .collect()
        })
        .collect()
}

fn shape(levels: &[&[&[&str]]]) -> Vec<Vec<Vec<String>>> {
    levels
        .iter()
        .map(|level| {
            level
                .iter()
                .map(|keys| keys.iter().map(|k| k.to_string()).collect())
                .collect()
        })
        .collect()
}

#[test]
fn insert_get_static_size() {
    let nr_entries = 2000u64;

    let mut t: BtreeIndex<u64> = BtreeIndex::new();

    assert_eq!(true, t.is_empty());
    assert_eq!(None, t.set(&0u64.to_be_bytes(), 42));
    assert_eq!(false, t.is_empty());
    assert_eq!(1, t.len());

    for i in 1..nr_entries {
        assert_eq!(None, t.set(&i.to_be_bytes(), i));
    }

    assert_eq!(nr_entries as usize, t.len());
    assert_eq!(true, t.contains_key(&0u64.to_be_bytes()));
    assert_eq!(Some(&42), t.get(&0u64.to_be_bytes()));
    assert_eq!(Some(42), t.set(&0u64.to_be_bytes(), 100));
    assert_eq!(Some(100), t.set(&0u64.to_be_bytes(), 42));

    for i in 1..nr_entries {
        assert_eq!(true, t.contains_key(&i.to_be_bytes()));
        assert_eq!(Some(&i), t.get(&i.to_be_bytes()));
    }
    assert_eq!(false, t.contains_key(&nr_entries.to_be_bytes()));
    assert_eq!(None, t.get(&nr_entries.to_be_bytes()));
    assert_eq!(None, t.get(&5000u64.to_be_bytes()));

    check_invariants(&t);
}

#[test]
fn shuffled_insert_yields_sorted_values() {
    let mut keys: Vec<u32> = (1..=14).collect();
    keys.shuffle(&mut rand::rngs::SmallRng::seed_from_u64(14));

    let mut t: BtreeIndex<u32, 4> = BtreeIndex::new();
    for k in keys {
        assert_eq!(true, t.add(format!("{:03}", k).as_bytes(), k));
    }

    let values: Vec<u32> = t.all().copied().collect();
    assert_eq!((1..=14).collect::<Vec<_>>(), values);
    assert_eq!(14, t.count());
    check_invariants(&t);
}

#[test]
fn add_keeps_first_value() {
    let mut t: BtreeIndex<&str> = BtreeIndex::new();
    assert_eq!(true, t.add(b"a", "v1"));
    assert_eq!(false, t.add(b"a", "v2"));
    assert_eq!(Some(&"v1"), t.get(b"a"));
    assert_eq!(1, t.len());

    assert_eq!(Some("v1"), t.set(b"a", "v2"));
    assert_eq!(Some(&"v2"), t.get(b"a"));
    assert_eq!(1, t.len());
}

#[test]
fn count_of_empty_tree() {
    let mut t: BtreeIndex<u8> = BtreeIndex::default();
    assert_eq!(0, t.count());
    assert_eq!(0, t.all().count());
    assert_eq!(None, t.get(b""));
    assert_eq!(None, t.del(b"missing"));
    assert!(t.levels().is_empty());

    t.set(b"", 1);
    assert_eq!(Some(&1), t.get(b""));
    assert_eq!(1, t.count());
}

#[test]
fn split_shapes() {
    let mut t: BtreeIndex<u32, 4> = BtreeIndex::new();
    for i in 1..=4u32 {
        t.set(i.to_string().as_bytes(), i);
    }
    assert_eq!(
        shape(&[&[&["3"]], &[&["1", "2"], &["3", "4"]]]),
        str_levels(&t)
    );

    let mut t: BtreeIndex<u32, 4> = BtreeIndex::new();
    for i in 1..=10u32 {
        t.set(format!("{:02}", i).as_bytes(), i);
    }
    print_tree(&t);
    assert_eq!(
        shape(&[
            &[&["05"]],
            &[&["03"], &["07", "09"]],
            &[
                &["01", "02"],
                &["03", "04"],
                &["05", "06"],
                &["07", "08"],
                &["09", "10"]
            ]
        ]),
        str_levels(&t)
    );
    check_invariants(&t);

    // Removing the first key merges the leftmost leaves and shrinks the tree by a level
    assert_eq!(Some(1), t.del(b"01"));
    print_tree(&t);
    assert_eq!(
        shape(&[
            &[&["05", "07", "09"]],
            &[&["02", "03", "04"], &["05", "06"], &["07", "08"], &["09", "10"]]
        ]),
        str_levels(&t)
    );
    check_invariants(&t);
}

#[test]
fn redistribute_from_neighbor() {
    let mut t: BtreeIndex<u32, 4> = BtreeIndex::new();
    for i in 1..=5u32 {
        t.set(i.to_string().as_bytes(), i);
    }
    assert_eq!(
        shape(&[&[&["3"]], &[&["1", "2"], &["3", "4", "5"]]]),
        str_levels(&t)
    );

    // The leftmost leaf borrows the first record of its right sibling
    t.del(b"1");
    assert_eq!(
        shape(&[&[&["4"]], &[&["2", "3"], &["4", "5"]]]),
        str_levels(&t)
    );

    let mut t: BtreeIndex<u32, 4> = BtreeIndex::new();
    for k in ["1", "2", "3", "4", "5", "0"] {
        t.set(k.as_bytes(), 0);
    }
    assert_eq!(
        shape(&[&[&["3"]], &[&["0", "1", "2"], &["3", "4", "5"]]]),
        str_levels(&t)
    );
    // The right leaf borrows the last record of its left sibling
    t.del(b"4");
    t.del(b"5");
    assert_eq!(
        shape(&[&[&["2"]], &[&["0", "1"], &["2", "3"]]]),
        str_levels(&t)
    );
    check_invariants(&t);
}

#[test]
fn delete_twice_is_noop() {
    let mut t: BtreeIndex<u32, 3> = BtreeIndex::new();
    for i in 0..100u32 {
        t.set(format!("{:03}", i).as_bytes(), i);
    }
    assert_eq!(Some(50), t.del(b"050"));
    assert_eq!(None, t.del(b"050"));
    assert_eq!(99, t.len());
    check_invariants(&t);
}

#[test]
fn delete_all_entries() {
    let mut t: BtreeIndex<u32, 4> = BtreeIndex::new();
    for i in 0..200u32 {
        t.set(format!("{:04}", i).as_bytes(), i);
    }
    for i in (0..200u32).rev() {
        assert_eq!(Some(i), t.del(format!("{:04}", i).as_bytes()));
        check_invariants(&t);
    }
    assert_eq!(true, t.is_empty());
    assert_eq!(0, t.count());
    assert!(t.levels().is_empty());

    // Released nodes are reused
    t.set(b"x", 1);
    assert_eq!(Some(&1), t.get(b"x"));
}

fn random_operations<const ORDER: usize>(seed: u64) {
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    let mut m = BTreeMap::default();
    let mut t: BtreeIndex<u32, ORDER> = BtreeIndex::new();

    for step in 0..3000u32 {
        let key = format!("{}", rng.gen_range(0..500u32));
        match rng.gen_range(0..3) {
            0 => {
                let expected = !m.contains_key(key.as_bytes());
                if expected {
                    m.insert(key.as_bytes().to_vec(), step);
                }
                assert_eq!(expected, t.add(key.as_bytes(), step));
            }
            1 => {
                assert_eq!(
                    m.insert(key.as_bytes().to_vec(), step),
                    t.set(key.as_bytes(), step)
                );
            }
            _ => {
                assert_eq!(m.remove(key.as_bytes()), t.del(key.as_bytes()));
            }
        }
        assert_eq!(m.len(), t.len());
    }
    check_invariants(&t);

    let m: Vec<_> = m.into_iter().collect();
    let t: Vec<_> = t.iter().map(|(k, v)| (k.to_vec(), *v)).collect();
    assert_eq!(m, t);
}

#[test]
fn random_operations_minimal_order() {
    random_operations::<3>(1);
}

#[test]
fn random_operations_small_order() {
    random_operations::<4>(2);
    random_operations::<5>(3);
}

#[test]
fn random_operations_default_order() {
    random_operations::<DEFAULT_ORDER>(4);
}

#[test]
fn parallel_get() {
    let nr_entries = 2000;

    let mut t: BtreeIndex<usize> = BtreeIndex::new();
    for i in 0..nr_entries {
        t.set(i.to_string().as_bytes(), i);
    }

    // Get all values in parallel
    let entries: Vec<Option<usize>> = (0..nr_entries)
        .into_par_iter()
        .map(|i| t.get(i.to_string().as_bytes()).copied())
        .collect();
    for i in 0..nr_entries {
        assert_eq!(Some(i), entries[i]);
    }
}

#[test]
fn get_with_generated_keys() {
    let seed = 1971428643569665;

    let n_entries = 2_000;
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    const ASCII: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let id_faker = StringFaker::with(Vec::from(ASCII), 8..16);
    let name_faker = fake::faker::name::en::Name();

    let mut btree: BtreeIndex<String, 8> = BtreeIndex::new();
    for _ in 0..n_entries {
        let key: String = id_faker.fake_with_rng(&mut rng);
        btree.set(key.as_bytes(), name_faker.fake_with_rng(&mut rng));
    }

    // Generate and insert a known key/value
    let search_key: String = id_faker.fake_with_rng(&mut rng);
    let search_value: String = name_faker.fake_with_rng(&mut rng);
    btree.set(search_key.as_bytes(), search_value.clone());

    assert_eq!(Some(&search_value), btree.get(search_key.as_bytes()));
    check_invariants(&btree);
}

#[test]
fn sorted_iterator() {
    let mut t: BtreeIndex<bool, 5> = BtreeIndex::new();

    for a in 0..=255 {
        t.set(&[1, a], true);
    }
    for a in 0..=255 {
        t.set(&[0, a], true);
    }
    assert_eq!(512, t.len());
    check_order(&t);

    let keys: Vec<&[u8]> = t.keys().collect();
    assert_eq!(&[0, 0], keys[0]);
    assert_eq!(&[1, 255], keys[511]);

    t.clear();
    assert_eq!(0, t.len());
    assert_eq!(None, t.iter().next());
}
