use std::mem;

use node::{cut, Internal, Leaf, Node, NodeId};

mod node;

/// Default maximum number of children of an internal node.
pub const DEFAULT_ORDER: usize = 32;

/// In-memory B+tree mapping byte-string keys to values.
///
/// Keys are compared byte-lexicographically.
/// `ORDER` is the maximum number of children of an internal node, a leaf holds up to
/// `ORDER - 1` records. Leaves are linked in key order so that iterating over all
/// entries never has to descend the tree again.
///
/// Nodes live in an arena and refer to their parent and children by index.
/// The index of a removed node is reused by the next allocated node.
///
/// # Example
///
/// ```rust
/// use mapped_btree_store::BtreeIndex;
///
/// let mut t: BtreeIndex<u32> = BtreeIndex::new();
/// t.set(b"b", 2);
/// t.set(b"a", 1);
/// assert_eq!(Some(&1), t.get(b"a"));
///
/// let values: Vec<_> = t.all().copied().collect();
/// assert_eq!(vec![1, 2], values);
/// ```
pub struct BtreeIndex<V, const ORDER: usize = DEFAULT_ORDER> {
    nodes: Vec<Option<Node<V>>>,
    free_nodes: Vec<NodeId>,
    root: Option<NodeId>,
    nr_elements: usize,
}

impl<V, const ORDER: usize> Default for BtreeIndex<V, ORDER> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, const ORDER: usize> BtreeIndex<V, ORDER> {
    const VALID_ORDER: () = assert!(ORDER >= 3, "a B+tree node needs at least three children");

    const MAX_KEYS: usize = ORDER - 1;

    pub fn new() -> BtreeIndex<V, ORDER> {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_ORDER;

        BtreeIndex {
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            root: None,
            nr_elements: 0,
        }
    }

    /// Searches for a key in the index and returns the value if found.
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let leaf = self.leaf(self.find_leaf(key)?);
        leaf.position(key).map(|i| &leaf.values[i])
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let leaf_id = self.find_leaf(key)?;
        let leaf = self.leaf_mut(leaf_id);
        let i = leaf.position(key)?;
        Some(&mut leaf.values[i])
    }

    /// Returns whether the index contains the given key.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Inserts the value only if the key does not exist yet.
    ///
    /// Returns `false` and leaves the existing value untouched otherwise.
    pub fn add(&mut self, key: &[u8], value: V) -> bool {
        if self.contains_key(key) {
            return false;
        }
        self.insert_new(key.to_vec(), value);
        true
    }

    /// Inserts a new value or overwrites the value of an existing key.
    ///
    /// Existing values are replaced in place and returned.
    pub fn set(&mut self, key: &[u8], value: V) -> Option<V> {
        if let Some(existing) = self.get_mut(key) {
            return Some(mem::replace(existing, value));
        }
        self.insert_new(key.to_vec(), value);
        None
    }

    /// Removes a key and returns its value.
    ///
    /// Removing a key that does not exist is a no-op.
    pub fn del(&mut self, key: &[u8]) -> Option<V> {
        let leaf_id = self.find_leaf(key)?;
        let value = {
            let leaf = self.leaf_mut(leaf_id);
            let i = leaf.position(key)?;
            leaf.keys.remove(i);
            leaf.values.remove(i)
        };
        self.nr_elements -= 1;
        self.rebalance(leaf_id);
        Some(value)
    }

    /// Returns all values in key order.
    pub fn all(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Returns all keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// Returns an iterator over all entries, starting at the leftmost leaf.
    pub fn iter(&self) -> Iter<'_, V, ORDER> {
        Iter {
            tree: self,
            leaf: self.first_leaf(),
            position: 0,
        }
    }

    /// Counts the records by walking the chain of leaves.
    pub fn count(&self) -> usize {
        let mut size = 0;
        let mut current = self.first_leaf();
        while let Some(id) = current {
            let leaf = self.leaf(id);
            size += leaf.keys.len();
            current = leaf.next;
        }
        size
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.nr_elements
    }

    /// Returns true if the index does not contain any records.
    pub fn is_empty(&self) -> bool {
        self.nr_elements == 0
    }

    /// Removes all nodes.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_nodes.clear();
        self.root = None;
        self.nr_elements = 0;
    }

    /// Returns the keys of each node, level by level starting at the root.
    pub fn levels(&self) -> Vec<Vec<Vec<&[u8]>>> {
        let mut result = Vec::new();
        let mut level: Vec<NodeId> = self.root.into_iter().collect();
        while !level.is_empty() {
            let mut next_level = Vec::new();
            let mut keys = Vec::with_capacity(level.len());
            for id in level {
                let node = self.node(id);
                keys.push(node.keys().iter().map(|k| k.as_slice()).collect());
                if let Node::Internal(internal) = node {
                    next_level.extend_from_slice(&internal.children);
                }
            }
            result.push(keys);
            level = next_level;
        }
        result
    }

    fn node(&self, id: NodeId) -> &Node<V> {
        match &self.nodes[id] {
            Some(node) => node,
            None => unreachable!("node {} was already released", id),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<V> {
        match &mut self.nodes[id] {
            Some(node) => node,
            None => unreachable!("node {} was already released", id),
        }
    }

    fn leaf(&self, id: NodeId) -> &Leaf<V> {
        match self.node(id) {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => unreachable!("node {} is not a leaf", id),
        }
    }

    fn leaf_mut(&mut self, id: NodeId) -> &mut Leaf<V> {
        match self.node_mut(id) {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => unreachable!("node {} is not a leaf", id),
        }
    }

    fn internal(&self, id: NodeId) -> &Internal {
        match self.node(id) {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => unreachable!("node {} is not an internal node", id),
        }
    }

    fn internal_mut(&mut self, id: NodeId) -> &mut Internal {
        match self.node_mut(id) {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => unreachable!("node {} is not an internal node", id),
        }
    }

    fn allocate(&mut self, node: Node<V>) -> NodeId {
        if let Some(id) = self.free_nodes.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn release(&mut self, id: NodeId) -> Node<V> {
        match self.nodes[id].take() {
            Some(node) => {
                self.free_nodes.push(id);
                node
            }
            None => unreachable!("node {} was already released", id),
        }
    }

    fn find_leaf(&self, key: &[u8]) -> Option<NodeId> {
        let mut id = self.root?;
        loop {
            match self.node(id) {
                Node::Leaf(_) => return Some(id),
                Node::Internal(internal) => id = internal.children[internal.child_index(key)],
            }
        }
    }

    fn first_leaf(&self) -> Option<NodeId> {
        let mut id = self.root?;
        while let Node::Internal(internal) = self.node(id) {
            id = internal.children[0];
        }
        Some(id)
    }

    /// Inserts a key that is not part of the tree yet.
    fn insert_new(&mut self, key: Vec<u8>, value: V) {
        self.nr_elements += 1;

        let Some(leaf_id) = self.find_leaf(&key) else {
            // First insertion, start a new tree
            let mut root = Leaf::new(None);
            root.keys.push(key);
            root.values.push(value);
            self.root = Some(self.allocate(Node::Leaf(root)));
            return;
        };

        let leaf = self.leaf_mut(leaf_id);
        let insertion_point = match node::search(&leaf.keys, &key) {
            node::SearchResult::NotFound(i) => i,
            node::SearchResult::Found(i) => {
                debug_assert!(false, "key is already part of the tree");
                i
            }
        };
        leaf.keys.insert(insertion_point, key);
        leaf.values.insert(insertion_point, value);

        if leaf.keys.len() > Self::MAX_KEYS {
            self.split_leaf(leaf_id);
        }
    }

    /// Splits a leaf that holds one record too many and links the new right leaf.
    fn split_leaf(&mut self, leaf_id: NodeId) {
        let split = cut(ORDER - 1);
        let right = {
            let leaf = self.leaf_mut(leaf_id);
            Leaf {
                keys: leaf.keys.split_off(split),
                values: leaf.values.split_off(split),
                next: leaf.next,
                parent: leaf.parent,
            }
        };
        let separator = right.keys[0].clone();
        let right_id = self.allocate(Node::Leaf(right));
        self.leaf_mut(leaf_id).next = Some(right_id);

        self.insert_into_parent(leaf_id, separator, right_id);
    }

    /// Inserts the separator and the new `right` node next to `left` into their parent.
    fn insert_into_parent(&mut self, left: NodeId, key: Vec<u8>, right: NodeId) {
        let Some(parent_id) = self.node(left).parent() else {
            // The root was split, create a new root for the two sub-trees
            let root = self.allocate(Node::Internal(Internal {
                keys: vec![key],
                children: vec![left, right],
                parent: None,
            }));
            self.node_mut(left).set_parent(Some(root));
            self.node_mut(right).set_parent(Some(root));
            self.root = Some(root);
            return;
        };

        let parent = self.internal_mut(parent_id);
        let left_index = parent.child_position(left);
        parent.keys.insert(left_index, key);
        parent.children.insert(left_index + 1, right);

        if parent.keys.len() > Self::MAX_KEYS {
            self.split_internal(parent_id);
        }
    }

    /// Splits an internal node that holds one key too many and promotes its middle key.
    fn split_internal(&mut self, id: NodeId) {
        let split = cut(ORDER);
        let (prime, right) = {
            let node = self.internal_mut(id);
            let right_keys = node.keys.split_off(split);
            let right_children = node.children.split_off(split);
            let prime = node.keys.pop();
            (
                prime,
                Internal {
                    keys: right_keys,
                    children: right_children,
                    parent: node.parent,
                },
            )
        };
        let Some(prime) = prime else {
            unreachable!("split point of an internal node is never zero")
        };

        let moved_children = right.children.clone();
        let right_id = self.allocate(Node::Internal(right));
        for child in moved_children {
            self.node_mut(child).set_parent(Some(right_id));
        }

        self.insert_into_parent(id, prime, right_id);
    }

    /// Restores the minimum occupancy of a node after a key was removed from it.
    fn rebalance(&mut self, id: NodeId) {
        if self.root == Some(id) {
            self.adjust_root();
            return;
        }

        let node = self.node(id);
        let is_leaf = node.is_leaf();
        let num_keys = node.num_keys();
        let (min_keys, capacity) = if is_leaf {
            (cut(ORDER - 1), ORDER)
        } else {
            (cut(ORDER) - 1, ORDER - 1)
        };
        if num_keys >= min_keys {
            return;
        }

        let Some(parent_id) = node.parent() else {
            unreachable!("non-root node {} has no parent", id)
        };
        let parent = self.internal(parent_id);
        let index = parent.child_position(id);
        // The leftmost child uses its right sibling, all others their left one
        let leftmost = index == 0;
        let (neighbor_id, prime_index) = if leftmost {
            (parent.children[1], 0)
        } else {
            (parent.children[index - 1], index - 1)
        };
        let prime = parent.keys[prime_index].clone();

        if self.node(neighbor_id).num_keys() + num_keys < capacity {
            let (left, right) = if leftmost {
                (id, neighbor_id)
            } else {
                (neighbor_id, id)
            };
            self.coalesce(parent_id, left, right, prime_index, prime);
        } else {
            self.redistribute(parent_id, id, neighbor_id, leftmost, prime_index, prime);
        }
    }

    /// Merges `right` into its left sibling and removes the separator from the parent.
    fn coalesce(
        &mut self,
        parent_id: NodeId,
        left: NodeId,
        right: NodeId,
        prime_index: usize,
        prime: Vec<u8>,
    ) {
        let right_node = self.release(right);
        let mut moved_children = Vec::new();
        match (self.node_mut(left), right_node) {
            (Node::Internal(l), Node::Internal(r)) => {
                l.keys.push(prime);
                l.keys.extend(r.keys);
                moved_children.extend_from_slice(&r.children);
                l.children.extend(r.children);
            }
            (Node::Leaf(l), Node::Leaf(r)) => {
                l.keys.extend(r.keys);
                l.values.extend(r.values);
                l.next = r.next;
            }
            _ => unreachable!("siblings {} and {} differ in kind", left, right),
        }
        for child in moved_children {
            self.node_mut(child).set_parent(Some(left));
        }

        let parent = self.internal_mut(parent_id);
        parent.keys.remove(prime_index);
        parent.children.remove(prime_index + 1);
        self.rebalance(parent_id);
    }

    /// Moves a single entry from the neighbor into the under-full node `id`.
    fn redistribute(
        &mut self,
        parent_id: NodeId,
        id: NodeId,
        neighbor_id: NodeId,
        leftmost: bool,
        prime_index: usize,
        prime: Vec<u8>,
    ) {
        let new_prime = if self.node(id).is_leaf() {
            if leftmost {
                let (key, value) = {
                    let neighbor = self.leaf_mut(neighbor_id);
                    (neighbor.keys.remove(0), neighbor.values.remove(0))
                };
                let n = self.leaf_mut(id);
                n.keys.push(key);
                n.values.push(value);
                self.leaf(neighbor_id).keys[0].clone()
            } else {
                let (key, value) = {
                    let neighbor = self.leaf_mut(neighbor_id);
                    match (neighbor.keys.pop(), neighbor.values.pop()) {
                        (Some(key), Some(value)) => (key, value),
                        _ => unreachable!("neighbor leaf {} is empty", neighbor_id),
                    }
                };
                let n = self.leaf_mut(id);
                n.keys.insert(0, key.clone());
                n.values.insert(0, value);
                key
            }
        } else {
            let (key, child) = if leftmost {
                let neighbor = self.internal_mut(neighbor_id);
                let key = neighbor.keys.remove(0);
                let child = neighbor.children.remove(0);
                let n = self.internal_mut(id);
                n.keys.push(prime);
                n.children.push(child);
                (key, child)
            } else {
                let neighbor = self.internal_mut(neighbor_id);
                let (Some(key), Some(child)) = (neighbor.keys.pop(), neighbor.children.pop())
                else {
                    unreachable!("neighbor node {} is empty", neighbor_id)
                };
                let n = self.internal_mut(id);
                n.keys.insert(0, prime);
                n.children.insert(0, child);
                (key, child)
            };
            self.node_mut(child).set_parent(Some(id));
            key
        };

        self.internal_mut(parent_id).keys[prime_index] = new_prime;
    }

    /// Replaces a root without keys by its only child, or empties the tree.
    fn adjust_root(&mut self) {
        let Some(root) = self.root else {
            return;
        };
        if self.node(root).num_keys() > 0 {
            return;
        }
        match self.release(root) {
            Node::Internal(internal) => {
                let child = internal.children[0];
                self.node_mut(child).set_parent(None);
                self.root = Some(child);
            }
            Node::Leaf(_) => self.clear(),
        }
    }
}

/// Iterator over the entries of a [`BtreeIndex`] in key order.
pub struct Iter<'a, V, const ORDER: usize = DEFAULT_ORDER> {
    tree: &'a BtreeIndex<V, ORDER>,
    leaf: Option<NodeId>,
    position: usize,
}

impl<'a, V, const ORDER: usize> Iterator for Iter<'a, V, ORDER> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let tree: &'a BtreeIndex<V, ORDER> = self.tree;
        while let Some(id) = self.leaf {
            let leaf = tree.leaf(id);
            if self.position < leaf.keys.len() {
                let i = self.position;
                self.position += 1;
                return Some((leaf.keys[i].as_slice(), &leaf.values[i]));
            }
            // follow the forward link to the next leaf
            self.leaf = leaf.next;
            self.position = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests;
