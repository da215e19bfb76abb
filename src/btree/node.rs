/// Index of a node in the arena of a [`BtreeIndex`](super::BtreeIndex).
pub(crate) type NodeId = usize;

/// Returns the split point for a node holding `length` entries.
///
/// Odd lengths favor the left half.
pub(crate) fn cut(length: usize) -> usize {
    if length % 2 == 0 {
        length / 2
    } else {
        length / 2 + 1
    }
}

/// Searches a sorted key array with byte-lexicographic order.
pub(crate) fn search(keys: &[Vec<u8>], key: &[u8]) -> SearchResult {
    match keys.binary_search_by(|k| k.as_slice().cmp(key)) {
        Ok(i) => SearchResult::Found(i),
        Err(i) => SearchResult::NotFound(i),
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum SearchResult {
    Found(usize),
    NotFound(usize),
}

/// A leaf holds the records and a forward link to the next leaf in key order.
pub(crate) struct Leaf<V> {
    pub(crate) keys: Vec<Vec<u8>>,
    pub(crate) values: Vec<V>,
    pub(crate) next: Option<NodeId>,
    pub(crate) parent: Option<NodeId>,
}

impl<V> Leaf<V> {
    pub(crate) fn new(parent: Option<NodeId>) -> Leaf<V> {
        Leaf {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
            parent,
        }
    }

    pub(crate) fn position(&self, key: &[u8]) -> Option<usize> {
        match search(&self.keys, key) {
            SearchResult::Found(i) => Some(i),
            SearchResult::NotFound(_) => None,
        }
    }
}

/// An internal node has one more child than keys.
/// Child `i` holds all keys smaller than `keys[i]`, child `i + 1` the keys from `keys[i]` on.
pub(crate) struct Internal {
    pub(crate) keys: Vec<Vec<u8>>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
}

impl Internal {
    /// Index of the child to descend into when looking for `key`.
    pub(crate) fn child_index(&self, key: &[u8]) -> usize {
        match search(&self.keys, key) {
            // Separators are the first key of their right subtree
            SearchResult::Found(i) => i + 1,
            SearchResult::NotFound(i) => i,
        }
    }

    /// Position of `child` among the children of this node.
    pub(crate) fn child_position(&self, child: NodeId) -> usize {
        let position = self.children.iter().position(|c| *c == child);
        debug_assert!(
            position.is_some(),
            "node {} is not a child of its parent",
            child
        );
        position.unwrap_or(0)
    }
}

pub(crate) enum Node<V> {
    Leaf(Leaf<V>),
    Internal(Internal),
}

impl<V> Node<V> {
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub(crate) fn num_keys(&self) -> usize {
        self.keys().len()
    }

    pub(crate) fn keys(&self) -> &[Vec<u8>] {
        match self {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Internal(internal) => &internal.keys,
        }
    }

    pub(crate) fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Leaf(leaf) => leaf.parent,
            Node::Internal(internal) => internal.parent,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        match self {
            Node::Leaf(leaf) => leaf.parent = parent,
            Node::Internal(internal) => internal.parent = parent,
        }
    }
}
