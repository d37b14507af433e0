use alloc::boxed::Box;
use alloc::vec::Vec;

use bitcoin::hashes::{Hash, HashEngine, sha256::Hash as Sha256Hash};
use once_cell::race::OnceBox;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Number of levels below the root of an MS-SMT.
pub const MAX_TREE_LEVELS: usize = 256;

/// Index of the last bit of a tree key.
pub const LAST_BIT_INDEX: usize = MAX_TREE_LEVELS - 1;

/// Digest of a tree node.
pub type NodeHash = Sha256Hash;

/// Common view over every kind of MS-SMT node.
pub trait Node {
    /// Returns the digest of the node.
    fn node_hash(&self) -> NodeHash;

    /// Returns the sum of every leaf below the node.
    fn node_sum(&self) -> u64;

    /// Returns the node reduced to its `(hash, sum)` pair.
    fn computed(&self) -> ComputedNode {
        ComputedNode {
            hash: self.node_hash(),
            sum: self.node_sum(),
        }
    }
}

/// Returns true if both nodes commit to the same hash and sum.
pub fn is_equal_node<A: Node + ?Sized, B: Node + ?Sized>(a: &A, b: &B) -> bool {
    a.node_hash() == b.node_hash() && a.node_sum() == b.node_sum()
}

/// Returns the bit of `key` that selects the child below a branch at `depth`.
///
/// A zero bit descends left, a one bit descends right.
pub fn bit_index(depth: usize, key: &[u8; 32]) -> u8 {
    (key[depth / 8] >> (depth % 8)) & 1
}

/// A leaf of the tree: an opaque value and the sum it contributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeafNode {
    /// Leaf payload.
    #[serde(with = "hex::serde")]
    pub value: Vec<u8>,
    /// Sum contributed by this leaf.
    pub sum: u64,
}

impl LeafNode {
    /// Creates a leaf from a value and sum.
    pub fn new(value: Vec<u8>, sum: u64) -> Self {
        Self { value, sum }
    }

    /// Returns the leaf that marks absence of a key.
    pub fn empty() -> Self {
        Self {
            value: Vec::new(),
            sum: 0,
        }
    }

    /// Returns true if this is the empty leaf.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && self.sum == 0
    }
}

impl Node for LeafNode {
    fn node_hash(&self) -> NodeHash {
        let mut engine = Sha256Hash::engine();
        engine.input(&self.value);
        engine.input(&self.sum.to_be_bytes());
        Sha256Hash::from_engine(engine)
    }

    fn node_sum(&self) -> u64 {
        self.sum
    }
}

/// A node known only by its digest, with no children attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComputedNode {
    /// Node digest.
    pub hash: NodeHash,
    /// Node sum.
    pub sum: u64,
}

impl ComputedNode {
    pub fn new(hash: NodeHash, sum: u64) -> Self {
        Self { hash, sum }
    }
}

impl Node for ComputedNode {
    fn node_hash(&self) -> NodeHash {
        self.hash
    }

    fn node_sum(&self) -> u64 {
        self.sum
    }
}

/// An inner node holding the digests of both children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchNode {
    /// Left child.
    pub left: ComputedNode,
    /// Right child.
    pub right: ComputedNode,
    hash: NodeHash,
    sum: u64,
}

impl BranchNode {
    /// Builds a branch over two children, failing if their sums overflow.
    pub fn new(left: ComputedNode, right: ComputedNode) -> Result<Self, Error> {
        let sum = left.sum.checked_add(right.sum).ok_or(Error::SumOverflow)?;

        let mut engine = Sha256Hash::engine();
        engine.input(&left.hash.to_byte_array());
        engine.input(&right.hash.to_byte_array());
        engine.input(&sum.to_be_bytes());
        let hash = Sha256Hash::from_engine(engine);

        Ok(Self {
            left,
            right,
            hash,
            sum,
        })
    }
}

impl Node for BranchNode {
    fn node_hash(&self) -> NodeHash {
        self.hash
    }

    fn node_sum(&self) -> u64 {
        self.sum
    }
}

/// Combines two children into the `(hash, sum)` of their parent.
pub(crate) fn parent(left: &ComputedNode, right: &ComputedNode) -> Result<ComputedNode, Error> {
    BranchNode::new(*left, *right).map(|branch| branch.computed())
}

static EMPTY_TREE: OnceBox<Vec<ComputedNode>> = OnceBox::new();

/// Returns the digests of empty subtrees indexed by depth.
///
/// Index `MAX_TREE_LEVELS` is the empty leaf, index 0 the root of an empty tree.
/// The table is built on first use and shared afterwards.
pub fn empty_tree() -> &'static [ComputedNode] {
    EMPTY_TREE.get_or_init(|| Box::new(build_empty_tree()))
}

fn build_empty_tree() -> Vec<ComputedNode> {
    let mut nodes = Vec::with_capacity(MAX_TREE_LEVELS + 1);
    nodes.resize(MAX_TREE_LEVELS + 1, LeafNode::empty().computed());

    for depth in (0..MAX_TREE_LEVELS).rev() {
        let child = nodes[depth + 1];
        // Empty subtrees sum to zero, so this can never overflow.
        nodes[depth] = parent(&child, &child).unwrap_or(child);
    }

    nodes
}

/// A single populated key stored in place of the run of branches above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactedLeaf {
    /// Key of the leaf.
    pub key: [u8; 32],
    /// The leaf itself.
    pub leaf: LeafNode,
}

impl CompactedLeaf {
    pub fn new(key: [u8; 32], leaf: LeafNode) -> Self {
        Self { key, leaf }
    }

    /// Returns this leaf as found at `depth` on the path of `path_key`.
    ///
    /// The digest of a compacted subtree only covers key bits `depth..256`,
    /// so two keys that differ above `depth` share one store entry. The bits
    /// above `depth` are taken from the path that led to the subtree.
    pub fn on_path(mut self, depth: usize, path_key: &[u8; 32]) -> Self {
        let full = depth / 8;
        self.key[..full].copy_from_slice(&path_key[..full]);
        let rem = depth % 8;
        if rem != 0 {
            let mask = (1u8 << rem) - 1;
            self.key[full] = (path_key[full] & mask) | (self.key[full] & !mask);
        }
        self
    }

    /// Returns the digest of the full-depth path from the leaf up to `depth`.
    pub fn node_at(&self, depth: usize, empty: &[ComputedNode]) -> Result<ComputedNode, Error> {
        let mut current = self.leaf.computed();
        for level in (depth..MAX_TREE_LEVELS).rev() {
            let sibling = &empty[level + 1];
            current = if bit_index(level, &self.key) == 0 {
                parent(&current, sibling)?
            } else {
                parent(sibling, &current)?
            };
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_is_consistent() {
        let empty = empty_tree();
        assert_eq!(empty.len(), MAX_TREE_LEVELS + 1);
        assert_eq!(empty[MAX_TREE_LEVELS], LeafNode::empty().computed());
        for depth in 0..MAX_TREE_LEVELS {
            let child = empty[depth + 1];
            let branch = BranchNode::new(child, child).unwrap();
            assert!(is_equal_node(&branch, &empty[depth]));
            assert_eq!(empty[depth].sum, 0);
        }
    }

    #[test]
    fn branch_sums_children() {
        let left = LeafNode::new(b"left".to_vec(), 3).computed();
        let right = LeafNode::new(b"right".to_vec(), 4).computed();
        let branch = BranchNode::new(left, right).unwrap();
        assert_eq!(branch.node_sum(), 7);
        assert_ne!(branch.node_hash(), BranchNode::new(right, left).unwrap().node_hash());
    }

    #[test]
    fn branch_rejects_overflow() {
        let left = ComputedNode::new(NodeHash::all_zeros(), u64::MAX);
        let right = ComputedNode::new(NodeHash::all_zeros(), 1);
        assert!(matches!(BranchNode::new(left, right), Err(Error::SumOverflow)));
    }

    #[test]
    fn leaf_hash_commits_to_sum() {
        let a = LeafNode::new(b"value".to_vec(), 1);
        let b = LeafNode::new(b"value".to_vec(), 2);
        assert!(!is_equal_node(&a, &b));
        assert!(is_equal_node(&a, &a.computed()));
    }

    #[test]
    fn empty_tree_is_shared() {
        assert!(core::ptr::eq(empty_tree(), empty_tree()));
    }

    #[test]
    fn on_path_replaces_bits_above_depth() {
        let stored = CompactedLeaf::new([0xFFu8; 32], LeafNode::new(b"v".to_vec(), 1));
        let path = [0u8; 32];

        let relocated = stored.clone().on_path(11, &path);
        assert_eq!(relocated.key[0], 0x00);
        assert_eq!(relocated.key[1], 0b1111_1000);
        assert_eq!(relocated.key[2..], [0xFFu8; 30]);
        assert_eq!(relocated.leaf, stored.leaf);

        assert_eq!(stored.clone().on_path(0, &path), stored);
        assert_eq!(stored.on_path(MAX_TREE_LEVELS, &path).key, path);
    }

    #[test]
    fn bit_index_is_lsb_first() {
        let mut key = [0u8; 32];
        key[0] = 0b0000_0010;
        key[31] = 0b1000_0000;
        assert_eq!(bit_index(0, &key), 0);
        assert_eq!(bit_index(1, &key), 1);
        assert_eq!(bit_index(255, &key), 1);
        assert_eq!(bit_index(254, &key), 0);
    }
}
