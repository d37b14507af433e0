//! Merkle-sum sparse merkle tree.
//!
//! Every node carries a digest and the sum of the leaves below it:
//! `hash(leaf) = H(value || be64(sum))` and
//! `hash(branch) = H(left.hash || right.hash || be64(left.sum + right.sum))`.

mod node;
mod proof;
mod store;
mod tree;

pub use node::{
    BranchNode, CompactedLeaf, ComputedNode, LAST_BIT_INDEX, LeafNode, MAX_TREE_LEVELS, Node,
    NodeHash, bit_index, empty_tree, is_equal_node,
};
pub use proof::{CompressedProof, Proof};
pub use store::{MemoryStore, StoredNode, TreeStore};
pub use tree::CompactedTree;
