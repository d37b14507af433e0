use alloc::string::ToString;
use alloc::vec::Vec;

use tracing::trace;

use crate::error::Error;
use crate::mssmt::node::{
    BranchNode, CompactedLeaf, ComputedNode, LeafNode, MAX_TREE_LEVELS, Node, NodeHash, bit_index,
    empty_tree,
};
use crate::mssmt::proof::Proof;
use crate::mssmt::store::{StoredNode, TreeStore};

/// A merkle-sum sparse merkle tree over 256-bit keys.
///
/// Subtrees holding a single key are stored as one [`CompactedLeaf`], so
/// storage grows with the number of populated keys. Digests and proofs are
/// those of the equivalent full-depth tree. The tree itself is only the
/// digest of its current root; every node lives in the store it was given.
#[derive(Debug, Clone)]
pub struct CompactedTree<S: TreeStore> {
    store: S,
    root: ComputedNode,
    empty: &'static [ComputedNode],
}

impl<S: TreeStore> CompactedTree<S> {
    /// Creates an empty tree backed by `store`.
    pub fn new(store: S) -> Self {
        let empty = empty_tree();
        Self {
            store,
            root: empty[0],
            empty,
        }
    }

    /// Opens the tree rooted at `root` inside an already populated `store`.
    pub fn with_root(store: S, root: ComputedNode) -> Self {
        let empty = empty_tree();
        Self { store, root, empty }
    }

    /// Returns the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the `(hash, sum)` of the current root.
    pub fn root_node(&self) -> ComputedNode {
        self.root
    }

    /// Returns the current root as a branch with both children.
    pub fn root(&self) -> Result<BranchNode, Error> {
        if self.is_empty_at(0, &self.root) {
            return BranchNode::new(self.empty[1], self.empty[1]);
        }

        match self.fetch(&self.root.hash)? {
            StoredNode::Branch(branch) => Ok(branch),
            StoredNode::CompactedLeaf(compacted) => {
                let child = compacted.node_at(1, &self.empty)?;
                if bit_index(0, &compacted.key) == 0 {
                    BranchNode::new(child, self.empty[1])
                } else {
                    BranchNode::new(self.empty[1], child)
                }
            }
        }
    }

    /// Inserts `leaf` at `key`, replacing any previous leaf, and returns the new root.
    ///
    /// Inserting the empty leaf removes the key.
    pub fn insert(&mut self, key: &[u8; 32], leaf: LeafNode) -> Result<BranchNode, Error> {
        trace!(key = %hex::encode(key), sum = leaf.sum, "mssmt insert");
        let root = self.root;
        self.root = self.insert_at(0, root, key, &leaf)?;
        self.root()
    }

    /// Removes the leaf at `key` and returns the new root.
    pub fn delete(&mut self, key: &[u8; 32]) -> Result<BranchNode, Error> {
        self.insert(key, LeafNode::empty())
    }

    /// Returns the leaf at `key`, or the empty leaf if the key is absent.
    pub fn get(&self, key: &[u8; 32]) -> Result<LeafNode, Error> {
        let mut node = self.root;
        for depth in 0..=MAX_TREE_LEVELS {
            if self.is_empty_at(depth, &node) {
                return Ok(LeafNode::empty());
            }
            match self.fetch_on_path(depth, &node.hash, key)? {
                StoredNode::CompactedLeaf(compacted) => {
                    return Ok(if compacted.key == *key {
                        compacted.leaf
                    } else {
                        LeafNode::empty()
                    });
                }
                StoredNode::Branch(_) if depth == MAX_TREE_LEVELS => break,
                StoredNode::Branch(branch) => {
                    node = if bit_index(depth, key) == 0 {
                        branch.left
                    } else {
                        branch.right
                    };
                }
            }
        }

        // Leaves always sit in compacted form, never behind a branch at full depth.
        Err(Error::MissingNode(node.hash.to_string()))
    }

    /// Builds the merkle proof of the leaf at `key`, present or not.
    pub fn merkle_proof(&self, key: &[u8; 32]) -> Result<Proof, Error> {
        // siblings[depth] is the sibling of the node at depth + 1 on the path.
        let mut siblings: Vec<ComputedNode> = self.empty[1..].to_vec();
        let mut node = self.root;

        for depth in 0..MAX_TREE_LEVELS {
            if self.is_empty_at(depth, &node) {
                break;
            }
            match self.fetch_on_path(depth, &node.hash, key)? {
                StoredNode::Branch(branch) => {
                    let (next, sibling) = if bit_index(depth, key) == 0 {
                        (branch.left, branch.right)
                    } else {
                        (branch.right, branch.left)
                    };
                    siblings[depth] = sibling;
                    node = next;
                }
                StoredNode::CompactedLeaf(compacted) => {
                    if compacted.key != *key {
                        let diverge = (depth..MAX_TREE_LEVELS)
                            .find(|level| bit_index(*level, key) != bit_index(*level, &compacted.key));
                        if let Some(level) = diverge {
                            siblings[level] = compacted.node_at(level + 1, &self.empty)?;
                        }
                    }
                    break;
                }
            }
        }

        siblings.reverse();
        Proof::new(siblings)
    }

    fn is_empty_at(&self, depth: usize, node: &ComputedNode) -> bool {
        self.empty[depth] == *node
    }

    fn fetch(&self, hash: &NodeHash) -> Result<StoredNode, Error> {
        self.store
            .get(hash)?
            .ok_or_else(|| Error::MissingNode(hash.to_string()))
    }

    /// Fetches the node at `depth` on the path of `path_key`.
    fn fetch_on_path(
        &self,
        depth: usize,
        hash: &NodeHash,
        path_key: &[u8; 32],
    ) -> Result<StoredNode, Error> {
        Ok(match self.fetch(hash)? {
            StoredNode::CompactedLeaf(compacted) => {
                StoredNode::CompactedLeaf(compacted.on_path(depth, path_key))
            }
            branch => branch,
        })
    }

    fn insert_at(
        &mut self,
        depth: usize,
        node: ComputedNode,
        key: &[u8; 32],
        leaf: &LeafNode,
    ) -> Result<ComputedNode, Error> {
        if self.is_empty_at(depth, &node) {
            if leaf.is_empty() {
                return Ok(node);
            }
            return self.put_compacted(depth, CompactedLeaf::new(*key, leaf.clone()));
        }

        match self.fetch_on_path(depth, &node.hash, key)? {
            StoredNode::CompactedLeaf(existing) if existing.key == *key => {
                if leaf.is_empty() {
                    return Ok(self.empty[depth]);
                }
                self.put_compacted(depth, CompactedLeaf::new(*key, leaf.clone()))
            }
            StoredNode::CompactedLeaf(existing) => {
                if leaf.is_empty() {
                    return Ok(node);
                }
                self.merge_leaves(depth, existing, CompactedLeaf::new(*key, leaf.clone()))
            }
            StoredNode::Branch(branch) => {
                let (left, right) = if bit_index(depth, key) == 0 {
                    (self.insert_at(depth + 1, branch.left, key, leaf)?, branch.right)
                } else {
                    (branch.left, self.insert_at(depth + 1, branch.right, key, leaf)?)
                };
                self.put_branch(depth, key, left, right)
            }
        }
    }

    /// Splits two compacted leaves sharing a subtree at `depth` into branches
    /// down to the first bit where their keys differ.
    fn merge_leaves(
        &mut self,
        depth: usize,
        a: CompactedLeaf,
        b: CompactedLeaf,
    ) -> Result<ComputedNode, Error> {
        let a_bit = bit_index(depth, &a.key);
        let b_bit = bit_index(depth, &b.key);

        let (left, right) = if a_bit == b_bit {
            let merged = self.merge_leaves(depth + 1, a, b)?;
            if a_bit == 0 {
                (merged, self.empty[depth + 1])
            } else {
                (self.empty[depth + 1], merged)
            }
        } else {
            let a_node = self.put_compacted(depth + 1, a)?;
            let b_node = self.put_compacted(depth + 1, b)?;
            if a_bit == 0 { (a_node, b_node) } else { (b_node, a_node) }
        };

        let branch = BranchNode::new(left, right)?;
        self.store
            .put(branch.node_hash(), StoredNode::Branch(branch))?;
        Ok(branch.computed())
    }

    /// Stores a branch at `depth` on the path of `key`, collapsing it when it
    /// holds a single key.
    fn put_branch(
        &mut self,
        depth: usize,
        key: &[u8; 32],
        left: ComputedNode,
        right: ComputedNode,
    ) -> Result<ComputedNode, Error> {
        let child_empty = self.empty[depth + 1];
        let lone_child = match (left == child_empty, right == child_empty) {
            (true, true) => return Ok(self.empty[depth]),
            (true, false) => Some((right, 1)),
            (false, true) => Some((left, 0)),
            (false, false) => None,
        };

        if let Some((child, side)) = lone_child {
            let child_path = with_bit(key, depth, side);
            if let StoredNode::CompactedLeaf(compacted) =
                self.fetch_on_path(depth + 1, &child.hash, &child_path)?
            {
                return self.put_compacted(depth, compacted);
            }
        }

        let branch = BranchNode::new(left, right)?;
        self.store
            .put(branch.node_hash(), StoredNode::Branch(branch))?;
        Ok(branch.computed())
    }

    fn put_compacted(
        &mut self,
        depth: usize,
        compacted: CompactedLeaf,
    ) -> Result<ComputedNode, Error> {
        let node = compacted.node_at(depth, &self.empty)?;
        self.store
            .put(node.hash, StoredNode::CompactedLeaf(compacted))?;
        Ok(node)
    }
}

/// Returns `key` with the bit selecting the child at `depth` set to `bit`.
fn with_bit(key: &[u8; 32], depth: usize, bit: u8) -> [u8; 32] {
    let mut out = *key;
    let mask = 1u8 << (depth % 8);
    if bit == 0 {
        out[depth / 8] &= !mask;
    } else {
        out[depth / 8] |= mask;
    }
    out
}
