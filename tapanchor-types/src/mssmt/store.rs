use alloc::collections::BTreeMap;

use crate::error::Error;
use crate::mssmt::node::{BranchNode, CompactedLeaf, NodeHash};

/// A node as persisted in a tree store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredNode {
    /// An inner node with two non-empty or mixed children.
    Branch(BranchNode),
    /// A subtree holding exactly one populated key.
    CompactedLeaf(CompactedLeaf),
}

/// Content-addressed node storage consumed by [`CompactedTree`].
///
/// Empty subtrees are never stored; the tree recognises them by digest.
///
/// [`CompactedTree`]: crate::mssmt::CompactedTree
pub trait TreeStore {
    /// Fetches the node stored under `hash`, if any.
    fn get(&self, hash: &NodeHash) -> Result<Option<StoredNode>, Error>;

    /// Stores `node` under `hash`.
    fn put(&mut self, hash: NodeHash, node: StoredNode) -> Result<(), Error>;

    /// Removes the node stored under `hash`.
    fn delete(&mut self, hash: &NodeHash) -> Result<(), Error>;
}

/// In-memory, append-only node store.
///
/// Superseded nodes stay addressable, so any root previously returned by a
/// tree can still be walked.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: BTreeMap<NodeHash, StoredNode>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes held by the store.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl TreeStore for MemoryStore {
    fn get(&self, hash: &NodeHash) -> Result<Option<StoredNode>, Error> {
        Ok(self.nodes.get(hash).cloned())
    }

    fn put(&mut self, hash: NodeHash, node: StoredNode) -> Result<(), Error> {
        self.nodes.entry(hash).or_insert(node);
        Ok(())
    }

    fn delete(&mut self, hash: &NodeHash) -> Result<(), Error> {
        self.nodes.remove(hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mssmt::node::{LeafNode, Node};

    #[test]
    fn memory_store_is_content_addressed() {
        let mut store = MemoryStore::new();
        let leaf = LeafNode::new(b"asset".to_vec(), 10);
        let node = StoredNode::CompactedLeaf(CompactedLeaf::new([7u8; 32], leaf.clone()));
        let hash = leaf.node_hash();

        store.put(hash, node.clone()).unwrap();
        store.put(hash, node.clone()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&hash).unwrap(), Some(node));

        store.delete(&hash).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.get(&hash).unwrap(), None);
    }
}
