use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use bitcoin::hashes::{Hash, sha256::Hash as Sha256Hash};
use bitcoin::io::Read;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::mssmt::node::{
    BranchNode, ComputedNode, LeafNode, MAX_TREE_LEVELS, Node, bit_index, empty_tree, is_equal_node,
    parent,
};

/// Number of bytes used to pack one bit per tree level.
const PACKED_BITS_LEN: usize = MAX_TREE_LEVELS / 8;

/// Represents a merkle proof for a MS-SMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    /// Siblings that should be hashed with the leaf and its parents to arrive at the root.
    ///
    /// `nodes[0]` is the sibling of the leaf, `nodes[255]` a child of the root.
    pub nodes: Vec<ComputedNode>,
}

impl Proof {
    /// Wraps a full list of siblings, one per tree level.
    pub fn new(nodes: Vec<ComputedNode>) -> Result<Self, Error> {
        if nodes.len() != MAX_TREE_LEVELS {
            return Err(Error::InvalidProofLength {
                expected: MAX_TREE_LEVELS,
                actual: nodes.len(),
            });
        }
        Ok(Self { nodes })
    }

    /// Replays the proof for `leaf` at `key` and returns the resulting root.
    pub fn root(&self, key: &[u8; 32], leaf: &LeafNode) -> Result<BranchNode, Error> {
        if self.nodes.len() != MAX_TREE_LEVELS {
            return Err(Error::InvalidProofLength {
                expected: MAX_TREE_LEVELS,
                actual: self.nodes.len(),
            });
        }

        let mut current = leaf.computed();
        for depth in (1..MAX_TREE_LEVELS).rev() {
            let sibling = &self.nodes[MAX_TREE_LEVELS - 1 - depth];
            current = if bit_index(depth, key) == 0 {
                parent(&current, sibling)?
            } else {
                parent(sibling, &current)?
            };
        }

        let sibling = self.nodes[MAX_TREE_LEVELS - 1];
        if bit_index(0, key) == 0 {
            BranchNode::new(current, sibling)
        } else {
            BranchNode::new(sibling, current)
        }
    }

    /// Returns true if replaying `leaf` at `key` arrives at `root`.
    pub fn verify<N: Node>(&self, key: &[u8; 32], leaf: &LeafNode, root: &N) -> bool {
        match self.root(key, leaf) {
            Ok(derived) => is_equal_node(&derived, root),
            Err(_) => false,
        }
    }

    /// Elides every sibling that is the empty subtree at its level.
    pub fn compress(&self) -> CompressedProof {
        let empty = empty_tree();
        let mut bits = Vec::with_capacity(self.nodes.len());
        let mut nodes = Vec::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            let is_empty = MAX_TREE_LEVELS
                .checked_sub(idx)
                .map(|depth| empty[depth] == *node)
                .unwrap_or(false);
            bits.push(is_empty);
            if !is_empty {
                nodes.push(*node);
            }
        }
        CompressedProof { bits, nodes }
    }

    /// Encodes the proof in its compressed wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.compress().encode()
    }

    /// Decodes a proof from its compressed wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let compressed = CompressedProof::decode(bytes)?;
        if compressed.encoded_len() != bytes.len() {
            return Err(Error::InvalidCompressedProof(
                "trailing bytes after compressed proof".to_string(),
            ));
        }
        compressed.decompress()
    }
}

impl Serialize for Proof {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_bytes()))
    }
}

impl<'de> Deserialize<'de> for Proof {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(encoded).map_err(serde::de::Error::custom)?;
        Proof::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// A proof with empty siblings replaced by a bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedProof {
    /// One bit per level; set when the sibling is the empty subtree.
    pub bits: Vec<bool>,
    /// The siblings that are not empty, in level order.
    pub nodes: Vec<ComputedNode>,
}

impl CompressedProof {
    /// Expands the bitmap back into a full proof.
    pub fn decompress(&self) -> Result<Proof, Error> {
        if self.bits.len() != MAX_TREE_LEVELS {
            return Err(Error::InvalidCompressedProof(format!(
                "expected {} bits, got {}",
                MAX_TREE_LEVELS,
                self.bits.len()
            )));
        }

        let explicit = self.bits.iter().filter(|bit| !**bit).count();
        if explicit != self.nodes.len() {
            return Err(Error::InvalidCompressedProof(format!(
                "bitmap names {} explicit nodes, proof carries {}",
                explicit,
                self.nodes.len()
            )));
        }

        let empty = empty_tree();
        let mut explicit_nodes = self.nodes.iter();
        let mut nodes = Vec::with_capacity(MAX_TREE_LEVELS);
        for (idx, bit) in self.bits.iter().enumerate() {
            if *bit {
                nodes.push(empty[MAX_TREE_LEVELS - idx]);
            } else if let Some(node) = explicit_nodes.next() {
                nodes.push(*node);
            }
        }

        Proof::new(nodes)
    }

    /// Length in bytes of the encoded proof.
    pub fn encoded_len(&self) -> usize {
        2 + self.nodes.len() * 40 + PACKED_BITS_LEN
    }

    /// Encodes the compressed proof.
    ///
    /// Layout: node count (u16, big endian), then each node as a 32 byte hash
    /// and 8 byte big endian sum, then the bitmap packed LSB first.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        // At most MAX_TREE_LEVELS nodes are ever explicit.
        let node_count = u16::try_from(self.nodes.len()).unwrap_or(u16::MAX);
        out.extend_from_slice(&node_count.to_be_bytes());
        for node in &self.nodes {
            out.extend_from_slice(&node.hash.to_byte_array());
            out.extend_from_slice(&node.sum.to_be_bytes());
        }
        out.extend_from_slice(&pack_bits(&self.bits));
        out
    }

    /// Decodes a compressed proof from a reader.
    pub fn decode<R: Read>(mut r: R) -> Result<Self, Error> {
        let mut num_nodes_bytes = [0u8; 2];
        r.read_exact(&mut num_nodes_bytes).map_err(Error::Io)?;
        let num_nodes = u16::from_be_bytes(num_nodes_bytes) as usize;
        if num_nodes > MAX_TREE_LEVELS {
            return Err(Error::InvalidCompressedProof(format!(
                "too many explicit nodes: {}",
                num_nodes
            )));
        }

        let mut nodes = Vec::with_capacity(num_nodes);
        for _ in 0..num_nodes {
            let mut hash_bytes = [0u8; 32];
            r.read_exact(&mut hash_bytes).map_err(Error::Io)?;
            let mut sum_bytes = [0u8; 8];
            r.read_exact(&mut sum_bytes).map_err(Error::Io)?;
            nodes.push(ComputedNode {
                hash: Sha256Hash::from_byte_array(hash_bytes),
                sum: u64::from_be_bytes(sum_bytes),
            });
        }

        let mut packed_bits = [0u8; PACKED_BITS_LEN];
        r.read_exact(&mut packed_bits).map_err(Error::Io)?;

        let compressed = Self {
            bits: unpack_bits(&packed_bits),
            nodes,
        };
        let explicit = compressed.bits.iter().filter(|bit| !**bit).count();
        if explicit != compressed.nodes.len() {
            return Err(Error::InvalidCompressedProof(
                "bit/node count mismatch: unset bits != explicit nodes".to_string(),
            ));
        }

        Ok(compressed)
    }
}

/// Packs a bit slice into bytes using little-endian bit ordering.
fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.resize(bits.len().div_ceil(8), 0);
    for (idx, bit) in bits.iter().enumerate() {
        if *bit {
            bytes[idx / 8] |= 1 << (idx % 8);
        }
    }
    bytes
}

/// Unpacks little-endian ordered bits.
fn unpack_bits(bytes: &[u8]) -> Vec<bool> {
    (0..bytes.len() * 8)
        .map(|idx| (bytes[idx / 8] >> (idx % 8)) & 1 == 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse_proof() -> Proof {
        let empty = empty_tree();
        let mut nodes: Vec<ComputedNode> =
            (0..MAX_TREE_LEVELS).map(|idx| empty[MAX_TREE_LEVELS - idx]).collect();
        nodes[3] = LeafNode::new(b"sibling".to_vec(), 5).computed();
        nodes[200] = LeafNode::new(b"other".to_vec(), 9).computed();
        Proof::new(nodes).unwrap()
    }

    #[test]
    fn compressed_proof_carries_only_explicit_nodes() {
        let proof = sparse_proof();
        let compressed = proof.compress();
        assert_eq!(compressed.nodes.len(), 2);
        assert_eq!(compressed.bits.iter().filter(|b| !**b).count(), 2);
        assert!(!compressed.bits[3]);
        assert!(!compressed.bits[200]);

        let bytes = compressed.encode();
        assert_eq!(bytes.len(), 2 + 2 * 40 + PACKED_BITS_LEN);
        assert_eq!(&bytes[..2], &[0, 2]);
        assert_eq!(Proof::from_bytes(&bytes).unwrap(), proof);
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let bytes = sparse_proof().to_bytes();
        let err = Proof::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn decode_rejects_bitmap_mismatch() {
        let mut bytes = sparse_proof().to_bytes();
        // Claim the leaf-level sibling is empty while still carrying its node.
        let bitmap_start = bytes.len() - PACKED_BITS_LEN;
        bytes[bitmap_start] |= 1 << 3;
        assert!(matches!(
            Proof::from_bytes(&bytes),
            Err(Error::InvalidCompressedProof(_))
        ));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = sparse_proof().to_bytes();
        bytes.push(0);
        assert!(matches!(
            Proof::from_bytes(&bytes),
            Err(Error::InvalidCompressedProof(_))
        ));
    }

    #[test]
    fn short_proof_is_rejected() {
        let empty = empty_tree();
        assert!(matches!(
            Proof::new(empty[..10].to_vec()),
            Err(Error::InvalidProofLength { actual: 10, .. })
        ));
    }

    #[test]
    fn proof_serializes_as_hex() {
        let proof = sparse_proof();
        let json = serde_json::to_string(&proof).unwrap();
        assert_eq!(json, alloc::format!("\"{}\"", hex::encode(proof.to_bytes())));
        let decoded: Proof = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, proof);
    }
}
