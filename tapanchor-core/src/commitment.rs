//! Two-level asset commitments.
//!
//! An [`AssetCommitment`] is an MS-SMT over every asset sharing one asset ID,
//! keyed by [`Asset::asset_commitment_key`]. A [`TapCommitment`] is an MS-SMT
//! over the asset commitments anchored in one output, keyed by asset ID.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use bitcoin::ScriptBuf;
use bitcoin::hashes::{Hash, HashEngine, sha256::Hash as Sha256Hash};
use bitcoin::taproot::{LeafVersion, TapNodeHash};
use tapanchor_types::asset::Asset;
use tapanchor_types::commitment::{AssetProof, CommitmentProof, TaprootAssetProof};
use tapanchor_types::error::Error as TypesError;
use tapanchor_types::mssmt::{self, BranchNode, CompactedTree, LeafNode, MemoryStore, Node};
use thiserror::Error;
use tracing::{debug, trace};

/// Length in bytes of the tapscript leaf committing to a tap commitment.
pub const TAP_LEAF_SCRIPT_LEN: usize = 32 + 8;

/// Errors returned while building or querying commitments.
#[derive(Error, Debug)]
pub enum Error {
    /// No asset was supplied.
    #[error("asset commitment has no assets")]
    NoAssets,
    /// An asset does not belong to the commitment's asset ID.
    #[error("asset tap commitment key {actual} does not match {expected}")]
    AssetIdMismatch {
        /// Tap key of the commitment.
        expected: Sha256Hash,
        /// Tap key of the offending asset.
        actual: Sha256Hash,
    },
    /// The commitment was rebuilt from a digest and has no tree to query.
    #[error("commitment has no backing tree")]
    MissingTree,
    /// MS-SMT operation failed.
    #[error(transparent)]
    Tree(#[from] TypesError),
}

/// Computes the digest an asset commitment is identified by:
/// `sha256(tap_key || root.left.hash || root.right.hash || be64(root.sum))`.
pub fn asset_commitment_root(tap_key: &[u8; 32], root: &BranchNode) -> [u8; 32] {
    let mut engine = Sha256Hash::engine();
    engine.input(tap_key);
    engine.input(&root.left.hash.to_byte_array());
    engine.input(&root.right.hash.to_byte_array());
    engine.input(&root.node_sum().to_be_bytes());
    Sha256Hash::from_engine(engine).to_byte_array()
}

/// Builds the leaf an asset commitment contributes to the outer tree.
pub fn tap_commitment_leaf(tap_key: &[u8; 32], root: &BranchNode) -> LeafNode {
    let sum = root.node_sum();
    let mut value = Vec::with_capacity(32 + 8);
    value.extend_from_slice(&asset_commitment_root(tap_key, root));
    value.extend_from_slice(&sum.to_be_bytes());
    LeafNode::new(value, sum)
}

/// Every asset of one asset ID within one output.
#[derive(Debug, Clone)]
pub struct AssetCommitment {
    tap_key: [u8; 32],
    root: BranchNode,
    tree: Option<CompactedTree<MemoryStore>>,
    assets: BTreeMap<[u8; 32], Asset>,
}

impl AssetCommitment {
    /// Commits to `assets`, which must all share the first asset's tap commitment key.
    pub fn new(assets: &[Asset]) -> Result<Self, Error> {
        let first = assets.first().ok_or(Error::NoAssets)?;
        let tap_key = first.tap_commitment_key();

        let tree = CompactedTree::new(MemoryStore::new());
        let mut commitment = Self {
            tap_key,
            root: tree.root()?,
            tree: Some(tree),
            assets: BTreeMap::new(),
        };
        for asset in assets {
            commitment.upsert(asset)?;
        }

        debug!(
            asset_id = %Sha256Hash::from_byte_array(tap_key),
            assets = commitment.assets.len(),
            sum = commitment.root.node_sum(),
            "built asset commitment"
        );
        Ok(commitment)
    }

    /// Rebuilds a digest-only commitment, as recovered from a proof.
    pub fn from_root(tap_key: [u8; 32], root: BranchNode) -> Self {
        Self {
            tap_key,
            root,
            tree: None,
            assets: BTreeMap::new(),
        }
    }

    pub fn tap_key(&self) -> [u8; 32] {
        self.tap_key
    }

    /// Root of the inner tree.
    pub fn tree_root(&self) -> &BranchNode {
        &self.root
    }

    /// Committed assets by asset commitment key.
    pub fn assets(&self) -> &BTreeMap<[u8; 32], Asset> {
        &self.assets
    }

    /// Inserts `asset`, replacing any asset at the same key.
    pub fn upsert(&mut self, asset: &Asset) -> Result<(), Error> {
        let actual = asset.tap_commitment_key();
        if actual != self.tap_key {
            return Err(Error::AssetIdMismatch {
                expected: Sha256Hash::from_byte_array(self.tap_key),
                actual: Sha256Hash::from_byte_array(actual),
            });
        }

        let tree = self.tree.as_mut().ok_or(Error::MissingTree)?;
        let key = asset.asset_commitment_key();
        self.root = tree.insert(&key, asset.leaf())?;
        self.assets.insert(key, asset.clone());
        Ok(())
    }

    /// Upserts every asset of `other` into this commitment.
    pub fn merge(&mut self, other: &AssetCommitment) -> Result<(), Error> {
        if other.assets.is_empty() {
            return Err(Error::NoAssets);
        }
        for asset in other.assets.values() {
            self.upsert(asset)?;
        }
        Ok(())
    }

    /// Returns the asset at `key`, if present, and its inclusion or exclusion proof.
    pub fn asset_proof(&self, key: &[u8; 32]) -> Result<(Option<Asset>, mssmt::Proof), Error> {
        let tree = self.tree.as_ref().ok_or(Error::MissingTree)?;
        let proof = tree.merkle_proof(key)?;
        Ok((self.assets.get(key).cloned(), proof))
    }

    /// Digest identifying this commitment.
    pub fn commitment_root(&self) -> [u8; 32] {
        asset_commitment_root(&self.tap_key, &self.root)
    }

    /// Leaf this commitment contributes to a tap commitment.
    pub fn tap_commitment_leaf(&self) -> LeafNode {
        tap_commitment_leaf(&self.tap_key, &self.root)
    }
}

/// Every asset commitment anchored in one taproot output.
#[derive(Debug, Clone)]
pub struct TapCommitment {
    tree_root: BranchNode,
    tree: Option<CompactedTree<MemoryStore>>,
    asset_commitments: BTreeMap<[u8; 32], AssetCommitment>,
}

impl TapCommitment {
    /// Commits to `commitments`. Commitments sharing a tap key are merged
    /// into the first one seen.
    pub fn new(commitments: Vec<AssetCommitment>) -> Result<Self, Error> {
        let tree = CompactedTree::new(MemoryStore::new());
        let mut tap_commitment = Self {
            tree_root: tree.root()?,
            tree: Some(tree),
            asset_commitments: BTreeMap::new(),
        };
        for commitment in commitments {
            tap_commitment.upsert(commitment)?;
        }

        debug!(
            asset_ids = tap_commitment.asset_commitments.len(),
            root = %tap_commitment.tree_root.node_hash(),
            sum = tap_commitment.tree_root.node_sum(),
            "built tap commitment"
        );
        Ok(tap_commitment)
    }

    /// Builds a tap commitment over the given assets, grouping them by asset ID.
    pub fn from_assets(assets: &[Asset]) -> Result<Self, Error> {
        let mut grouped: BTreeMap<[u8; 32], Vec<Asset>> = BTreeMap::new();
        for asset in assets {
            grouped
                .entry(asset.tap_commitment_key())
                .or_default()
                .push(asset.clone());
        }

        let commitments = grouped
            .values()
            .map(|group| AssetCommitment::new(group))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(commitments)
    }

    /// Rebuilds a digest-only tap commitment, as recovered from a proof.
    pub fn from_root(tree_root: BranchNode) -> Self {
        Self {
            tree_root,
            tree: None,
            asset_commitments: BTreeMap::new(),
        }
    }

    pub fn tree_root(&self) -> &BranchNode {
        &self.tree_root
    }

    pub fn asset_commitments(&self) -> &BTreeMap<[u8; 32], AssetCommitment> {
        &self.asset_commitments
    }

    /// Inserts an asset commitment, merging it into an existing one at the same tap key.
    pub fn upsert(&mut self, commitment: AssetCommitment) -> Result<(), Error> {
        let tap_key = commitment.tap_key();
        let tree = self.tree.as_mut().ok_or(Error::MissingTree)?;
        let leaf = match self.asset_commitments.get_mut(&tap_key) {
            Some(existing) => {
                existing.merge(&commitment)?;
                existing.tap_commitment_leaf()
            }
            None => {
                let leaf = commitment.tap_commitment_leaf();
                self.asset_commitments.insert(tap_key, commitment);
                leaf
            }
        };
        self.tree_root = tree.insert(&tap_key, leaf)?;
        Ok(())
    }

    /// Builds the proof of the asset at `asset_key` under `tap_key`.
    ///
    /// The outer proof is always produced. The inner proof is produced only
    /// when an asset commitment exists at `tap_key`; the returned asset is
    /// `None` when the asset is absent at either level.
    pub fn proof(
        &self,
        tap_key: &[u8; 32],
        asset_key: &[u8; 32],
    ) -> Result<(Option<Asset>, CommitmentProof), Error> {
        let tree = self.tree.as_ref().ok_or(Error::MissingTree)?;
        let taproot_asset_proof = TaprootAssetProof {
            proof: tree.merkle_proof(tap_key)?,
        };

        let Some(commitment) = self.asset_commitments.get(tap_key) else {
            trace!("no asset commitment at tap key, proving commitment exclusion");
            return Ok((
                None,
                CommitmentProof {
                    asset_proof: None,
                    taproot_asset_proof,
                },
            ));
        };

        let (asset, proof) = commitment.asset_proof(asset_key)?;
        Ok((
            asset,
            CommitmentProof {
                asset_proof: Some(AssetProof {
                    proof,
                    tap_key: *tap_key,
                }),
                taproot_asset_proof,
            },
        ))
    }

    /// Script of the single tapscript leaf: `root.hash || be64(root.sum)`.
    ///
    /// The leaf is never executed; it only fixes the tapscript root.
    pub fn tap_leaf_script(&self) -> Vec<u8> {
        tap_leaf_script(&self.tree_root)
    }

    /// Tapscript root of the one-leaf script tree committing to this commitment.
    pub fn tapscript_root(&self) -> TapNodeHash {
        let script = ScriptBuf::from_bytes(self.tap_leaf_script());
        TapNodeHash::from_script(script.as_script(), LeafVersion::TapScript)
    }

    /// Every asset across all asset commitments.
    pub fn committed_assets(&self) -> Vec<Asset> {
        self.asset_commitments
            .values()
            .flat_map(|commitment| commitment.assets().values().cloned())
            .collect()
    }
}

/// Builds the tapscript leaf committing to a tap commitment root.
pub fn tap_leaf_script(root: &BranchNode) -> Vec<u8> {
    let mut script = Vec::with_capacity(TAP_LEAF_SCRIPT_LEN);
    script.extend_from_slice(&root.node_hash().to_byte_array());
    script.extend_from_slice(&root.node_sum().to_be_bytes());
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{OutPoint, Txid};
    use tapanchor_types::asset::{Genesis, SerializedKey};
    use tapanchor_types::mssmt::is_equal_node;

    fn genesis(name: &str) -> Genesis {
        Genesis::new(
            OutPoint {
                txid: Txid::from_byte_array([9u8; 32]),
                vout: 0,
            },
            name,
            0,
        )
    }

    fn key(byte: u8) -> SerializedKey {
        let mut bytes = [byte; 33];
        bytes[0] = 0x02;
        SerializedKey::new(bytes)
    }

    #[test]
    fn asset_commitment_rejects_mixed_ids() {
        let foo = Asset::new(genesis("FOO"), 10, key(1));
        let bar = Asset::new(genesis("BAR"), 10, key(1));
        assert!(matches!(
            AssetCommitment::new(&[foo.clone(), bar.clone()]),
            Err(Error::AssetIdMismatch { .. })
        ));
        assert!(matches!(AssetCommitment::new(&[]), Err(Error::NoAssets)));

        let mut commitment = AssetCommitment::new(&[foo]).unwrap();
        assert!(matches!(
            commitment.upsert(&bar),
            Err(Error::AssetIdMismatch { .. })
        ));
    }

    #[test]
    fn asset_commitment_sums_and_proves() {
        let a = Asset::new(genesis("FOO"), 10, key(1));
        let b = Asset::new(genesis("FOO"), 32, key(2));
        let commitment = AssetCommitment::new(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(commitment.tree_root().node_sum(), 42);
        assert_eq!(commitment.tap_commitment_leaf().sum, 42);

        let (found, proof) = commitment.asset_proof(&a.asset_commitment_key()).unwrap();
        assert_eq!(found, Some(a.clone()));
        let root = proof.root(&a.asset_commitment_key(), &a.leaf()).unwrap();
        assert!(is_equal_node(&root, commitment.tree_root()));

        let digest_only = AssetCommitment::from_root(commitment.tap_key(), root);
        assert_eq!(digest_only.commitment_root(), commitment.commitment_root());
        assert!(matches!(
            digest_only.asset_proof(&a.asset_commitment_key()),
            Err(Error::MissingTree)
        ));
    }

    #[test]
    fn merge_requires_assets() {
        let a = Asset::new(genesis("FOO"), 10, key(1));
        let b = Asset::new(genesis("FOO"), 5, key(2));
        let mut left = AssetCommitment::new(&[a]).unwrap();
        let right = AssetCommitment::new(&[b.clone()]).unwrap();
        left.merge(&right).unwrap();
        assert_eq!(left.assets().len(), 2);
        assert_eq!(left.tree_root().node_sum(), 15);

        let empty = AssetCommitment::from_root(left.tap_key(), *left.tree_root());
        assert!(matches!(left.merge(&empty), Err(Error::NoAssets)));
    }

    #[test]
    fn tap_commitment_merges_same_asset_id() {
        let a = Asset::new(genesis("FOO"), 10, key(1));
        let b = Asset::new(genesis("FOO"), 5, key(2));
        let c = Asset::new(genesis("BAR"), 7, key(3));
        let tap = TapCommitment::new(alloc::vec![
            AssetCommitment::new(&[a.clone()]).unwrap(),
            AssetCommitment::new(&[c.clone()]).unwrap(),
            AssetCommitment::new(&[b.clone()]).unwrap(),
        ])
        .unwrap();

        assert_eq!(tap.asset_commitments().len(), 2);
        assert_eq!(tap.tree_root().node_sum(), 22);
        assert_eq!(tap.committed_assets().len(), 3);

        let grouped = TapCommitment::from_assets(&[a, b, c]).unwrap();
        assert!(is_equal_node(grouped.tree_root(), tap.tree_root()));
    }

    #[test]
    fn tap_commitment_proofs_cover_inclusion_and_exclusion() {
        let a = Asset::new(genesis("FOO"), 10, key(1));
        let tap = TapCommitment::from_assets(&[a.clone()]).unwrap();

        let (found, proof) = tap
            .proof(&a.tap_commitment_key(), &a.asset_commitment_key())
            .unwrap();
        assert_eq!(found, Some(a.clone()));
        assert!(proof.asset_proof.is_some());

        let mut other_holder = a.clone();
        other_holder.script_key = key(5);
        let (found, proof) = tap
            .proof(
                &other_holder.tap_commitment_key(),
                &other_holder.asset_commitment_key(),
            )
            .unwrap();
        assert_eq!(found, None);
        assert!(proof.asset_proof.is_some());

        let absent = Asset::new(genesis("BAR"), 1, key(1));
        let (found, proof) = tap
            .proof(&absent.tap_commitment_key(), &absent.asset_commitment_key())
            .unwrap();
        assert_eq!(found, None);
        assert!(proof.asset_proof.is_none());
    }

    #[test]
    fn tap_leaf_script_layout() {
        let a = Asset::new(genesis("FOO"), 10, key(1));
        let tap = TapCommitment::from_assets(&[a]).unwrap();
        let script = tap.tap_leaf_script();
        assert_eq!(script.len(), TAP_LEAF_SCRIPT_LEN);
        assert_eq!(&script[..32], &tap.tree_root().node_hash().to_byte_array());
        assert_eq!(&script[32..], &10u64.to_be_bytes());
    }
}
