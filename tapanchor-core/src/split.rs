//! Split commitments.
//!
//! A transfer partitions its inputs among several locators. Every output
//! asset is inserted into a dedicated MS-SMT; the root locator's asset carries
//! that tree's root and the provenance of every input, and each output asset
//! carries a proof into the tree together with a copy of the root asset.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};

use bitcoin::OutPoint;
use bitcoin::hashes::{Hash, HashEngine, sha256::Hash as Sha256Hash};
use serde::{Deserialize, Serialize};
use tapanchor_types::asset::{Asset, AssetID, PrevId, SerializedKey, SplitCommitment as SplitWitness, Witness};
use tapanchor_types::error::Error as TypesError;
use tapanchor_types::mssmt::{CompactedTree, ComputedNode, MemoryStore, Node};
use thiserror::Error;
use tracing::{debug, warn};

/// Un-spendable script key a zero-value root locator must use.
pub const NUMS_SCRIPT_KEY: SerializedKey = SerializedKey::new([
    0x02, 0x7c, 0x79, 0xb9, 0xb2, 0x6e, 0x46, 0x38, 0x95, 0xee, 0xf5, 0x67, 0x9d, 0x85, 0x58, 0x94,
    0x2c, 0x86, 0xc4, 0xad, 0x22, 0x33, 0xad, 0xef, 0x01, 0xbc, 0x3e, 0x6d, 0x54, 0x0b, 0x36, 0x53,
    0xfe,
]);

/// Errors returned while creating or verifying split commitments.
#[derive(Error, Debug)]
pub enum Error {
    /// No external locator was given.
    #[error("at least one locator should be specified")]
    InvalidSplitLocator,
    /// A non-root locator carries no value.
    #[error("split locator for output {0} has zero amount")]
    ZeroSplitAmount(u32),
    /// Locator amounts do not add up to the input amount.
    #[error("invalid split amounts: inputs hold {total}, locators allocate {allocated}")]
    InvalidSplitAmount {
        /// Sum of the input amounts.
        total: u64,
        /// Sum of the locator amounts, saturated on overflow.
        allocated: u64,
    },
    /// Two locators name the same output.
    #[error("found locator with duplicate output index {0}")]
    DuplicateSplitOutputIndex(u32),
    /// A zero-value root locator does not use the un-spendable script key.
    #[error("invalid script key for zero-amount locator")]
    InvalidScriptKey,
    /// A root locator using the un-spendable script key carries value.
    #[error("un-spendable root locator has non-zero amount")]
    NonZeroSplitAmount,
    /// No input was given.
    #[error("split requires at least one input")]
    NoInputs,
    /// The inputs do not share one asset ID.
    #[error("split inputs have different asset IDs")]
    InputAssetMismatch,
    /// A locator names an asset ID other than the inputs'.
    #[error("split locator for output {0} does not match the input asset ID")]
    LocatorAssetMismatch(u32),
    /// The asset is not a split output.
    #[error("asset has no split commitment witness")]
    MissingSplitCommitment,
    /// The split root asset carries no split tree root.
    #[error("split root asset has no split commitment root")]
    MissingSplitCommitmentRoot,
    /// The split output and its root asset have different asset IDs.
    #[error("split output asset ID does not match its root asset")]
    RootAssetMismatch,
    /// The split output's proof does not lead to the root asset's split root.
    #[error("invalid split commitment proof")]
    InvalidSplitCommitmentProof,
    /// MS-SMT operation failed.
    #[error(transparent)]
    Tree(#[from] TypesError),
}

/// Destination of one share of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SplitLocator {
    /// Index of the anchor transaction output receiving the share.
    pub output_index: u32,
    pub asset_id: AssetID,
    /// Script key of the recipient.
    pub script_key: SerializedKey,
    pub amount: u64,
}

impl SplitLocator {
    /// Locates an existing split output anchored at `output_index`.
    pub fn from_asset(asset: &Asset, output_index: u32) -> Self {
        Self {
            output_index,
            asset_id: asset.id(),
            script_key: asset.script_key,
            amount: asset.amount,
        }
    }

    /// Key of the share in the split tree:
    /// `sha256(be32(output_index) || asset_id || schnorr(script_key))`.
    pub fn hash(&self) -> [u8; 32] {
        let mut engine = Sha256Hash::engine();
        engine.input(&self.output_index.to_be_bytes());
        engine.input(&self.asset_id.to_byte_array());
        engine.input(&self.script_key.schnorr_serialized());
        Sha256Hash::from_engine(engine).to_byte_array()
    }
}

/// An asset consumed by a split and the outpoint anchoring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitCommitmentInput {
    pub asset: Asset,
    pub out_point: OutPoint,
}

/// One output asset of a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAsset {
    pub asset: Asset,
    pub output_index: u32,
}

/// The result of splitting a set of inputs among locators.
#[derive(Debug, Clone)]
pub struct SplitCommitment {
    prev_assets: BTreeMap<PrevId, Asset>,
    root_asset: Asset,
    split_assets: BTreeMap<SplitLocator, SplitAsset>,
    tree: CompactedTree<MemoryStore>,
}

impl SplitCommitment {
    /// Splits `inputs` between `root_locator` and `external_locators`.
    ///
    /// Every locator is validated before the split tree is built, so a
    /// rejected split leaves nothing behind.
    pub fn new(
        inputs: &[SplitCommitmentInput],
        root_locator: &SplitLocator,
        external_locators: &[SplitLocator],
    ) -> Result<Self, Error> {
        let template = &inputs.first().ok_or(Error::NoInputs)?.asset;
        let asset_id = template.id();
        if inputs.iter().any(|input| input.asset.id() != asset_id) {
            return Err(Error::InputAssetMismatch);
        }
        validate_locators(inputs, asset_id, root_locator, external_locators)?;

        let mut tree = CompactedTree::new(MemoryStore::new());
        let mut split_assets = BTreeMap::new();
        let locators = external_locators
            .iter()
            .chain(core::iter::once(root_locator));
        for locator in locators.clone() {
            let mut asset = template.clone();
            asset.amount = locator.amount;
            asset.script_key = locator.script_key;
            asset.prev_witnesses = alloc::vec![Witness::genesis()];
            asset.split_commitment_root = None;

            tree.insert(&locator.hash(), asset.leaf())?;
            split_assets.insert(
                *locator,
                SplitAsset {
                    asset,
                    output_index: locator.output_index,
                },
            );
        }

        let mut root_asset = split_assets
            .get(root_locator)
            .map(|split| split.asset.clone())
            .ok_or(Error::InvalidSplitLocator)?;
        let mut prev_assets = BTreeMap::new();
        root_asset.prev_witnesses = inputs
            .iter()
            .map(|input| {
                let prev_id = PrevId {
                    out_point: input.out_point,
                    asset_id: input.asset.id(),
                    script_key: input.asset.script_key,
                };
                prev_assets.insert(prev_id, input.asset.clone());
                Witness {
                    prev_id: Some(prev_id),
                    split_commitment: None,
                }
            })
            .collect();
        let split_root = tree.root()?;
        root_asset.split_commitment_root = Some(split_root.computed());

        for locator in locators {
            let proof = tree.merkle_proof(&locator.hash())?;
            if let Some(split) = split_assets.get_mut(locator) {
                split.asset.prev_witnesses[0].split_commitment = Some(SplitWitness {
                    proof,
                    root_asset: Box::new(root_asset.clone()),
                });
            }
        }

        debug!(
            %asset_id,
            inputs = inputs.len(),
            outputs = split_assets.len(),
            root = %split_root.node_hash(),
            "created split commitment"
        );

        Ok(Self {
            prev_assets,
            root_asset,
            split_assets,
            tree,
        })
    }

    /// The asset of the root locator, carrying the split tree root.
    pub fn root_asset(&self) -> &Asset {
        &self.root_asset
    }

    /// Every output asset, including the root locator's share.
    pub fn split_assets(&self) -> &BTreeMap<SplitLocator, SplitAsset> {
        &self.split_assets
    }

    pub fn split_asset(&self, locator: &SplitLocator) -> Option<&SplitAsset> {
        self.split_assets.get(locator)
    }

    /// The consumed assets by their previous IDs.
    pub fn prev_assets(&self) -> &BTreeMap<PrevId, Asset> {
        &self.prev_assets
    }

    pub fn tree_root(&self) -> ComputedNode {
        self.tree.root_node()
    }
}

/// Checks the locator set before any tree is built.
fn validate_locators(
    inputs: &[SplitCommitmentInput],
    asset_id: AssetID,
    root_locator: &SplitLocator,
    external_locators: &[SplitLocator],
) -> Result<(), Error> {
    if external_locators.is_empty() {
        return Err(Error::InvalidSplitLocator);
    }

    if root_locator.amount == 0 && root_locator.script_key != NUMS_SCRIPT_KEY {
        return Err(Error::InvalidScriptKey);
    }
    if root_locator.script_key == NUMS_SCRIPT_KEY && root_locator.amount != 0 {
        return Err(Error::NonZeroSplitAmount);
    }

    let mut output_indexes = BTreeSet::new();
    for locator in external_locators.iter().chain(core::iter::once(root_locator)) {
        if !output_indexes.insert(locator.output_index) {
            return Err(Error::DuplicateSplitOutputIndex(locator.output_index));
        }
        if locator.asset_id != asset_id {
            return Err(Error::LocatorAssetMismatch(locator.output_index));
        }
    }

    if let Some(locator) = external_locators.iter().find(|locator| locator.amount == 0) {
        return Err(Error::ZeroSplitAmount(locator.output_index));
    }

    let total = inputs
        .iter()
        .try_fold(0u64, |sum, input| sum.checked_add(input.asset.amount));
    let allocated = external_locators
        .iter()
        .chain(core::iter::once(root_locator))
        .try_fold(0u64, |sum, locator| sum.checked_add(locator.amount));
    match (total, allocated) {
        (Some(total), Some(allocated)) if total == allocated => Ok(()),
        (total, allocated) => {
            let total = total.unwrap_or(u64::MAX);
            let allocated = allocated.unwrap_or(u64::MAX);
            warn!(total, allocated, "split amounts do not balance");
            Err(Error::InvalidSplitAmount { total, allocated })
        }
    }
}

/// Verifies that a split output anchored at `output_index` is committed to
/// by the split root carried in its own witness.
pub fn verify_split_commitment(asset: &Asset, output_index: u32) -> Result<(), Error> {
    let split = asset
        .split_commitment()
        .ok_or(Error::MissingSplitCommitment)?;
    let root = split
        .root_asset
        .split_commitment_root
        .ok_or(Error::MissingSplitCommitmentRoot)?;
    if split.root_asset.id() != asset.id() {
        return Err(Error::RootAssetMismatch);
    }

    // The split tree holds each share as it looked before witnesses were attached.
    let mut share = asset.clone();
    share.prev_witnesses = alloc::vec![Witness::genesis()];
    share.split_commitment_root = None;

    let locator = SplitLocator::from_asset(asset, output_index);
    if split.proof.verify(&locator.hash(), &share.leaf(), &root) {
        Ok(())
    } else {
        Err(Error::InvalidSplitCommitmentProof)
    }
}
