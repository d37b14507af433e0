//! Proof-level verification helpers.

use alloc::collections::BTreeSet;

use bitcoin::{OutPoint, Transaction};
use serde::{Deserialize, Serialize};
use tapanchor_types::asset::{Asset, SerializedKey};
use tapanchor_types::proof::Proof;
use tracing::{debug, warn};

use crate::TaprootOps;
use crate::commitment::TapCommitment;
use crate::split::verify_split_commitment;
use crate::verify::{taproot_proof, tx};

/// Proof verification stage used for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofStage {
    /// Inclusion proof verification stage.
    Inclusion,
    /// Exclusion proof verification stage.
    Exclusion,
    /// Split root proof verification stage.
    SplitRoot,
}

impl core::fmt::Display for ProofStage {
    /// Formats the stage for display.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProofStage::Inclusion => write!(f, "inclusion"),
            ProofStage::Exclusion => write!(f, "exclusion"),
            ProofStage::SplitRoot => write!(f, "split_root"),
        }
    }
}

/// Errors returned by proof verification helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Taproot proof verification failed at a specific stage.
    TaprootProof {
        /// Stage where verification failed.
        stage: ProofStage,
        /// Underlying taproot proof error.
        source: taproot_proof::Error,
    },
    /// The inclusion proof did not resolve to a tap commitment.
    MissingCommitmentProof,
    /// Split root proof is missing for a split commitment asset.
    MissingSplitRootProof,
    /// The split output is not committed to by its root asset.
    InvalidSplitCommitmentProof,
    /// A P2TR output of the anchor transaction has no exclusion proof.
    MissingExclusionProofs {
        /// First output lacking an exclusion proof.
        output_index: u32,
    },
    /// Genesis reveal is present for a non-genesis asset.
    NonGenesisAssetWithGenesisReveal,
    /// Genesis reveal is required for a genesis asset.
    GenesisRevealRequired,
    /// Genesis reveal prev out does not match the proof prev out.
    GenesisRevealPrevOutMismatch,
    /// Genesis reveal output index does not match the inclusion proof.
    GenesisRevealOutputIndexMismatch,
    /// Genesis reveal asset ID does not match the asset genesis.
    GenesisRevealAssetIdMismatch,
}

impl core::fmt::Display for Error {
    /// Formats the error for display.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::TaprootProof { stage, source } => {
                write!(f, "taproot proof {} error: {}", stage, source)
            }
            Error::MissingCommitmentProof => write!(f, "missing commitment proof"),
            Error::MissingSplitRootProof => write!(f, "missing split root proof"),
            Error::InvalidSplitCommitmentProof => write!(f, "invalid split commitment proof"),
            Error::MissingExclusionProofs { output_index } => {
                write!(f, "missing exclusion proof for output {}", output_index)
            }
            Error::NonGenesisAssetWithGenesisReveal => {
                write!(f, "non-genesis asset with genesis reveal")
            }
            Error::GenesisRevealRequired => write!(f, "genesis reveal required"),
            Error::GenesisRevealPrevOutMismatch => write!(f, "genesis reveal prev out mismatch"),
            Error::GenesisRevealOutputIndexMismatch => {
                write!(f, "genesis reveal output index mismatch")
            }
            Error::GenesisRevealAssetIdMismatch => write!(f, "genesis reveal asset id mismatch"),
        }
    }
}

/// The state of an asset as established by a verified proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSnapshot {
    /// The asset as proven.
    pub asset: Asset,
    /// Outpoint holding the asset.
    pub out_point: OutPoint,
    /// Transaction anchoring the asset.
    pub anchor_tx: Transaction,
    /// Index of the anchor output.
    pub output_index: u32,
    /// Internal key of the anchor output.
    pub internal_key: SerializedKey,
    /// Tap commitment recovered from the inclusion proof.
    #[serde(skip)]
    pub script_root: Option<TapCommitment>,
    /// Whether the asset is a split output.
    pub split_asset: bool,
}

/// Verifies a single proof and returns the asset snapshot it establishes.
///
/// Checks, in order: the inclusion proof, the split root and split
/// commitment proofs of split outputs, an exclusion proof for every other
/// P2TR output, and the genesis reveal.
pub fn verify_proof<O: TaprootOps>(ops: &O, proof: &Proof) -> Result<AssetSnapshot, Error> {
    let tap_commitment = verify_inclusion_proof(ops, proof)?;

    let split_asset = proof.asset.has_split_commitment_witness();
    if split_asset {
        verify_split_root_proof(ops, proof)?;
    }

    verify_exclusion_proofs(ops, proof)?;
    verify_genesis_reveal(proof)?;

    debug!(
        asset_id = %proof.asset.id(),
        out_point = %proof.out_point(),
        amount = proof.asset.amount,
        split_asset,
        "verified proof"
    );

    Ok(AssetSnapshot {
        asset: proof.asset.clone(),
        out_point: proof.out_point(),
        anchor_tx: proof.anchor_tx.clone(),
        output_index: proof.inclusion_proof.output_index,
        internal_key: proof.inclusion_proof.internal_key,
        script_root: Some(tap_commitment),
        split_asset,
    })
}

/// Verifies the inclusion proof for the resulting asset.
pub fn verify_inclusion_proof<O: TaprootOps>(
    ops: &O,
    proof: &Proof,
) -> Result<TapCommitment, Error> {
    taproot_proof::verify_taproot_proof_with_commitment(
        ops,
        &proof.anchor_tx,
        &proof.inclusion_proof,
        &proof.asset,
        true,
    )
    .map_err(|err| Error::TaprootProof {
        stage: ProofStage::Inclusion,
        source: err,
    })?
    .ok_or(Error::MissingCommitmentProof)
}

/// Verifies that the split root asset is anchored and commits to the asset.
pub fn verify_split_root_proof<O: TaprootOps>(ops: &O, proof: &Proof) -> Result<(), Error> {
    let split_proof = proof
        .split_root_proof
        .as_ref()
        .ok_or(Error::MissingSplitRootProof)?;
    let split = proof
        .asset
        .split_commitment()
        .ok_or(Error::InvalidSplitCommitmentProof)?;

    taproot_proof::verify_taproot_proof(ops, &proof.anchor_tx, split_proof, &split.root_asset, true)
        .map_err(|err| Error::TaprootProof {
            stage: ProofStage::SplitRoot,
            source: err,
        })?;

    verify_split_commitment(&proof.asset, proof.inclusion_proof.output_index).map_err(|err| {
        warn!(%err, "split commitment proof rejected");
        Error::InvalidSplitCommitmentProof
    })
}

/// Verifies that every P2TR output besides the inclusion output is proven
/// not to hold the asset.
pub fn verify_exclusion_proofs<O: TaprootOps>(ops: &O, proof: &Proof) -> Result<(), Error> {
    let mut p2tr_outputs: BTreeSet<u32> =
        tx::p2tr_output_indices(&proof.anchor_tx, Some(proof.inclusion_proof.output_index));

    for exclusion in &proof.exclusion_proofs {
        taproot_proof::verify_taproot_proof(ops, &proof.anchor_tx, exclusion, &proof.asset, false)
            .map_err(|err| Error::TaprootProof {
                stage: ProofStage::Exclusion,
                source: err,
            })?;
        p2tr_outputs.remove(&exclusion.output_index);
    }

    match p2tr_outputs.first() {
        Some(&output_index) => Err(Error::MissingExclusionProofs { output_index }),
        None => Ok(()),
    }
}

/// Verifies that a genesis reveal is present exactly for genesis assets and
/// matches the proof.
pub fn verify_genesis_reveal(proof: &Proof) -> Result<(), Error> {
    if !proof.asset.is_genesis_asset() {
        return match proof.genesis_reveal {
            Some(_) => Err(Error::NonGenesisAssetWithGenesisReveal),
            None => Ok(()),
        };
    }

    let reveal = proof
        .genesis_reveal
        .as_ref()
        .ok_or(Error::GenesisRevealRequired)?;
    if reveal.first_prev_out != proof.prev_out {
        return Err(Error::GenesisRevealPrevOutMismatch);
    }
    if reveal.output_index != proof.inclusion_proof.output_index {
        return Err(Error::GenesisRevealOutputIndexMismatch);
    }
    if reveal.id() != proof.asset.id() {
        return Err(Error::GenesisRevealAssetIdMismatch);
    }
    Ok(())
}
