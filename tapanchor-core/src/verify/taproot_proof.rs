//! Taproot proof verification helpers.

use bitcoin::secp256k1::XOnlyPublicKey;
use bitcoin::{Script, Transaction};
use tapanchor_types::asset::{Asset, SerializedKey};
use tapanchor_types::commitment::CommitmentProof;
use tapanchor_types::mssmt::{LeafNode, Node};
use tapanchor_types::proof::{TaprootProof, TaprootProofKind, TapscriptProof};
use tracing::trace;

use crate::commitment::{TapCommitment, tap_commitment_leaf};
use crate::{OpsError, TaprootOps, taproot_output_key_for_commitment};

/// Errors returned by taproot proof verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Taproot output index is invalid.
    InvalidTaprootOutputIndex {
        /// Index requested in the anchor transaction outputs.
        output_index: u32,
        /// Total number of outputs in the anchor transaction.
        output_count: usize,
    },
    /// Script pubkey is not a Taproot v1 witness program.
    InvalidTaprootWitnessProgram,
    /// Taproot output key bytes are invalid.
    InvalidTaprootOutputKey,
    /// Taproot proof is missing a commitment proof.
    MissingCommitmentProof,
    /// Taproot proof is missing an asset proof.
    MissingAssetProof,
    /// Commitment exclusion proof unexpectedly carries an asset proof.
    UnexpectedAssetProof,
    /// Taproot proof derived key does not match the anchor output.
    InvalidTaprootProof,
    /// MS-SMT proof could not be replayed.
    InvalidMssmtProof,
    /// Tapscript proof does not claim a BIP-86 output.
    UnsupportedTapscriptProof,
    /// Taproot operation failed.
    Ops(OpsError),
}

impl From<OpsError> for Error {
    /// Converts an ops error into a taproot proof error.
    fn from(err: OpsError) -> Self {
        Self::Ops(err)
    }
}

impl core::fmt::Display for Error {
    /// Formats the error for display.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidTaprootOutputIndex {
                output_index,
                output_count,
            } => write!(
                f,
                "invalid taproot output index {} for {} outputs",
                output_index, output_count
            ),
            Error::InvalidTaprootWitnessProgram => {
                write!(f, "script pubkey is not a Taproot v1 witness program")
            }
            Error::InvalidTaprootOutputKey => write!(f, "invalid taproot output key"),
            Error::MissingCommitmentProof => write!(f, "missing commitment proof"),
            Error::MissingAssetProof => write!(f, "missing asset proof"),
            Error::UnexpectedAssetProof => {
                write!(f, "asset proof present in commitment exclusion proof")
            }
            Error::InvalidTaprootProof => write!(f, "invalid taproot proof"),
            Error::InvalidMssmtProof => write!(f, "invalid mssmt proof"),
            Error::UnsupportedTapscriptProof => {
                write!(f, "tapscript proof is not a BIP-86 proof")
            }
            Error::Ops(err) => core::fmt::Display::fmt(err, f),
        }
    }
}

/// What a taproot proof claims about its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofRole<'a> {
    /// The output commits to this asset.
    Inclusion(&'a Asset),
    /// The output commits to the asset's ID but not to the asset itself.
    AssetExclusion {
        /// Key of the asset inside its asset commitment.
        asset_key: [u8; 32],
        /// Key of the asset commitment inside the tap commitment.
        tap_key: [u8; 32],
    },
    /// The output has no asset commitment for the asset's ID.
    CommitmentExclusion {
        /// Key the asset commitment would have inside the tap commitment.
        tap_key: [u8; 32],
    },
    /// The output carries no tap commitment at all.
    TapscriptOnly(&'a TapscriptProof),
}

impl<'a> ProofRole<'a> {
    /// Classifies `proof`: the inclusion output first, then commitment
    /// exclusion proofs, then tapscript proofs.
    pub fn classify(proof: &'a TaprootProof, asset: &'a Asset, inclusion: bool) -> Self {
        if inclusion {
            return Self::Inclusion(asset);
        }
        match &proof.kind {
            TaprootProofKind::Commitment(commitment) if commitment.asset_proof.is_some() => {
                Self::AssetExclusion {
                    asset_key: asset.asset_commitment_key(),
                    tap_key: asset.tap_commitment_key(),
                }
            }
            TaprootProofKind::Commitment(_) => Self::CommitmentExclusion {
                tap_key: asset.tap_commitment_key(),
            },
            TaprootProofKind::Tapscript(tapscript) => Self::TapscriptOnly(tapscript),
        }
    }
}

/// Extracts the taproot output key from an anchor transaction output.
pub fn extract_taproot_key(
    anchor_tx: &Transaction,
    output_index: u32,
) -> Result<XOnlyPublicKey, Error> {
    let output_count = anchor_tx.output.len();
    let output =
        anchor_tx
            .output
            .get(output_index as usize)
            .ok_or(Error::InvalidTaprootOutputIndex {
                output_index,
                output_count,
            })?;

    extract_taproot_key_from_script(output.script_pubkey.as_script())
}

/// Extracts the taproot output key from a script pubkey.
pub fn extract_taproot_key_from_script(script: &Script) -> Result<XOnlyPublicKey, Error> {
    if !script.is_p2tr() {
        return Err(Error::InvalidTaprootWitnessProgram);
    }

    let bytes = script.as_bytes();
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&bytes[2..34]);

    XOnlyPublicKey::from_slice(&key_bytes).map_err(|_| Error::InvalidTaprootOutputKey)
}

/// Rebuilds the tap commitment an inclusion proof for `asset` leads to.
pub fn derive_by_asset_inclusion(
    proof: &CommitmentProof,
    asset: &Asset,
) -> Result<TapCommitment, Error> {
    let asset_proof = proof.asset_proof.as_ref().ok_or(Error::MissingAssetProof)?;
    let asset = asset.without_split_commitment();

    let asset_root = asset_proof
        .proof
        .root(&asset.asset_commitment_key(), &asset.leaf())
        .map_err(|_| Error::InvalidMssmtProof)?;
    let leaf = tap_commitment_leaf(&asset_proof.tap_key, &asset_root);
    derive_tap_root(proof, &asset.tap_commitment_key(), &leaf)
}

/// Rebuilds the tap commitment an asset exclusion proof leads to: the asset
/// commitment at `tap_key` exists but holds nothing at `asset_key`.
pub fn derive_by_asset_exclusion(
    proof: &CommitmentProof,
    asset_key: &[u8; 32],
    tap_key: &[u8; 32],
) -> Result<TapCommitment, Error> {
    let asset_proof = proof.asset_proof.as_ref().ok_or(Error::MissingAssetProof)?;
    let asset_root = asset_proof
        .proof
        .root(asset_key, &LeafNode::empty())
        .map_err(|_| Error::InvalidMssmtProof)?;
    let leaf = tap_commitment_leaf(&asset_proof.tap_key, &asset_root);
    derive_tap_root(proof, tap_key, &leaf)
}

/// Rebuilds the tap commitment a commitment exclusion proof leads to: no
/// asset commitment exists at `tap_key`.
pub fn derive_by_asset_commitment_exclusion(
    proof: &CommitmentProof,
    tap_key: &[u8; 32],
) -> Result<TapCommitment, Error> {
    if proof.asset_proof.is_some() {
        return Err(Error::UnexpectedAssetProof);
    }
    derive_tap_root(proof, tap_key, &LeafNode::empty())
}

/// Replays the outer proof of `proof` with `leaf` at `tap_key`.
fn derive_tap_root(
    proof: &CommitmentProof,
    tap_key: &[u8; 32],
    leaf: &LeafNode,
) -> Result<TapCommitment, Error> {
    let root = proof
        .taproot_asset_proof
        .proof
        .root(tap_key, leaf)
        .map_err(|_| Error::InvalidMssmtProof)?;
    Ok(TapCommitment::from_root(root))
}

/// Tweaks `internal_key` with the one-leaf tapscript tree committing to `commitment`.
pub fn derive_taproot_key<O: TaprootOps>(
    ops: &O,
    internal_key: &SerializedKey,
    commitment: &TapCommitment,
) -> Result<SerializedKey, Error> {
    Ok(taproot_output_key_for_commitment(ops, internal_key, commitment)?)
}

/// Tweaks `internal_key` with an empty script tree, as BIP86 outputs do.
///
/// Only BIP-86 tapscript proofs are supported.
pub fn derive_by_tapscript_proof<O: TaprootOps>(
    ops: &O,
    internal_key: &SerializedKey,
    tapscript: &TapscriptProof,
) -> Result<SerializedKey, Error> {
    if !tapscript.bip86 {
        return Err(Error::UnsupportedTapscriptProof);
    }
    let internal = ops.parse_internal_key(internal_key)?;
    Ok(ops.taproot_output_key(&internal, None)?)
}

/// Derives the candidate output key for `proof` in its role, together with
/// the tap commitment it was derived from, if any.
pub fn derive_candidate<O: TaprootOps>(
    ops: &O,
    proof: &TaprootProof,
    role: ProofRole<'_>,
) -> Result<(SerializedKey, Option<TapCommitment>), Error> {
    let commitment = match role {
        ProofRole::Inclusion(asset) => {
            let commitment = proof.commitment_proof().ok_or(Error::MissingCommitmentProof)?;
            derive_by_asset_inclusion(commitment, asset)?
        }
        ProofRole::AssetExclusion { asset_key, tap_key } => {
            let commitment = proof.commitment_proof().ok_or(Error::MissingCommitmentProof)?;
            derive_by_asset_exclusion(commitment, &asset_key, &tap_key)?
        }
        ProofRole::CommitmentExclusion { tap_key } => {
            let commitment = proof.commitment_proof().ok_or(Error::MissingCommitmentProof)?;
            derive_by_asset_commitment_exclusion(commitment, &tap_key)?
        }
        ProofRole::TapscriptOnly(tapscript) => {
            let key = derive_by_tapscript_proof(ops, &proof.internal_key, tapscript)?;
            return Ok((key, None));
        }
    };

    let key = derive_taproot_key(ops, &proof.internal_key, &commitment)?;
    Ok((key, Some(commitment)))
}

/// Verifies a taproot proof against the anchor transaction output.
pub fn verify_taproot_proof<O: TaprootOps>(
    ops: &O,
    anchor_tx: &Transaction,
    proof: &TaprootProof,
    asset: &Asset,
    inclusion: bool,
) -> Result<(), Error> {
    verify_taproot_proof_with_commitment(ops, anchor_tx, proof, asset, inclusion).map(|_| ())
}

/// Verifies a taproot proof and returns the matched TapCommitment, if any.
pub fn verify_taproot_proof_with_commitment<O: TaprootOps>(
    ops: &O,
    anchor_tx: &Transaction,
    proof: &TaprootProof,
    asset: &Asset,
    inclusion: bool,
) -> Result<Option<TapCommitment>, Error> {
    let expected_key = extract_taproot_key(anchor_tx, proof.output_index)?;
    verify_taproot_proof_with_key(ops, expected_key, proof, asset, inclusion)
}

/// Verifies a taproot proof against an expected key and returns the matched TapCommitment, if any.
pub fn verify_taproot_proof_with_key<O: TaprootOps>(
    ops: &O,
    expected_key: XOnlyPublicKey,
    proof: &TaprootProof,
    asset: &Asset,
    inclusion: bool,
) -> Result<Option<TapCommitment>, Error> {
    let role = ProofRole::classify(proof, asset, inclusion);
    let (derived, commitment) = derive_candidate(ops, proof, role)?;

    if derived.schnorr_serialized() != expected_key.serialize() {
        trace!(
            output_index = proof.output_index,
            ?role,
            "derived taproot key does not match output"
        );
        return Err(Error::InvalidTaprootProof);
    }

    if let Some(commitment) = &commitment {
        trace!(
            output_index = proof.output_index,
            root = %commitment.tree_root().node_hash(),
            "taproot proof matched"
        );
    }
    Ok(commitment)
}
