//! Proof assembly for asset transfers.

use alloc::vec::Vec;

use bitcoin::OutPoint;
use tapanchor_types::asset::{Asset, SerializedKey};
use tapanchor_types::proof::{File, Proof, RawProofFile, TaprootProof, TaprootProofKind};
use thiserror::Error;
use tracing::{debug, trace};

use crate::TaprootOps;
use crate::commitment::TapCommitment;
use crate::mint::{self, BaseProofParams};
use crate::verify::{self, verify_file, verify_proof};

/// Errors returned while appending a transition.
#[derive(Error, Debug)]
pub enum Error {
    /// No input proof file was given.
    #[error("no input proof files")]
    NoInputFiles,
    /// The input proof file holds no proofs.
    #[error("invalid empty proof file")]
    EmptyProofFile,
    /// A split output is transferred without the root output's commitment.
    #[error("split output requires the root output's tap commitment")]
    MissingRootCommitment,
    /// The split root asset is not committed to by the root output.
    #[error("split root asset is not committed to by output {0}")]
    RootAssetNotCommitted(u32),
    /// Proof construction failed.
    #[error(transparent)]
    Proof(#[from] mint::Error),
    /// Decoding or encoding failed.
    #[error(transparent)]
    Types(#[from] tapanchor_types::error::Error),
    /// A proof or file does not verify.
    #[error("verification failed: {0}")]
    Verify(#[from] verify::Error),
}

/// Parameters of a state transition.
#[derive(Debug, Clone)]
pub struct TransitionParams {
    /// Anchor data of the output holding the new asset.
    pub base: BaseProofParams,
    /// The asset as it exists after the transition.
    pub new_asset: Asset,
    /// Index of the output holding the split root asset.
    pub root_output_index: u32,
    /// Internal key of the root output.
    pub root_internal_key: SerializedKey,
    /// Tap commitment of the root output; required when the new asset is a split output.
    pub root_tap_commitment: Option<TapCommitment>,
}

/// Builds the proof of `params.new_asset` created by a transition spending `prev_out`.
///
/// Split outputs keep their split commitment and get a split root proof
/// anchoring the root asset in the root output.
pub fn create_transition_proof(prev_out: OutPoint, params: &TransitionParams) -> Result<Proof, Error> {
    let mut proof = params.base.anchored_proof(prev_out, &params.new_asset)?;

    if let Some(split) = params.new_asset.split_commitment() {
        let root_commitment = params
            .root_tap_commitment
            .as_ref()
            .ok_or(Error::MissingRootCommitment)?;
        let root_asset = &split.root_asset;
        let (found, commitment_proof) = root_commitment
            .proof(&root_asset.tap_commitment_key(), &root_asset.asset_commitment_key())
            .map_err(mint::Error::from)?;
        if found.is_none() {
            return Err(Error::RootAssetNotCommitted(params.root_output_index));
        }

        trace!(
            root_output_index = params.root_output_index,
            "attaching split root proof"
        );
        proof.split_root_proof = Some(TaprootProof {
            output_index: params.root_output_index,
            internal_key: params.root_internal_key,
            kind: TaprootProofKind::Commitment(commitment_proof),
        });
    }

    Ok(proof)
}

/// Appends the transition described by `params` to the first input file.
///
/// The last proof of the first file must verify; its outpoint is the one the
/// transition spends. Any further files are proofs of additional inputs and
/// are verified and attached to the new proof. Returns the extended file and
/// the new proof.
pub fn append_transition<O: TaprootOps>(
    ops: &O,
    input_files: &[RawProofFile],
    params: &TransitionParams,
) -> Result<(File, Proof), Error> {
    let (first, additional) = input_files.split_first().ok_or(Error::NoInputFiles)?;
    let mut file = File::from_bytes(first)?;
    if file.is_empty() {
        return Err(Error::EmptyProofFile);
    }

    let last_proof = file.last_proof()?;
    let last_snapshot = verify_proof(ops, &last_proof).map_err(verify::Error::from)?;

    let mut new_proof = create_transition_proof(last_snapshot.out_point, params)?;
    new_proof.additional_inputs = additional
        .iter()
        .map(|bytes| {
            let input = File::from_bytes(bytes)?;
            verify_file(ops, &input).map_err(verify::Error::from)?;
            Ok(input)
        })
        .collect::<Result<Vec<_>, Error>>()?;

    verify_proof(ops, &new_proof).map_err(verify::Error::from)?;
    file.append_proof(&new_proof)?;
    let snapshot = verify_file(ops, &file).map_err(verify::Error::from)?;

    debug!(
        prev_out = %last_snapshot.out_point,
        out_point = %snapshot.out_point,
        proofs = file.num_proofs(),
        "appended transition proof"
    );
    Ok((file, new_proof))
}
