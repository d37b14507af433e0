//! Anchor output scripts and proof assembly using the bitcoin backend.

use bitcoin::ScriptBuf;
use bitcoin::key::{TweakedPublicKey, XOnlyPublicKey};
use tapanchor_core::append::{self, TransitionParams};
use tapanchor_core::commitment::TapCommitment;
use tapanchor_core::mint::{self, AssetProofs, MintParams};
use tapanchor_core::{OpsError, TaprootOps};
use tapanchor_types::asset::SerializedKey;
use tapanchor_types::mssmt::Node;
use tapanchor_types::proof::{File, Proof, RawProofFile};
use tracing::trace;

use crate::{BitcoinTaprootOps, Error};

/// Taproot output key of an output committing to `commitment`.
pub fn taproot_output_key_for_commitment(
    internal_key: &SerializedKey,
    commitment: &TapCommitment,
) -> Result<SerializedKey, OpsError> {
    let ops = BitcoinTaprootOps::new();
    tapanchor_core::taproot_output_key_for_commitment(&ops, internal_key, commitment)
}

/// P2TR script of an output committing to `commitment`.
pub fn p2tr_script_for_commitment(
    internal_key: &SerializedKey,
    commitment: &TapCommitment,
) -> Result<ScriptBuf, OpsError> {
    let output_key = taproot_output_key_for_commitment(internal_key, commitment)?;
    trace!(%output_key, root = %commitment.tree_root().node_hash(), "commitment output key");
    p2tr_script(&output_key)
}

/// P2TR script of a BIP86 output without any script tree.
pub fn p2tr_script_bip86(internal_key: &SerializedKey) -> Result<ScriptBuf, OpsError> {
    let ops = BitcoinTaprootOps::new();
    let internal = ops.parse_internal_key(internal_key)?;
    p2tr_script(&ops.taproot_output_key(&internal, None)?)
}

fn p2tr_script(output_key: &SerializedKey) -> Result<ScriptBuf, OpsError> {
    let xonly = XOnlyPublicKey::from_slice(&output_key.schnorr_serialized())
        .map_err(|_| OpsError::InvalidTaprootOutputKey)?;
    Ok(ScriptBuf::new_p2tr_tweaked(
        TweakedPublicKey::dangerous_assume_tweaked(xonly),
    ))
}

/// Builds and verifies the proofs of a mint using the bitcoin backend.
pub fn new_minting_blobs(params: &MintParams) -> Result<AssetProofs, Error> {
    let ops = BitcoinTaprootOps::new();
    mint::new_minting_blobs(&ops, params).map_err(Error::from)
}

/// Appends a transition to an encoded proof file using the bitcoin backend.
pub fn append_transition(
    input_files: &[RawProofFile],
    params: &TransitionParams,
) -> Result<(File, Proof), Error> {
    let ops = BitcoinTaprootOps::new();
    append::append_transition(&ops, input_files, params).map_err(Error::from)
}
