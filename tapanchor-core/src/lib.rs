#![no_std]

extern crate alloc;

use bitcoin::hashes::Hash;
use tapanchor_types::asset::SerializedKey;
use thiserror::Error;

/// Errors returned by TaprootOps implementations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpsError {
    /// Internal key bytes are invalid.
    #[error("invalid internal key")]
    InvalidInternalKey,
    /// Taproot output key derivation failed.
    #[error("invalid taproot output key")]
    InvalidTaprootOutputKey,
}

/// Trait that supplies cryptographic operations needed by verifier core.
pub trait TaprootOps {
    /// Backend-specific public key representation.
    type PubKey;

    /// Parses an internal key into the backend representation.
    fn parse_internal_key(&self, key: &SerializedKey) -> Result<Self::PubKey, OpsError>;

    /// Computes the Taproot output key for an internal key and optional tapscript root.
    fn taproot_output_key(
        &self,
        internal_key: &Self::PubKey,
        tapscript_root: Option<[u8; 32]>,
    ) -> Result<SerializedKey, OpsError>;
}

/// Taproot output key of an anchor output committing to `commitment`.
///
/// The output's script tree holds a single leaf committing to the tap
/// commitment root, so the key follows from the internal key alone.
pub fn taproot_output_key_for_commitment<O: TaprootOps>(
    ops: &O,
    internal_key: &SerializedKey,
    commitment: &commitment::TapCommitment,
) -> Result<SerializedKey, OpsError> {
    let internal = ops.parse_internal_key(internal_key)?;
    let root = commitment.tapscript_root().to_byte_array();
    ops.taproot_output_key(&internal, Some(root))
}

/// Proof assembly for state transitions.
pub mod append;
/// Asset and tap commitments.
pub mod commitment;
/// Proof assembly for minted assets.
pub mod mint;
/// Split commitments for transfers.
pub mod split;
/// Verification routines for asset proofs.
pub mod verify;
