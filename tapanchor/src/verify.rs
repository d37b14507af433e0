//! Host-side verification utilities backed by bitcoin/secp256k1.

use bitcoin::TapNodeHash;
use bitcoin::hashes::Hash;
use bitcoin::key::TapTweak;
use bitcoin::secp256k1::{self, PublicKey as SecpPublicKey, Secp256k1};
use tapanchor_core::verify::{self, AssetSnapshot};
use tapanchor_core::{OpsError, TaprootOps};
use tapanchor_types::asset::SerializedKey;
use tapanchor_types::proof::{File, Proof};

use crate::Error;

/// Taproot operations implemented with bitcoin/secp256k1 types.
#[derive(Debug)]
pub struct BitcoinTaprootOps {
    /// Secp256k1 context used for verification-only operations.
    secp: Secp256k1<secp256k1::VerifyOnly>,
}

impl BitcoinTaprootOps {
    /// Creates a new Taproot operations backend.
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for BitcoinTaprootOps {
    fn default() -> Self {
        Self::new()
    }
}

impl TaprootOps for BitcoinTaprootOps {
    type PubKey = SecpPublicKey;

    /// Parses an internal key into the backend representation.
    fn parse_internal_key(&self, key: &SerializedKey) -> Result<Self::PubKey, OpsError> {
        SecpPublicKey::from_slice(&key.bytes).map_err(|_| OpsError::InvalidInternalKey)
    }

    /// Computes the Taproot output key for an internal key and optional tapscript root.
    fn taproot_output_key(
        &self,
        internal_key: &Self::PubKey,
        tapscript_root: Option<[u8; 32]>,
    ) -> Result<SerializedKey, OpsError> {
        let merkle_root = tapscript_root.map(TapNodeHash::from_byte_array);
        let (xonly_key, _) = internal_key.x_only_public_key();
        let (tweaked, parity) = xonly_key.tap_tweak(&self.secp, merkle_root);
        let output_key =
            SecpPublicKey::from_x_only_public_key(tweaked.to_x_only_public_key(), parity);

        Ok(SerializedKey {
            bytes: output_key.serialize(),
        })
    }
}

/// Verifies a single proof using the bitcoin backend.
pub fn verify_proof(proof: &Proof) -> Result<AssetSnapshot, verify::Error> {
    let ops = BitcoinTaprootOps::new();
    verify::verify_proof(&ops, proof).map_err(verify::Error::from)
}

/// Verifies a proof file using the bitcoin backend.
pub fn verify_file(file: &File) -> Result<AssetSnapshot, verify::Error> {
    let ops = BitcoinTaprootOps::new();
    verify::verify_file(&ops, file).map_err(verify::Error::from)
}

/// Decodes and verifies an encoded proof file using the bitcoin backend.
pub fn verify_file_bytes(bytes: &[u8]) -> Result<AssetSnapshot, Error> {
    let file = File::from_bytes(bytes)?;
    Ok(verify_file(&file)?)
}
