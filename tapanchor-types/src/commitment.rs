use serde::{Deserialize, Serialize};

use crate::mssmt;

/// Merkle proof of a leaf inside an asset commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetProof {
    /// Proof of the asset leaf within the inner tree.
    pub proof: mssmt::Proof,
    /// The tap commitment key shared by every asset of the commitment.
    #[serde(with = "hex::serde")]
    pub tap_key: [u8; 32],
}

/// Merkle proof of an asset commitment inside a tap commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaprootAssetProof {
    pub proof: mssmt::Proof,
}

/// Two-level proof through a tap commitment.
///
/// The inner `asset_proof` is absent when the tap commitment holds no asset
/// commitment at the requested key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentProof {
    /// Proof of the asset inside its asset commitment, if that commitment exists.
    pub asset_proof: Option<AssetProof>,
    /// Proof of the asset commitment inside the tap commitment.
    pub taproot_asset_proof: TaprootAssetProof,
}
