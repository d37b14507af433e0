//! Proof assembly for freshly minted assets.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use bitcoin::{OutPoint, Transaction};
use tapanchor_types::asset::{Asset, SerializedKey};
use tapanchor_types::error::Error as TypesError;
use tapanchor_types::proof::{Proof, TaprootProof, TaprootProofKind, TapscriptProof};
use thiserror::Error;
use tracing::debug;

use crate::TaprootOps;
use crate::commitment::{self, TapCommitment};
use crate::verify::{self, verify_proof};

/// Proofs of every asset of a mint, by script key.
pub type AssetProofs = BTreeMap<SerializedKey, Proof>;

/// Errors returned while assembling proofs.
#[derive(Error, Debug)]
pub enum Error {
    /// The anchor commitment holds no assets.
    #[error("tap commitment holds no assets")]
    NoAssets,
    /// No internal key is known for a P2TR output needing an exclusion proof.
    #[error("missing internal key for output {0}")]
    MissingInternalKey(u32),
    /// The asset is not committed to where it should be.
    #[error("asset {0} is not committed to by the anchor output")]
    AssetNotCommitted(SerializedKey),
    /// The asset is committed to by an output that should exclude it.
    #[error("asset {0} is not excluded from output {1}")]
    AssetNotExcluded(SerializedKey, u32),
    /// Building a commitment proof failed.
    #[error(transparent)]
    Commitment(#[from] commitment::Error),
    /// Encoding failed.
    #[error(transparent)]
    Types(#[from] TypesError),
    /// A generated proof does not verify.
    #[error("invalid proof generated: {0}")]
    Verify(#[from] verify::Error),
}

/// Anchor transaction data shared by every proof of one output.
#[derive(Debug, Clone)]
pub struct BaseProofParams {
    /// The anchor transaction.
    pub tx: Transaction,
    /// Index of the output committing to the assets.
    pub output_index: u32,
    /// Internal key of that output.
    pub internal_key: SerializedKey,
    /// Tap commitment the output commits to.
    pub tap_commitment: TapCommitment,
    /// Exclusion proofs for the other P2TR outputs.
    pub exclusion_proofs: Vec<TaprootProof>,
}

impl BaseProofParams {
    /// Adds a BIP86 exclusion proof for every P2TR output of the anchor
    /// transaction that is not an asset anchor.
    pub fn add_exclusion_proofs(
        &mut self,
        internal_keys: &BTreeMap<u32, SerializedKey>,
        is_anchor: impl Fn(u32) -> bool,
    ) -> Result<(), Error> {
        for (idx, output) in self.tx.output.iter().enumerate() {
            let output_index = idx as u32;
            if is_anchor(output_index) || !output.script_pubkey.is_p2tr() {
                continue;
            }

            let internal_key = *internal_keys
                .get(&output_index)
                .ok_or(Error::MissingInternalKey(output_index))?;
            self.exclusion_proofs.push(TaprootProof {
                output_index,
                internal_key,
                kind: TaprootProofKind::Tapscript(TapscriptProof { bip86: true }),
            });
        }
        Ok(())
    }

    /// Adds an exclusion proof showing that `asset` is absent from another
    /// anchor output committing to `commitment`.
    pub fn add_commitment_exclusion_proof(
        &mut self,
        output_index: u32,
        internal_key: SerializedKey,
        commitment: &TapCommitment,
        asset: &Asset,
    ) -> Result<(), Error> {
        let (found, proof) =
            commitment.proof(&asset.tap_commitment_key(), &asset.asset_commitment_key())?;
        if found.is_some() {
            return Err(Error::AssetNotExcluded(asset.script_key, output_index));
        }

        self.exclusion_proofs.push(TaprootProof {
            output_index,
            internal_key,
            kind: TaprootProofKind::Commitment(proof),
        });
        Ok(())
    }

    pub fn has_exclusion_proof(&self, output_index: u32) -> bool {
        self.exclusion_proofs
            .iter()
            .any(|proof| proof.output_index == output_index)
    }

    /// Builds the proof of `asset` at the anchor output, spending `prev_out`.
    pub(crate) fn anchored_proof(&self, prev_out: OutPoint, asset: &Asset) -> Result<Proof, Error> {
        let (found, commitment_proof) = self
            .tap_commitment
            .proof(&asset.tap_commitment_key(), &asset.asset_commitment_key())?;
        if found.is_none() {
            return Err(Error::AssetNotCommitted(asset.script_key));
        }

        Ok(Proof {
            prev_out,
            anchor_tx: self.tx.clone(),
            asset: asset.clone(),
            inclusion_proof: TaprootProof {
                output_index: self.output_index,
                internal_key: self.internal_key,
                kind: TaprootProofKind::Commitment(commitment_proof),
            },
            exclusion_proofs: self.exclusion_proofs.clone(),
            split_root_proof: None,
            additional_inputs: Vec::new(),
            genesis_reveal: None,
        })
    }
}

/// Parameters of a mint.
#[derive(Debug, Clone)]
pub struct MintParams {
    pub base: BaseProofParams,
    /// Outpoint spent by the minting transaction; every minted asset's genesis refers to it.
    pub genesis_point: OutPoint,
}

/// Builds and verifies the genesis proof of every asset committed to by the mint.
pub fn new_minting_blobs<O: TaprootOps>(ops: &O, params: &MintParams) -> Result<AssetProofs, Error> {
    let assets = params.base.tap_commitment.committed_assets();
    if assets.is_empty() {
        return Err(Error::NoAssets);
    }

    let mut proofs = AssetProofs::new();
    for asset in &assets {
        let mut proof = params.base.anchored_proof(params.genesis_point, asset)?;
        proof.genesis_reveal = Some(asset.genesis.clone());

        verify_proof(ops, &proof).map_err(verify::Error::from)?;
        proofs.insert(asset.script_key, proof);
    }

    debug!(
        genesis_point = %params.genesis_point,
        proofs = proofs.len(),
        "created minting proofs"
    );
    Ok(proofs)
}
