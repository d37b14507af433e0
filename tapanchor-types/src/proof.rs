use alloc::string::ToString;
use alloc::vec::Vec;

use bitcoin::hashes::{Hash, HashEngine, sha256::Hash as Sha256Hash};
use bitcoin::{OutPoint, Transaction};
use serde::{Deserialize, Serialize};

use crate::asset::{Asset, AssetID, Genesis, SerializedKey};
use crate::commitment::CommitmentProof;
use crate::error::Error;

/// Serialized proof file bytes.
pub type RawProofFile = Vec<u8>;

/// Current proof file format version.
pub const FILE_VERSION: u32 = 0;

/// Proof that an output carries no asset commitment at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapscriptProof {
    /// The output key is the internal key tweaked with an empty script root (BIP-86).
    pub bip86: bool,
}

/// The evidence a [`TaprootProof`] carries about its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaprootProofKind {
    /// The output commits to a tap commitment; proves inclusion or exclusion.
    Commitment(CommitmentProof),
    /// The output commits to no tap commitment.
    Tapscript(TapscriptProof),
}

/// Proof about the tap commitment (or its absence) in one transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaprootProof {
    /// Index of the output within the anchor transaction.
    pub output_index: u32,
    /// The internal key of the taproot output.
    pub internal_key: SerializedKey,
    pub kind: TaprootProofKind,
}

impl TaprootProof {
    /// Returns the commitment proof, if this is not a tapscript proof.
    pub fn commitment_proof(&self) -> Option<&CommitmentProof> {
        match &self.kind {
            TaprootProofKind::Commitment(proof) => Some(proof),
            TaprootProofKind::Tapscript(_) => None,
        }
    }

    /// Returns the tapscript proof, if any.
    pub fn tapscript_proof(&self) -> Option<&TapscriptProof> {
        match &self.kind {
            TaprootProofKind::Tapscript(proof) => Some(proof),
            TaprootProofKind::Commitment(_) => None,
        }
    }
}

/// Evidence for one asset state: the transition that produced it and where
/// it is anchored on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// The outpoint consumed by the anchor transaction.
    pub prev_out: OutPoint,

    /// The transaction anchoring the resulting asset.
    pub anchor_tx: Transaction,

    /// The asset referenced in the proof. This is the resulting asset after its
    /// state transition.
    pub asset: Asset,

    /// The TaprootProof proving the new inclusion of the resulting asset
    /// within AnchorTx.
    pub inclusion_proof: TaprootProof,

    /// The set of TaprootProofs proving the exclusion of the resulting asset
    /// from all other Taproot outputs within AnchorTx.
    pub exclusion_proofs: Vec<TaprootProof>,

    /// An optional TaprootProof needed if this asset is the result of a split.
    /// SplitRootProof proves inclusion of the root asset of the split.
    pub split_root_proof: Option<TaprootProof>,

    /// Full proof files of any further inputs merged into the asset.
    pub additional_inputs: Vec<File>,

    /// Genesis information for the asset. Required for minting proofs and must
    /// be empty for every other proof.
    pub genesis_reveal: Option<Genesis>,
}

impl Proof {
    /// Returns the outpoint holding the resulting asset.
    pub fn out_point(&self) -> OutPoint {
        OutPoint {
            txid: self.anchor_tx.compute_txid(),
            vout: self.inclusion_proof.output_index,
        }
    }

    /// Encodes the proof as a self-describing JSON envelope.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A proof entry of a [`File`] together with its chained checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedProof {
    /// Raw encoded proof bytes.
    #[serde(with = "hex::serde")]
    pub proof_bytes: Vec<u8>,
    /// `sha256(previous_hash || proof_bytes)`.
    #[serde(with = "hex::serde")]
    pub hash: [u8; 32],
}

/// Computes the chained checksum of a proof entry.
pub fn hash_proof(prev_hash: &[u8; 32], proof_bytes: &[u8]) -> [u8; 32] {
    let mut engine = Sha256Hash::engine();
    engine.input(prev_hash);
    engine.input(proof_bytes);
    Sha256Hash::from_engine(engine).to_byte_array()
}

/// Append-only, hash-chained list of proofs from genesis to the latest state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub version: u32,
    pub proofs: Vec<HashedProof>,
}

impl Default for File {
    fn default() -> Self {
        Self {
            version: FILE_VERSION,
            proofs: Vec::new(),
        }
    }
}

impl File {
    /// Builds a file holding `proofs` in order.
    pub fn new(proofs: &[Proof]) -> Result<Self, Error> {
        let mut file = Self::default();
        for proof in proofs {
            file.append_proof(proof)?;
        }
        Ok(file)
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }

    pub fn num_proofs(&self) -> usize {
        self.proofs.len()
    }

    /// Checksum of the last entry, or zero for an empty file.
    pub fn last_hash(&self) -> [u8; 32] {
        self.proofs.last().map(|proof| proof.hash).unwrap_or([0u8; 32])
    }

    /// Appends an encoded proof and chains its checksum.
    pub fn append_raw_proof(&mut self, proof_bytes: Vec<u8>) {
        let hash = hash_proof(&self.last_hash(), &proof_bytes);
        self.proofs.push(HashedProof { proof_bytes, hash });
    }

    pub fn append_proof(&mut self, proof: &Proof) -> Result<(), Error> {
        self.append_raw_proof(proof.to_bytes()?);
        Ok(())
    }

    pub fn raw_proof_at(&self, index: usize) -> Result<&[u8], Error> {
        self.proofs
            .get(index)
            .map(|proof| proof.proof_bytes.as_slice())
            .ok_or(Error::ProofIndexOutOfRange {
                index,
                count: self.proofs.len(),
            })
    }

    pub fn proof_at(&self, index: usize) -> Result<Proof, Error> {
        Proof::from_bytes(self.raw_proof_at(index)?)
    }

    pub fn last_proof(&self) -> Result<Proof, Error> {
        match self.proofs.len() {
            0 => Err(Error::EmptyFile),
            count => self.proof_at(count - 1),
        }
    }

    pub fn to_bytes(&self) -> Result<RawProofFile, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Content-addressed name of a proof file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub asset_id: Option<AssetID>,
    /// Script key of the asset in the file's last proof.
    pub script_key: SerializedKey,
    /// Outpoint anchoring the asset in the file's last proof.
    pub out_point: Option<OutPoint>,
}

impl Locator {
    /// Builds the locator naming a file whose last proof is `proof`.
    pub fn from_proof(proof: &Proof) -> Self {
        Self {
            asset_id: Some(proof.asset.id()),
            script_key: proof.asset.script_key,
            out_point: Some(proof.out_point()),
        }
    }

    /// Computes `sha256(asset_id? || script_key || out_point.to_string()?)`.
    pub fn hash(&self) -> [u8; 32] {
        let mut engine = Sha256Hash::engine();
        if let Some(asset_id) = &self.asset_id {
            engine.input(&asset_id.to_byte_array());
        }
        engine.input(&self.script_key.bytes);
        if let Some(out_point) = &self.out_point {
            engine.input(out_point.to_string().as_bytes());
        }
        Sha256Hash::from_engine(engine).to_byte_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::Txid;

    #[test]
    fn raw_proofs_are_hash_chained() {
        let mut file = File::default();
        file.append_raw_proof(b"first".to_vec());
        file.append_raw_proof(b"second".to_vec());

        let first = hash_proof(&[0u8; 32], b"first");
        assert_eq!(file.proofs[0].hash, first);
        assert_eq!(file.proofs[1].hash, hash_proof(&first, b"second"));
        assert_eq!(file.last_hash(), file.proofs[1].hash);
        assert_eq!(file.raw_proof_at(1).unwrap(), b"second");
        assert!(matches!(
            file.raw_proof_at(2),
            Err(Error::ProofIndexOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn empty_file_has_no_last_proof() {
        let file = File::default();
        assert!(file.is_empty());
        assert_eq!(file.last_hash(), [0u8; 32]);
        assert!(matches!(file.last_proof(), Err(Error::EmptyFile)));
    }

    #[test]
    fn file_bytes_round_trip() {
        let mut file = File::default();
        file.append_raw_proof(b"proof".to_vec());
        let bytes = file.to_bytes().unwrap();
        assert_eq!(File::from_bytes(&bytes).unwrap(), file);
        assert!(File::from_bytes(b"not json").is_err());
    }

    #[test]
    fn locator_hash_skips_absent_fields() {
        let script_key = SerializedKey::new([2u8; 33]);
        let bare = Locator {
            asset_id: None,
            script_key,
            out_point: None,
        };
        assert_eq!(bare.hash(), Sha256Hash::hash(&[2u8; 33]).to_byte_array());

        let out_point = OutPoint {
            txid: Txid::all_zeros(),
            vout: 1,
        };
        let full = Locator {
            asset_id: Some(AssetID::all_zeros()),
            script_key,
            out_point: Some(out_point),
        };
        let mut preimage = [0u8; 32].to_vec();
        preimage.extend_from_slice(&[2u8; 33]);
        preimage.extend_from_slice(out_point.to_string().as_bytes());
        assert_eq!(full.hash(), Sha256Hash::hash(&preimage).to_byte_array());
    }
}
