use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use bitcoin::hashes::{Hash, HashEngine, sha256::Hash as Sha256Hash};
use bitcoin::{OutPoint, Txid};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::mssmt::{self, ComputedNode, LeafNode};
use crate::tlv::{Encoder, encode_bigsize, encode_inline_var_bytes};

pub type AssetID = Sha256Hash;

/// Length in bytes of a compressed public key.
pub const SERIALIZED_KEY_LEN: usize = 33;

/// A compressed secp256k1 public key in its 33 byte wire form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SerializedKey {
    pub bytes: [u8; SERIALIZED_KEY_LEN],
}

impl SerializedKey {
    pub const fn new(bytes: [u8; SERIALIZED_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Parses a key from a slice that must be exactly 33 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let bytes: [u8; SERIALIZED_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyLength(bytes.len()))?;
        Ok(Self { bytes })
    }

    /// Returns the x-only (schnorr) form of the key.
    pub fn schnorr_serialized(&self) -> [u8; 32] {
        let mut xonly = [0u8; 32];
        xonly.copy_from_slice(&self.bytes[1..]);
        xonly
    }
}

impl fmt::Debug for SerializedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializedKey({})", hex::encode(self.bytes))
    }
}

impl fmt::Display for SerializedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.bytes))
    }
}

impl Serialize for SerializedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.bytes))
    }
}

impl<'de> Deserialize<'de> for SerializedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(encoded).map_err(serde::de::Error::custom)?;
        SerializedKey::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// The issuance record of an asset. Its [`Genesis::id`] is the asset ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genesis {
    /// The first outpoint spent by the minting transaction.
    pub first_prev_out: OutPoint,
    /// The name of the asset.
    pub name: String,
    /// Index of the minting transaction output that anchors the asset.
    pub output_index: u32,
}

impl Genesis {
    pub fn new(first_prev_out: OutPoint, name: impl Into<String>, output_index: u32) -> Self {
        Self {
            first_prev_out,
            name: name.into(),
            output_index,
        }
    }

    /// Computes `sha256(txid || le32(vout) || sha256(name) || be32(output_index))`.
    pub fn id(&self) -> AssetID {
        let tag_hash = Sha256Hash::hash(self.name.as_bytes());

        let mut engine = Sha256Hash::engine();
        engine.input(&self.first_prev_out.txid.to_byte_array());
        engine.input(&self.first_prev_out.vout.to_le_bytes());
        engine.input(&tag_hash.to_byte_array());
        engine.input(&self.output_index.to_be_bytes());
        Sha256Hash::from_engine(engine)
    }
}

/// Identifies the asset output consumed by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrevId {
    /// The outpoint anchoring the consumed asset.
    pub out_point: OutPoint,
    /// The ID of the consumed asset.
    pub asset_id: AssetID,
    /// The script key of the consumed asset.
    pub script_key: SerializedKey,
}

impl PrevId {
    /// The all-zero ID carried by genesis and split-output witnesses.
    pub fn zero() -> Self {
        Self {
            out_point: OutPoint {
                txid: Txid::all_zeros(),
                vout: 0,
            },
            asset_id: AssetID::all_zeros(),
            script_key: SerializedKey::new([0u8; SERIALIZED_KEY_LEN]),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}

/// Proof that an asset is one output of a split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCommitment {
    /// Merkle proof of this output inside the split tree.
    pub proof: mssmt::Proof,
    /// The root asset carrying the split tree root.
    pub root_asset: Box<Asset>,
}

/// Provenance record of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// The consumed asset output, zero for genesis and split outputs.
    pub prev_id: Option<PrevId>,
    /// Split membership proof, present only on split outputs.
    pub split_commitment: Option<SplitCommitment>,
}

impl Witness {
    /// The witness of a freshly minted asset.
    pub fn genesis() -> Self {
        Self {
            prev_id: Some(PrevId::zero()),
            split_commitment: None,
        }
    }

    pub fn is_split_commitment(&self) -> bool {
        self.prev_id.is_some() && self.split_commitment.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub genesis: Genesis,
    pub amount: u64,
    /// The key of the current holder.
    pub script_key: SerializedKey,
    /// Root of the split tree if this asset is the root of a split.
    pub split_commitment_root: Option<ComputedNode>,
    pub prev_witnesses: Vec<Witness>,
}

impl Asset {
    /// Creates a genesis asset owned by `script_key`.
    pub fn new(genesis: Genesis, amount: u64, script_key: SerializedKey) -> Self {
        Self {
            genesis,
            amount,
            script_key,
            split_commitment_root: None,
            prev_witnesses: alloc::vec![Witness::genesis()],
        }
    }

    pub fn id(&self) -> AssetID {
        self.genesis.id()
    }

    /// Key of the asset's commitment inside a tap commitment.
    pub fn tap_commitment_key(&self) -> [u8; 32] {
        self.id().to_byte_array()
    }

    /// Key of the asset inside its asset commitment:
    /// `sha256(asset_id || schnorr(script_key))`.
    pub fn asset_commitment_key(&self) -> [u8; 32] {
        let mut engine = Sha256Hash::engine();
        engine.input(&self.id().to_byte_array());
        engine.input(&self.script_key.schnorr_serialized());
        Sha256Hash::from_engine(engine).to_byte_array()
    }

    /// Returns true if the asset carries exactly one witness and it is a
    /// split commitment witness.
    pub fn has_split_commitment_witness(&self) -> bool {
        match self.prev_witnesses.as_slice() {
            [witness] => witness.is_split_commitment(),
            _ => false,
        }
    }

    /// Returns true if the asset carries exactly one zero, split-free witness.
    pub fn has_genesis_witness(&self) -> bool {
        match self.prev_witnesses.as_slice() {
            [witness] => {
                witness.split_commitment.is_none()
                    && witness.prev_id.as_ref().is_some_and(PrevId::is_zero)
            }
            _ => false,
        }
    }

    pub fn is_genesis_asset(&self) -> bool {
        self.has_genesis_witness()
    }

    /// Returns the split commitment of a split output, if any.
    pub fn split_commitment(&self) -> Option<&SplitCommitment> {
        if !self.has_split_commitment_witness() {
            return None;
        }
        self.prev_witnesses[0].split_commitment.as_ref()
    }

    /// Returns a copy of the asset with any split commitment witness removed.
    pub fn without_split_commitment(&self) -> Asset {
        let mut asset = self.clone();
        for witness in &mut asset.prev_witnesses {
            witness.split_commitment = None;
        }
        asset
    }

    /// Returns the MS-SMT leaf committing to this asset, summing to its amount.
    ///
    /// Split commitment proofs are not part of the leaf; a split output is
    /// tied to its root asset by verifying the proof separately.
    pub fn leaf(&self) -> LeafNode {
        LeafNode::new(self.encode_leaf_value(), self.amount)
    }

    /// Encodes the asset fields committed to by its leaf.
    pub fn encode_leaf_value(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.record(ASSET_LEAF_GENESIS, &encode_genesis(&self.genesis));

        let mut amount = Vec::new();
        encode_bigsize(self.amount, &mut amount);
        encoder.record(ASSET_LEAF_AMOUNT, &amount);

        if !self.prev_witnesses.is_empty() {
            encoder.record(
                ASSET_LEAF_PREV_WITNESS,
                &encode_prev_witnesses(&self.prev_witnesses),
            );
        }
        if let Some(root) = &self.split_commitment_root {
            let mut bytes = Vec::with_capacity(32 + 8);
            bytes.extend_from_slice(&root.hash.to_byte_array());
            bytes.extend_from_slice(&root.sum.to_be_bytes());
            encoder.record(ASSET_LEAF_SPLIT_COMMITMENT_ROOT, &bytes);
        }
        encoder.record(ASSET_LEAF_SCRIPT_KEY, &self.script_key.bytes);

        encoder.finish()
    }
}

/// Encodes a genesis record into bytes.
fn encode_genesis(genesis: &Genesis) -> Vec<u8> {
    let mut out = Vec::new();
    encode_outpoint(&genesis.first_prev_out, &mut out);
    encode_inline_var_bytes(genesis.name.as_bytes(), &mut out);
    out.extend_from_slice(&genesis.output_index.to_be_bytes());
    out
}

/// Encodes a Bitcoin outpoint into bytes.
fn encode_outpoint(out_point: &OutPoint, out: &mut Vec<u8>) {
    out.extend_from_slice(&out_point.txid.to_byte_array());
    out.extend_from_slice(&out_point.vout.to_be_bytes());
}

/// Encodes the provenance fields of each witness. Split commitments are skipped.
fn encode_prev_witnesses(witnesses: &[Witness]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_bigsize(witnesses.len() as u64, &mut out);
    for witness in witnesses {
        let mut encoder = Encoder::new();
        if let Some(prev_id) = &witness.prev_id {
            let mut bytes = Vec::new();
            encode_outpoint(&prev_id.out_point, &mut bytes);
            bytes.extend_from_slice(&prev_id.asset_id.to_byte_array());
            bytes.extend_from_slice(&prev_id.script_key.bytes);
            encoder.record(WITNESS_PREV_ID, &bytes);
        }
        encode_inline_var_bytes(&encoder.finish(), &mut out);
    }
    out
}

/// TLV type for the asset genesis field.
const ASSET_LEAF_GENESIS: u64 = 0;
/// TLV type for the asset amount field.
const ASSET_LEAF_AMOUNT: u64 = 2;
/// TLV type for the asset prev witness field.
const ASSET_LEAF_PREV_WITNESS: u64 = 4;
/// TLV type for the asset split commitment root field.
const ASSET_LEAF_SPLIT_COMMITMENT_ROOT: u64 = 6;
/// TLV type for the asset script key field.
const ASSET_LEAF_SCRIPT_KEY: u64 = 8;

/// TLV type for the witness prev ID field.
const WITNESS_PREV_ID: u64 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mssmt::{MAX_TREE_LEVELS, empty_tree};

    fn outpoint(byte: u8, vout: u32) -> OutPoint {
        OutPoint {
            txid: Txid::from_byte_array([byte; 32]),
            vout,
        }
    }

    fn key(byte: u8) -> SerializedKey {
        let mut bytes = [byte; SERIALIZED_KEY_LEN];
        bytes[0] = 0x02;
        SerializedKey::new(bytes)
    }

    #[test]
    fn genesis_id_commits_to_every_field() {
        let genesis = Genesis::new(outpoint(1, 0), "FOO", 0);

        let mut engine = Sha256Hash::engine();
        engine.input(&[1u8; 32]);
        engine.input(&[0, 0, 0, 0]);
        engine.input(&Sha256Hash::hash(b"FOO").to_byte_array());
        engine.input(&[0, 0, 0, 0]);
        assert_eq!(genesis.id(), Sha256Hash::from_engine(engine));

        assert_ne!(genesis.id(), Genesis::new(outpoint(1, 1), "FOO", 0).id());
        assert_ne!(genesis.id(), Genesis::new(outpoint(1, 0), "BAR", 0).id());
        assert_ne!(genesis.id(), Genesis::new(outpoint(1, 0), "FOO", 1).id());
    }

    #[test]
    fn commitment_keys() {
        let asset = Asset::new(Genesis::new(outpoint(1, 0), "FOO", 0), 10, key(7));
        assert_eq!(asset.tap_commitment_key(), asset.id().to_byte_array());

        let mut preimage = asset.id().to_byte_array().to_vec();
        preimage.extend_from_slice(&[7u8; 32]);
        assert_eq!(
            asset.asset_commitment_key(),
            Sha256Hash::hash(&preimage).to_byte_array()
        );

        let mut other = asset.clone();
        other.script_key = key(8);
        assert_eq!(other.tap_commitment_key(), asset.tap_commitment_key());
        assert_ne!(other.asset_commitment_key(), asset.asset_commitment_key());
    }

    #[test]
    fn witness_classification() {
        let mut asset = Asset::new(Genesis::new(outpoint(1, 0), "FOO", 0), 10, key(7));
        assert!(asset.is_genesis_asset());
        assert!(!asset.has_split_commitment_witness());

        let empty = empty_tree();
        let proof = mssmt::Proof::new(
            (0..MAX_TREE_LEVELS)
                .map(|idx| empty[MAX_TREE_LEVELS - idx])
                .collect(),
        )
        .unwrap();
        asset.prev_witnesses[0].split_commitment = Some(SplitCommitment {
            proof,
            root_asset: Box::new(asset.clone()),
        });
        assert!(!asset.is_genesis_asset());
        assert!(asset.has_split_commitment_witness());
        assert!(asset.split_commitment().is_some());

        // The split proof is not part of the leaf.
        assert_eq!(asset.leaf(), asset.without_split_commitment().leaf());

        asset.prev_witnesses[0] = Witness {
            prev_id: Some(PrevId {
                out_point: outpoint(2, 1),
                asset_id: asset.id(),
                script_key: key(9),
            }),
            split_commitment: None,
        };
        assert!(!asset.is_genesis_asset());
        assert!(!asset.has_split_commitment_witness());
    }

    #[test]
    fn leaf_sums_to_amount_and_tracks_fields() {
        let asset = Asset::new(Genesis::new(outpoint(1, 0), "FOO", 0), 1000, key(7));
        let leaf = asset.leaf();
        assert_eq!(leaf.sum, 1000);

        let mut moved = asset.clone();
        moved.script_key = key(8);
        assert_ne!(moved.leaf(), leaf);

        let mut rooted = asset.clone();
        rooted.split_commitment_root = Some(ComputedNode::new(Sha256Hash::all_zeros(), 5));
        assert_ne!(rooted.leaf(), leaf);
    }

    #[test]
    fn serialized_key_hex_round_trip() {
        let key = key(3);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json.len(), 2 + 66);
        assert_eq!(serde_json::from_str::<SerializedKey>(&json).unwrap(), key);
        assert!(SerializedKey::from_slice(&[0u8; 32]).is_err());
    }
}
