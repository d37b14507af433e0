#![allow(dead_code)]

use std::collections::BTreeMap;

use bitcoin::TapNodeHash;
use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::key::{TapTweak, TweakedPublicKey, XOnlyPublicKey};
use bitcoin::secp256k1::{self, PublicKey as SecpPublicKey, Secp256k1, SecretKey};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use tapanchor_core::commitment::TapCommitment;
use tapanchor_core::mint::{BaseProofParams, MintParams};
use tapanchor_core::{OpsError, TaprootOps, taproot_output_key_for_commitment};
use tapanchor_types::asset::{Asset, Genesis, SerializedKey};

pub struct BitcoinTaprootOps {
    secp: Secp256k1<secp256k1::VerifyOnly>,
}

impl BitcoinTaprootOps {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl TaprootOps for BitcoinTaprootOps {
    type PubKey = SecpPublicKey;

    fn parse_internal_key(&self, key: &SerializedKey) -> Result<Self::PubKey, OpsError> {
        SecpPublicKey::from_slice(&key.bytes).map_err(|_| OpsError::InvalidInternalKey)
    }

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

/// Deterministic public key derived from a one-byte seed.
pub fn key(seed: u8) -> SerializedKey {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[seed; 32]).expect("valid secret key");
    SerializedKey {
        bytes: SecpPublicKey::from_secret_key(&secp, &secret).serialize(),
    }
}

pub fn p2tr_script(output_key: &SerializedKey) -> ScriptBuf {
    let xonly = XOnlyPublicKey::from_slice(&output_key.schnorr_serialized()).expect("x-only key");
    ScriptBuf::new_p2tr_tweaked(TweakedPublicKey::dangerous_assume_tweaked(xonly))
}

pub fn commitment_script(
    ops: &BitcoinTaprootOps,
    internal_key: &SerializedKey,
    commitment: &TapCommitment,
) -> ScriptBuf {
    p2tr_script(&taproot_output_key_for_commitment(ops, internal_key, commitment).expect("output key"))
}

pub fn bip86_script(ops: &BitcoinTaprootOps, internal_key: &SerializedKey) -> ScriptBuf {
    let internal = ops.parse_internal_key(internal_key).expect("internal key");
    p2tr_script(&ops.taproot_output_key(&internal, None).expect("output key"))
}

pub fn anchor_tx(prev_out: OutPoint, scripts: Vec<ScriptBuf>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: prev_out,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: scripts
            .into_iter()
            .map(|script_pubkey| TxOut {
                value: Amount::from_sat(1_000),
                script_pubkey,
            })
            .collect(),
    }
}

pub fn genesis_point() -> OutPoint {
    OutPoint {
        txid: Txid::from_byte_array([9u8; 32]),
        vout: 0,
    }
}

pub const ANCHOR_INTERNAL_SEED: u8 = 1;
pub const SCRIPT_KEY_SEED: u8 = 2;

/// A mint of `amount` units of "FOO" at output 0, followed by
/// `extra_outputs` BIP86 outputs. No exclusion proofs are attached yet.
pub struct MintFixture {
    pub ops: BitcoinTaprootOps,
    pub asset: Asset,
    pub params: MintParams,
    pub extra_internal_keys: BTreeMap<u32, SerializedKey>,
}

pub fn mint_fixture(amount: u64, extra_outputs: u8) -> MintFixture {
    let ops = BitcoinTaprootOps::new();
    let genesis = Genesis::new(genesis_point(), "FOO", 0);
    let asset = Asset::new(genesis, amount, key(SCRIPT_KEY_SEED));
    let tap_commitment = TapCommitment::from_assets(&[asset.clone()]).expect("tap commitment");
    let internal_key = key(ANCHOR_INTERNAL_SEED);

    let mut scripts = vec![commitment_script(&ops, &internal_key, &tap_commitment)];
    let mut extra_internal_keys = BTreeMap::new();
    for extra in 0..extra_outputs {
        let extra_key = key(10 + extra);
        scripts.push(bip86_script(&ops, &extra_key));
        extra_internal_keys.insert(u32::from(extra) + 1, extra_key);
    }

    let params = MintParams {
        base: BaseProofParams {
            tx: anchor_tx(genesis_point(), scripts),
            output_index: 0,
            internal_key,
            tap_commitment,
            exclusion_proofs: Vec::new(),
        },
        genesis_point: genesis_point(),
    };

    MintFixture {
        ops,
        asset,
        params,
        extra_internal_keys,
    }
}
