mod common;

use common::mint_fixture;
use tapanchor_core::mint::new_minting_blobs;
use tapanchor_core::verify::file::Error as FileError;
use tapanchor_core::verify::proof::Error as ProofError;
use tapanchor_core::verify::verify_file;
use tapanchor_types::proof::{File, Proof};

fn minted() -> (common::BitcoinTaprootOps, Proof) {
    let fixture = mint_fixture(1000, 0);
    let proof = new_minting_blobs(&fixture.ops, &fixture.params)
        .expect("minting proofs")
        .into_values()
        .next()
        .expect("one proof");
    (fixture.ops, proof)
}

#[test]
fn single_proof_file_verifies() {
    let (ops, proof) = minted();
    let file = File::new(&[proof.clone()]).expect("file");
    let snapshot = verify_file(&ops, &file).expect("file verifies");
    assert_eq!(snapshot.out_point, proof.out_point());
    assert_eq!(snapshot.asset, proof.asset);

    let decoded = File::from_bytes(&file.to_bytes().expect("encode")).expect("decode");
    assert_eq!(decoded, file);
    verify_file(&ops, &decoded).expect("decoded file verifies");
}

#[test]
fn empty_file_is_rejected() {
    let (ops, _) = minted();
    assert_eq!(
        verify_file(&ops, &File::default()).unwrap_err(),
        FileError::EmptyFile
    );
}

#[test]
fn broken_hash_chain_is_rejected() {
    let (ops, proof) = minted();
    let mut file = File::new(&[proof]).expect("file");
    file.proofs[0].hash[0] ^= 1;
    assert_eq!(
        verify_file(&ops, &file).unwrap_err(),
        FileError::ChecksumMismatch { index: 0 }
    );
}

#[test]
fn undecodable_proof_is_rejected() {
    let (ops, _) = minted();
    let mut file = File::default();
    file.append_raw_proof(b"not a proof".to_vec());
    assert_eq!(
        verify_file(&ops, &file).unwrap_err(),
        FileError::InvalidProofEncoding { index: 0 }
    );
}

#[test]
fn proofs_must_chain_outpoints() {
    let (ops, proof) = minted();
    let file = File::new(&[proof.clone(), proof]).expect("file");
    assert_eq!(
        verify_file(&ops, &file).unwrap_err(),
        FileError::PrevOutChainMismatch { index: 1 }
    );
}

#[test]
fn anchor_must_spend_prev_out() {
    let (ops, mut proof) = minted();
    proof.prev_out.vout = 5;
    let file = File::new(&[proof]).expect("file");
    assert_eq!(
        verify_file(&ops, &file).unwrap_err(),
        FileError::AnchorTxMissingPrevOut { index: 0 }
    );
}

#[test]
fn proof_errors_carry_their_index() {
    let (ops, mut proof) = minted();
    proof.genesis_reveal = None;
    let file = File::new(&[proof]).expect("file");
    assert_eq!(
        verify_file(&ops, &file).unwrap_err(),
        FileError::Proof {
            index: 0,
            source: ProofError::GenesisRevealRequired,
        }
    );
}
