//! Proof file verification.

use tapanchor_types::proof::{File, Proof, hash_proof};
use tracing::{debug, warn};

use crate::TaprootOps;
use crate::verify::proof::{self as proof_verify, AssetSnapshot};
use crate::verify::tx;

/// Errors returned by proof file verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The file holds no proofs.
    EmptyFile,
    /// A stored checksum does not match the chained hash of its proof.
    ChecksumMismatch {
        /// Index of the offending proof.
        index: usize,
    },
    /// A proof could not be decoded.
    InvalidProofEncoding {
        /// Index of the offending proof.
        index: usize,
    },
    /// A proof does not spend the outpoint established by its predecessor.
    PrevOutChainMismatch {
        /// Index of the offending proof.
        index: usize,
    },
    /// An anchor transaction does not spend its proof's previous outpoint.
    AnchorTxMissingPrevOut {
        /// Index of the offending proof.
        index: usize,
    },
    /// An additional input file attached to a proof failed verification.
    InvalidAdditionalInput {
        /// Index of the proof carrying the input.
        index: usize,
    },
    /// A proof failed verification.
    Proof {
        /// Index of the offending proof.
        index: usize,
        /// Underlying proof error.
        source: proof_verify::Error,
    },
}

impl core::fmt::Display for Error {
    /// Formats the error for display.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::EmptyFile => write!(f, "proof file is empty"),
            Error::ChecksumMismatch { index } => {
                write!(f, "checksum mismatch at proof {}", index)
            }
            Error::InvalidProofEncoding { index } => {
                write!(f, "invalid proof encoding at proof {}", index)
            }
            Error::PrevOutChainMismatch { index } => {
                write!(f, "proof {} does not spend the previous proof's outpoint", index)
            }
            Error::AnchorTxMissingPrevOut { index } => {
                write!(f, "anchor tx of proof {} missing prev out", index)
            }
            Error::InvalidAdditionalInput { index } => {
                write!(f, "invalid additional input at proof {}", index)
            }
            Error::Proof { index, source } => write!(f, "proof {}: {}", index, source),
        }
    }
}

/// Verifies every proof of `file` from genesis to the latest state and
/// returns the final asset snapshot.
///
/// Besides each proof on its own, the hash chain of the file and the
/// outpoint continuity between consecutive proofs are checked.
pub fn verify_file<O: TaprootOps>(ops: &O, file: &File) -> Result<AssetSnapshot, Error> {
    let mut prev_hash = [0u8; 32];
    let mut prev_snapshot: Option<AssetSnapshot> = None;

    for (index, entry) in file.proofs.iter().enumerate() {
        if hash_proof(&prev_hash, &entry.proof_bytes) != entry.hash {
            warn!(index, "proof file checksum mismatch");
            return Err(Error::ChecksumMismatch { index });
        }
        prev_hash = entry.hash;

        let proof = Proof::from_bytes(&entry.proof_bytes)
            .map_err(|_| Error::InvalidProofEncoding { index })?;

        let snapshot = verify_file_entry(ops, index, &proof, prev_snapshot.as_ref())?;
        prev_snapshot = Some(snapshot);
    }

    let snapshot = prev_snapshot.ok_or(Error::EmptyFile)?;
    debug!(
        proofs = file.num_proofs(),
        out_point = %snapshot.out_point,
        "verified proof file"
    );
    Ok(snapshot)
}

/// Verifies one decoded proof of a file given the snapshot of its predecessor.
fn verify_file_entry<O: TaprootOps>(
    ops: &O,
    index: usize,
    proof: &Proof,
    prev: Option<&AssetSnapshot>,
) -> Result<AssetSnapshot, Error> {
    if let Some(prev) = prev {
        if proof.prev_out != prev.out_point {
            return Err(Error::PrevOutChainMismatch { index });
        }
    }
    tx::verify_spends_prev_out(&proof.anchor_tx, &proof.prev_out)
        .map_err(|_| Error::AnchorTxMissingPrevOut { index })?;

    for input in &proof.additional_inputs {
        verify_file(ops, input).map_err(|_| Error::InvalidAdditionalInput { index })?;
    }

    proof_verify::verify_proof(ops, proof).map_err(|source| Error::Proof { index, source })
}
