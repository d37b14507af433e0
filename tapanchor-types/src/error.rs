use crate::alloc::string::String; // For no_std compatibility
use bitcoin::io::Error as BitcoinIoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(BitcoinIoError),

    /// The compressed proof bytes could not be decoded.
    #[error("invalid compressed proof: {0}")]
    InvalidCompressedProof(String),

    /// A proof did not carry one sibling per tree level.
    #[error("invalid proof length {actual}, expected {expected}")]
    InvalidProofLength { expected: usize, actual: usize },

    /// A node referenced by the tree is absent from its store.
    #[error("node {0} missing from tree store")]
    MissingNode(String),

    #[error("merkle sum overflow")]
    SumOverflow,

    #[error("invalid serialized key length {0}")]
    InvalidKeyLength(usize),

    #[error("JSON encoding error: {0}")]
    Json(String),

    /// Requested proof index is past the end of the file.
    #[error("proof index {index} out of range for {count} proofs")]
    ProofIndexOutOfRange { index: usize, count: usize },

    #[error("proof file is empty")]
    EmptyFile,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        use alloc::string::ToString;
        Error::Json(err.to_string())
    }
}
