//! Verification routines for asset proofs and proof files.

/// Proof file verification helpers.
pub mod file;
/// Proof verification helpers.
pub mod proof;
/// Taproot proof verification helpers.
pub mod taproot_proof;
/// Anchor transaction verification helpers.
pub mod tx;

pub use file::verify_file;
pub use proof::{AssetSnapshot, verify_proof};

/// Result type for verification helpers.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors returned by verification helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Proof file verification failed.
    File(file::Error),
    /// Proof verification failed.
    Proof(proof::Error),
    /// Taproot proof verification failed.
    TaprootProof(taproot_proof::Error),
    /// Anchor transaction verification failed.
    Tx(tx::Error),
}

impl From<file::Error> for Error {
    /// Converts a file error into a verification error.
    fn from(err: file::Error) -> Self {
        Self::File(err)
    }
}

impl From<proof::Error> for Error {
    /// Converts a proof error into a verification error.
    fn from(err: proof::Error) -> Self {
        Self::Proof(err)
    }
}

impl From<taproot_proof::Error> for Error {
    /// Converts a taproot proof error into a verification error.
    fn from(err: taproot_proof::Error) -> Self {
        Self::TaprootProof(err)
    }
}

impl From<tx::Error> for Error {
    /// Converts a transaction error into a verification error.
    fn from(err: tx::Error) -> Self {
        Self::Tx(err)
    }
}

impl core::fmt::Display for Error {
    /// Formats the error for display.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::File(err) => core::fmt::Display::fmt(err, f),
            Error::Proof(err) => core::fmt::Display::fmt(err, f),
            Error::TaprootProof(err) => core::fmt::Display::fmt(err, f),
            Error::Tx(err) => core::fmt::Display::fmt(err, f),
        }
    }
}

impl core::error::Error for Error {}
