//! High-level convenience API for taproot-anchored assets.
//!
//! Re-exports the low-level crates and supplies a bitcoin/secp256k1 backend
//! for their key operations.

#![cfg_attr(not(feature = "std"), no_std)]

/// Re-export of tapanchor-core for backend implementations.
pub use tapanchor_core;
/// Re-export of tapanchor-types for the data model.
pub use tapanchor_types;

/// Anchor output and proof assembly helpers.
pub mod anchor;
/// Host-side verification helpers backed by bitcoin/secp256k1.
pub mod verify;

pub use verify::BitcoinTaprootOps;

use tapanchor_core::{OpsError, append, mint};
use thiserror::Error;

/// Errors returned by the host-side helpers.
#[derive(Error, Debug)]
pub enum Error {
    /// Encoding or decoding failed.
    #[error(transparent)]
    Types(#[from] tapanchor_types::error::Error),
    /// A proof or proof file did not verify.
    #[error(transparent)]
    Verify(#[from] tapanchor_core::verify::Error),
    /// A key operation failed.
    #[error(transparent)]
    Ops(#[from] OpsError),
    /// Minting proofs could not be assembled.
    #[error(transparent)]
    Mint(#[from] mint::Error),
    /// A transition could not be appended.
    #[error(transparent)]
    Append(#[from] append::Error),
}
