//! Anchor transaction verification helpers.

use alloc::collections::BTreeSet;

use bitcoin::{OutPoint, Transaction};
use thiserror::Error;

/// Errors returned by anchor transaction verification helpers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The anchor transaction does not spend the claimed previous outpoint.
    #[error("anchor tx missing prev out")]
    AnchorTxMissingPrevOut,
}

/// Returns true if the transaction spends the specified outpoint.
pub fn tx_spends_prev_out(tx: &Transaction, prev_out: &OutPoint) -> bool {
    tx.input
        .iter()
        .any(|input| input.previous_output == *prev_out)
}

/// Verifies that the anchor transaction spends `prev_out`.
pub fn verify_spends_prev_out(tx: &Transaction, prev_out: &OutPoint) -> Result<(), Error> {
    if tx_spends_prev_out(tx, prev_out) {
        Ok(())
    } else {
        Err(Error::AnchorTxMissingPrevOut)
    }
}

/// Indexes of the P2TR outputs of the transaction, except `skip`.
pub fn p2tr_output_indices(tx: &Transaction, skip: Option<u32>) -> BTreeSet<u32> {
    tx.output
        .iter()
        .enumerate()
        .map(|(idx, output)| (idx as u32, output))
        .filter(|(idx, output)| Some(*idx) != skip && output.script_pubkey.is_p2tr())
        .map(|(idx, _)| idx)
        .collect()
}
