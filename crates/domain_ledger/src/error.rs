//! Ledger domain errors

use thiserror::Error;

use core_kernel::{ErrorKind, MoneyError};

/// Errors that can occur in the ledger domain
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Entry does not carry the links its kind requires, or has a zero amount
    #[error("Malformed ledger entry: {0}")]
    MalformedEntry(String),

    /// Referenced entry does not exist
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),

    /// Entry has already been offset by a reversal
    #[error("Ledger entry {0} has already been reversed")]
    AlreadyReversed(String),

    /// Reversals themselves cannot be reversed
    #[error("Ledger entry {0} is a reversal and cannot be reversed")]
    ReversalOfReversal(String),

    /// Entry belongs to another client
    #[error("Ledger entry {entry} does not belong to client {client}")]
    ClientMismatch { entry: String, client: String },

    #[error("Calculation error: {0}")]
    Money(#[from] MoneyError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::MalformedEntry(_) | LedgerError::Money(_) => ErrorKind::Validation,
            LedgerError::EntryNotFound(_) => ErrorKind::NotFound,
            LedgerError::AlreadyReversed(_)
            | LedgerError::ReversalOfReversal(_)
            | LedgerError::ClientMismatch { .. } => ErrorKind::Consistency,
        }
    }
}
