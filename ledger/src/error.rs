use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("insufficient balance on {account}: need {needed}, have {available}")]
    InsufficientBalance {
        account: String,
        needed: u128,
        available: u128,
    },

    #[error("bad sequence number {found} for {account}, expected {expected}")]
    BadSequence {
        account: String,
        expected: i64,
        found: i64,
    },

    #[error("transaction validity window has expired")]
    Expired,

    #[error("missing signature from {0}")]
    MissingSignature(String),

    #[error("invalid signature from {0}")]
    InvalidSignature(String),

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}
