//! Structural validation errors.
//!
//! A validation failure means either a protocol bug or a rogue hop. Callers
//! abort the session; they never try to repair the transaction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Address, Amount};

#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("payment source and destination are both {0}")]
    SelfPayment(Address),

    #[error("amount out {amount_out} exceeds reference amount in {amount_in}")]
    NegativeFee { amount_in: Amount, amount_out: Amount },

    #[error("transaction source {found} must be the payment destination {expected}")]
    TransactionSourceMismatch { expected: Address, found: Address },

    #[error("reference transaction is for {found_source} -> {found_destination}, pending is for {pending_source} -> {pending_destination}")]
    ReferenceAddressMismatch {
        pending_source: Address,
        pending_destination: Address,
        found_source: Address,
        found_destination: Address,
    },

    #[error("{field} is {found}, expected {expected} after accumulation")]
    AccumulatedAmountMismatch {
        field: String,
        expected: Amount,
        found: Amount,
    },

    #[error("pending sequence number {pending} differs from reference sequence number {reference}")]
    SequenceMismatch { pending: i64, reference: i64 },

    #[error("fee mismatch: total in minus total out is {found}, caller claimed {expected}")]
    FeeMismatch { expected: Amount, found: Amount },

    #[error("requested fee {requested} does not match advertised fee {advertised}")]
    UnexpectedFee { advertised: Amount, requested: Amount },

    #[error("node {node} is not the payment destination {destination}")]
    NotDestination { node: Address, destination: Address },

    #[error("node {node} is not the payment source {payment_source}")]
    NotSource { node: Address, payment_source: Address },

    #[error("reference transaction is no longer the active one for {0}")]
    StaleReference(Address),

    #[error("sequence number {sequence} is already outstanding for {holder}")]
    SequenceInUse { sequence: i64, holder: Address },

    #[error("session mismatch: expected {expected}, found {found}")]
    SessionMismatch { expected: String, found: String },

    #[error("asset mismatch: expected {expected}, found {found}")]
    AssetMismatch { expected: String, found: String },

    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("amount overflow while computing {0}")]
    Overflow(String),

    #[error("route leg {index} is inconsistent: {reason}")]
    LegDiscontinuity { index: usize, reason: String },

    #[error("ledger rejected envelope structure: {0}")]
    Envelope(String),
}
