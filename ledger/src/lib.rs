//! Ledger client boundary.
//!
//! The relay core never builds or parses ledger-specific transaction formats.
//! Everything ledger-shaped goes through [`LedgerClient`]: building an
//! envelope for a hop leg, signing it, reading its sequence number, checking
//! it and finally submitting it. Implementations live outside the core (the
//! in-memory `NullLedger` in `chainpay-nullables` is one).

pub mod client;
pub mod error;
pub mod validation;

pub use client::{BuildRequest, LedgerClient, SubmitReceipt};
pub use error::LedgerError;
pub use validation::{check_same_sequence, validate_pair};
