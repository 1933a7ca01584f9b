use chainpay_ledger::LedgerError;
use thiserror::Error;

use crate::AccumulationError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("accumulation error: {0}")]
    Accumulation(#[from] AccumulationError),

    #[error("flush stopped at sequence {sequence}: {error}")]
    Flush { sequence: i64, error: LedgerError },

    #[error("config error: {0}")]
    Config(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
