use chainpay_ledger::LedgerError;
use chainpay_types::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a node operation, local or remote.
///
/// Serializable so a remote hop's failure reaches the caller with its kind
/// intact.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum OperationError {
    #[error("routing error: {0}")]
    Routing(String),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Envelope encoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("malformed message: {0}")]
    Malformed(String),
}

impl From<ProtocolError> for OperationError {
    fn from(e: ProtocolError) -> Self {
        OperationError::Transport(e.to_string())
    }
}
