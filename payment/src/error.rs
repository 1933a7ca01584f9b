use chainpay_ledger::LedgerError;
use chainpay_network::DiscoveryError;
use chainpay_protocol::OperationError;
use chainpay_types::{SessionId, ValidationError};
use thiserror::Error;

use crate::RoutingError;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("hop {node} failed: {error}")]
    Hop { node: String, error: OperationError },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("route discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("session {0} already exists")]
    DuplicateSession(SessionId),

    #[error("session {0} not found")]
    NotFound(SessionId),

    #[error("session {0} timed out")]
    Timeout(SessionId),

    #[error("session {0} has already run")]
    AlreadyStarted(SessionId),
}

impl PaymentError {
    /// Errors caused by the request itself rather than by a hop or the ledger.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PaymentError::Routing(_)
                | PaymentError::DuplicateSession(_)
                | PaymentError::NotFound(_)
                | PaymentError::AlreadyStarted(_)
        )
    }
}
