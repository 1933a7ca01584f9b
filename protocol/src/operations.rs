//! The operation contract shared by local nodes and remote proxies.

use async_trait::async_trait;
use chainpay_types::{Address, NodeId, PaymentRequest, PaymentTransactionReplacing, SessionId};

use crate::{CreateTransactionArgs, OperationError};

/// The four chain operations a routing node supports.
///
/// Implemented by the local protocol engine and by the remote proxy, so the
/// payment manager drives a route without knowing where each hop runs.
#[async_trait]
pub trait NodeOperations: Send + Sync {
    fn node_id(&self) -> &NodeId;

    fn address(&self) -> &Address;

    /// Build this node's incoming leg for a session, folding in any
    /// outstanding transaction from the same source.
    async fn create_transaction(
        &self,
        session_id: &SessionId,
        args: CreateTransactionArgs,
    ) -> Result<PaymentTransactionReplacing, OperationError>;

    /// Counter-sign a leg this node is the beneficiary of.
    async fn sign_service_transaction(
        &self,
        session_id: &SessionId,
        pair: PaymentTransactionReplacing,
    ) -> Result<PaymentTransactionReplacing, OperationError>;

    /// Sign both legs meeting at this node: the incoming `credit` leg, then
    /// the outgoing `debit` leg.
    async fn sign_chain_transaction(
        &self,
        session_id: &SessionId,
        credit: PaymentTransactionReplacing,
        debit: PaymentTransactionReplacing,
    ) -> Result<(PaymentTransactionReplacing, PaymentTransactionReplacing), OperationError>;

    /// Commit an intermediary's incoming leg.
    async fn commit_chain_transaction(
        &self,
        session_id: &SessionId,
        pair: PaymentTransactionReplacing,
    ) -> Result<(), OperationError>;

    /// Commit the payee's incoming leg and settle the owed amount of the
    /// request.
    async fn commit_service_transaction(
        &self,
        session_id: &SessionId,
        pair: PaymentTransactionReplacing,
        request: PaymentRequest,
    ) -> Result<(), OperationError>;
}
