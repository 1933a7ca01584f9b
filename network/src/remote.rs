//! Remote node proxy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chainpay_protocol::{
    Command, CreateTransactionArgs, NodeCommand, NodeOperations, NodeReply, OperationError,
};
use chainpay_types::{
    Address, NodeId, PaymentRequest, PaymentTransactionReplacing, RoutingNode, SessionId,
};

use crate::{CommandChannel, Transport};

/// A hop running in another process, reached through a [`Transport`].
///
/// Every operation becomes one [`NodeCommand`]; the response is correlated
/// through the shared [`CommandChannel`]. A failure reported by the remote
/// hop keeps its kind, transport and correlation failures become
/// [`OperationError::Transport`].
pub struct RemoteNode {
    node_id: NodeId,
    address: Address,
    endpoint: String,
    channel: Arc<CommandChannel>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    reply_to: Option<String>,
}

impl RemoteNode {
    pub fn new(
        node_id: NodeId,
        address: Address,
        endpoint: impl Into<String>,
        channel: Arc<CommandChannel>,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Self {
        Self {
            node_id,
            address,
            endpoint: endpoint.into(),
            channel,
            transport,
            timeout,
            reply_to: None,
        }
    }

    /// Proxy for a routing hop that advertises an endpoint.
    pub fn for_hop(
        hop: &RoutingNode,
        channel: Arc<CommandChannel>,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Option<Self> {
        let endpoint = hop.endpoint.clone()?;
        Some(Self::new(
            hop.node_id.clone(),
            hop.address.clone(),
            endpoint,
            channel,
            transport,
            timeout,
        ))
    }

    /// Ask the hop to answer asynchronously at `reply_to`.
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(
        &self,
        session_id: &SessionId,
        command: NodeCommand,
    ) -> Result<NodeReply, OperationError> {
        let mut command = Command::new(
            self.channel.next_command_id(),
            session_id.clone(),
            self.node_id.clone(),
            command,
        );
        if let Some(reply_to) = &self.reply_to {
            command = command.with_reply_to(reply_to.clone());
        }
        tracing::debug!(
            command_id = %command.command_id,
            session = %session_id,
            node = %self.node_id,
            command_type = %command.command_type(),
            "sending command"
        );

        let response = self
            .channel
            .request(self.transport.as_ref(), &self.endpoint, command, self.timeout)
            .await?;
        match response.body {
            NodeReply::Failed(e) => Err(e),
            reply => Ok(reply),
        }
    }
}

fn unexpected(reply: NodeReply) -> OperationError {
    OperationError::Transport(format!("unexpected reply: {reply:?}"))
}

#[async_trait]
impl NodeOperations for RemoteNode {
    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    fn address(&self) -> &Address {
        &self.address
    }

    async fn create_transaction(
        &self,
        session_id: &SessionId,
        args: CreateTransactionArgs,
    ) -> Result<PaymentTransactionReplacing, OperationError> {
        match self
            .call(session_id, NodeCommand::CreateTransaction(args))
            .await?
        {
            NodeReply::Created(pair) => Ok(pair),
            other => Err(unexpected(other)),
        }
    }

    async fn sign_service_transaction(
        &self,
        session_id: &SessionId,
        pair: PaymentTransactionReplacing,
    ) -> Result<PaymentTransactionReplacing, OperationError> {
        match self
            .call(session_id, NodeCommand::SignServiceTransaction { pair })
            .await?
        {
            NodeReply::ServiceSigned(pair) => Ok(pair),
            other => Err(unexpected(other)),
        }
    }

    async fn sign_chain_transaction(
        &self,
        session_id: &SessionId,
        credit: PaymentTransactionReplacing,
        debit: PaymentTransactionReplacing,
    ) -> Result<(PaymentTransactionReplacing, PaymentTransactionReplacing), OperationError> {
        match self
            .call(session_id, NodeCommand::SignChainTransaction { credit, debit })
            .await?
        {
            NodeReply::ChainSigned { credit, debit } => Ok((credit, debit)),
            other => Err(unexpected(other)),
        }
    }

    async fn commit_chain_transaction(
        &self,
        session_id: &SessionId,
        pair: PaymentTransactionReplacing,
    ) -> Result<(), OperationError> {
        match self
            .call(session_id, NodeCommand::CommitChainTransaction { pair })
            .await?
        {
            NodeReply::Committed => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn commit_service_transaction(
        &self,
        session_id: &SessionId,
        pair: PaymentTransactionReplacing,
        request: PaymentRequest,
    ) -> Result<(), OperationError> {
        match self
            .call(
                session_id,
                NodeCommand::CommitServiceTransaction { pair, request },
            )
            .await?
        {
            NodeReply::Committed => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}
