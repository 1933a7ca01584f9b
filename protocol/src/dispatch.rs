//! Execute inbound commands against a node.

use crate::version::is_compatible;
use crate::{Command, CommandResponse, NodeCommand, NodeOperations, NodeReply, OperationError};

/// Execute `command` against `node` and wrap the outcome in a response.
///
/// Never fails: operation errors become [`NodeReply::Failed`] so the caller
/// always has something to correlate.
pub async fn execute(node: &dyn NodeOperations, command: Command) -> CommandResponse {
    let body = match run(node, &command).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(
                command_id = %command.command_id,
                session = %command.session_id,
                command_type = %command.command_type(),
                error = %e,
                "command failed"
            );
            NodeReply::Failed(e)
        }
    };
    command.respond(body)
}

async fn run(node: &dyn NodeOperations, command: &Command) -> Result<NodeReply, OperationError> {
    if !is_compatible(command.version) {
        return Err(OperationError::Other(format!(
            "unsupported protocol version {}",
            command.version
        )));
    }
    if &command.node_id != node.node_id() {
        return Err(OperationError::Routing(format!(
            "command for node {} delivered to node {}",
            command.node_id,
            node.node_id()
        )));
    }

    tracing::debug!(
        command_id = %command.command_id,
        session = %command.session_id,
        command_type = %command.command_type(),
        "executing command"
    );

    let session = &command.session_id;
    let reply = match command.command.clone() {
        NodeCommand::CreateTransaction(args) => {
            NodeReply::Created(node.create_transaction(session, args).await?)
        }
        NodeCommand::SignServiceTransaction { pair } => {
            NodeReply::ServiceSigned(node.sign_service_transaction(session, pair).await?)
        }
        NodeCommand::SignChainTransaction { credit, debit } => {
            let (credit, debit) = node.sign_chain_transaction(session, credit, debit).await?;
            NodeReply::ChainSigned { credit, debit }
        }
        NodeCommand::CommitChainTransaction { pair } => {
            node.commit_chain_transaction(session, pair).await?;
            NodeReply::Committed
        }
        NodeCommand::CommitServiceTransaction { pair, request } => {
            node.commit_service_transaction(session, pair, request).await?;
            NodeReply::Committed
        }
    };
    Ok(reply)
}
