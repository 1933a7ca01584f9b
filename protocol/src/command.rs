//! Command and response envelopes.

use chainpay_types::{
    Address, Amount, CommandId, NodeId, PaymentRequest, PaymentTransactionReplacing, SessionId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{OperationError, PROTOCOL_VERSION};

/// Arguments of the create operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransactionArgs {
    /// What the hop receives from `source` for this session.
    pub total_in: Amount,
    /// What the hop forwards downstream for this session.
    pub total_out: Amount,
    /// Fee the caller believes the hop charges; must equal `total_in - total_out`.
    pub fee: Amount,
    /// Upstream address paying the hop.
    pub source: Address,
}

/// The operations a routing node executes on behalf of a payment session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command_type", content = "body", rename_all = "snake_case")]
pub enum NodeCommand {
    CreateTransaction(CreateTransactionArgs),
    SignServiceTransaction {
        pair: PaymentTransactionReplacing,
    },
    SignChainTransaction {
        credit: PaymentTransactionReplacing,
        debit: PaymentTransactionReplacing,
    },
    CommitChainTransaction {
        pair: PaymentTransactionReplacing,
    },
    CommitServiceTransaction {
        pair: PaymentTransactionReplacing,
        request: PaymentRequest,
    },
}

/// Discriminant of [`NodeCommand`], used for logging and metrics labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandType {
    CreateTransaction,
    SignServiceTransaction,
    SignChainTransaction,
    CommitChainTransaction,
    CommitServiceTransaction,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::CreateTransaction => "create_transaction",
            CommandType::SignServiceTransaction => "sign_service_transaction",
            CommandType::SignChainTransaction => "sign_chain_transaction",
            CommandType::CommitChainTransaction => "commit_chain_transaction",
            CommandType::CommitServiceTransaction => "commit_service_transaction",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NodeCommand {
    pub fn command_type(&self) -> CommandType {
        match self {
            NodeCommand::CreateTransaction(_) => CommandType::CreateTransaction,
            NodeCommand::SignServiceTransaction { .. } => CommandType::SignServiceTransaction,
            NodeCommand::SignChainTransaction { .. } => CommandType::SignChainTransaction,
            NodeCommand::CommitChainTransaction { .. } => CommandType::CommitChainTransaction,
            NodeCommand::CommitServiceTransaction { .. } => CommandType::CommitServiceTransaction,
        }
    }
}

/// Result of executing a [`NodeCommand`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "body", rename_all = "snake_case")]
pub enum NodeReply {
    Created(PaymentTransactionReplacing),
    ServiceSigned(PaymentTransactionReplacing),
    ChainSigned {
        credit: PaymentTransactionReplacing,
        debit: PaymentTransactionReplacing,
    },
    Committed,
    Failed(OperationError),
}

impl NodeReply {
    pub fn is_failure(&self) -> bool {
        matches!(self, NodeReply::Failed(_))
    }
}

/// A command addressed to one node on behalf of one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default = "default_version")]
    pub version: u16,
    pub command_id: CommandId,
    pub session_id: SessionId,
    pub node_id: NodeId,
    /// Base URL to POST the response to when the node answers
    /// asynchronously. `None` asks for a synchronous reply.
    #[serde(default)]
    pub reply_to: Option<String>,
    pub command: NodeCommand,
}

fn default_version() -> u16 {
    PROTOCOL_VERSION
}

impl Command {
    pub fn new(
        command_id: CommandId,
        session_id: SessionId,
        node_id: NodeId,
        command: NodeCommand,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command_id,
            session_id,
            node_id,
            reply_to: None,
            command,
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn command_type(&self) -> CommandType {
        self.command.command_type()
    }

    /// Build the response to this command.
    pub fn respond(&self, body: NodeReply) -> CommandResponse {
        CommandResponse {
            command_id: self.command_id.clone(),
            session_id: self.session_id.clone(),
            node_id: self.node_id.clone(),
            body,
        }
    }
}

/// The answer to a [`Command`], correlated by `command_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub command_id: CommandId,
    pub session_id: SessionId,
    pub node_id: NodeId,
    pub body: NodeReply,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    fn create_command() -> Command {
        Command::new(
            CommandId::from("cmd-1"),
            SessionId::from("session-1"),
            NodeId::from("node-a"),
            NodeCommand::CreateTransaction(CreateTransactionArgs {
                total_in: Amount::new(320),
                total_out: Amount::new(310),
                fee: Amount::new(10),
                source: Address::new("hop_payer"),
            }),
        )
    }

    #[test]
    fn command_wire_shape_carries_type_discriminant() {
        let bytes = encode(&create_command()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["command_id"], "cmd-1");
        assert_eq!(json["session_id"], "session-1");
        assert_eq!(json["node_id"], "node-a");
        assert_eq!(json["command"]["command_type"], "create_transaction");
        assert_eq!(json["command"]["body"]["fee"], 10);
    }

    #[test]
    fn missing_version_defaults_to_current() {
        let mut json = serde_json::to_value(create_command()).unwrap();
        json.as_object_mut().unwrap().remove("version");
        let command: Command = serde_json::from_value(json).unwrap();
        assert_eq!(command.version, PROTOCOL_VERSION);
    }

    #[test]
    fn failure_reply_keeps_error_kind() {
        let response = create_command().respond(NodeReply::Failed(OperationError::Routing(
            "no such hop".into(),
        )));
        let decoded: CommandResponse = decode(&encode(&response).unwrap()).unwrap();
        assert!(decoded.body.is_failure());
        assert_eq!(
            decoded.body,
            NodeReply::Failed(OperationError::Routing("no such hop".into()))
        );
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        assert!(decode::<Command>(b"{not json").is_err());
    }
}
