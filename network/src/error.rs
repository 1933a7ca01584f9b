use chainpay_protocol::{OperationError, ProtocolError};
use chainpay_types::CommandId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("hop unreachable: {0}")]
    Unreachable(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no response to command {command_id} within {after_ms}ms")]
    Timeout { command_id: CommandId, after_ms: u64 },

    #[error("response slot for command {0} closed before a response arrived")]
    ChannelClosed(CommandId),

    #[error("no hop listening at {0}")]
    UnknownEndpoint(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<TransportError> for OperationError {
    fn from(e: TransportError) -> Self {
        OperationError::Transport(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("route discovery unreachable: {0}")]
    Unreachable(String),

    #[error("route discovery request failed: {0}")]
    RequestFailed(String),

    #[error("invalid route discovery response: {0}")]
    InvalidResponse(String),

    #[error("no route for session {0}")]
    NoRoute(String),
}
