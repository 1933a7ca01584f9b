//! Hop protocol — the operation contract every routing node exposes, the
//! command envelopes that carry those operations to remote nodes, and the
//! dispatcher that executes an inbound command against a local node.
//!
//! The four chain operations (create, sign-service, sign-chain, commit) are a
//! closed set: [`NodeCommand`] and [`NodeReply`] enumerate them and every
//! consumer matches them exhaustively.

pub mod codec;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod operations;
pub mod version;

pub use command::{
    Command, CommandResponse, CommandType, CreateTransactionArgs, NodeCommand, NodeReply,
};
pub use dispatch::execute;
pub use error::{OperationError, ProtocolError};
pub use operations::NodeOperations;
pub use version::PROTOCOL_VERSION;
