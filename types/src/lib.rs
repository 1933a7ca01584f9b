//! Fundamental types for the chainpay relay protocol.
//!
//! This crate defines the data model shared by every other crate in the workspace:
//! ledger addresses, amounts, identifiers, the opaque ledger envelope, payment
//! requests, hop transactions and their accumulation pairs, and the structural
//! validation rules those transactions must satisfy.

pub mod address;
pub mod amount;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod keys;
pub mod payment;
pub mod routing;
pub mod time;
pub mod validation;

pub use address::Address;
pub use amount::{Amount, Asset};
pub use envelope::Envelope;
pub use error::ValidationError;
pub use ids::{CommandId, NodeId, SessionId};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use payment::{PaymentRequest, PaymentTransaction, PaymentTransactionReplacing};
pub use routing::RoutingNode;
pub use time::Timestamp;
