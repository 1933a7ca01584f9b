//! Nullable infrastructure for deterministic testing.
//!
//! Every external collaborator of the relay (ledger, route discovery, hop
//! transport) sits behind a trait. This crate provides in-memory
//! implementations that:
//! - Behave deterministically
//! - Can be steered programmatically (funding, failure injection, reply mode)
//! - Never touch the filesystem or network
//!
//! The daemon also uses [`NullLedger`] as its development ledger.

pub mod discovery;
pub mod ledger;
pub mod transport;

pub use discovery::NullRouteDiscovery;
pub use ledger::{NullLedger, DEFAULT_ASSET};
pub use transport::{LoopbackTransport, ReplyMode};
