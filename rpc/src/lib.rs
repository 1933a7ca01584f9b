//! HTTP surface of a chainpay node.
//!
//! Serves the hop protocol (`/commands`, `/responses`) to other nodes and a
//! small control API to operators: payment requests, payments, flush,
//! balance, status and Prometheus metrics.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use server::{router, serve, RpcServer, RpcState};
