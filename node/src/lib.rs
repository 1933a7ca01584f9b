//! chainpay routing node.
//!
//! A node is one hop of a payment route. It:
//! - Builds, counter-signs and commits the ledger legs of the sessions it relays
//! - Accumulates repeated payments from the same counterparty into one
//!   outstanding ledger transaction
//! - Tracks what payers still owe it for requested services
//! - Settles outstanding transactions in sequence order (manually or on a timer)

pub mod accumulation;
pub mod auto_flush;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod shutdown;
pub mod tracing_spans;

pub use accumulation::{
    AccumulationError, AccumulationRegistry, OutstandingTransaction, PendingUsage,
};
pub use auto_flush::AutoFlusher;
pub use config::NodeConfig;
pub use engine::{FlushReport, LocalNode, NodeSettings};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use shutdown::ShutdownController;
