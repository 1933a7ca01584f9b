//! Payment orchestration.
//!
//! A payment session routes one [`PaymentRequest`](chainpay_types::PaymentRequest)
//! from the payer (this node) to the payee through a [`Route`] of hops:
//!
//! 1. [`PaymentManagerRegistry::create`] builds the route (from the caller or
//!    from route discovery) and resolves every hop to a local node or a
//!    [`RemoteNode`](chainpay_network::RemoteNode)
//! 2. [`PaymentManager::run`] drives create → sign → verify → commit
//! 3. Status callbacks hear about the outcome; the registry forgets the session

pub mod error;
pub mod manager;
pub mod registry;
pub mod route;
pub mod status;

pub use error::PaymentError;
pub use manager::{PaymentManager, PaymentState};
pub use registry::{ExecuteOutcome, PaymentManagerRegistry, RegistryConfig};
pub use route::{LegAmounts, Route, RouteBuilder, RoutingError};
pub use status::{HttpStatusNotifier, StatusCallback, StatusNotification};
