//! Hop transport for chainpay.
//!
//! - [`CommandChannel`]: correlates a command with its response, whether the
//!   response comes back in the dispatch call or later through `/responses`
//! - [`Transport`]: how a command reaches a hop ([`HttpTransport`] over HTTP)
//! - [`RemoteNode`]: the node operation contract over a channel + transport
//! - [`RouteDiscovery`]: where routes come from ([`HttpRouteDiscovery`])

pub mod channel;
pub mod discovery;
pub mod error;
pub mod remote;
pub mod transport;

pub use channel::{CommandChannel, ResponseSink, ResponseSlot};
pub use discovery::{DiscoveredRoute, HttpRouteDiscovery, RouteDiscovery};
pub use error::{DiscoveryError, TransportError};
pub use remote::RemoteNode;
pub use transport::{HttpTransport, Transport};
