//! Routing node description.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, NodeId};

/// One hop of a payment route as published by route discovery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingNode {
    pub node_id: NodeId,
    pub address: Address,
    /// Fee this hop charges for relaying. Only intermediaries collect it.
    #[serde(default)]
    pub fee: Amount,
    /// Base URL of the node's command endpoint. `None` for hops served
    /// in-process or for the payer itself.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl RoutingNode {
    pub fn new(node_id: impl Into<NodeId>, address: impl Into<Address>, fee: Amount) -> Self {
        Self {
            node_id: node_id.into(),
            address: address.into(),
            fee,
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}
