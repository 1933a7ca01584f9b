//! Nullable route discovery — routes configured up front.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chainpay_network::{DiscoveredRoute, DiscoveryError, RouteDiscovery};
use chainpay_types::{Address, NodeId, RoutingNode, SessionId};

#[derive(Default)]
pub struct NullRouteDiscovery {
    routes: Mutex<HashMap<SessionId, DiscoveredRoute>>,
    fallback: Mutex<Option<DiscoveredRoute>>,
    requests: Mutex<Vec<(SessionId, NodeId, Address)>>,
}

impl NullRouteDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every session without its own route with `hops`.
    pub fn with_default_route(hops: Vec<RoutingNode>) -> Self {
        let discovery = Self::new();
        discovery.set_default(DiscoveredRoute {
            hops,
            callback_url: None,
        });
        discovery
    }

    pub fn set_route(&self, session_id: SessionId, route: DiscoveredRoute) {
        self.routes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(session_id, route);
    }

    pub fn set_default(&self, route: DiscoveredRoute) {
        *self.fallback.lock().unwrap_or_else(|p| p.into_inner()) = Some(route);
    }

    /// Every `(session, exclude_node_id, exclude_address)` asked for so far.
    pub fn requests(&self) -> Vec<(SessionId, NodeId, Address)> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl RouteDiscovery for NullRouteDiscovery {
    async fn get_route(
        &self,
        session_id: &SessionId,
        exclude_node_id: &NodeId,
        exclude_address: &Address,
    ) -> Result<DiscoveredRoute, DiscoveryError> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).push((
            session_id.clone(),
            exclude_node_id.clone(),
            exclude_address.clone(),
        ));
        let configured = self
            .routes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(session_id)
            .cloned();
        configured
            .or_else(|| self.fallback.lock().unwrap_or_else(|p| p.into_inner()).clone())
            .ok_or_else(|| DiscoveryError::NoRoute(session_id.to_string()))
    }
}
