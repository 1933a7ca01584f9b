//! Route discovery client.

use std::time::Duration;

use async_trait::async_trait;
use chainpay_types::{Address, NodeId, RoutingNode, SessionId};
use serde::{Deserialize, Serialize};

use crate::DiscoveryError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Hops for one session, from the first hop after the payer up to and
/// including the payee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredRoute {
    pub hops: Vec<RoutingNode>,
    /// Where the session's status callback should go, if anywhere.
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[async_trait]
pub trait RouteDiscovery: Send + Sync {
    /// Route a session paid by the node `exclude_node_id` / `exclude_address`,
    /// which must not appear among the returned hops.
    async fn get_route(
        &self,
        session_id: &SessionId,
        exclude_node_id: &NodeId,
        exclude_address: &Address,
    ) -> Result<DiscoveredRoute, DiscoveryError>;
}

/// `GET {base_url}/route?session_id=..&exclude_node_id=..&exclude_address=..`
pub struct HttpRouteDiscovery {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpRouteDiscovery {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            http_client,
        }
    }
}

#[async_trait]
impl RouteDiscovery for HttpRouteDiscovery {
    async fn get_route(
        &self,
        session_id: &SessionId,
        exclude_node_id: &NodeId,
        exclude_address: &Address,
    ) -> Result<DiscoveredRoute, DiscoveryError> {
        let url = format!("{}/route", self.base_url.trim_end_matches('/'));
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("session_id", session_id.as_str()),
                ("exclude_node_id", exclude_node_id.as_str()),
                ("exclude_address", exclude_address.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    DiscoveryError::Unreachable(e.to_string())
                } else {
                    DiscoveryError::RequestFailed(e.to_string())
                }
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DiscoveryError::NoRoute(session_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(DiscoveryError::RequestFailed(format!(
                "HTTP status {}",
                response.status()
            )));
        }

        let route: DiscoveredRoute = response
            .json()
            .await
            .map_err(|e| DiscoveryError::InvalidResponse(e.to_string()))?;
        if route.hops.is_empty() {
            return Err(DiscoveryError::NoRoute(session_id.to_string()));
        }
        Ok(route)
    }
}
