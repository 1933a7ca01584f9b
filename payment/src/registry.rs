//! Session registry.
//!
//! One [`PaymentManagerRegistry`] per payer process. It owns every live
//! session, resolves route hops to in-process nodes or remote proxies, and
//! hands inbound asynchronous responses to the session that is waiting for
//! them. Sessions are removed once they reach a terminal state, or once the
//! session timeout passes without anyone executing them.

use std::sync::Arc;
use std::time::Duration;

use chainpay_network::{
    CommandChannel, RemoteNode, ResponseSink, RouteDiscovery, Transport,
};
use chainpay_node::{LocalNode, NodeConfig};
use chainpay_protocol::{CommandResponse, NodeOperations};
use chainpay_types::{Address, Amount, NodeId, PaymentRequest, RoutingNode, SessionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::{
    HttpStatusNotifier, PaymentError, PaymentManager, PaymentState, RouteBuilder, RoutingError,
    StatusCallback,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Bound on each remote command.
    pub command_timeout: Duration,
    /// Bound on a whole session.
    pub session_timeout: Duration,
    /// Run sessions in the background and answer `execute` immediately.
    pub async_completion: bool,
    /// Where remote hops may post asynchronous responses.
    pub reply_to: Option<String>,
    pub status_callback_url: Option<String>,
}

impl RegistryConfig {
    pub fn from_node_config(config: &NodeConfig) -> Self {
        Self {
            command_timeout: config.command_timeout(),
            session_timeout: config.session_timeout(),
            async_completion: config.async_completion,
            reply_to: config.public_endpoint.clone(),
            status_callback_url: config.status_callback_url.clone(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from_node_config(&NodeConfig::default())
    }
}

/// What `execute` reports back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "session_id", rename_all = "snake_case")]
pub enum ExecuteOutcome {
    /// The session ran to completion and committed.
    Committed(SessionId),
    /// The session is running in the background; its outcome goes to the
    /// status callbacks.
    Accepted(SessionId),
}

pub struct PaymentManagerRegistry {
    payer: Arc<LocalNode>,
    discovery: Option<Arc<dyn RouteDiscovery>>,
    transport: Arc<dyn Transport>,
    locals: DashMap<NodeId, Arc<dyn NodeOperations>>,
    sessions: Arc<DashMap<SessionId, Arc<PaymentManager>>>,
    callbacks: Vec<Arc<dyn StatusCallback>>,
    config: RegistryConfig,
}

impl PaymentManagerRegistry {
    pub fn new(
        payer: Arc<LocalNode>,
        transport: Arc<dyn Transport>,
        config: RegistryConfig,
    ) -> Self {
        let mut callbacks: Vec<Arc<dyn StatusCallback>> = Vec::new();
        if config.status_callback_url.is_some() {
            callbacks.push(Arc::new(HttpStatusNotifier::new(
                config.status_callback_url.clone(),
            )));
        }
        Self {
            payer,
            discovery: None,
            transport,
            locals: DashMap::new(),
            sessions: Arc::new(DashMap::new()),
            callbacks,
            config,
        }
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn RouteDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Tell `callback` about every session this registry finishes.
    pub fn with_callback(mut self, callback: Arc<dyn StatusCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Serve hop `node` in-process instead of through the transport.
    pub fn register_local(&self, node: Arc<dyn NodeOperations>) {
        self.locals.insert(node.node_id().clone(), node);
    }

    pub fn payer(&self) -> &Arc<LocalNode> {
        &self.payer
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn has(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Arc<PaymentManager>> {
        self.sessions.get(session_id).map(|m| Arc::clone(m.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Create a session paying `request` from `source`.
    ///
    /// `hops` runs from the first hop after the payer through the payee;
    /// without it the route comes from route discovery.
    pub async fn create(
        &self,
        source: &Address,
        request: PaymentRequest,
        hops: Option<Vec<RoutingNode>>,
    ) -> Result<Arc<PaymentManager>, PaymentError> {
        let session_id = request.session_id.clone();
        if self.has(&session_id) {
            return Err(PaymentError::DuplicateSession(session_id));
        }
        let payer_address = self.payer.address();
        if source != payer_address {
            return Err(RoutingError::SourceMismatch {
                expected: payer_address.clone(),
                found: source.clone(),
            }
            .into());
        }

        let (hops, callback_url) = match hops {
            Some(hops) => (hops, None),
            None => {
                let discovery = self
                    .discovery
                    .as_ref()
                    .ok_or_else(|| RoutingError::NoRoute(session_id.clone()))?;
                let route = discovery
                    .get_route(&session_id, self.payer.node_id(), payer_address)
                    .await?;
                (route.hops, route.callback_url)
            }
        };

        let route = {
            let mut builder = RouteBuilder::new();
            builder.add_source(RoutingNode::new(
                self.payer.node_id().clone(),
                payer_address.clone(),
                Amount::ZERO,
            ))?;
            let mut hops = hops;
            let destination = hops.pop().ok_or(RoutingError::MissingDestination)?;
            for hop in hops {
                builder.add_chain(hop)?;
            }
            builder.add_destination(destination)?;
            builder.build()?
        };
        route.validate(payer_address, &request.destination)?;

        let channel = Arc::new(CommandChannel::new());
        let resolved = route.hops()[1..]
            .iter()
            .map(|hop| self.resolve(hop, &channel))
            .collect::<Result<Vec<_>, _>>()?;

        let mut callbacks = self.callbacks.clone();
        if let Some(url) = callback_url {
            callbacks.push(Arc::new(HttpStatusNotifier::new(Some(url))));
        }
        let manager = Arc::new(
            PaymentManager::new(
                request,
                route,
                resolved,
                Arc::clone(&self.payer),
                channel,
                self.config.session_timeout,
            )
            .with_callbacks(callbacks),
        );

        match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(_) => Err(PaymentError::DuplicateSession(session_id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&manager));
                tracing::debug!(
                    session = %session_id,
                    hops = manager.route().len(),
                    "session created"
                );
                self.evict_if_never_run(session_id, &manager);
                Ok(manager)
            }
        }
    }

    /// Drop the session after the session timeout if it is still waiting
    /// for `execute`.
    fn evict_if_never_run(&self, session_id: SessionId, manager: &Arc<PaymentManager>) {
        let sessions = Arc::clone(&self.sessions);
        let manager = Arc::downgrade(manager);
        let timeout = self.config.session_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let evicted = sessions.remove_if(&session_id, |_, live| {
                std::ptr::eq(Arc::as_ptr(live), manager.as_ptr())
                    && live.state() == PaymentState::Routed
            });
            if evicted.is_some() {
                tracing::debug!(session = %session_id, "evicted session that never ran");
            }
        });
    }

    fn resolve(
        &self,
        hop: &RoutingNode,
        channel: &Arc<CommandChannel>,
    ) -> Result<Arc<dyn NodeOperations>, RoutingError> {
        if let Some(local) = self.locals.get(&hop.node_id) {
            if local.address() == &hop.address {
                return Ok(Arc::clone(local.value()));
            }
        }
        let remote = RemoteNode::for_hop(
            hop,
            Arc::clone(channel),
            Arc::clone(&self.transport),
            self.config.command_timeout,
        )
        .ok_or_else(|| RoutingError::UnresolvedHop(hop.node_id.clone()))?;
        let remote = match &self.config.reply_to {
            Some(reply_to) => remote.with_reply_to(reply_to.clone()),
            None => remote,
        };
        Ok(Arc::new(remote))
    }

    /// Route an inbound asynchronous response to the session waiting for it.
    pub fn deliver(&self, response: CommandResponse) -> bool {
        match self.get(&response.session_id) {
            Some(manager) => manager.channel().deliver(response),
            None => {
                tracing::debug!(
                    session = %response.session_id,
                    command_id = %response.command_id,
                    "dropping response for unknown session"
                );
                false
            }
        }
    }

    /// Run a created session.
    ///
    /// With async completion the session runs in the background and this
    /// returns [`ExecuteOutcome::Accepted`] straight away.
    pub async fn execute(
        self: &Arc<Self>,
        session_id: &SessionId,
    ) -> Result<ExecuteOutcome, PaymentError> {
        let manager = self
            .get(session_id)
            .ok_or_else(|| PaymentError::NotFound(session_id.clone()))?;

        if self.config.async_completion {
            let registry = Arc::clone(self);
            let session_id = session_id.clone();
            let outcome = ExecuteOutcome::Accepted(session_id.clone());
            tokio::spawn(async move {
                let result = manager.run().await;
                registry.finish(&session_id, &result);
            });
            return Ok(outcome);
        }

        let result = manager.run().await;
        self.finish(session_id, &result);
        result.map(|()| ExecuteOutcome::Committed(session_id.clone()))
    }

    fn finish(&self, session_id: &SessionId, result: &Result<(), PaymentError>) {
        if matches!(result, Err(PaymentError::AlreadyStarted(_))) {
            return;
        }
        self.sessions.remove(session_id);
    }

    /// Create and execute in one call.
    pub async fn pay(
        self: &Arc<Self>,
        request: PaymentRequest,
        hops: Option<Vec<RoutingNode>>,
    ) -> Result<ExecuteOutcome, PaymentError> {
        let source = self.payer.address().clone();
        let manager = self.create(&source, request, hops).await?;
        self.execute(manager.session_id()).await
    }
}

impl ResponseSink for PaymentManagerRegistry {
    fn deliver(&self, response: CommandResponse) -> bool {
        PaymentManagerRegistry::deliver(self, response)
    }
}
