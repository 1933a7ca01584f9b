//! Per-session payment state machine.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chainpay_ledger::validate_pair;
use chainpay_network::CommandChannel;
use chainpay_node::tracing_spans::payment_span;
use chainpay_node::LocalNode;
use chainpay_protocol::{CreateTransactionArgs, NodeOperations, OperationError};
use chainpay_types::{PaymentRequest, PaymentTransactionReplacing, SessionId, ValidationError};
use serde::Serialize;
use tracing::Instrument;

use crate::route::{LegAmounts, Route};
use crate::{PaymentError, RoutingError, StatusCallback};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Building,
    Routed,
    Created,
    Signed,
    Verified,
    Committed,
    Failed,
}

impl PaymentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentState::Committed | PaymentState::Failed)
    }
}

/// Drives one session across its route.
///
/// `hops[k]` serves route hop `k + 1`; the payer (route hop 0) is the local
/// node and signs its own leg directly.
pub struct PaymentManager {
    session_id: SessionId,
    request: PaymentRequest,
    route: Route,
    hops: Vec<Arc<dyn NodeOperations>>,
    payer: Arc<LocalNode>,
    channel: Arc<CommandChannel>,
    callbacks: Vec<Arc<dyn StatusCallback>>,
    timeout: Duration,
    state: Mutex<PaymentState>,
}

impl fmt::Debug for PaymentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentManager")
            .field("session_id", &self.session_id)
            .field("hops", &self.route.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn hop_error(hop: &dyn NodeOperations, error: OperationError) -> PaymentError {
    PaymentError::Hop {
        node: hop.node_id().to_string(),
        error,
    }
}

fn discontinuity(index: usize, reason: String) -> ValidationError {
    ValidationError::LegDiscontinuity { index, reason }
}

impl PaymentManager {
    pub fn new(
        request: PaymentRequest,
        route: Route,
        hops: Vec<Arc<dyn NodeOperations>>,
        payer: Arc<LocalNode>,
        channel: Arc<CommandChannel>,
        timeout: Duration,
    ) -> Self {
        Self {
            session_id: request.session_id.clone(),
            request,
            route,
            hops,
            payer,
            channel,
            callbacks: Vec::new(),
            timeout,
            state: Mutex::new(PaymentState::Routed),
        }
    }

    pub fn with_callbacks(mut self, callbacks: Vec<Arc<dyn StatusCallback>>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn request(&self) -> &PaymentRequest {
        &self.request
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Correlation channel shared by this session's remote hops.
    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }

    pub fn state(&self) -> PaymentState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: PaymentState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// Claim the session for a run. Only a routed session can start.
    fn begin(&self) -> Result<(), PaymentError> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state != PaymentState::Routed {
            return Err(PaymentError::AlreadyStarted(self.session_id.clone()));
        }
        *state = PaymentState::Building;
        Ok(())
    }

    /// Run the session to a terminal state, bounded by the session timeout.
    ///
    /// Every status callback hears the outcome before this returns.
    pub async fn run(&self) -> Result<(), PaymentError> {
        self.begin()?;
        let span = payment_span(self.session_id.as_str(), self.payer.address().as_str());
        let result = async {
            match tokio::time::timeout(self.timeout, self.drive()).await {
                Ok(result) => result,
                Err(_) => Err(PaymentError::Timeout(self.session_id.clone())),
            }
        }
        .instrument(span)
        .await;

        let metrics = self.payer.metrics();
        match &result {
            Ok(()) => {
                self.set_state(PaymentState::Committed);
                metrics.sessions_completed.inc();
                tracing::info!(
                    session = %self.session_id,
                    amount = %self.request.amount,
                    "payment committed"
                );
            }
            Err(error) => {
                self.set_state(PaymentState::Failed);
                metrics.sessions_failed.inc();
                tracing::warn!(session = %self.session_id, %error, "payment failed");
            }
        }
        let success = result.is_ok();
        for callback in &self.callbacks {
            callback.on_status(&self.session_id, success).await;
        }
        result
    }

    async fn drive(&self) -> Result<(), PaymentError> {
        self.route
            .validate(self.payer.address(), &self.request.destination)?;
        self.check_hops()?;
        self.set_state(PaymentState::Routed);

        let amounts = self.route.leg_amounts(self.request.amount)?;
        let legs = self.create(&amounts).await?;
        self.set_state(PaymentState::Created);

        let legs = self.sign(legs).await?;
        self.set_state(PaymentState::Signed);

        self.verify(&legs, &amounts)?;
        self.set_state(PaymentState::Verified);

        self.commit(legs).await
    }

    fn check_hops(&self) -> Result<(), RoutingError> {
        let route = &self.route.hops()[1..];
        if self.hops.len() != route.len() {
            let missing = route
                .get(self.hops.len())
                .unwrap_or(self.route.payee())
                .node_id
                .clone();
            return Err(RoutingError::UnresolvedHop(missing));
        }
        for (hop, node) in self.hops.iter().zip(route) {
            if hop.address() != &node.address {
                return Err(RoutingError::UnresolvedHop(node.node_id.clone()));
            }
        }
        Ok(())
    }

    /// Ask every hop for its incoming leg, payee first.
    async fn create(
        &self,
        amounts: &[LegAmounts],
    ) -> Result<Vec<PaymentTransactionReplacing>, PaymentError> {
        let route = self.route.hops();
        let mut legs = Vec::with_capacity(self.hops.len());
        for (index, hop) in self.hops.iter().enumerate().rev() {
            let leg = amounts[index];
            let source = &route[index].address;
            let pair = hop
                .create_transaction(
                    &self.session_id,
                    CreateTransactionArgs {
                        total_in: leg.total_in,
                        total_out: leg.total_out,
                        fee: leg.fee,
                        source: source.clone(),
                    },
                )
                .await
                .map_err(|e| hop_error(hop.as_ref(), e))?;
            if &pair.pending.payment_source_address != source
                || pair.pending.payment_destination_address != route[index + 1].address
            {
                return Err(discontinuity(
                    index,
                    format!(
                        "hop {} created a leg {} -> {}",
                        hop.node_id(),
                        pair.pending.payment_source_address,
                        pair.pending.payment_destination_address
                    ),
                )
                .into());
            }
            legs.push(pair);
        }
        legs.reverse();
        Ok(legs)
    }

    /// Payee signs its leg, then every intermediary signs the two legs
    /// meeting at it, walking forward. The payer signs the first leg last.
    async fn sign(
        &self,
        mut legs: Vec<PaymentTransactionReplacing>,
    ) -> Result<Vec<PaymentTransactionReplacing>, PaymentError> {
        let last = legs.len() - 1;
        let payee = &self.hops[last];
        legs[last] = payee
            .sign_service_transaction(&self.session_id, legs[last].clone())
            .await
            .map_err(|e| hop_error(payee.as_ref(), e))?;

        for index in 0..last {
            let hop = &self.hops[index];
            let (credit, debit) = hop
                .sign_chain_transaction(
                    &self.session_id,
                    legs[index].clone(),
                    legs[index + 1].clone(),
                )
                .await
                .map_err(|e| hop_error(hop.as_ref(), e))?;
            legs[index] = credit;
            legs[index + 1] = debit;
        }

        let first = &mut legs[0].pending;
        first.envelope = self
            .payer
            .ledger()
            .sign(&first.envelope, self.payer.keypair())?;
        Ok(legs)
    }

    /// Re-check the whole chain locally before anything is committed.
    fn verify(
        &self,
        legs: &[PaymentTransactionReplacing],
        amounts: &[LegAmounts],
    ) -> Result<(), ValidationError> {
        let route = self.route.hops();
        let ledger = self.payer.ledger().as_ref();
        for (index, pair) in legs.iter().enumerate() {
            let tx = &pair.pending;
            validate_pair(ledger, pair, true)?;
            if pair.session_id() != &self.session_id {
                return Err(ValidationError::SessionMismatch {
                    expected: self.session_id.to_string(),
                    found: pair.session_id().to_string(),
                });
            }
            if tx.asset != self.request.asset {
                return Err(ValidationError::AssetMismatch {
                    expected: self.request.asset.to_string(),
                    found: tx.asset.to_string(),
                });
            }
            if tx.payment_source_address != route[index].address
                || tx.payment_destination_address != route[index + 1].address
            {
                return Err(discontinuity(index, "leg does not join adjacent hops".into()));
            }
            let expected = amounts[index];
            if tx.own_reference_amount_in != expected.total_in
                || tx.own_amount_out != expected.total_out
            {
                return Err(discontinuity(
                    index,
                    format!(
                        "leg carries {} -> {}, route expects {} -> {}",
                        tx.own_reference_amount_in,
                        tx.own_amount_out,
                        expected.total_in,
                        expected.total_out
                    ),
                ));
            }
            if index > 0 && legs[index - 1].pending.own_amount_out != tx.own_reference_amount_in {
                return Err(discontinuity(
                    index,
                    "previous hop forwards a different amount".into(),
                ));
            }
        }
        Ok(())
    }

    /// Commit forward, so every intermediary's incoming leg lands before its
    /// outgoing one.
    async fn commit(&self, legs: Vec<PaymentTransactionReplacing>) -> Result<(), PaymentError> {
        let last = legs.len() - 1;
        for (index, pair) in legs.into_iter().enumerate() {
            let hop = &self.hops[index];
            let result = if index == last {
                hop.commit_service_transaction(&self.session_id, pair, self.request.clone())
                    .await
            } else {
                hop.commit_chain_transaction(&self.session_id, pair).await
            };
            result.map_err(|e| hop_error(hop.as_ref(), e))?;
        }
        Ok(())
    }
}
