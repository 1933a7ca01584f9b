//! Node protocol engine.
//!
//! [`LocalNode`] implements the hop operations against the accumulation
//! registry and the ledger client:
//!
//! - **create**: build this node's incoming leg, folding in the outstanding
//!   transaction from the same payer when accumulating
//! - **sign**: counter-sign the service leg (payee) or both legs meeting at
//!   this node (intermediary)
//! - **commit**: submit the incoming leg now, or save it for the next flush
//! - **flush**: submit every saved leg in ascending sequence order

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chainpay_ledger::{validate_pair, BuildRequest, LedgerClient};
use chainpay_protocol::{CreateTransactionArgs, NodeOperations, OperationError};
use chainpay_types::{
    Address, Amount, Asset, KeyPair, NodeId, PaymentRequest, PaymentTransaction,
    PaymentTransactionReplacing, SessionId, ValidationError,
};
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::tracing_spans::flush_span;
use crate::{AccumulationError, AccumulationRegistry, NodeConfig, NodeError, NodeMetrics};

/// Economic identity of a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSettings {
    pub node_id: NodeId,
    /// Fee charged when relaying as an intermediary.
    pub fee: Amount,
    pub asset: Asset,
    pub accumulate: bool,
}

impl NodeSettings {
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            node_id: config.node_id(),
            fee: config.fee(),
            asset: config.asset(),
            accumulate: config.accumulate,
        }
    }
}

/// Sequence numbers submitted by one flush, in submission order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub submitted: Vec<i64>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty()
    }
}

impl From<AccumulationError> for OperationError {
    fn from(e: AccumulationError) -> Self {
        match e {
            AccumulationError::NotFound(session) => {
                OperationError::NotFound(format!("pending amount for session {session}"))
            }
            other => OperationError::Other(other.to_string()),
        }
    }
}

pub struct LocalNode {
    settings: NodeSettings,
    address: Address,
    keypair: KeyPair,
    ledger: Arc<dyn LedgerClient>,
    registry: Arc<AccumulationRegistry>,
    /// Serializes flushes, and commits against flushes.
    flush_lock: Mutex<()>,
    metrics: Arc<NodeMetrics>,
}

impl LocalNode {
    pub fn new(settings: NodeSettings, keypair: KeyPair, ledger: Arc<dyn LedgerClient>) -> Self {
        let address = chainpay_crypto::derive_address(&keypair.public);
        Self {
            settings,
            address,
            keypair,
            ledger,
            registry: Arc::new(AccumulationRegistry::new()),
            flush_lock: Mutex::new(()),
            metrics: Arc::new(NodeMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<NodeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn registry(&self) -> &Arc<AccumulationRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Issue a payment request for a service this node provides and record
    /// the amount the session now owes.
    pub fn request_payment(
        &self,
        session_id: SessionId,
        service_ref: impl Into<String>,
        amount: Amount,
    ) -> Result<PaymentRequest, NodeError> {
        let request = PaymentRequest {
            session_id: session_id.clone(),
            amount,
            asset: self.settings.asset.clone(),
            service_ref: service_ref.into(),
            destination: self.address.clone(),
        };
        let owed = self.registry.add_service_usage(&session_id, &request)?;
        self.metrics
            .pending_usage
            .set(self.registry.usage_len() as i64);
        tracing::debug!(session = %session_id, %amount, %owed, "payment requested");
        Ok(request)
    }

    pub async fn balance(&self) -> Result<Amount, NodeError> {
        Ok(self
            .ledger
            .balance(&self.address, &self.settings.asset)
            .await?)
    }

    /// Submit every outstanding transaction in ascending sequence order.
    ///
    /// Stops at the first rejected submission; that transaction and every
    /// later one stay outstanding for the next flush.
    pub async fn flush(&self) -> Result<FlushReport, NodeError> {
        let _guard = self.flush_lock.lock().await;
        let outstanding = self.registry.outstanding();
        let span = flush_span(self.settings.node_id.as_str(), outstanding.len());
        self.flush_outstanding(outstanding).instrument(span).await
    }

    async fn flush_outstanding(
        &self,
        outstanding: Vec<crate::OutstandingTransaction>,
    ) -> Result<FlushReport, NodeError> {
        let started = Instant::now();
        self.metrics.flush_runs.inc();

        let mut report = FlushReport::default();
        let mut result = Ok(());
        for entry in outstanding {
            let tx = &entry.transaction;
            match self.ledger.submit(&tx.envelope).await {
                Ok(receipt) => {
                    self.registry
                        .complete(&tx.payment_source_address, &tx.session_id);
                    self.metrics.transactions_submitted.inc();
                    tracing::debug!(
                        sequence = entry.sequence,
                        session = %tx.session_id,
                        hash = %receipt.hash,
                        "outstanding transaction submitted"
                    );
                    report.submitted.push(entry.sequence);
                }
                Err(error) => {
                    self.metrics.flush_failures.inc();
                    tracing::warn!(
                        sequence = entry.sequence,
                        session = %tx.session_id,
                        error = %error,
                        "flush stopped"
                    );
                    result = Err(NodeError::Flush {
                        sequence: entry.sequence,
                        error,
                    });
                    break;
                }
            }
        }

        self.metrics
            .outstanding_transactions
            .set(self.registry.len() as i64);
        self.metrics
            .flush_duration_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        if !report.is_empty() {
            tracing::info!(submitted = report.submitted.len(), "flush complete");
        }
        result.map(|()| report)
    }

    fn check_session(
        &self,
        session_id: &SessionId,
        pair: &PaymentTransactionReplacing,
    ) -> Result<(), ValidationError> {
        if pair.session_id() != session_id {
            return Err(ValidationError::SessionMismatch {
                expected: session_id.to_string(),
                found: pair.session_id().to_string(),
            });
        }
        Ok(())
    }

    fn check_destination(&self, tx: &PaymentTransaction) -> Result<(), ValidationError> {
        if tx.payment_destination_address != self.address {
            return Err(ValidationError::NotDestination {
                node: self.address.clone(),
                destination: tx.payment_destination_address.clone(),
            });
        }
        Ok(())
    }

    fn check_source(&self, tx: &PaymentTransaction) -> Result<(), ValidationError> {
        if tx.payment_source_address != self.address {
            return Err(ValidationError::NotSource {
                node: self.address.clone(),
                payment_source: tx.payment_source_address.clone(),
            });
        }
        Ok(())
    }

    fn sign_pending(
        &self,
        mut pair: PaymentTransactionReplacing,
    ) -> Result<PaymentTransactionReplacing, OperationError> {
        pair.pending.envelope = self.ledger.sign(&pair.pending.envelope, &self.keypair)?;
        Ok(pair)
    }

    /// Validate a fully signed incoming leg, then submit it or save it for
    /// the next flush.
    async fn commit(
        &self,
        session_id: &SessionId,
        pair: PaymentTransactionReplacing,
    ) -> Result<(), OperationError> {
        self.check_session(session_id, &pair)?;
        self.check_destination(&pair.pending)?;
        validate_pair(self.ledger.as_ref(), &pair, true)?;

        let _guard = self.flush_lock.lock().await;

        let payer = &pair.pending.payment_source_address;
        let active = self.registry.get_active(payer);
        if pair.reference != active {
            return Err(ValidationError::StaleReference(payer.clone()).into());
        }

        if self.settings.accumulate {
            let sequence = self.ledger.sequence_number(&pair.pending.envelope)?;
            if let Some(holder) = self.registry.sequence_holder(sequence, payer) {
                return Err(ValidationError::SequenceInUse { sequence, holder }.into());
            }
            self.registry.save(sequence, pair.pending);
            self.metrics
                .outstanding_transactions
                .set(self.registry.len() as i64);
            tracing::debug!(session = %session_id, sequence, "transaction saved for flush");
        } else {
            let receipt = self.ledger.submit(&pair.pending.envelope).await?;
            self.metrics.transactions_submitted.inc();
            tracing::debug!(
                session = %session_id,
                sequence = receipt.sequence,
                hash = %receipt.hash,
                "transaction submitted"
            );
        }
        self.metrics.transactions_committed.inc();
        Ok(())
    }
}

#[async_trait]
impl NodeOperations for LocalNode {
    fn node_id(&self) -> &NodeId {
        &self.settings.node_id
    }

    fn address(&self) -> &Address {
        &self.address
    }

    async fn create_transaction(
        &self,
        session_id: &SessionId,
        args: CreateTransactionArgs,
    ) -> Result<PaymentTransactionReplacing, OperationError> {
        let CreateTransactionArgs {
            total_in,
            total_out,
            fee,
            source,
        } = args;

        let actual_fee = total_in
            .checked_sub(total_out)
            .ok_or(ValidationError::NegativeFee {
                amount_in: total_in,
                amount_out: total_out,
            })?;
        if actual_fee != fee {
            return Err(ValidationError::FeeMismatch {
                expected: fee,
                found: actual_fee,
            }
            .into());
        }
        // Zero when this node is the payee.
        if !fee.is_zero() && fee != self.settings.fee {
            return Err(ValidationError::UnexpectedFee {
                advertised: self.settings.fee,
                requested: fee,
            }
            .into());
        }
        if source == self.address {
            return Err(ValidationError::SelfPayment(source).into());
        }

        let draft = PaymentTransaction::draft(
            session_id.clone(),
            source.clone(),
            self.address.clone(),
            self.settings.asset.clone(),
            total_in,
            total_out,
        );
        let active = self
            .settings
            .accumulate
            .then(|| self.registry.get_active_entry(&source))
            .flatten();
        let (reference, sequence) = match active {
            Some(entry) => (Some(entry.transaction), Some(entry.sequence)),
            // Outstanding legs of other payers already hold sequences the
            // ledger has not applied yet.
            None if self.settings.accumulate => (None, self.registry.next_sequence()),
            None => (None, None),
        };
        let mut pair = PaymentTransactionReplacing::accumulate(draft, reference)?;

        pair.pending.envelope = self
            .ledger
            .build_transaction(BuildRequest {
                transaction_source: self.address.clone(),
                payment_source: source,
                payment_destination: self.address.clone(),
                amount: pair.pending.reference_amount_in,
                asset: self.settings.asset.clone(),
                sequence,
            })
            .await?;
        validate_pair(self.ledger.as_ref(), &pair, false)?;

        self.metrics.transactions_created.inc();
        tracing::debug!(
            session = %session_id,
            %total_in,
            %total_out,
            accumulated = pair.reference.is_some(),
            "transaction created"
        );
        Ok(pair)
    }

    async fn sign_service_transaction(
        &self,
        session_id: &SessionId,
        pair: PaymentTransactionReplacing,
    ) -> Result<PaymentTransactionReplacing, OperationError> {
        self.check_session(session_id, &pair)?;
        self.check_destination(&pair.pending)?;
        validate_pair(self.ledger.as_ref(), &pair, false)?;

        let pair = self.sign_pending(pair)?;
        self.metrics.transactions_signed.inc();
        tracing::debug!(session = %session_id, "service transaction signed");
        Ok(pair)
    }

    async fn sign_chain_transaction(
        &self,
        session_id: &SessionId,
        credit: PaymentTransactionReplacing,
        debit: PaymentTransactionReplacing,
    ) -> Result<(PaymentTransactionReplacing, PaymentTransactionReplacing), OperationError> {
        self.check_session(session_id, &credit)?;
        self.check_session(session_id, &debit)?;
        self.check_destination(&credit.pending)?;
        self.check_source(&debit.pending)?;
        if credit.pending.own_amount_out != debit.pending.own_reference_amount_in {
            return Err(ValidationError::LegDiscontinuity {
                index: 0,
                reason: format!(
                    "credit forwards {} but debit carries {}",
                    credit.pending.own_amount_out, debit.pending.own_reference_amount_in
                ),
            }
            .into());
        }
        validate_pair(self.ledger.as_ref(), &credit, false)?;
        validate_pair(self.ledger.as_ref(), &debit, false)?;

        let credit = self.sign_pending(credit)?;
        let debit = self.sign_pending(debit)?;
        self.metrics.transactions_signed.inc_by(2);
        tracing::debug!(session = %session_id, "chain transaction signed");
        Ok((credit, debit))
    }

    async fn commit_chain_transaction(
        &self,
        session_id: &SessionId,
        pair: PaymentTransactionReplacing,
    ) -> Result<(), OperationError> {
        self.commit(session_id, pair).await
    }

    async fn commit_service_transaction(
        &self,
        session_id: &SessionId,
        pair: PaymentTransactionReplacing,
        request: PaymentRequest,
    ) -> Result<(), OperationError> {
        if &request.session_id != session_id {
            return Err(ValidationError::SessionMismatch {
                expected: session_id.to_string(),
                found: request.session_id.to_string(),
            }
            .into());
        }
        if request.destination != self.address {
            return Err(ValidationError::NotDestination {
                node: self.address.clone(),
                destination: request.destination,
            }
            .into());
        }
        if request.asset != pair.pending.asset {
            return Err(ValidationError::AssetMismatch {
                expected: request.asset.to_string(),
                found: pair.pending.asset.to_string(),
            }
            .into());
        }
        if request.amount != pair.pending.own_reference_amount_in {
            return Err(ValidationError::AccumulatedAmountMismatch {
                field: "own_reference_amount_in".into(),
                expected: request.amount,
                found: pair.pending.own_reference_amount_in,
            }
            .into());
        }

        let settled = pair.pending.own_amount_out;
        match self.registry.pending_amount(session_id) {
            None => return Err(AccumulationError::NotFound(session_id.clone()).into()),
            Some(owed) if owed < settled => {
                return Err(AccumulationError::Underflow {
                    owed,
                    requested: settled,
                }
                .into())
            }
            Some(_) => {}
        }

        self.commit(session_id, pair).await?;
        let remaining = self.registry.reduce_pending_amount(session_id, settled)?;
        self.metrics
            .pending_usage
            .set(self.registry.usage_len() as i64);
        tracing::info!(session = %session_id, %settled, %remaining, "service payment committed");
        Ok(())
    }
}
