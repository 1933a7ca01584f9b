//! Accumulation registry.
//!
//! Per-node bookkeeping of two things:
//! - one outstanding (committed but not yet submitted) ledger transaction per
//!   counterparty address, also indexed by session id
//! - the amount each session still owes this node for requested services
//!
//! Both maps are sharded (`DashMap`), so sessions touching unrelated
//! counterparties never contend. Every method is atomic on its own; nothing
//! is atomic across two calls.

use chainpay_types::{
    Address, Amount, Asset, PaymentRequest, PaymentTransaction, SessionId, Timestamp,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AccumulationError {
    #[error("no pending amount for session {0}")]
    NotFound(SessionId),

    #[error("cannot reduce pending amount {owed} by {requested}")]
    Underflow { owed: Amount, requested: Amount },

    #[error("pending amount overflow for session {0}")]
    Overflow(SessionId),
}

/// A committed transaction waiting for the next flush.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutstandingTransaction {
    pub sequence: i64,
    pub transaction: PaymentTransaction,
    pub saved_at: Timestamp,
}

/// What a session owes for the services it requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingUsage {
    pub amount: Amount,
    pub asset: Asset,
    pub service_ref: String,
    pub updated_at: Timestamp,
}

#[derive(Debug, Default)]
pub struct AccumulationRegistry {
    outstanding: DashMap<Address, OutstandingTransaction>,
    by_session: DashMap<SessionId, Address>,
    usage: DashMap<SessionId, PendingUsage>,
}

impl AccumulationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The outstanding transaction paid by `address`, if any.
    pub fn get_active(&self, address: &Address) -> Option<PaymentTransaction> {
        self.outstanding
            .get(address)
            .map(|entry| entry.transaction.clone())
    }

    pub fn get_active_entry(&self, address: &Address) -> Option<OutstandingTransaction> {
        self.outstanding.get(address).map(|entry| entry.clone())
    }

    pub fn find_by_session(&self, session_id: &SessionId) -> Option<OutstandingTransaction> {
        let address = self.by_session.get(session_id)?.clone();
        self.outstanding
            .get(&address)
            .filter(|entry| &entry.transaction.session_id == session_id)
            .map(|entry| entry.clone())
    }

    /// Store `transaction` as the outstanding transaction of its payment
    /// source, replacing whatever was there.
    pub fn save(&self, sequence: i64, transaction: PaymentTransaction) {
        let address = transaction.payment_source_address.clone();
        let session_id = transaction.session_id.clone();
        let entry = OutstandingTransaction {
            sequence,
            transaction,
            saved_at: Timestamp::now(),
        };

        if let Some(previous) = self.outstanding.insert(address.clone(), entry) {
            let previous_session = previous.transaction.session_id;
            if previous_session != session_id {
                self.by_session
                    .remove_if(&previous_session, |_, indexed| indexed == &address);
            }
        }
        self.by_session.insert(session_id, address);
    }

    /// Remove the outstanding transaction of `address` if it still belongs to
    /// `session_id`. Calling it again is a no-op.
    pub fn complete(&self, address: &Address, session_id: &SessionId) -> bool {
        let removed = self
            .outstanding
            .remove_if(address, |_, entry| &entry.transaction.session_id == session_id)
            .is_some();
        self.by_session
            .remove_if(session_id, |_, indexed| indexed == address);
        removed
    }

    /// Snapshot of every outstanding transaction, ascending by sequence number.
    pub fn outstanding(&self) -> Vec<OutstandingTransaction> {
        let mut entries: Vec<_> = self
            .outstanding
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries
    }

    /// One past the highest outstanding sequence, or `None` when nothing is
    /// outstanding and the ledger's own next sequence applies.
    pub fn next_sequence(&self) -> Option<i64> {
        self.outstanding
            .iter()
            .map(|entry| entry.sequence)
            .max()
            .map(|highest| highest + 1)
    }

    /// The counterparty other than `address` whose outstanding transaction
    /// holds `sequence`.
    pub fn sequence_holder(&self, sequence: i64, address: &Address) -> Option<Address> {
        self.outstanding
            .iter()
            .find(|entry| entry.sequence == sequence && entry.key() != address)
            .map(|entry| entry.key().clone())
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Record that `session_id` owes `request.amount` more.
    pub fn add_service_usage(
        &self,
        session_id: &SessionId,
        request: &PaymentRequest,
    ) -> Result<Amount, AccumulationError> {
        let now = Timestamp::now();
        match self.usage.entry(session_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let usage = occupied.get_mut();
                usage.amount = usage
                    .amount
                    .checked_add(request.amount)
                    .ok_or_else(|| AccumulationError::Overflow(session_id.clone()))?;
                usage.service_ref = request.service_ref.clone();
                usage.updated_at = now;
                Ok(usage.amount)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingUsage {
                    amount: request.amount,
                    asset: request.asset.clone(),
                    service_ref: request.service_ref.clone(),
                    updated_at: now,
                });
                Ok(request.amount)
            }
        }
    }

    /// Settle `amount` of what `session_id` owes. The entry disappears when
    /// nothing is left; the remaining amount is returned.
    pub fn reduce_pending_amount(
        &self,
        session_id: &SessionId,
        amount: Amount,
    ) -> Result<Amount, AccumulationError> {
        match self.usage.entry(session_id.clone()) {
            Entry::Vacant(_) => Err(AccumulationError::NotFound(session_id.clone())),
            Entry::Occupied(mut occupied) => {
                let owed = occupied.get().amount;
                let remaining = owed.checked_sub(amount).ok_or(AccumulationError::Underflow {
                    owed,
                    requested: amount,
                })?;
                if remaining.is_zero() {
                    occupied.remove();
                } else {
                    let usage = occupied.get_mut();
                    usage.amount = remaining;
                    usage.updated_at = Timestamp::now();
                }
                Ok(remaining)
            }
        }
    }

    pub fn pending_amount(&self, session_id: &SessionId) -> Option<Amount> {
        self.usage.get(session_id).map(|usage| usage.amount)
    }

    pub fn pending_usage(&self, session_id: &SessionId) -> Option<PendingUsage> {
        self.usage.get(session_id).map(|usage| usage.clone())
    }

    pub fn usage_len(&self) -> usize {
        self.usage.len()
    }
}
