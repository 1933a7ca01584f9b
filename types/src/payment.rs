//! Payment requests and hop transactions.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, Asset, Envelope, SessionId, ValidationError};

/// What the payer owes the payee for one service interaction.
///
/// Issued by the payee node and immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub session_id: SessionId,
    /// Amount the payee must receive.
    pub amount: Amount,
    pub asset: Asset,
    /// Reference to the service (or commodity) being paid for.
    pub service_ref: String,
    /// Payee ledger address.
    pub destination: Address,
}

/// One leg of a route: `payment_source` pays `payment_destination`.
///
/// The destination builds and owns the ledger transaction
/// (`transaction_source == payment_destination`), the source counter-signs it.
/// `amount_out` / `reference_amount_in` are the totals the envelope settles,
/// which can include amounts folded in from earlier sessions between the same
/// two parties; the `own_*` fields are this session's share.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub transaction_source_address: Address,
    pub payment_source_address: Address,
    pub payment_destination_address: Address,
    /// What the destination receives on this leg, accumulated.
    pub reference_amount_in: Amount,
    /// What the destination forwards downstream, accumulated.
    pub amount_out: Amount,
    pub own_reference_amount_in: Amount,
    pub own_amount_out: Amount,
    pub envelope: Envelope,
    /// Asset ("network token") the leg is denominated in.
    pub asset: Asset,
    pub session_id: SessionId,
}

impl PaymentTransaction {
    /// A leg for a single session, before any accumulation and before the
    /// ledger client has built its envelope.
    pub fn draft(
        session_id: SessionId,
        payment_source: Address,
        payment_destination: Address,
        asset: Asset,
        total_in: Amount,
        total_out: Amount,
    ) -> Self {
        Self {
            transaction_source_address: payment_destination.clone(),
            payment_source_address: payment_source,
            payment_destination_address: payment_destination,
            reference_amount_in: total_in,
            amount_out: total_out,
            own_reference_amount_in: total_in,
            own_amount_out: total_out,
            envelope: Envelope::new(""),
            asset,
            session_id,
        }
    }

    /// Fee this leg pays its destination for the current session.
    pub fn own_fee(&self) -> Amount {
        self.own_reference_amount_in.saturating_sub(self.own_amount_out)
    }

    /// Whether `other` settles between the same two parties.
    pub fn same_parties(&self, other: &PaymentTransaction) -> bool {
        self.payment_source_address == other.payment_source_address
            && self.payment_destination_address == other.payment_destination_address
    }
}

/// A pending transaction together with the outstanding transaction it
/// replaces.
///
/// Repeated payments from the same payer to the same node inside one
/// settlement window are folded into one ledger transaction: the pending
/// envelope carries the summed amounts and reuses the reference's sequence
/// number, so only one of the two can ever be applied by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransactionReplacing {
    pub pending: PaymentTransaction,
    pub reference: Option<PaymentTransaction>,
}

impl PaymentTransactionReplacing {
    pub fn new(pending: PaymentTransaction, reference: Option<PaymentTransaction>) -> Self {
        Self { pending, reference }
    }

    /// Fold `reference` into a draft leg, summing the accumulated amounts.
    ///
    /// The envelope of the result is left as the draft's; the caller asks the
    /// ledger client to build one for the summed amounts.
    pub fn accumulate(
        mut draft: PaymentTransaction,
        reference: Option<PaymentTransaction>,
    ) -> Result<Self, ValidationError> {
        if let Some(reference) = &reference {
            if !draft.same_parties(reference) {
                return Err(ValidationError::ReferenceAddressMismatch {
                    pending_source: draft.payment_source_address.clone(),
                    pending_destination: draft.payment_destination_address.clone(),
                    found_source: reference.payment_source_address.clone(),
                    found_destination: reference.payment_destination_address.clone(),
                });
            }
            draft.amount_out = draft
                .own_amount_out
                .checked_add(reference.amount_out)
                .ok_or_else(|| ValidationError::Overflow("amount_out".into()))?;
            draft.reference_amount_in = draft
                .own_reference_amount_in
                .checked_add(reference.reference_amount_in)
                .ok_or_else(|| ValidationError::Overflow("reference_amount_in".into()))?;
        }
        Ok(Self {
            pending: draft,
            reference,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.pending.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(session: &str, total_in: u64, total_out: u64) -> PaymentTransaction {
        PaymentTransaction::draft(
            SessionId::from(session),
            Address::new("hop_payer"),
            Address::new("hop_node"),
            Asset::new("XLM"),
            Amount::from(total_in),
            Amount::from(total_out),
        )
    }

    #[test]
    fn draft_is_owned_by_destination() {
        let tx = leg("s1", 110, 100);
        assert_eq!(tx.transaction_source_address, tx.payment_destination_address);
        assert_eq!(tx.own_fee(), Amount::new(10));
    }

    #[test]
    fn accumulate_without_reference_keeps_own_amounts() {
        let pair = PaymentTransactionReplacing::accumulate(leg("s1", 110, 100), None).unwrap();
        assert_eq!(pair.pending.amount_out, Amount::new(100));
        assert_eq!(pair.pending.reference_amount_in, Amount::new(110));
    }

    #[test]
    fn accumulate_sums_with_reference() {
        let reference = leg("s1", 110, 100);
        let pair =
            PaymentTransactionReplacing::accumulate(leg("s2", 55, 50), Some(reference)).unwrap();
        assert_eq!(pair.pending.amount_out, Amount::new(150));
        assert_eq!(pair.pending.reference_amount_in, Amount::new(165));
        assert_eq!(pair.pending.own_amount_out, Amount::new(50));
    }

    #[test]
    fn accumulate_rejects_other_parties() {
        let mut reference = leg("s1", 110, 100);
        reference.payment_source_address = Address::new("hop_other");
        let err = PaymentTransactionReplacing::accumulate(leg("s2", 55, 50), Some(reference))
            .unwrap_err();
        assert!(matches!(err, ValidationError::ReferenceAddressMismatch { .. }));
    }
}
