//! Structural validation of hop transactions.
//!
//! Only stateless checks live here. Checks that need the ledger (sequence
//! numbers, signatures) are done by `chainpay_ledger::validate_pair`, and
//! checks that need node state (stale references) by the node engine.

use crate::{PaymentTransaction, PaymentTransactionReplacing, ValidationError};

/// Validate the invariants every hop transaction must hold on its own.
pub fn validate_transaction(tx: &PaymentTransaction) -> Result<(), ValidationError> {
    for address in [
        &tx.transaction_source_address,
        &tx.payment_source_address,
        &tx.payment_destination_address,
    ] {
        if !address.is_valid() {
            return Err(ValidationError::InvalidAddress(address.to_string()));
        }
    }

    if tx.payment_source_address == tx.payment_destination_address {
        return Err(ValidationError::SelfPayment(tx.payment_source_address.clone()));
    }

    if tx.transaction_source_address != tx.payment_destination_address {
        return Err(ValidationError::TransactionSourceMismatch {
            expected: tx.payment_destination_address.clone(),
            found: tx.transaction_source_address.clone(),
        });
    }

    if tx.amount_out > tx.reference_amount_in {
        return Err(ValidationError::NegativeFee {
            amount_in: tx.reference_amount_in,
            amount_out: tx.amount_out,
        });
    }

    if tx.own_amount_out > tx.own_reference_amount_in {
        return Err(ValidationError::NegativeFee {
            amount_in: tx.own_reference_amount_in,
            amount_out: tx.own_amount_out,
        });
    }

    Ok(())
}

/// Validate a pending/reference pair, except for the sequence number check.
///
/// The accumulated amounts of `pending` must equal its own share plus the
/// reference's accumulated amounts, or equal its own share when there is no
/// reference.
pub fn validate_replacing(pair: &PaymentTransactionReplacing) -> Result<(), ValidationError> {
    let pending = &pair.pending;
    validate_transaction(pending)?;

    let Some(reference) = &pair.reference else {
        check_sum("amount_out", pending.own_amount_out, pending.amount_out)?;
        check_sum(
            "reference_amount_in",
            pending.own_reference_amount_in,
            pending.reference_amount_in,
        )?;
        return Ok(());
    };

    validate_transaction(reference)?;

    if !pending.same_parties(reference) {
        return Err(ValidationError::ReferenceAddressMismatch {
            pending_source: pending.payment_source_address.clone(),
            pending_destination: pending.payment_destination_address.clone(),
            found_source: reference.payment_source_address.clone(),
            found_destination: reference.payment_destination_address.clone(),
        });
    }

    if pending.asset != reference.asset {
        return Err(ValidationError::AssetMismatch {
            expected: pending.asset.to_string(),
            found: reference.asset.to_string(),
        });
    }

    let expected_out = pending
        .own_amount_out
        .checked_add(reference.amount_out)
        .ok_or_else(|| ValidationError::Overflow("amount_out".into()))?;
    check_sum("amount_out", expected_out, pending.amount_out)?;

    let expected_in = pending
        .own_reference_amount_in
        .checked_add(reference.reference_amount_in)
        .ok_or_else(|| ValidationError::Overflow("reference_amount_in".into()))?;
    check_sum("reference_amount_in", expected_in, pending.reference_amount_in)?;

    Ok(())
}

fn check_sum(
    field: &str,
    expected: crate::Amount,
    found: crate::Amount,
) -> Result<(), ValidationError> {
    if expected != found {
        return Err(ValidationError::AccumulatedAmountMismatch {
            field: field.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Address, Amount, Asset, SessionId};
    use proptest::prelude::*;

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
    fn valid_single_leg_passes() {
        assert!(validate_transaction(&leg("s", 110, 100)).is_ok());
    }

    #[test]
    fn self_payment_rejected() {
        let mut tx = leg("s", 110, 100);
        tx.payment_source_address = tx.payment_destination_address.clone();
        assert!(matches!(
            validate_transaction(&tx),
            Err(ValidationError::SelfPayment(_))
        ));
    }

    #[test]
    fn negative_fee_rejected() {
        let tx = leg("s", 90, 100);
        assert!(matches!(
            validate_transaction(&tx),
            Err(ValidationError::NegativeFee { .. })
        ));
    }

    #[test]
    fn transaction_must_be_owned_by_destination() {
        let mut tx = leg("s", 110, 100);
        tx.transaction_source_address = Address::new("hop_payer");
        assert!(matches!(
            validate_transaction(&tx),
            Err(ValidationError::TransactionSourceMismatch { .. })
        ));
    }

    #[test]
    fn tampered_accumulated_amount_rejected() {
        let reference = leg("s1", 110, 100);
        let mut pair =
            PaymentTransactionReplacing::accumulate(leg("s2", 55, 50), Some(reference)).unwrap();
        pair.pending.amount_out = Amount::new(149);
        assert!(matches!(
            validate_replacing(&pair),
            Err(ValidationError::AccumulatedAmountMismatch { .. })
        ));
    }

    #[test]
    fn unaccumulated_pending_must_match_own_amounts() {
        let mut pair = PaymentTransactionReplacing::new(leg("s1", 110, 100), None);
        pair.pending.reference_amount_in = Amount::new(220);
        assert!(validate_replacing(&pair).is_err());
    }

    proptest! {
        #[test]
        fn accumulated_chain_always_validates(
            amounts in prop::collection::vec((1u64..1_000_000, 0u64..1_000), 1..8)
        ) {
            let mut reference: Option<PaymentTransaction> = None;
            let mut expected_out = Amount::ZERO;
            for (i, (out, fee)) in amounts.iter().enumerate() {
                let draft = leg(&format!("s{i}"), out + fee, *out);
                let pair =
                    PaymentTransactionReplacing::accumulate(draft, reference.take()).unwrap();
                prop_assert!(validate_replacing(&pair).is_ok());
                expected_out = expected_out + Amount::from(*out);
                prop_assert_eq!(pair.pending.amount_out, expected_out);
                reference = Some(pair.pending);
            }
        }
    }
}
