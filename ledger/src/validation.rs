//! Pair validation that needs the ledger client.

use chainpay_types::validation::validate_replacing;
use chainpay_types::{PaymentTransactionReplacing, ValidationError};

use crate::LedgerClient;

/// Check that pending and reference envelopes share one sequence number.
///
/// A pair without a reference trivially passes.
pub fn check_same_sequence(
    ledger: &dyn LedgerClient,
    pair: &PaymentTransactionReplacing,
) -> Result<(), ValidationError> {
    let Some(reference) = &pair.reference else {
        return Ok(());
    };
    let pending = ledger
        .sequence_number(&pair.pending.envelope)
        .map_err(|e| ValidationError::Envelope(e.to_string()))?;
    let reference = ledger
        .sequence_number(&reference.envelope)
        .map_err(|e| ValidationError::Envelope(e.to_string()))?;
    if pending != reference {
        return Err(ValidationError::SequenceMismatch { pending, reference });
    }
    Ok(())
}

/// Full validation of a pair: structural invariants, envelope checks by the
/// ledger client and the same-sequence rule.
///
/// With `require_signed` the pending envelope must also carry every
/// signature needed for submission.
pub fn validate_pair(
    ledger: &dyn LedgerClient,
    pair: &PaymentTransactionReplacing,
    require_signed: bool,
) -> Result<(), ValidationError> {
    validate_replacing(pair)?;

    ledger
        .validate(&pair.pending.envelope)
        .map_err(|e| ValidationError::Envelope(e.to_string()))?;
    if require_signed {
        ledger
            .validate_signed(&pair.pending.envelope)
            .map_err(|e| ValidationError::Envelope(e.to_string()))?;
    }

    check_same_sequence(ledger, pair)
}
