//! Nullable ledger — an in-memory two-party transfer ledger.
//!
//! Envelopes are hex-encoded JSON carrying the transfer and the Ed25519
//! signatures collected so far. A transfer needs the signatures of both the
//! transaction source (which consumes a sequence number) and the payment
//! source (whose balance is debited). Sequence numbers are strict: an
//! envelope is accepted only when its sequence is the owner's current
//! sequence plus one.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chainpay_crypto::{
    blake2b_256, decode_address, derive_address, sign_message, verify_signature,
};
use chainpay_ledger::{BuildRequest, LedgerClient, LedgerError, SubmitReceipt};
use chainpay_types::{Address, Amount, Asset, Envelope, KeyPair, Signature};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ASSET: &str = "XLM";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Transfer {
    transaction_source: Address,
    payment_source: Address,
    payment_destination: Address,
    amount: Amount,
    asset: Asset,
    sequence: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct EnvelopeSignature {
    signer: Address,
    signature: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SignedTransfer {
    transfer: Transfer,
    signatures: Vec<EnvelopeSignature>,
}

impl SignedTransfer {
    fn decode(envelope: &Envelope) -> Result<Self, LedgerError> {
        let bytes =
            hex::decode(envelope.as_str()).map_err(|e| LedgerError::Malformed(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| LedgerError::Malformed(e.to_string()))
    }

    fn encode(&self) -> Result<Envelope, LedgerError> {
        let bytes = serde_json::to_vec(self).map_err(|e| LedgerError::Malformed(e.to_string()))?;
        Ok(Envelope::new(hex::encode(bytes)))
    }

    fn message(&self) -> Result<[u8; 32], LedgerError> {
        let bytes = serde_json::to_vec(&self.transfer)
            .map_err(|e| LedgerError::Malformed(e.to_string()))?;
        Ok(blake2b_256(&bytes))
    }

    fn is_party(&self, address: &Address) -> bool {
        address == &self.transfer.transaction_source || address == &self.transfer.payment_source
    }

    fn verify(&self) -> Result<(), LedgerError> {
        let message = self.message()?;
        for entry in &self.signatures {
            if !self.is_party(&entry.signer) {
                return Err(LedgerError::InvalidSignature(entry.signer.to_string()));
            }
            let invalid = || LedgerError::InvalidSignature(entry.signer.to_string());
            let public = decode_address(entry.signer.as_str()).map_err(|_| invalid())?;
            let bytes: [u8; 64] = hex::decode(&entry.signature)
                .ok()
                .and_then(|b| b.try_into().ok())
                .ok_or_else(invalid)?;
            if !verify_signature(&message, &Signature(bytes), &public) {
                return Err(invalid());
            }
        }
        Ok(())
    }

    fn verify_complete(&self) -> Result<(), LedgerError> {
        self.verify()?;
        let signers: HashSet<&Address> = self.signatures.iter().map(|s| &s.signer).collect();
        for required in [&self.transfer.transaction_source, &self.transfer.payment_source] {
            if !signers.contains(&required) {
                return Err(LedgerError::MissingSignature(required.to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Account {
    balances: HashMap<Asset, Amount>,
    /// Sequence of the last applied transaction.
    sequence: i64,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<Address, Account>,
    failing_sequences: HashSet<i64>,
    submissions: Vec<i64>,
}

/// In-memory ledger shared by every node of a test (or dev) deployment.
#[derive(Debug, Default)]
pub struct NullLedger {
    state: Mutex<LedgerState>,
}

impl NullLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Credit `amount` of [`DEFAULT_ASSET`] to `address`, creating the account.
    pub fn fund(&self, address: &Address, amount: Amount) {
        self.fund_asset(address, &Asset::new(DEFAULT_ASSET), amount);
    }

    pub fn fund_asset(&self, address: &Address, asset: &Asset, amount: Amount) {
        let mut state = self.state();
        let balance = state
            .accounts
            .entry(address.clone())
            .or_default()
            .balances
            .entry(asset.clone())
            .or_default();
        *balance = *balance + amount;
    }

    /// Set the sequence of the last applied transaction of `address`.
    pub fn set_sequence(&self, address: &Address, sequence: i64) {
        let mut state = self.state();
        let account = state.accounts.entry(address.clone()).or_default();
        account.sequence = sequence;
    }

    pub fn account_sequence(&self, address: &Address) -> i64 {
        self.state()
            .accounts
            .get(address)
            .map(|a| a.sequence)
            .unwrap_or(0)
    }

    pub fn balance_of(&self, address: &Address) -> Amount {
        self.state()
            .accounts
            .get(address)
            .and_then(|a| a.balances.get(&Asset::new(DEFAULT_ASSET)).copied())
            .unwrap_or(Amount::ZERO)
    }

    /// Reject every submission of an envelope with `sequence`.
    pub fn fail_sequence(&self, sequence: i64) {
        self.state().failing_sequences.insert(sequence);
    }

    pub fn clear_failures(&self) {
        self.state().failing_sequences.clear();
    }

    /// Sequence numbers of every submission attempt, in order.
    pub fn submissions(&self) -> Vec<i64> {
        self.state().submissions.clone()
    }
}

#[async_trait]
impl LedgerClient for NullLedger {
    async fn build_transaction(&self, request: BuildRequest) -> Result<Envelope, LedgerError> {
        for address in [
            &request.transaction_source,
            &request.payment_source,
            &request.payment_destination,
        ] {
            if !address.is_valid() {
                return Err(LedgerError::Malformed(format!("invalid address {address:?}")));
            }
        }

        // Unsubmitted builds reserve nothing.
        let sequence = match request.sequence {
            Some(sequence) => sequence,
            None => self.account_sequence(&request.transaction_source) + 1,
        };

        SignedTransfer {
            transfer: Transfer {
                transaction_source: request.transaction_source,
                payment_source: request.payment_source,
                payment_destination: request.payment_destination,
                amount: request.amount,
                asset: request.asset,
                sequence,
            },
            signatures: Vec::new(),
        }
        .encode()
    }

    fn sign(&self, envelope: &Envelope, keypair: &KeyPair) -> Result<Envelope, LedgerError> {
        let mut signed = SignedTransfer::decode(envelope)?;
        let signer = derive_address(&keypair.public);
        if !signed.is_party(&signer) {
            return Err(LedgerError::Rejected(format!(
                "{signer} is not a party to this transfer"
            )));
        }
        let signature = sign_message(&signed.message()?, &keypair.private);
        signed.signatures.retain(|s| s.signer != signer);
        signed.signatures.push(EnvelopeSignature {
            signer,
            signature: hex::encode(signature.as_bytes()),
        });
        signed.encode()
    }

    async fn submit(&self, envelope: &Envelope) -> Result<SubmitReceipt, LedgerError> {
        let signed = SignedTransfer::decode(envelope)?;
        let transfer = &signed.transfer;

        let mut state = self.state();
        state.submissions.push(transfer.sequence);
        if state.failing_sequences.contains(&transfer.sequence) {
            return Err(LedgerError::Rejected(format!(
                "sequence {} rejected by failure injection",
                transfer.sequence
            )));
        }
        signed.verify_complete()?;

        let expected = state
            .accounts
            .get(&transfer.transaction_source)
            .map(|a| a.sequence + 1)
            .unwrap_or(1);
        if transfer.sequence != expected {
            return Err(LedgerError::BadSequence {
                account: transfer.transaction_source.to_string(),
                expected,
                found: transfer.sequence,
            });
        }

        let payer = state
            .accounts
            .get_mut(&transfer.payment_source)
            .ok_or_else(|| LedgerError::AccountNotFound(transfer.payment_source.to_string()))?;
        let available = payer
            .balances
            .get(&transfer.asset)
            .copied()
            .unwrap_or(Amount::ZERO);
        let remaining = available
            .checked_sub(transfer.amount)
            .ok_or_else(|| LedgerError::InsufficientBalance {
                account: transfer.payment_source.to_string(),
                needed: transfer.amount.raw(),
                available: available.raw(),
            })?;
        payer.balances.insert(transfer.asset.clone(), remaining);

        let payee = state
            .accounts
            .entry(transfer.payment_destination.clone())
            .or_default();
        let balance = payee.balances.entry(transfer.asset.clone()).or_default();
        *balance = *balance + transfer.amount;

        let owner = state
            .accounts
            .entry(transfer.transaction_source.clone())
            .or_default();
        owner.sequence = transfer.sequence;

        tracing::trace!(
            sequence = transfer.sequence,
            amount = %transfer.amount,
            "null ledger applied transfer"
        );
        Ok(SubmitReceipt {
            hash: hex::encode(blake2b_256(envelope.as_str().as_bytes())),
            sequence: transfer.sequence,
        })
    }

    fn sequence_number(&self, envelope: &Envelope) -> Result<i64, LedgerError> {
        Ok(SignedTransfer::decode(envelope)?.transfer.sequence)
    }

    fn validate(&self, envelope: &Envelope) -> Result<(), LedgerError> {
        SignedTransfer::decode(envelope)?.verify()
    }

    fn validate_signed(&self, envelope: &Envelope) -> Result<(), LedgerError> {
        SignedTransfer::decode(envelope)?.verify_complete()
    }

    async fn balance(&self, address: &Address, asset: &Asset) -> Result<Amount, LedgerError> {
        Ok(self
            .state()
            .accounts
            .get(address)
            .and_then(|a| a.balances.get(asset).copied())
            .unwrap_or(Amount::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpay_crypto::keypair_from_seed;

    struct Parties {
        payer: KeyPair,
        payee: KeyPair,
    }

    impl Parties {
        fn new() -> Self {
            Self {
                payer: keypair_from_seed(&[1; 32]),
                payee: keypair_from_seed(&[2; 32]),
            }
        }

        fn payer(&self) -> Address {
            derive_address(&self.payer.public)
        }

        fn payee(&self) -> Address {
            derive_address(&self.payee.public)
        }

        fn request(&self, amount: u64, sequence: Option<i64>) -> BuildRequest {
            BuildRequest {
                transaction_source: self.payee(),
                payment_source: self.payer(),
                payment_destination: self.payee(),
                amount: Amount::from(amount),
                asset: Asset::new(DEFAULT_ASSET),
                sequence,
            }
        }
    }

    async fn fully_signed(ledger: &NullLedger, p: &Parties, amount: u64) -> Envelope {
        let envelope = ledger.build_transaction(p.request(amount, None)).await.unwrap();
        let envelope = ledger.sign(&envelope, &p.payee).unwrap();
        ledger.sign(&envelope, &p.payer).unwrap()
    }

    #[tokio::test]
    async fn transfer_moves_funds_and_consumes_sequence() {
        let ledger = NullLedger::new();
        let p = Parties::new();
        ledger.fund(&p.payer(), Amount::new(500));

        let envelope = fully_signed(&ledger, &p, 200).await;
        let receipt = ledger.submit(&envelope).await.unwrap();

        assert_eq!(receipt.sequence, 1);
        assert_eq!(ledger.balance_of(&p.payer()), Amount::new(300));
        assert_eq!(ledger.balance_of(&p.payee()), Amount::new(200));
        assert_eq!(ledger.account_sequence(&p.payee()), 1);
    }

    #[tokio::test]
    async fn builds_follow_the_applied_sequence() {
        let ledger = NullLedger::new();
        let p = Parties::new();
        ledger.fund(&p.payer(), Amount::new(500));
        let abandoned = ledger.build_transaction(p.request(1, None)).await.unwrap();
        let next = ledger.build_transaction(p.request(1, None)).await.unwrap();
        let explicit = ledger.build_transaction(p.request(2, Some(7))).await.unwrap();
        assert_eq!(ledger.sequence_number(&abandoned).unwrap(), 1);
        assert_eq!(ledger.sequence_number(&next).unwrap(), 1);
        assert_eq!(ledger.sequence_number(&explicit).unwrap(), 7);

        let applied = fully_signed(&ledger, &p, 10).await;
        ledger.submit(&applied).await.unwrap();
        let after = ledger.build_transaction(p.request(1, None)).await.unwrap();
        assert_eq!(ledger.sequence_number(&after).unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_payer_signature_blocks_submission() {
        let ledger = NullLedger::new();
        let p = Parties::new();
        ledger.fund(&p.payer(), Amount::new(500));
        let envelope = ledger.build_transaction(p.request(10, None)).await.unwrap();
        let envelope = ledger.sign(&envelope, &p.payee).unwrap();

        assert!(ledger.validate(&envelope).is_ok());
        assert_eq!(
            ledger.validate_signed(&envelope),
            Err(LedgerError::MissingSignature(p.payer().to_string()))
        );
        assert!(ledger.submit(&envelope).await.is_err());
        assert_eq!(ledger.balance_of(&p.payer()), Amount::new(500));
    }

    #[tokio::test]
    async fn outsider_cannot_sign() {
        let ledger = NullLedger::new();
        let p = Parties::new();
        let envelope = ledger.build_transaction(p.request(10, None)).await.unwrap();
        let outsider = keypair_from_seed(&[3; 32]);
        assert!(matches!(
            ledger.sign(&envelope, &outsider),
            Err(LedgerError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn out_of_order_sequence_is_rejected() {
        let ledger = NullLedger::new();
        let p = Parties::new();
        ledger.fund(&p.payer(), Amount::new(500));
        let second = ledger.build_transaction(p.request(10, Some(2))).await.unwrap();
        let second = ledger.sign(&second, &p.payee).unwrap();
        let second = ledger.sign(&second, &p.payer).unwrap();

        assert!(matches!(
            ledger.submit(&second).await,
            Err(LedgerError::BadSequence {
                expected: 1,
                found: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn insufficient_balance_is_rejected() {
        let ledger = NullLedger::new();
        let p = Parties::new();
        ledger.fund(&p.payer(), Amount::new(5));
        let envelope = fully_signed(&ledger, &p, 10).await;
        assert!(matches!(
            ledger.submit(&envelope).await,
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn failure_injection_is_recorded() {
        let ledger = NullLedger::new();
        let p = Parties::new();
        ledger.fund(&p.payer(), Amount::new(500));
        ledger.fail_sequence(1);
        let envelope = fully_signed(&ledger, &p, 10).await;

        assert!(ledger.submit(&envelope).await.is_err());
        ledger.clear_failures();
        assert!(ledger.submit(&envelope).await.is_ok());
        assert_eq!(ledger.submissions(), vec![1, 1]);
    }

    #[test]
    fn garbage_envelope_is_malformed() {
        let ledger = NullLedger::new();
        assert!(matches!(
            ledger.sequence_number(&Envelope::new("not hex")),
            Err(LedgerError::Malformed(_))
        ));
    }
}
