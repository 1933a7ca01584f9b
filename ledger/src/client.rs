//! The ledger client trait.

use async_trait::async_trait;
use chainpay_types::{Address, Amount, Asset, Envelope, KeyPair};
use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Parameters for building the envelope of one hop leg.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Account that owns the transaction and consumes a sequence number.
    pub transaction_source: Address,
    pub payment_source: Address,
    pub payment_destination: Address,
    pub amount: Amount,
    pub asset: Asset,
    /// Reuse this sequence number instead of allocating a new one. Set when
    /// the envelope replaces an outstanding accumulated transaction.
    pub sequence: Option<i64>,
}

/// Outcome of a successful submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Ledger-assigned transaction identifier.
    pub hash: String,
    pub sequence: i64,
}

/// Everything the relay core needs from the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Build an unsigned envelope moving `amount` from the payment source to
    /// the payment destination.
    async fn build_transaction(&self, request: BuildRequest) -> Result<Envelope, LedgerError>;

    /// Add the key pair's signature to an envelope.
    fn sign(&self, envelope: &Envelope, keypair: &KeyPair) -> Result<Envelope, LedgerError>;

    /// Submit a fully signed envelope.
    async fn submit(&self, envelope: &Envelope) -> Result<SubmitReceipt, LedgerError>;

    /// Sequence number the envelope was built with.
    fn sequence_number(&self, envelope: &Envelope) -> Result<i64, LedgerError>;

    /// Check the envelope is well formed and every signature on it verifies.
    fn validate(&self, envelope: &Envelope) -> Result<(), LedgerError>;

    /// Check the envelope carries every signature it needs to be submitted.
    fn validate_signed(&self, envelope: &Envelope) -> Result<(), LedgerError>;

    async fn balance(&self, address: &Address, asset: &Asset) -> Result<Amount, LedgerError>;
}
