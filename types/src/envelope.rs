//! Opaque signed-transaction envelope.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A ledger-specific transaction blob ("XDR").
///
/// Produced, signed, sized and validated only by the ledger client. The relay
/// core compares envelopes for equality and asks the ledger client for their
/// sequence number; it never parses them.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(String);

impl Envelope {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 16;
        if self.0.len() > SHOWN {
            let head: String = self.0.chars().take(SHOWN).collect();
            write!(f, "Envelope({head}…, {} bytes)", self.0.len())
        } else {
            write!(f, "Envelope({})", self.0)
        }
    }
}
