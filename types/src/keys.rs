//! Key types used to sign ledger envelopes.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 32-byte Ed25519 public key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// A 32-byte Ed25519 private key, zeroized on drop.
///
/// Not `Clone`, `Debug` or `Serialize`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(pub [u8; 32]);

/// A detached 64-byte Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// The key pair a node, or a payer, signs its legs with.
///
/// Built by `chainpay_crypto::keypair_from_seed` or
/// `chainpay_crypto::generate_keypair`.
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_pair_debug_hides_the_private_key() {
        let pair = KeyPair {
            public: PublicKey([1; 32]),
            private: PrivateKey([0xab; 32]),
        };
        let shown = format!("{pair:?}");
        assert!(shown.contains("public"));
        assert!(!shown.contains("private"));
    }
}
