//! Cryptographic primitives for chainpay.
//!
//! - **Ed25519** for signing ledger envelopes
//! - **Blake2b** for hashing envelope payloads before signing
//! - Address derivation with `hop_` prefix and base32 encoding

pub mod address;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::{decode_address, derive_address, is_valid_address, AddressError};
pub use hash::{blake2b_256, blake2b_256_multi};
pub use keys::{
    generate_keypair, keypair_from_hex_seed, keypair_from_private, keypair_from_seed,
    public_from_private,
};
pub use sign::{sign_message, verify_signature};
