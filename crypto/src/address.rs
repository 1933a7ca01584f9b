//! Ledger addresses derived from public keys.
//!
//! `hop_` followed by 60 base32 characters: 52 for the public key and 8 for
//! a 5-byte Blake2b-256 checksum of it.

use chainpay_types::{Address, PublicKey};
use thiserror::Error;

/// No `0`, `2`, `l` or `v`.
const ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";

const KEY_CHARS: usize = 52;
const CHECKSUM_LEN: usize = 5;
const CHECKSUM_CHARS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address does not start with {}", Address::PREFIX)]
    Prefix,

    #[error("address body must be {expected} characters, found {found}")]
    Length { expected: usize, found: usize },

    #[error("invalid address character {0:?}")]
    Character(char),

    #[error("address checksum does not match its key")]
    Checksum,
}

fn symbol(c: u8) -> Result<u64, AddressError> {
    ALPHABET
        .iter()
        .position(|&a| a == c)
        .map(|p| p as u64)
        .ok_or(AddressError::Character(c as char))
}

/// Big-endian base32; the final group is zero-padded on the right.
fn encode(bytes: &[u8], out: &mut String) {
    let mut acc = 0u64;
    let mut bits = 0u32;
    for &byte in bytes {
        acc = (acc << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((acc >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((acc << (5 - bits)) & 0x1f) as usize] as char);
    }
}

fn decode<const N: usize>(chars: &str) -> Result<[u8; N], AddressError> {
    let mut out = [0u8; N];
    let mut filled = 0;
    let mut acc = 0u64;
    let mut bits = 0u32;
    for c in chars.bytes() {
        acc = (acc << 5) | symbol(c)?;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            if filled < N {
                out[filled] = (acc >> bits) as u8;
                filled += 1;
            }
        }
    }
    Ok(out)
}

fn checksum(key: &[u8; 32]) -> [u8; CHECKSUM_LEN] {
    let hash = crate::blake2b_256(key);
    let mut sum = [0u8; CHECKSUM_LEN];
    sum.copy_from_slice(&hash[..CHECKSUM_LEN]);
    sum
}

/// The ledger address owned by `public_key`.
pub fn derive_address(public_key: &PublicKey) -> Address {
    let mut address = String::with_capacity(Address::PREFIX.len() + KEY_CHARS + CHECKSUM_CHARS);
    address.push_str(Address::PREFIX);
    encode(public_key.as_bytes(), &mut address);
    encode(&checksum(public_key.as_bytes()), &mut address);
    Address::new(address)
}

/// Recover the public key an address was derived from.
pub fn decode_address(address: &str) -> Result<PublicKey, AddressError> {
    let body = address
        .strip_prefix(Address::PREFIX)
        .ok_or(AddressError::Prefix)?;
    if body.len() != KEY_CHARS + CHECKSUM_CHARS {
        return Err(AddressError::Length {
            expected: KEY_CHARS + CHECKSUM_CHARS,
            found: body.len(),
        });
    }
    if !body.is_ascii() {
        return Err(AddressError::Character(
            body.chars().find(|c| !c.is_ascii()).unwrap_or('?'),
        ));
    }
    let (key_chars, checksum_chars) = body.split_at(KEY_CHARS);
    let key: [u8; 32] = decode(key_chars)?;
    let found: [u8; CHECKSUM_LEN] = decode(checksum_chars)?;
    if found != checksum(&key) {
        return Err(AddressError::Checksum);
    }
    Ok(PublicKey(key))
}

pub fn is_valid_address(address: &str) -> bool {
    decode_address(address).is_ok()
}
