//! Hashing and random-token helpers.
//!
//! API keys, OTPs, transfer codes and CVVs are never stored in plain text;
//! only their SHA-256 hex digest is persisted.

use rand::Rng;
use sha2::{Digest, Sha256};

const API_KEY_PREFIX: &str = "nbk_";

/// SHA-256 digest of `value`, hex encoded (64 characters).
pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a submitted secret against a stored digest.
pub fn matches_hash(submitted: &str, stored_hash: &str) -> bool {
    let computed = sha256_hex(submitted.trim());
    // Equal-length hex strings; fold to avoid early exit.
    computed.len() == stored_hash.len()
        && computed
            .bytes()
            .zip(stored_hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// A string of `len` random decimal digits.
pub fn random_digits(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Fresh API key: `nbk_` followed by 48 hex characters.
pub fn generate_api_key() -> String {
    let bytes: [u8; 24] = rand::random();
    format!("{API_KEY_PREFIX}{}", hex::encode(bytes))
}

/// Unique, human-traceable reference such as `TRF_3f2a...`.
pub fn new_reference(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple()).to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_stable_hex() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn matches_hash_trims_input() {
        let stored = sha256_hex("123456");
        assert!(matches_hash(" 123456 ", &stored));
        assert!(!matches_hash("123457", &stored));
        assert!(!matches_hash("123456", "short"));
    }

    #[test]
    fn random_digits_are_digits() {
        let otp = random_digits(6);
        assert_eq!(otp.len(), 6);
        assert!(otp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn api_keys_are_prefixed_and_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert!(a.starts_with("nbk_"));
        assert_eq!(a.len(), 4 + 48);
        assert_ne!(a, b);
    }

    #[test]
    fn references_carry_prefix() {
        let reference = new_reference("dep");
        assert!(reference.starts_with("DEP_"));
        assert_eq!(reference.len(), 4 + 32);
    }
}
