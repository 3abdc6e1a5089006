//! Content fingerprints and settlement references

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::amount;

/// SHA-256 of the input, base64 encoded
pub fn sha256_b64(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    STANDARD.encode(digest)
}

/// Fingerprint over (amount, wallet address, settlement reference).
///
/// The amount is rendered at the storage scale so `100` and `100.000000`
/// hash identically.
pub fn token_hash(amount: Decimal, wallet_address: &str, tx_ref: &str) -> String {
    let preimage = format!("{}{}{}", amount::normalize(amount), wallet_address, tx_ref);
    sha256_b64(&preimage)
}

/// Generate a globally unique settlement reference: `TX<millis>-<uuid>`
pub fn new_tx_ref() -> String {
    format!(
        "TX{}-{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}
