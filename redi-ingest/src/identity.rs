//! Deterministic identity fingerprints for owners and phones
//!
//! Hashes are pure functions of normalized input: re-running on identical
//! input reproduces the identical hash, which is what makes the store's
//! upserts idempotent.

use sha2::{Digest, Sha256};

/// Fingerprint an owner from their normalized identity fields.
///
/// `sha256(lower(trim(first)) + "_" + lower(trim(last)) + "_" +
/// lower(trim(mailing_street)) + "_" + zip)`, hex-encoded.
pub fn owner_hash(first: &str, last: &str, mailing_street: &str, zip: &str) -> String {
    let raw = format!(
        "{}_{}_{}_{}",
        first.trim().to_lowercase(),
        last.trim().to_lowercase(),
        mailing_street.trim().to_lowercase(),
        zip
    );
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// Human-readable owner display label (non-unique-safe).
pub fn owner_display_id(hash: &str) -> String {
    format!("OWN-{}", &hash[..8.min(hash.len())])
}

/// Fingerprint a canonicalized phone number.
pub fn phone_hash(number: &str) -> String {
    format!("{:x}", Sha256::digest(number.as_bytes()))
}

/// Human-readable phone display label.
pub fn phone_display_id(hash: &str) -> String {
    format!("PHONE-{}", &hash[..8.min(hash.len())])
}
