//! Callback signature verification.
//!
//! The platform signs every callback with SHA-1 over the lexicographically
//! sorted concatenation of the shared token, timestamp, nonce and a fourth
//! string (the echo string on handshake, the ciphertext or empty on delivery).

use sha1::{Digest, Sha1};

/// Compute the lowercase hex SHA-1 over the sorted concatenation of `parts`.
pub fn compute_signature(parts: &[&str]) -> String {
    let mut sorted = parts.to_vec();
    sorted.sort_unstable();

    let mut hasher = Sha1::new();
    for part in sorted {
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Verify a callback signature.
///
/// Returns false on any mismatch. Never fails on odd input; callers must
/// reject requests with absent mandatory fields before getting here.
pub fn verify(token: &str, signature: &str, timestamp: &str, nonce: &str, echo: &str) -> bool {
    compute_signature(&[token, timestamp, nonce, echo]) == signature
}
