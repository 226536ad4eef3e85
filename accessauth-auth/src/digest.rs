//! Challenge digest computation and comparison.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 over the UTF-8 bytes of the challenge, base64-encoded.
///
/// This digest is the value a client must reproduce to prove it decrypted
/// the issued challenge.
pub fn compute_digest(challenge: &str) -> String {
    BASE64_STANDARD.encode(Sha256::digest(challenge.as_bytes()))
}

/// Constant-time equality of two digest strings.
pub fn digests_match(claimed: &str, expected: &str) -> bool {
    if claimed.len() != expected.len() {
        return false;
    }
    claimed.as_bytes().ct_eq(expected.as_bytes()).into()
}
