//! Random challenge and key generation.

use base64::prelude::{Engine as _, BASE64_STANDARD, BASE64_URL_SAFE_NO_PAD};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

/// Challenge entropy (256 bits).
const CHALLENGE_BYTES: usize = 32;

/// Generated key size (256 bits).
const KEY_BYTES: usize = 32;

/// Draw a fresh 256-bit challenge, rendered as URL-safe unpadded base64.
///
/// A challenge has exactly one valid lifetime: from issuance to the first
/// verification attempt.
pub fn generate_challenge() -> String {
    let mut bytes = [0u8; CHALLENGE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let encoded = BASE64_URL_SAFE_NO_PAD.encode(bytes);
    bytes.zeroize();
    encoded
}

/// Draw a fresh 256-bit symmetric key, rendered as standard base64.
///
/// Used by provisioning tooling only, never by the runtime protocol.
pub fn generate_symmetric_key() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let encoded = BASE64_STANDARD.encode(bytes);
    bytes.zeroize();
    encoded
}
