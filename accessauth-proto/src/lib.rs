//! Wire protocol for the authentication service.
//!
//! Messages travel as newline-delimited JSON records tagged with a `type`
//! field. Binary or sensitive payloads (identity strings, ciphertext,
//! timestamps) are carried as lowercase hex text so the outer record stays
//! text-safe. The hex layer is an encoding choice only; it provides no
//! confidentiality.

mod error;
mod hex;
mod message;

pub use self::error::WireError;
pub use self::hex::{hex_decode, hex_decode_str, hex_encode, hex_encode_str};
pub use self::message::Message;
