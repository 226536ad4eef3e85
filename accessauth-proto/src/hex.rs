//! Byte <-> hex text sub-codec.
//!
//! Lowercase, two digits per byte. Decoding rejects odd-length input and
//! non-hex characters.

use crate::error::WireError;

/// Encode bytes as lowercase hex.
pub fn hex_encode(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode a hex string back to bytes.
pub fn hex_decode(text: &str) -> Result<Vec<u8>, WireError> {
    hex::decode(text).map_err(|e| match e {
        hex::FromHexError::OddLength => WireError::InvalidHexEncoding("odd length"),
        _ => WireError::InvalidHexEncoding("non-hex character"),
    })
}

/// Encode the UTF-8 bytes of a string as hex.
pub fn hex_encode_str(text: &str) -> String {
    hex::encode(text.as_bytes())
}

/// Decode hex back into a UTF-8 string.
pub fn hex_decode_str(text: &str) -> Result<String, WireError> {
    let bytes = hex_decode(text)?;
    String::from_utf8(bytes).map_err(|_| WireError::InvalidHexEncoding("decoded bytes are not utf-8"))
}
