//! AES-CBC encryption of challenge material.
//!
//! Wire form is base64(IV || ciphertext) with a freshly drawn random
//! 16-byte IV per encryption. Padding is PKCS#7 applied by hand and
//! validated strictly on decrypt: a padding mismatch fails the operation
//! rather than passing unpadded bytes through. Keys are base64 and must
//! decode to 16 or 32 bytes (AES-128 or AES-256).

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const BLOCK: usize = 16;

/// Encrypt a UTF-8 plaintext under a base64 key.
///
/// Returns base64(IV || ciphertext).
pub fn encrypt(plaintext: &str, key_b64: &str) -> Result<String, CryptoError> {
    let key = decode_key(key_b64, "encrypt")?;
    let mut iv = [0u8; BLOCK];
    OsRng.fill_bytes(&mut iv);

    let padded = Zeroizing::new(pkcs7_pad(plaintext.as_bytes()));
    let ciphertext = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(&key, &iv)
            .map_err(|_| CryptoError::new("encrypt", "invalid key material"))?
            .encrypt_padded_vec_mut::<NoPadding>(&padded),
        32 => Aes256CbcEnc::new_from_slices(&key, &iv)
            .map_err(|_| CryptoError::new("encrypt", "invalid key material"))?
            .encrypt_padded_vec_mut::<NoPadding>(&padded),
        _ => return Err(CryptoError::new("encrypt", "unsupported key length")),
    };

    let mut out = Vec::with_capacity(BLOCK + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64_STANDARD.encode(out))
}

/// Decrypt base64(IV || ciphertext) under a base64 key back to UTF-8 text.
pub fn decrypt(ciphertext_b64: &str, key_b64: &str) -> Result<String, CryptoError> {
    let key = decode_key(key_b64, "decrypt")?;
    let data = BASE64_STANDARD
        .decode(ciphertext_b64)
        .map_err(|_| CryptoError::new("decrypt", "ciphertext is not valid base64"))?;

    if data.len() < 2 * BLOCK {
        return Err(CryptoError::new("decrypt", "ciphertext too short"));
    }
    if (data.len() - BLOCK) % BLOCK != 0 {
        return Err(CryptoError::new("decrypt", "ciphertext not block aligned"));
    }

    let (iv, body) = data.split_at(BLOCK);
    let padded = Zeroizing::new(match key.len() {
        16 => Aes128CbcDec::new_from_slices(&key, iv)
            .map_err(|_| CryptoError::new("decrypt", "invalid key material"))?
            .decrypt_padded_vec_mut::<NoPadding>(body)
            .map_err(|_| CryptoError::new("decrypt", "block decryption failed"))?,
        32 => Aes256CbcDec::new_from_slices(&key, iv)
            .map_err(|_| CryptoError::new("decrypt", "invalid key material"))?
            .decrypt_padded_vec_mut::<NoPadding>(body)
            .map_err(|_| CryptoError::new("decrypt", "block decryption failed"))?,
        _ => return Err(CryptoError::new("decrypt", "unsupported key length")),
    });

    let plain = pkcs7_unpad(&padded)?;
    String::from_utf8(plain.to_vec())
        .map_err(|_| CryptoError::new("decrypt", "plaintext is not valid utf-8"))
}

fn decode_key(key_b64: &str, operation: &'static str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let bytes = BASE64_STANDARD
        .decode(key_b64)
        .map_err(|_| CryptoError::new(operation, "key is not valid base64"))?;
    match bytes.len() {
        16 | 32 => Ok(Zeroizing::new(bytes)),
        _ => Err(CryptoError::new(operation, "key must be 128 or 256 bits")),
    }
}

fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad = BLOCK - (data.len() % BLOCK);
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.extend(std::iter::repeat(pad as u8).take(pad));
    out
}

fn pkcs7_unpad(data: &[u8]) -> Result<&[u8], CryptoError> {
    let last = *data
        .last()
        .ok_or(CryptoError::new("decrypt", "empty padded block"))?;
    let pad = last as usize;
    if pad == 0 || pad > BLOCK || pad > data.len() {
        return Err(CryptoError::new("decrypt", "invalid padding length"));
    }
    if data[data.len() - pad..].iter().any(|&b| b != last) {
        return Err(CryptoError::new("decrypt", "inconsistent padding bytes"));
    }
    Ok(&data[..data.len() - pad])
}
