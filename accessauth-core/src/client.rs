//! Client-side authentication driver.
//!
//! Runs the full exchange against a server: claim an identity, decrypt
//! the issued challenge, answer with the encrypted digest, and interpret
//! the terminal reply. Used by the daemon's `auth` subcommand and the
//! end-to-end tests.

use accessauth_auth::{compute_digest, decrypt, encrypt, CryptoError};
use accessauth_proto::{hex_decode_str, hex_encode_str, Message, WireError};

use crate::transport::{SecureConnection, TransportError};

/// Terminal result of a successful exchange.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user_id: String,
    pub timestamp_millis: i64,
}

/// Client-side failures.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("authentication denied: {0}")]
    Denied(String),
    #[error("authentication timed out: {0}")]
    TimedOut(String),
    #[error("connection closed before completion")]
    ConnectionClosed,
    #[error("unexpected {0} message")]
    UnexpectedMessage(&'static str),
}

/// Authenticate as `user_id` using the base64 symmetric key.
pub async fn authenticate(
    conn: &SecureConnection,
    user_id: &str,
    key_b64: &str,
) -> Result<AuthOutcome, ClientError> {
    conn.send(&Message::AuthRequest {
        user_id: hex_encode_str(user_id),
    })
    .await?;

    let challenge_hex = match conn.next_message().await? {
        Some(Message::Challenge { challenge, .. }) => challenge,
        Some(other) => return Err(terminal_error(other)),
        None => return Err(ClientError::ConnectionClosed),
    };

    let ciphertext = hex_decode_str(&challenge_hex)?;
    let challenge = decrypt(&ciphertext, key_b64)?;
    let response = encrypt(&compute_digest(&challenge), key_b64)?;
    conn.send(&Message::ChallengeResponse {
        response: hex_encode_str(&response),
    })
    .await?;

    match conn.next_message().await? {
        Some(Message::AuthSuccess {
            user_id, timestamp, ..
        }) => {
            let user_id = hex_decode_str(&user_id)?;
            let timestamp_millis = hex_decode_str(&timestamp)?
                .parse()
                .map_err(|_| WireError::MalformedMessage("timestamp is not numeric"))?;
            Ok(AuthOutcome {
                user_id,
                timestamp_millis,
            })
        }
        Some(other) => Err(terminal_error(other)),
        None => Err(ClientError::ConnectionClosed),
    }
}

fn terminal_error(msg: Message) -> ClientError {
    match msg {
        Message::AuthError { message } => ClientError::Denied(readable(&message)),
        Message::Timeout { message } => ClientError::TimedOut(readable(&message)),
        other => ClientError::UnexpectedMessage(other.kind()),
    }
}

fn readable(hex_text: &str) -> String {
    hex_decode_str(hex_text).unwrap_or_else(|_| hex_text.to_string())
}
