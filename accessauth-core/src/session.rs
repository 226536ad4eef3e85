//! Per-connection authentication state machine.
//!
//! One [`AuthSession`] owns one authentication attempt. Inbound messages
//! from the read loop and the timeout action both funnel through the
//! attempt mutex, and an epoch counter decides races between the two:
//! every handled message cancels the pending timeout and bumps the epoch
//! before acting, while a firing timeout re-checks epoch and state under
//! the same lock before touching anything. A message and a concurrently
//! firing timeout therefore always yield exactly one outcome.
//!
//! Outbound messages flow through an mpsc channel drained by the
//! connection's writer task, so the timeout action can emit without
//! holding any transport lock.
//!
//! The peer only ever sees one generic denial text; the differentiated
//! reasons (unknown identity, inactive, bad encoding, digest mismatch,
//! state mismatch) stay in server-side logs to avoid handing an
//! enumeration oracle to unauthenticated clients.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch, Mutex};
use zeroize::Zeroizing;

use accessauth_auth::{
    compute_digest, decrypt, digests_match, encrypt, generate_challenge, Directory,
};
use accessauth_proto::{hex_decode_str, hex_encode_str, Message};

use crate::timeout::{self, TimeoutHandle};

/// Denial text sent to the peer for every terminal failure.
const GENERIC_DENIAL: &str = "authentication failed";

/// States of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    IdVerification,
    WaitingChallengeResponse,
    Authenticated,
    Terminated,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Authenticated | AttemptState::Terminated)
    }
}

/// Mutable attempt state, guarded by the session mutex.
///
/// `symmetric_key` and `challenge` are present exactly while the attempt
/// sits between identity verification and the terminal outcome, and are
/// erased (zeroized on drop) on every terminal transition.
struct Attempt {
    state: AttemptState,
    identity: Option<String>,
    symmetric_key: Option<Zeroizing<String>>,
    challenge: Option<Zeroizing<String>>,
    pending_timeout: Option<TimeoutHandle>,
    epoch: u64,
}

impl Attempt {
    fn new() -> Self {
        Self {
            state: AttemptState::Idle,
            identity: None,
            symmetric_key: None,
            challenge: None,
            pending_timeout: None,
            epoch: 0,
        }
    }

    fn erase_secrets(&mut self) {
        self.symmetric_key = None;
        self.challenge = None;
    }
}

struct SessionInner {
    attempt: Mutex<Attempt>,
    outbox: mpsc::Sender<Message>,
    directory: Arc<dyn Directory>,
    timeout: Duration,
    peer: String,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

/// One authentication attempt bound to one connection.
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

impl AuthSession {
    pub async fn new(
        directory: Arc<dyn Directory>,
        outbox: mpsc::Sender<Message>,
        timeout: Duration,
        peer: String,
    ) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        let session = Self {
            inner: Arc::new(SessionInner {
                attempt: Mutex::new(Attempt::new()),
                outbox,
                directory,
                timeout,
                peer,
                done_tx,
                done_rx,
            }),
        };

        // A peer that completes the handshake and then sends nothing is
        // bounded by the same window as an unanswered challenge; the first
        // message cancels this and every later wait re-arms it.
        let mut attempt = session.inner.attempt.lock().await;
        session.arm_timeout(&mut attempt);
        drop(attempt);
        session
    }

    /// Feed one decoded inbound message through the state machine.
    pub async fn handle_message(&self, msg: Message) {
        let mut attempt = self.inner.attempt.lock().await;

        // Supersede any armed timeout before acting on the message.
        if let Some(handle) = attempt.pending_timeout.take() {
            handle.cancel();
        }
        attempt.epoch += 1;

        if attempt.state.is_terminal() {
            tracing::debug!(
                peer = %self.inner.peer,
                kind = msg.kind(),
                "dropping message after terminal outcome"
            );
            return;
        }

        match (attempt.state, msg) {
            (AttemptState::Idle, Message::AuthRequest { user_id }) => {
                self.start_verification(&mut attempt, &user_id).await;
            }
            (AttemptState::WaitingChallengeResponse, Message::ChallengeResponse { response }) => {
                self.verify_response(&mut attempt, &response).await;
            }
            (state, msg) => {
                tracing::warn!(
                    peer = %self.inner.peer,
                    state = ?state,
                    kind = msg.kind(),
                    "message does not fit current state"
                );
                self.deny(&mut attempt, "state mismatch").await;
            }
        }
    }

    /// Resolves once the attempt reaches a terminal outcome.
    pub async fn finished(&self) {
        let mut done = self.inner.done_rx.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Cancel any armed timeout and erase secrets. Called when the
    /// connection goes away, whatever state the attempt is in.
    pub async fn shutdown(&self) {
        let mut attempt = self.inner.attempt.lock().await;
        if let Some(handle) = attempt.pending_timeout.take() {
            handle.cancel();
        }
        attempt.erase_secrets();
        if !attempt.state.is_terminal() {
            attempt.state = AttemptState::Terminated;
        }
        let _ = self.inner.done_tx.send(true);
    }

    /// Current attempt state.
    pub async fn state(&self) -> AttemptState {
        self.inner.attempt.lock().await.state
    }

    async fn start_verification(&self, attempt: &mut Attempt, user_id_hex: &str) {
        attempt.state = AttemptState::IdVerification;

        let identity_text = match hex_decode_str(user_id_hex) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(peer = %self.inner.peer, error = %e, "identity field is not valid hex");
                self.deny(attempt, "bad identity encoding").await;
                return;
            }
        };
        let identity: i64 = match identity_text.parse() {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(peer = %self.inner.peer, "identity is not a decimal integer");
                self.deny(attempt, "identity is not numeric").await;
                return;
            }
        };

        if !self.inner.directory.exists_and_active(identity) {
            tracing::warn!(peer = %self.inner.peer, identity, "unknown or inactive identity");
            self.deny(attempt, "unknown or inactive identity").await;
            return;
        }
        let key = match self.inner.directory.symmetric_key_of(identity) {
            Some(k) => Zeroizing::new(k),
            None => {
                tracing::warn!(peer = %self.inner.peer, identity, "no symmetric key provisioned");
                self.deny(attempt, "key unavailable").await;
                return;
            }
        };

        let challenge = Zeroizing::new(generate_challenge());
        let ciphertext = match encrypt(&challenge, &key) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(peer = %self.inner.peer, error = %e, "challenge encryption failed");
                self.deny(attempt, "challenge encryption failed").await;
                return;
            }
        };

        attempt.identity = Some(identity_text);
        attempt.symmetric_key = Some(key);
        attempt.challenge = Some(challenge);
        attempt.state = AttemptState::WaitingChallengeResponse;

        tracing::info!(peer = %self.inner.peer, identity, "challenge issued");
        self.send(Message::Challenge {
            message: hex_encode_str("challenge issued"),
            challenge: hex_encode_str(&ciphertext),
        })
        .await;
        self.arm_timeout(attempt);
    }

    async fn verify_response(&self, attempt: &mut Attempt, response_hex: &str) {
        let response_b64 = match hex_decode_str(response_hex) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(peer = %self.inner.peer, error = %e, "response field is not valid hex");
                self.deny(attempt, "bad response encoding").await;
                return;
            }
        };

        // Invariant: both secrets are present in this state.
        let (Some(key), Some(challenge)) =
            (attempt.symmetric_key.clone(), attempt.challenge.clone())
        else {
            self.deny(attempt, "attempt secrets missing").await;
            return;
        };

        let claimed = match decrypt(&response_b64, &key) {
            Ok(plain) => Zeroizing::new(plain),
            Err(e) => {
                tracing::warn!(peer = %self.inner.peer, error = %e, "response decryption failed");
                self.deny(attempt, "response decryption failed").await;
                return;
            }
        };
        let expected = compute_digest(&challenge);
        if !digests_match(&claimed, &expected) {
            tracing::warn!(peer = %self.inner.peer, "challenge digest mismatch");
            self.deny(attempt, "digest mismatch").await;
            return;
        }

        let identity = attempt.identity.clone().unwrap_or_default();
        attempt.erase_secrets();
        attempt.state = AttemptState::Authenticated;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        tracing::info!(peer = %self.inner.peer, identity = %identity, "authentication successful");
        self.send(Message::AuthSuccess {
            message: hex_encode_str("authentication successful"),
            user_id: hex_encode_str(&identity),
            timestamp: hex_encode_str(&millis.to_string()),
        })
        .await;
        let _ = self.inner.done_tx.send(true);
    }

    /// Terminal denial. The wire carries only the generic text; `reason`
    /// goes to the logs.
    async fn deny(&self, attempt: &mut Attempt, reason: &'static str) {
        tracing::info!(peer = %self.inner.peer, reason, "authentication denied");
        attempt.erase_secrets();
        attempt.state = AttemptState::Terminated;
        self.send(Message::AuthError {
            message: hex_encode_str(GENERIC_DENIAL),
        })
        .await;
        let _ = self.inner.done_tx.send(true);
    }

    fn arm_timeout(&self, attempt: &mut Attempt) {
        let epoch = attempt.epoch;
        let inner = Arc::clone(&self.inner);
        let handle = timeout::arm(self.inner.timeout, async move {
            SessionInner::expire(inner, epoch).await;
        });
        attempt.pending_timeout = Some(handle);
    }

    async fn send(&self, msg: Message) {
        if self.inner.outbox.send(msg).await.is_err() {
            tracing::debug!(peer = %self.inner.peer, "outbox closed, dropping outbound message");
        }
    }
}

impl SessionInner {
    /// Timeout action. Runs on the shared pool; takes the attempt lock
    /// and bails if a message superseded it in the meantime.
    async fn expire(inner: Arc<SessionInner>, epoch: u64) {
        let mut attempt = inner.attempt.lock().await;
        if attempt.epoch != epoch || attempt.state.is_terminal() {
            return;
        }

        tracing::info!(peer = %inner.peer, "authentication attempt timed out");
        attempt.erase_secrets();
        attempt.state = AttemptState::Terminated;
        // The fired handle stays in the attempt; dropping it later is a no-op.
        if inner
            .outbox
            .send(Message::Timeout {
                message: hex_encode_str("authentication timed out"),
            })
            .await
            .is_err()
        {
            tracing::debug!(peer = %inner.peer, "outbox closed, dropping timeout message");
        }
        let _ = inner.done_tx.send(true);
    }
}
