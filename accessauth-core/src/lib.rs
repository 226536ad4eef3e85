//! Connection handling for the authentication service.
//!
//! Layers, bottom up: TLS configuration ([`tls`]), the newline-framed
//! transport ([`transport`]), the cancellable deadline primitive
//! ([`timeout`]), the per-connection protocol state machine ([`session`])
//! and its serving loop ([`server`]), and the client-side driver used for
//! provisioning checks and interop tests ([`client`]).

pub mod client;
pub mod server;
pub mod session;
pub mod timeout;
pub mod tls;
pub mod transport;
