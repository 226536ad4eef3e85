//! Cryptographic primitives and the identity directory interface.
//!
//! This crate is deliberately IO-free: no sockets, no filesystem, no
//! logging. The connection layer injects a [`Directory`] implementation
//! and drives the protocol elsewhere, which keeps everything here
//! directly unit-testable.

mod challenge;
mod cipher;
mod digest;
mod directory;
mod error;

pub use challenge::{generate_challenge, generate_symmetric_key};
pub use cipher::{decrypt, encrypt};
pub use digest::{compute_digest, digests_match};
pub use directory::{Directory, DirectoryEntry, MemoryDirectory};
pub use error::CryptoError;
