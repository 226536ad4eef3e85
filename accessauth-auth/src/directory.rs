//! Identity directory interface.
//!
//! The directory maps a numeric identity to an active flag and a base64
//! symmetric key. It is consumed, never mutated, by the protocol; a
//! persistent backing store lives outside this crate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lookup interface the protocol depends on.
pub trait Directory: Send + Sync {
    /// Whether the identity exists and is marked active.
    fn exists_and_active(&self, identity: i64) -> bool;

    /// The identity's base64 symmetric key, if one is provisioned.
    fn symmetric_key_of(&self, identity: i64) -> Option<String>;
}

/// One directory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub active: bool,
    pub symmetric_key: String,
}

/// In-memory directory, built once at startup and shared read-only.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: HashMap<i64, DirectoryEntry>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: i64, entry: DirectoryEntry) {
        self.entries.insert(identity, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(i64, DirectoryEntry)> for MemoryDirectory {
    fn from_iter<I: IntoIterator<Item = (i64, DirectoryEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Directory for MemoryDirectory {
    fn exists_and_active(&self, identity: i64) -> bool {
        self.entries.get(&identity).map(|e| e.active).unwrap_or(false)
    }

    fn symmetric_key_of(&self, identity: i64) -> Option<String> {
        self.entries.get(&identity).map(|e| e.symmetric_key.clone())
    }
}
