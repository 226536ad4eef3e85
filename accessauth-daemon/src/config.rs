//! Users file loading.
//!
//! The file is a JSON object keyed by decimal identity strings:
//!
//! ```json
//! {
//!   "2": { "active": true, "symmetric_key": "base64..." }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use accessauth_auth::{DirectoryEntry, MemoryDirectory};
use anyhow::Context;

/// Parse the users file content into a directory.
pub fn parse_users(text: &str) -> anyhow::Result<MemoryDirectory> {
    let raw: HashMap<String, DirectoryEntry> =
        serde_json::from_str(text).context("users file is not valid JSON")?;

    let mut directory = MemoryDirectory::new();
    for (id, entry) in raw {
        let identity: i64 = id
            .parse()
            .with_context(|| format!("identity {id:?} is not a decimal integer"))?;
        directory.insert(identity, entry);
    }
    Ok(directory)
}

/// Read and parse the users file.
pub fn load_users(path: &Path) -> anyhow::Result<MemoryDirectory> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read users file {}", path.display()))?;
    parse_users(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use accessauth_auth::Directory;

    #[test]
    fn parses_valid_users_file() {
        let directory = parse_users(
            r#"{
                "2": { "active": true, "symmetric_key": "a2V5" },
                "3": { "active": false, "symmetric_key": "b3RoZXI=" }
            }"#,
        )
        .unwrap();

        assert_eq!(directory.len(), 2);
        assert!(directory.exists_and_active(2));
        assert!(!directory.exists_and_active(3));
        assert_eq!(directory.symmetric_key_of(2).as_deref(), Some("a2V5"));
    }

    #[test]
    fn rejects_non_numeric_identity_keys() {
        let err = parse_users(r#"{"alice": {"active": true, "symmetric_key": "a2V5"}}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("alice"));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(parse_users("not json").is_err());
    }

    #[test]
    fn parses_empty_directory() {
        assert!(parse_users("{}").unwrap().is_empty());
    }
}
