//! On-disk persistence for the Microsoft token.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Token material returned by the Microsoft identity platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl TokenData {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// True once `expires_at` lies in the past. Tokens without an expiry
    /// never report as expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at <= chrono::Utc::now().timestamp_millis())
    }
}

/// JSON file holding at most one [`TokenData`].
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored token. A missing or unreadable file yields `None`.
    pub fn load(&self) -> Option<TokenData> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read token store");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed token store");
                None
            }
        }
    }

    pub fn save(&self, token: &TokenData) -> Result<()> {
        let json = serde_json::to_string_pretty(token)?;
        fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "Saved token");
        Ok(())
    }

    /// Delete the file. Absent files are not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_clear() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::new(tmp.path().join(".tokens.json"));
        assert!(store.load().is_none());

        let token = TokenData {
            access_token: "abc".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(1_700_000_000_000),
        };
        store.save(&token).unwrap();
        assert_eq!(store.load(), Some(token));

        store.clear().unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_file_format_uses_snake_case() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::new(tmp.path().join(".tokens.json"));
        store.save(&TokenData::new("abc")).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["access_token"], "abc");
        assert!(value.get("refresh_token").is_none());
    }

    #[test]
    fn test_malformed_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".tokens.json");
        fs::write(&path, "not json").unwrap();
        assert!(TokenStore::new(path).load().is_none());
    }

    #[test]
    fn test_expiry() {
        let mut token = TokenData::new("abc");
        assert!(!token.is_expired());
        token.expires_at = Some(0);
        assert!(token.is_expired());
    }
}
