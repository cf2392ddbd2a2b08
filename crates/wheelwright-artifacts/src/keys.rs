//! Storage key utilities.

use sha2::{Digest, Sha256};
use std::path::Path;
use wheelwright_core::artifact::{RESERVED_KEY_CHARS, check_key};
use wheelwright_core::{ConfigError, Error, Result};

/// Sanitize a key for use as a directory name.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if RESERVED_KEY_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

pub fn validate_key(key: &str) -> Result<()> {
    Ok(check_key(key)?)
}

/// Compiled key pattern such as `cibw-*`.
pub fn key_pattern(pattern: &str) -> Result<glob::Pattern> {
    glob::Pattern::new(pattern).map_err(|e| {
        Error::from(ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
    })
}

/// Hex-encoded SHA-256 of a file's contents.
pub async fn file_digest(path: &Path) -> Result<String> {
    let contents = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&contents)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("cibw/wheels"), "cibw_wheels");
        assert_eq!(sanitize_key("cibw-wheels-ubuntu-latest-0"), "cibw-wheels-ubuntu-latest-0");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("cibw-sdist").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key("cibw-*").is_err());
    }

    #[test]
    fn test_key_pattern() {
        let pattern = key_pattern("cibw-*").unwrap();
        assert!(pattern.matches("cibw-sdist"));
        assert!(pattern.matches("cibw-wheels-macos-14-2"));
        assert!(!pattern.matches("coverage-report"));
        assert!(key_pattern("[unclosed").is_err());
    }

    #[tokio::test]
    async fn test_file_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        tokio::fs::write(&path, b"abc").await.unwrap();
        assert_eq!(
            file_digest(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
