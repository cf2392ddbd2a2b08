//! Collected artifact types.

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Characters a storage key may not contain.
pub const RESERVED_KEY_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Keys must be non-empty and free of path separators and wildcards.
pub fn check_key(key: &str) -> Result<(), ConfigError> {
    if key.trim().is_empty() {
        return Err(ConfigError::EmptyField("artifact key"));
    }
    if key.contains(RESERVED_KEY_CHARS) || key == "." || key == ".." {
        return Err(ConfigError::InvalidPattern {
            pattern: key.to_string(),
            reason: "artifact keys may not contain path separators or wildcards".to_string(),
        });
    }
    Ok(())
}

/// What an upload does when its pattern selects nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfNoFilesFound {
    /// Fail the upload. Used for every artifact this pipeline collects.
    #[default]
    Error,
    Warn,
    Ignore,
}

/// A single file held by the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub name: String,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Everything uploaded under one storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub key: String,
    pub files: Vec<StoredFile>,
    pub uploaded_at: DateTime<Utc>,
}

impl ArtifactRecord {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_key() {
        assert!(check_key("cibw-wheels-ubuntu-latest-0").is_ok());
        assert_eq!(check_key(" "), Err(ConfigError::EmptyField("artifact key")));
        for bad in ["cibw/wheels", "ubuntu:22", "cibw-*", ".."] {
            assert!(matches!(
                check_key(bad),
                Err(ConfigError::InvalidPattern { .. })
            ));
        }
    }
}
