//! Filesystem-backed artifact store.
//!
//! Layout: `<root>/<key>/` holds the uploaded files plus a `manifest.json`
//! describing them. A key is written once per store.

use crate::keys::{file_digest, key_pattern, sanitize_key, validate_key};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use wheelwright_core::artifact::{ArtifactRecord, IfNoFilesFound, StoredFile};
use wheelwright_core::ports::ArtifactStore;
use wheelwright_core::{Error, Result};

const MANIFEST_FILE: &str = "manifest.json";

pub struct FilesystemStore {
    root_dir: PathBuf,
}

impl FilesystemStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        self.root_dir.join(sanitize_key(key))
    }

    /// Regular files directly inside `dir` whose names match `pattern`.
    async fn matching_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
        let pattern = key_pattern(pattern)?;
        if !tokio::fs::try_exists(dir).await? {
            return Ok(vec![]);
        }

        let mut files = vec![];
        let mut read_dir = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await?.is_file() && pattern.matches(&name) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    async fn read_record(&self, key_dir: &Path) -> Result<Option<ArtifactRecord>> {
        let manifest = key_dir.join(MANIFEST_FILE);
        if !tokio::fs::try_exists(&manifest).await? {
            return Ok(None);
        }
        let contents = tokio::fs::read(&manifest).await?;
        Ok(Some(serde_json::from_slice(&contents)?))
    }

    /// Create the key directory and fill it. A key left half-written by a
    /// failed copy is removed so the key can be uploaded again.
    async fn write_key(&self, key: &str, sources: &[PathBuf]) -> Result<ArtifactRecord> {
        tokio::fs::create_dir_all(&self.root_dir).await?;
        let key_dir = self.key_dir(key);
        // create_dir fails if the key already exists, which also covers
        // two concurrent uploads racing for the same key.
        if let Err(e) = tokio::fs::create_dir(&key_dir).await {
            return Err(if e.kind() == std::io::ErrorKind::AlreadyExists {
                Error::ArtifactUploadFailed(format!("artifact {} already exists", key))
            } else {
                Error::Io(e)
            });
        }

        let result = Self::fill(&key_dir, key, sources).await;
        if let Err(e) = &result {
            warn!(key = %key, error = %e, "Upload failed, removing partial artifact");
            if let Err(e) = tokio::fs::remove_dir_all(&key_dir).await {
                warn!(dir = %key_dir.display(), error = %e, "Failed to remove partial artifact");
            }
        }
        result
    }

    async fn fill(key_dir: &Path, key: &str, sources: &[PathBuf]) -> Result<ArtifactRecord> {
        let mut files = Vec::with_capacity(sources.len());
        for source in sources {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| Error::Internal(format!("no file name: {}", source.display())))?;
            let size_bytes = tokio::fs::copy(source, key_dir.join(&name)).await?;
            let sha256 = file_digest(source).await?;
            files.push(StoredFile {
                name,
                size_bytes,
                sha256,
            });
        }

        let record = ArtifactRecord {
            key: key.to_string(),
            files,
            uploaded_at: Utc::now(),
        };
        tokio::fs::write(
            key_dir.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&record)?,
        )
        .await?;
        Ok(record)
    }
}

#[async_trait]
impl ArtifactStore for FilesystemStore {
    async fn upload(
        &self,
        key: &str,
        dir: &Path,
        pattern: &str,
        if_no_files_found: IfNoFilesFound,
    ) -> Result<ArtifactRecord> {
        validate_key(key)?;
        let sources = Self::matching_files(dir, pattern).await?;

        if sources.is_empty() {
            let location = dir.join(pattern).display().to_string();
            match if_no_files_found {
                IfNoFilesFound::Error => {
                    return Err(Error::MissingArtifact {
                        key: key.to_string(),
                        location,
                    });
                }
                IfNoFilesFound::Warn => {
                    warn!(key = %key, location = %location, "No files found, nothing uploaded");
                }
                IfNoFilesFound::Ignore => {
                    debug!(key = %key, location = %location, "No files found, nothing uploaded");
                }
            }
            return Ok(ArtifactRecord {
                key: key.to_string(),
                files: vec![],
                uploaded_at: Utc::now(),
            });
        }

        let record = self.write_key(key, &sources).await?;

        info!(
            key = %key,
            files = record.files.len(),
            bytes = record.total_bytes(),
            "Uploaded artifact"
        );
        Ok(record)
    }

    async fn download(&self, selector: &str, dest: &Path, merge: bool) -> Result<Vec<PathBuf>> {
        let pattern = key_pattern(selector)?;
        let records: Vec<ArtifactRecord> = self
            .list()
            .await?
            .into_iter()
            .filter(|r| pattern.matches(&r.key))
            .collect();

        if records.is_empty() {
            return Err(Error::ArtifactNotFound(selector.to_string()));
        }

        let mut downloaded: Vec<PathBuf> = vec![];
        for record in &records {
            let target_dir = if merge {
                dest.to_path_buf()
            } else {
                dest.join(sanitize_key(&record.key))
            };
            tokio::fs::create_dir_all(&target_dir).await?;

            for file in &record.files {
                let target = target_dir.join(&file.name);
                if tokio::fs::try_exists(&target).await? {
                    // Identical files from different keys collapse into one.
                    if file_digest(&target).await? == file.sha256 {
                        debug!(file = %file.name, key = %record.key, "Skipping identical file");
                        continue;
                    }
                    return Err(Error::ArtifactConflict {
                        name: file.name.clone(),
                    });
                }
                tokio::fs::copy(self.key_dir(&record.key).join(&file.name), &target).await?;
                downloaded.push(target);
            }
        }

        downloaded.sort();
        info!(
            pattern = %selector,
            keys = records.len(),
            files = downloaded.len(),
            merge,
            "Downloaded artifacts"
        );
        Ok(downloaded)
    }

    async fn list(&self) -> Result<Vec<ArtifactRecord>> {
        if !tokio::fs::try_exists(&self.root_dir).await? {
            return Ok(vec![]);
        }

        let mut records = vec![];
        let mut read_dir = tokio::fs::read_dir(&self.root_dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(record) = self.read_record(&entry.path()).await? {
                records.push(record);
            }
        }

        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }
}
