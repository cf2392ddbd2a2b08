//! Error types for Wheelwright.

use crate::run::{FailureKind, StepKind, TestDuration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // Job errors
    #[error("Dependency installation failed with exit code {exit_code}")]
    DependencyInstallFailed { exit_code: i32 },

    #[error("Build failed with exit code {exit_code}: {message}")]
    BuildFailed { exit_code: i32, message: String },

    #[error("Runtime not available: {0}")]
    RuntimeUnavailable(String),

    #[error("Package installation failed with exit code {exit_code}: {message}")]
    InstallFailed { exit_code: i32, message: String },

    #[error("Test suite failed with exit code {exit_code}")]
    TestsFailed {
        exit_code: i32,
        slowest: Vec<TestDuration>,
    },

    #[error("No artifact files found for {key} in {location}")]
    MissingArtifact { key: String, location: String },

    // Artifact store errors
    #[error("No artifacts match: {0}")]
    ArtifactNotFound(String),

    #[error("Artifact upload failed: {0}")]
    ArtifactUploadFailed(String),

    #[error("Conflicting artifact file {name}: different contents under the same name")]
    ArtifactConflict { name: String },

    // Release errors
    /// The index rejected `file`. Files before it in upload order went up;
    /// `remaining` were never attempted.
    #[error("Version already exists on index: {file}")]
    PublishConflict {
        file: String,
        uploaded: Vec<String>,
        remaining: Vec<String>,
    },

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    // Infrastructure errors
    #[error("Failed to run {program}: {reason}")]
    CommandFailed { program: String, reason: String },

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify the error for job reports.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Config(_) => FailureKind::Configuration,
            Error::DependencyInstallFailed { .. } | Error::RuntimeUnavailable(_) => {
                FailureKind::Setup
            }
            Error::BuildFailed { .. } => FailureKind::Build,
            Error::InstallFailed { .. } | Error::TestsFailed { .. } => FailureKind::Verification,
            Error::MissingArtifact { .. } => FailureKind::MissingArtifact,
            Error::PublishConflict { .. }
            | Error::PublishFailed(_)
            | Error::TokenExchange(_) => FailureKind::Publish,
            _ => FailureKind::Infrastructure,
        }
    }

    /// Exit status reported by the failing external tool, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::DependencyInstallFailed { exit_code }
            | Error::BuildFailed { exit_code, .. }
            | Error::InstallFailed { exit_code, .. }
            | Error::TestsFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Invalid pipeline configuration. Fatal to the affected job, raised before
/// any environment is provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unrecognized operating system {0:?} (expected a label starting with `ubuntu` or `macos`)")]
    UnknownOs(String),

    #[error("unknown platform tag {0:?}")]
    UnknownPlatform(String),

    #[error("platform {platform} cannot be built on {os} runners")]
    PlatformMismatch { os: String, platform: String },

    #[error("invalid runtime version {0:?}")]
    InvalidVersion(String),

    #[error("required field is empty: {0}")]
    EmptyField(&'static str),

    #[error("duplicate matrix entry {0}")]
    DuplicateEntry(String),

    #[error("unknown job group {0:?}")]
    UnknownJobGroup(String),

    #[error("invalid cron expression {expr:?}: {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("invalid path pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("source manifest paths missing: {}", .0.join(", "))]
    MissingManifestPaths(Vec<String>),
}

/// An error tagged with the job step that raised it.
#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct StepError {
    pub step: StepKind,
    #[source]
    pub source: Error,
}

impl StepError {
    pub fn new(step: StepKind, source: impl Into<Error>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            Error::from(ConfigError::EmptyField("os")).kind(),
            FailureKind::Configuration
        );
        assert_eq!(
            Error::BuildFailed {
                exit_code: 2,
                message: String::new()
            }
            .kind(),
            FailureKind::Build
        );
        assert_eq!(
            Error::TestsFailed {
                exit_code: 1,
                slowest: vec![]
            }
            .kind(),
            FailureKind::Verification
        );
        assert_eq!(
            Error::MissingArtifact {
                key: "k".into(),
                location: "wheelhouse".into()
            }
            .kind(),
            FailureKind::MissingArtifact
        );
    }

    #[test]
    fn test_step_error_display() {
        let err = StepError::new(
            StepKind::Build,
            Error::BuildFailed {
                exit_code: 3,
                message: "boom".into(),
            },
        );
        assert_eq!(
            err.to_string(),
            "build failed: Build failed with exit code 3: boom"
        );
    }
}
