//! Matrix expansion for parallel job generation.
//!
//! The matrix is an explicit list of allowed tuples, never a cross-product.
//! Each tuple is validated on its own: a bad tuple becomes a rejected entry
//! and every valid sibling still becomes a job.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};
use wheelwright_core::ConfigError;
use wheelwright_core::ids::MatrixId;
use wheelwright_core::job::{JobGroup, JobSpec};
use wheelwright_core::pipeline::{MatrixEntry, WheelsConfig};
use wheelwright_core::platform::{PlatformTag, PythonVersion, RunnerImage};

/// A declared tuple that failed validation.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedEntry {
    /// Position in the declared `include` list.
    pub index: usize,
    pub entry: MatrixEntry,
    #[serde(serialize_with = "serialize_error")]
    pub error: ConfigError,
}

fn serialize_error<S: serde::Serializer>(err: &ConfigError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&err.to_string())
}

impl RejectedEntry {
    pub fn display_name(&self) -> String {
        format!(
            "{} ({}, {}-{})",
            JobGroup::BuildWheels,
            self.entry.os,
            self.entry.python,
            self.entry.platform_id
        )
    }
}

/// Result of matrix expansion.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixExpansion {
    pub matrix_id: MatrixId,
    pub jobs: Vec<JobSpec>,
    pub rejected: Vec<RejectedEntry>,
    pub max_parallel: Option<u32>,
}

impl MatrixExpansion {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.rejected.is_empty()
    }
}

/// Expander for the wheel matrix.
pub struct MatrixExpander;

impl MatrixExpander {
    pub fn new() -> Self {
        Self
    }

    /// One job per valid tuple, in declaration order. An empty list yields
    /// zero jobs.
    pub fn expand(&self, config: &WheelsConfig) -> MatrixExpansion {
        let matrix_id = MatrixId::new();
        let mut seen: HashSet<(String, PythonVersion, PlatformTag)> = HashSet::new();
        let mut jobs = Vec::with_capacity(config.include.len());
        let mut rejected = vec![];

        for (index, entry) in config.include.iter().enumerate() {
            let job = self.job_for(index, entry, &config.artifact_prefix).and_then(|job| {
                let key = (job.runner().label().to_string(), job.python(), job.platform());
                if seen.insert(key) {
                    Ok(job)
                } else {
                    Err(ConfigError::DuplicateEntry(format!(
                        "{} {}",
                        job.runner(),
                        job.build_identifier()
                    )))
                }
            });

            match job {
                Ok(job) => {
                    debug!(index, build = %job.build_identifier(), os = %job.runner(), "Expanded matrix entry");
                    jobs.push(job);
                }
                Err(error) => {
                    warn!(index, os = %entry.os, error = %error, "Rejected matrix entry");
                    rejected.push(RejectedEntry {
                        index,
                        entry: entry.clone(),
                        error,
                    });
                }
            }
        }

        MatrixExpansion {
            matrix_id,
            jobs,
            rejected,
            max_parallel: config.max_parallel,
        }
    }

    fn job_for(
        &self,
        index: usize,
        entry: &MatrixEntry,
        artifact_prefix: &str,
    ) -> Result<JobSpec, ConfigError> {
        let runner = RunnerImage::parse(&entry.os)?;
        let python: PythonVersion = entry.python.parse()?;
        let platform: PlatformTag = entry.platform_id.parse()?;

        JobSpec::new(
            index,
            runner,
            python,
            platform,
            entry.image.clone(),
            artifact_prefix,
        )
    }
}

impl Default for MatrixExpander {
    fn default() -> Self {
        Self::new()
    }
}
