//! Job specifications and job groups.

use crate::artifact::check_key;
use crate::error::ConfigError;
use crate::ids::JobId;
use crate::pipeline::DependencyConfig;
use crate::platform::{DependencyProcedure, OsFamily, PlatformTag, PythonVersion, RunnerImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named groups of jobs that downstream stages depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobGroup {
    BuildWheels,
    BuildSdist,
}

impl JobGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobGroup::BuildWheels => "build_wheels",
            JobGroup::BuildSdist => "build_sdist",
        }
    }
}

impl FromStr for JobGroup {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "build_wheels" => Ok(JobGroup::BuildWheels),
            "build_sdist" => Ok(JobGroup::BuildSdist),
            other => Err(ConfigError::UnknownJobGroup(other.to_string())),
        }
    }
}

impl fmt::Display for JobGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete build job produced by matrix expansion. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSpec {
    id: JobId,
    index: usize,
    runner: RunnerImage,
    python: PythonVersion,
    platform: PlatformTag,
    image: Option<String>,
    build_identifier: String,
    artifact_key: String,
}

impl JobSpec {
    /// Build a job from validated axis values. The platform tag must belong
    /// to the runner's OS family.
    pub fn new(
        index: usize,
        runner: RunnerImage,
        python: PythonVersion,
        platform: PlatformTag,
        image: Option<String>,
        artifact_prefix: &str,
    ) -> Result<Self, ConfigError> {
        if platform.family() != runner.family() {
            return Err(ConfigError::PlatformMismatch {
                os: runner.label().to_string(),
                platform: platform.to_string(),
            });
        }
        if artifact_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyField("artifact_prefix"));
        }

        // The image selector only means something for containerized builds.
        let image = image
            .filter(|i| !i.trim().is_empty())
            .filter(|_| platform.image_variable().is_some());

        let build_identifier = format!("{}-{}", python.abi_tag(), platform.as_str());
        let artifact_key = format!("{}-{}-{}", artifact_prefix, runner.label(), index);
        check_key(&artifact_key)?;

        Ok(Self {
            id: JobId::new(),
            index,
            runner,
            python,
            platform,
            image,
            build_identifier,
            artifact_key,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn runner(&self) -> &RunnerImage {
        &self.runner
    }

    pub fn family(&self) -> OsFamily {
        self.runner.family()
    }

    pub fn python(&self) -> PythonVersion {
        self.python
    }

    pub fn platform(&self) -> PlatformTag {
        self.platform
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// Composite selector such as `cp39-manylinux_x86_64`.
    pub fn build_identifier(&self) -> &str {
        &self.build_identifier
    }

    /// Storage key unique to this job within a run.
    pub fn artifact_key(&self) -> &str {
        &self.artifact_key
    }

    pub fn dependency_procedure(&self, config: &DependencyConfig) -> DependencyProcedure {
        DependencyProcedure::for_family(self.family(), config)
    }

    pub fn display_name(&self) -> String {
        format!(
            "{} ({}, {})",
            JobGroup::BuildWheels,
            self.runner.label(),
            self.build_identifier
        )
    }
}
