//! Run and report types.

use crate::approval::ApprovalStatus;
use crate::artifact::ArtifactRecord;
use crate::error::StepError;
use crate::ids::{JobId, RunId};
use crate::job::{JobGroup, JobSpec};
use crate::pipeline::TriggerType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential steps inside a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Configure,
    Workspace,
    Dependencies,
    Build,
    Runtime,
    Install,
    Test,
    Collect,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Configure => "configure",
            StepKind::Workspace => "workspace",
            StepKind::Dependencies => "dependencies",
            StepKind::Build => "build",
            StepKind::Runtime => "runtime",
            StepKind::Install => "install",
            StepKind::Test => "test",
            StepKind::Collect => "collect",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classification surfaced in job reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Configuration,
    Setup,
    Build,
    Verification,
    MissingArtifact,
    Publish,
    Infrastructure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Setup => "setup",
            FailureKind::Build => "build",
            FailureKind::Verification => "verification",
            FailureKind::MissingArtifact => "missing_artifact",
            FailureKind::Publish => "publish",
            FailureKind::Infrastructure => "infrastructure",
        };
        f.write_str(s)
    }
}

/// Wall time of one test, as reported by the test runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDuration {
    pub name: String,
    pub seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub triggered_by: Option<String>,
}

impl TriggerInfo {
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type,
            git_ref: None,
            triggered_by: None,
        }
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }
}

/// One invocation of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub pipeline_name: String,
    pub trigger: TriggerInfo,
    pub approval: ApprovalStatus,
    pub jobs: Vec<JobSpec>,
    pub started_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(
        pipeline_name: impl Into<String>,
        trigger: TriggerInfo,
        approval: ApprovalStatus,
        jobs: Vec<JobSpec>,
    ) -> Self {
        Self {
            id: RunId::new(),
            pipeline_name: pipeline_name.into(),
            trigger,
            approval,
            jobs,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub step: StepKind,
    pub exit_code: Option<i32>,
    pub message: String,
}

impl From<&StepError> for JobFailure {
    fn from(err: &StepError) -> Self {
        Self {
            kind: err.source.kind(),
            step: err.step,
            exit_code: err.source.exit_code(),
            message: err.source.to_string(),
        }
    }
}

/// Terminal outcome of a single job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    /// `None` for jobs outside the release dependency graph (regression).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<JobGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    #[serde(default)]
    pub slowest_tests: Vec<TestDuration>,
    pub duration_ms: u64,
}

impl JobReport {
    pub fn succeeded(
        name: impl Into<String>,
        group: Option<JobGroup>,
        job_id: Option<JobId>,
        duration_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            group,
            job_id,
            status: JobStatus::Success,
            artifact: None,
            failure: None,
            slowest_tests: vec![],
            duration_ms,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        group: Option<JobGroup>,
        job_id: Option<JobId>,
        failure: JobFailure,
        duration_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            group,
            job_id,
            status: JobStatus::Failure,
            artifact: None,
            failure: Some(failure),
            slowest_tests: vec![],
            duration_ms,
        }
    }

    pub fn with_artifact(mut self, record: ArtifactRecord) -> Self {
        self.artifact = Some(record);
        self
    }

    pub fn with_slowest(mut self, slowest: Vec<TestDuration>) -> Self {
        self.slowest_tests = slowest;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

/// Release gate state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Disabled,
    Armed,
    Running,
    Published,
    Failed,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Disabled => "disabled",
            GateState::Armed => "armed",
            GateState::Running => "running",
            GateState::Published => "published",
            GateState::Failed => "failed",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the release stage for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReleaseStatus {
    /// The gate was never armed. Not an error.
    Disabled,
    /// Armed, but upstream groups or the gate condition did not allow a release.
    NotEligible { reason: String },
    Published {
        uploaded: Vec<String>,
        skipped: Vec<String>,
    },
    Failed { message: String },
}

impl ReleaseStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, ReleaseStatus::Failed { .. })
    }
}

/// Aggregate outcome of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: RunId,
    pub pipeline_name: String,
    pub trigger: TriggerInfo,
    pub jobs: Vec<JobReport>,
    pub release: ReleaseStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl PipelineReport {
    /// True when every job passed and the release stage did not fail.
    pub fn success(&self) -> bool {
        self.jobs.iter().all(JobReport::is_success) && !self.release.is_failure()
    }

    pub fn group_jobs(&self, group: JobGroup) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(move |j| j.group == Some(group))
    }

    /// A group with no jobs counts as succeeded.
    pub fn group_succeeded(&self, group: JobGroup) -> bool {
        self.group_jobs(group).all(JobReport::is_success)
    }

    pub fn failed_jobs(&self) -> Vec<&JobReport> {
        self.jobs.iter().filter(|j| !j.is_success()).collect()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.completed_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn report(jobs: Vec<JobReport>, release: ReleaseStatus) -> PipelineReport {
        PipelineReport {
            run_id: RunId::new(),
            pipeline_name: "demo".into(),
            trigger: TriggerInfo::new(TriggerType::Push),
            jobs,
            release,
            started_at: Utc::now(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_step_kind_display() {
        assert_eq!(StepKind::Build.to_string(), "build");
        assert_eq!(StepKind::Dependencies.to_string(), "dependencies");
    }

    #[test]
    fn test_job_failure_from_step_error() {
        let err = StepError::new(
            StepKind::Test,
            Error::TestsFailed {
                exit_code: 1,
                slowest: vec![],
            },
        );
        let failure = JobFailure::from(&err);
        assert_eq!(failure.kind, FailureKind::Verification);
        assert_eq!(failure.step, StepKind::Test);
        assert_eq!(failure.exit_code, Some(1));
    }

    #[test]
    fn test_disabled_release_is_not_a_failure() {
        let jobs = vec![JobReport::succeeded(
            "build_sdist",
            Some(JobGroup::BuildSdist),
            None,
            5,
        )];
        assert!(report(jobs.clone(), ReleaseStatus::Disabled).success());
        assert!(
            !report(
                jobs,
                ReleaseStatus::Failed {
                    message: "boom".into()
                }
            )
            .success()
        );
    }

    #[test]
    fn test_group_success_ignores_other_groups() {
        let failure = JobFailure {
            kind: FailureKind::Build,
            step: StepKind::Build,
            exit_code: Some(2),
            message: "compile error".into(),
        };
        let jobs = vec![
            JobReport::failed("wheel", Some(JobGroup::BuildWheels), None, failure, 1),
            JobReport::succeeded("sdist", Some(JobGroup::BuildSdist), None, 1),
        ];
        let report = report(jobs, ReleaseStatus::Disabled);

        assert!(!report.group_succeeded(JobGroup::BuildWheels));
        assert!(report.group_succeeded(JobGroup::BuildSdist));
        assert_eq!(report.failed_jobs().len(), 1);
        assert!(!report.success());
    }

    #[test]
    fn test_release_status_serialization() {
        let status = ReleaseStatus::Published {
            uploaded: vec!["demo-1.0.tar.gz".into()],
            skipped: vec![],
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "published");
    }
}
