//! Pipeline lifecycle events.

use crate::ids::RunId;
use crate::job::JobGroup;
use crate::pipeline::TriggerType;
use crate::run::{FailureKind, GateState, JobStatus, ReleaseStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All events emitted while a run progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Run lifecycle
    RunStarted(RunStartedPayload),
    RunCompleted(RunCompletedPayload),

    // Matrix
    MatrixExpanded(MatrixExpandedPayload),

    // Jobs
    JobStarted(JobStartedPayload),
    JobCompleted(JobCompletedPayload),

    // Artifacts
    ArtifactUploaded(ArtifactUploadedPayload),

    // Release
    GateEvaluated(GateEvaluatedPayload),
}

impl Event {
    /// Dotted subject used for pattern subscriptions.
    pub fn subject(&self) -> String {
        match self {
            Event::RunStarted(p) => format!("run.started.{}", p.run_id),
            Event::RunCompleted(p) => format!("run.completed.{}", p.run_id),
            Event::MatrixExpanded(p) => format!("matrix.expanded.{}", p.run_id),
            Event::JobStarted(p) => format!("job.started.{}", p.run_id),
            Event::JobCompleted(p) => format!("job.completed.{}", p.run_id),
            Event::ArtifactUploaded(p) => format!("artifact.uploaded.{}", p.run_id),
            Event::GateEvaluated(p) => format!("gate.evaluated.{}", p.run_id),
        }
    }

    pub fn run_id(&self) -> RunId {
        match self {
            Event::RunStarted(p) => p.run_id,
            Event::RunCompleted(p) => p.run_id,
            Event::MatrixExpanded(p) => p.run_id,
            Event::JobStarted(p) => p.run_id,
            Event::JobCompleted(p) => p.run_id,
            Event::ArtifactUploaded(p) => p.run_id,
            Event::GateEvaluated(p) => p.run_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStartedPayload {
    pub run_id: RunId,
    pub pipeline_name: String,
    pub trigger: TriggerType,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCompletedPayload {
    pub run_id: RunId,
    pub success: bool,
    pub failed_jobs: usize,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixExpandedPayload {
    pub run_id: RunId,
    pub job_count: usize,
    pub rejected_count: usize,
    pub expanded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStartedPayload {
    pub run_id: RunId,
    pub job_name: String,
    pub group: Option<JobGroup>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompletedPayload {
    pub run_id: RunId,
    pub job_name: String,
    pub group: Option<JobGroup>,
    pub status: JobStatus,
    pub failure_kind: Option<FailureKind>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactUploadedPayload {
    pub run_id: RunId,
    pub key: String,
    pub file_count: usize,
    pub total_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateEvaluatedPayload {
    pub run_id: RunId,
    pub state: GateState,
    pub release: ReleaseStatus,
    pub evaluated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_and_subject() {
        let run_id = RunId::new();
        let event = Event::GateEvaluated(GateEvaluatedPayload {
            run_id,
            state: GateState::Disabled,
            release: ReleaseStatus::Disabled,
            evaluated_at: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "gate_evaluated");
        assert_eq!(json["state"], "disabled");
        assert_eq!(event.subject(), format!("gate.evaluated.{}", run_id));
        assert_eq!(event.run_id(), run_id);
    }
}
