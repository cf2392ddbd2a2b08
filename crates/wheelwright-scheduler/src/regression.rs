//! Scheduled regression runner.
//!
//! Installs the already-published package from the index on a small matrix
//! and runs the test suite. There is no local-artifact path here: when the
//! index has nothing to install, the job fails.

use crate::scheduler::emit;
use crate::triggers::ScheduleSpec;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{Id, JoinSet};
use tracing::{error, info, warn};
use wheelwright_core::events::{
    Event, JobCompletedPayload, JobStartedPayload, RunCompletedPayload, RunStartedPayload,
};
use wheelwright_core::ids::RunId;
use wheelwright_core::pipeline::{IndexConfig, RegressionConfig, RegressionEntry, TriggerType};
use wheelwright_core::platform::{PythonVersion, RunnerImage};
use wheelwright_core::ports::{EventBus, WorkspaceProvisioner};
use wheelwright_core::run::{
    FailureKind, JobFailure, JobReport, PipelineReport, ReleaseStatus, StepKind, TriggerInfo,
};
use wheelwright_core::{ConfigError, StepError};
use wheelwright_runner::Verifier;

/// One validated regression cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegressionJob {
    pub runner: RunnerImage,
    pub python: PythonVersion,
}

impl RegressionJob {
    pub fn display_name(&self) -> String {
        format!("regression ({}, {})", self.runner, self.python)
    }
}

fn parse_entry(entry: &RegressionEntry) -> Result<RegressionJob, ConfigError> {
    Ok(RegressionJob {
        runner: RunnerImage::parse(&entry.os)?,
        python: entry.python.parse()?,
    })
}

pub struct RegressionRunner {
    pipeline_name: String,
    config: RegressionConfig,
    index: IndexConfig,
    schedule: ScheduleSpec,
    workspaces: Arc<dyn WorkspaceProvisioner>,
    verifier: Arc<Verifier>,
    bus: Arc<dyn EventBus>,
}

impl RegressionRunner {
    pub fn new(
        pipeline_name: impl Into<String>,
        config: RegressionConfig,
        index: IndexConfig,
        workspaces: Arc<dyn WorkspaceProvisioner>,
        verifier: Verifier,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self, ConfigError> {
        let schedule = ScheduleSpec::parse(&config.cron)?;
        Ok(Self {
            pipeline_name: pipeline_name.into(),
            config,
            index,
            schedule,
            workspaces,
            verifier: Arc::new(verifier),
            bus,
        })
    }

    pub fn schedule(&self) -> &ScheduleSpec {
        &self.schedule
    }

    pub fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.next_after(after)
    }

    pub async fn run(&self) -> PipelineReport {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let trigger = TriggerInfo::new(TriggerType::Schedule);
        info!(run = %run_id, index = %self.index.name, pre = self.config.pre, "Starting regression run");

        emit(
            self.bus.as_ref(),
            Event::RunStarted(RunStartedPayload {
                run_id,
                pipeline_name: self.pipeline_name.clone(),
                trigger: trigger.trigger_type,
                started_at,
            }),
        )
        .await;

        let mut reports: Vec<Option<JobReport>> = vec![None; self.config.include.len()];
        let mut join_set = JoinSet::new();
        let mut names: HashMap<Id, (usize, String)> = HashMap::new();

        for (slot, entry) in self.config.include.iter().enumerate() {
            let job = match parse_entry(entry) {
                Ok(job) => job,
                Err(e) => {
                    warn!(os = %entry.os, python = %entry.python, error = %e, "Rejected regression entry");
                    let report = JobReport::failed(
                        format!("regression ({}, {})", entry.os, entry.python),
                        None,
                        None,
                        JobFailure {
                            kind: FailureKind::Configuration,
                            step: StepKind::Configure,
                            exit_code: None,
                            message: e.to_string(),
                        },
                        0,
                    );
                    self.completed(run_id, &report).await;
                    reports[slot] = Some(report);
                    continue;
                }
            };

            let workspaces = self.workspaces.clone();
            let verifier = self.verifier.clone();
            let bus = self.bus.clone();
            let index = self.index.clone();
            let pre = self.config.pre;
            let name = job.display_name();
            let handle = join_set.spawn(async move {
                emit(
                    bus.as_ref(),
                    Event::JobStarted(JobStartedPayload {
                        run_id,
                        job_name: job.display_name(),
                        group: None,
                        started_at: Utc::now(),
                    }),
                )
                .await;

                let started = Instant::now();
                let result = async {
                    let workspace = workspaces
                        .acquire(&job.display_name())
                        .await
                        .map_err(|e| StepError::new(StepKind::Workspace, e))?;
                    let result = verifier
                        .verify_published(job.python, &index, pre, &workspace)
                        .await;
                    if let Err(e) = workspaces.release(&workspace).await {
                        warn!(error = %e, "Failed to release workspace");
                    }
                    result
                }
                .await;

                let elapsed = started.elapsed().as_millis() as u64;
                let report = match result {
                    Ok(slowest) => {
                        JobReport::succeeded(job.display_name(), None, None, elapsed)
                            .with_slowest(slowest)
                    }
                    Err(err) => {
                        warn!(job = %job.display_name(), error = %err, "Regression job failed");
                        JobReport::failed(
                            job.display_name(),
                            None,
                            None,
                            JobFailure::from(&err),
                            elapsed,
                        )
                    }
                };
                (slot, report)
            });
            names.insert(handle.id(), (slot, name));
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            let (slot, report) = match joined {
                Ok((_, result)) => result,
                Err(e) => {
                    let Some((slot, name)) = names.remove(&e.id()) else {
                        error!(error = %e, "Unknown regression task failed");
                        continue;
                    };
                    error!(job = %name, error = %e, "Regression task panicked");
                    let report = JobReport::failed(
                        name,
                        None,
                        None,
                        JobFailure {
                            kind: FailureKind::Infrastructure,
                            step: StepKind::Install,
                            exit_code: None,
                            message: format!("job task aborted: {}", e),
                        },
                        0,
                    );
                    (slot, report)
                }
            };
            self.completed(run_id, &report).await;
            reports[slot] = Some(report);
        }

        let report = PipelineReport {
            run_id,
            pipeline_name: self.pipeline_name.clone(),
            trigger,
            jobs: reports.into_iter().flatten().collect(),
            release: ReleaseStatus::Disabled,
            started_at,
            completed_at: Utc::now(),
        };

        emit(
            self.bus.as_ref(),
            Event::RunCompleted(RunCompletedPayload {
                run_id,
                success: report.success(),
                failed_jobs: report.failed_jobs().len(),
                duration_ms: report.duration_ms(),
                completed_at: report.completed_at,
            }),
        )
        .await;
        report
    }

    async fn completed(&self, run_id: RunId, report: &JobReport) {
        emit(
            self.bus.as_ref(),
            Event::JobCompleted(JobCompletedPayload {
                run_id,
                job_name: report.name.clone(),
                group: None,
                status: report.status,
                failure_kind: report.failure.as_ref().map(|f| f.kind),
                duration_ms: report.duration_ms,
                completed_at: Utc::now(),
            }),
        )
        .await;
    }
}
