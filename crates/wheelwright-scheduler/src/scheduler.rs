//! Main orchestration.
//!
//! Fan-out of every wheel job and the source job onto independent tasks,
//! fan-in of their reports, then the release gate. A failing or panicking
//! job never affects its siblings.

use crate::dag::{DagBuilder, DagError, PipelineDag};
use crate::gate::{ReleaseGate, ReleasePolicy, ReleasePorts, TaggedReleasePolicy};
use crate::job::{SourceJob, WheelJob};
use crate::matrix::{MatrixExpander, MatrixExpansion, RejectedEntry};
use crate::triggers::{TriggerEvent, TriggerMatcher};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use wheelwright_core::approval::ApprovalStatus;
use wheelwright_core::events::{
    ArtifactUploadedPayload, Event, GateEvaluatedPayload, JobCompletedPayload, JobStartedPayload,
    MatrixExpandedPayload, RunCompletedPayload, RunStartedPayload,
};
use wheelwright_core::ids::{JobId, RunId};
use wheelwright_core::job::{JobGroup, JobSpec};
use wheelwright_core::pipeline::PipelineDefinition;
use wheelwright_core::ports::{
    ArtifactStore, CompileTool, DependencyInstaller, EventBus, IdentityTokenSource,
    PackageInstaller, PublishTool, RuntimeProvisioner, SourceBuildTool, TestRunner, TokenExchange,
    WorkspaceProvisioner,
};
use wheelwright_core::run::{
    FailureKind, JobFailure, JobReport, PipelineReport, PipelineRun, StepKind, TriggerInfo,
};
use wheelwright_core::Error;
use wheelwright_runner::{BuildSettings, SourceDistBuilder, Verifier, WheelBuilder};

/// Every external collaborator a run talks to.
#[derive(Clone)]
pub struct Toolchain {
    pub workspaces: Arc<dyn WorkspaceProvisioner>,
    pub dependencies: Arc<dyn DependencyInstaller>,
    pub compiler: Arc<dyn CompileTool>,
    pub source_builder: Arc<dyn SourceBuildTool>,
    pub runtimes: Arc<dyn RuntimeProvisioner>,
    pub installer: Arc<dyn PackageInstaller>,
    pub tests: Arc<dyn TestRunner>,
    pub store: Arc<dyn ArtifactStore>,
    pub identity: Arc<dyn IdentityTokenSource>,
    pub exchange: Arc<dyn TokenExchange>,
    pub publisher: Arc<dyn PublishTool>,
}

impl Toolchain {
    pub fn verifier(&self, definition: &PipelineDefinition) -> Verifier {
        Verifier::new(
            self.runtimes.clone(),
            self.installer.clone(),
            self.tests.clone(),
            definition.package.clone(),
            definition.verify.clone(),
        )
    }

    fn release_ports(&self) -> ReleasePorts {
        ReleasePorts {
            workspaces: self.workspaces.clone(),
            store: self.store.clone(),
            identity: self.identity.clone(),
            exchange: self.exchange.clone(),
            publisher: self.publisher.clone(),
        }
    }
}

/// Publishes an event, logging instead of failing when the bus refuses it.
pub(crate) async fn emit(bus: &dyn EventBus, event: Event) {
    let subject = event.subject();
    if let Err(e) = bus.publish(event).await {
        warn!(subject = %subject, error = %e, "Failed to publish event");
    }
}

/// Report for a job that failed before doing any work.
fn configuration_failure(rejected: &RejectedEntry) -> JobReport {
    JobReport::failed(
        rejected.display_name(),
        Some(JobGroup::BuildWheels),
        None,
        JobFailure {
            kind: FailureKind::Configuration,
            step: StepKind::Configure,
            exit_code: None,
            message: rejected.error.to_string(),
        },
        0,
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Identity of a spawned task, kept so a panic can still be reported.
struct Slot {
    index: usize,
    name: String,
    group: JobGroup,
    job_id: Option<JobId>,
}

/// Runs the pipeline for one definition.
pub struct Orchestrator {
    definition: Arc<PipelineDefinition>,
    toolchain: Toolchain,
    bus: Arc<dyn EventBus>,
    policy: Arc<dyn ReleasePolicy>,
    trigger_matcher: TriggerMatcher,
    matrix_expander: MatrixExpander,
    dag: PipelineDag,
    arm_release: bool,
}

impl Orchestrator {
    pub fn new(
        definition: PipelineDefinition,
        toolchain: Toolchain,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self, DagError> {
        let dag = DagBuilder::new().build(&definition.release)?;
        Ok(Self {
            definition: Arc::new(definition),
            toolchain,
            bus,
            policy: Arc::new(TaggedReleasePolicy),
            trigger_matcher: TriggerMatcher::new(),
            matrix_expander: MatrixExpander::new(),
            dag,
            arm_release: false,
        })
    }

    pub fn with_policy(mut self, policy: Arc<dyn ReleasePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Arm the release gate even when the definition leaves it disabled.
    pub fn arm_release(mut self, arm: bool) -> Self {
        self.arm_release = arm;
        self
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Expand the matrix without running anything.
    pub fn plan(&self) -> MatrixExpansion {
        self.matrix_expander.expand(&self.definition.wheels)
    }

    /// Start a run if the event matches one of the pipeline's triggers.
    pub async fn handle_trigger(
        &self,
        event: TriggerEvent,
        approval: ApprovalStatus,
    ) -> Option<PipelineReport> {
        if !self.trigger_matcher.matches(&self.definition, &event) {
            info!(trigger = %event.trigger_type(), "Event does not match any trigger");
            return None;
        }
        Some(self.run(event.info(), approval).await)
    }

    pub async fn run(&self, trigger: TriggerInfo, approval: ApprovalStatus) -> PipelineReport {
        let expansion = self.plan();
        let run = PipelineRun::new(
            self.definition.name.clone(),
            trigger,
            approval,
            expansion.jobs.clone(),
        );
        info!(
            run = %run.id,
            pipeline = %run.pipeline_name,
            trigger = %run.trigger.trigger_type,
            jobs = run.jobs.len(),
            "Starting run"
        );

        emit(
            self.bus.as_ref(),
            Event::RunStarted(RunStartedPayload {
                run_id: run.id,
                pipeline_name: run.pipeline_name.clone(),
                trigger: run.trigger.trigger_type,
                started_at: run.started_at,
            }),
        )
        .await;
        emit(
            self.bus.as_ref(),
            Event::MatrixExpanded(MatrixExpandedPayload {
                run_id: run.id,
                job_count: expansion.jobs.len(),
                rejected_count: expansion.rejected.len(),
                expanded_at: Utc::now(),
            }),
        )
        .await;

        let jobs = self.run_jobs(run.id, &expansion).await;

        let mut gate = ReleaseGate::new(
            self.definition.release.clone(),
            self.dag.release_needs(),
            self.toolchain.release_ports(),
        )
        .with_policy(self.policy.clone());
        if self.arm_release {
            gate.arm();
        }
        let release = gate.evaluate(&run.trigger, run.approval, &jobs).await;
        emit(
            self.bus.as_ref(),
            Event::GateEvaluated(GateEvaluatedPayload {
                run_id: run.id,
                state: gate.state(),
                release: release.clone(),
                evaluated_at: Utc::now(),
            }),
        )
        .await;

        let report = PipelineReport {
            run_id: run.id,
            pipeline_name: run.pipeline_name,
            trigger: run.trigger,
            jobs,
            release,
            started_at: run.started_at,
            completed_at: Utc::now(),
        };

        let failed = report.failed_jobs().len();
        emit(
            self.bus.as_ref(),
            Event::RunCompleted(RunCompletedPayload {
                run_id: report.run_id,
                success: report.success(),
                failed_jobs: failed,
                duration_ms: report.duration_ms(),
                completed_at: report.completed_at,
            }),
        )
        .await;

        if report.success() {
            info!(run = %report.run_id, "Run succeeded");
        } else {
            warn!(run = %report.run_id, failed_jobs = failed, "Run failed");
        }
        report
    }

    /// Launch every job and wait for all of them. Reports come back in
    /// declaration order with the source job last.
    async fn run_jobs(&self, run_id: RunId, expansion: &MatrixExpansion) -> Vec<JobReport> {
        let definition = &self.definition;
        let wheel_job = Arc::new(WheelJob::new(
            self.toolchain.workspaces.clone(),
            WheelBuilder::new(
                self.toolchain.dependencies.clone(),
                self.toolchain.compiler.clone(),
                BuildSettings::from(&definition.wheels),
            ),
            Arc::new(self.toolchain.verifier(definition)),
            self.toolchain.store.clone(),
            definition.wheels.artifact_glob.clone(),
        ));
        let source_job = Arc::new(SourceJob::new(
            self.toolchain.workspaces.clone(),
            SourceDistBuilder::new(
                self.toolchain.source_builder.clone(),
                definition.sdist.clone(),
            ),
            self.toolchain.store.clone(),
            definition.sdist.clone(),
        ));
        let limiter = expansion
            .max_parallel
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n as usize)));

        // Rejected entries and real jobs share declaration order.
        let total = expansion.jobs.len() + expansion.rejected.len() + 1;
        let mut reports: Vec<Option<JobReport>> = vec![None; total];
        let mut order: Vec<(usize, Option<&JobSpec>, Option<&RejectedEntry>)> = expansion
            .jobs
            .iter()
            .map(|job| (job.index(), Some(job), None))
            .chain(expansion.rejected.iter().map(|r| (r.index, None, Some(r))))
            .collect();
        order.sort_by_key(|(index, _, _)| *index);

        let mut join_set = JoinSet::new();
        let mut slots = HashMap::new();

        for (slot, (_, job, rejected)) in order.into_iter().enumerate() {
            if let Some(rejected) = rejected {
                let report = configuration_failure(rejected);
                self.job_completed(run_id, &report).await;
                reports[slot] = Some(report);
                continue;
            }
            let Some(job) = job.cloned() else { continue };

            let name = job.display_name();
            let job_id = job.id();
            let wheel_job = wheel_job.clone();
            let limiter = limiter.clone();
            let bus = self.bus.clone();
            let handle = join_set.spawn(async move {
                let _permit = match limiter {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                emit(
                    bus.as_ref(),
                    Event::JobStarted(JobStartedPayload {
                        run_id,
                        job_name: job.display_name(),
                        group: Some(JobGroup::BuildWheels),
                        started_at: Utc::now(),
                    }),
                )
                .await;

                let started = Instant::now();
                let report = match wheel_job.run(&job).await {
                    Ok(collected) => JobReport::succeeded(
                        job.display_name(),
                        Some(JobGroup::BuildWheels),
                        Some(job.id()),
                        elapsed_ms(started),
                    )
                    .with_artifact(collected.record)
                    .with_slowest(collected.slowest),
                    Err(err) => {
                        warn!(job = %job.id(), error = %err, "Job failed");
                        let slowest = match &err.source {
                            Error::TestsFailed { slowest, .. } => slowest.clone(),
                            _ => vec![],
                        };
                        JobReport::failed(
                            job.display_name(),
                            Some(JobGroup::BuildWheels),
                            Some(job.id()),
                            JobFailure::from(&err),
                            elapsed_ms(started),
                        )
                        .with_slowest(slowest)
                    }
                };
                (slot, report)
            });
            slots.insert(
                handle.id(),
                Slot {
                    index: slot,
                    name,
                    group: JobGroup::BuildWheels,
                    job_id: Some(job_id),
                },
            );
        }

        let sdist_slot = total - 1;
        let bus = self.bus.clone();
        let handle = join_set.spawn(async move {
            emit(
                bus.as_ref(),
                Event::JobStarted(JobStartedPayload {
                    run_id,
                    job_name: source_job.name().to_string(),
                    group: Some(JobGroup::BuildSdist),
                    started_at: Utc::now(),
                }),
            )
            .await;

            let started = Instant::now();
            let report = match source_job.run().await {
                Ok(record) => JobReport::succeeded(
                    source_job.name(),
                    Some(JobGroup::BuildSdist),
                    None,
                    elapsed_ms(started),
                )
                .with_artifact(record),
                Err(err) => {
                    warn!(error = %err, "Source distribution job failed");
                    JobReport::failed(
                        source_job.name(),
                        Some(JobGroup::BuildSdist),
                        None,
                        JobFailure::from(&err),
                        elapsed_ms(started),
                    )
                }
            };
            (sdist_slot, report)
        });
        slots.insert(
            handle.id(),
            Slot {
                index: sdist_slot,
                name: JobGroup::BuildSdist.to_string(),
                group: JobGroup::BuildSdist,
                job_id: None,
            },
        );

        while let Some(joined) = join_set.join_next_with_id().await {
            let (slot, report) = match joined {
                Ok((_, result)) => result,
                Err(e) => {
                    let Some(slot) = slots.remove(&e.id()) else {
                        error!(error = %e, "Unknown job task failed");
                        continue;
                    };
                    error!(job = %slot.name, error = %e, "Job task panicked");
                    let report = JobReport::failed(
                        slot.name,
                        Some(slot.group),
                        slot.job_id,
                        JobFailure {
                            kind: FailureKind::Infrastructure,
                            step: StepKind::Build,
                            exit_code: None,
                            message: format!("job task aborted: {}", e),
                        },
                        0,
                    );
                    (slot.index, report)
                }
            };
            self.job_completed(run_id, &report).await;
            reports[slot] = Some(report);
        }

        reports.into_iter().flatten().collect()
    }

    async fn job_completed(&self, run_id: RunId, report: &JobReport) {
        if let Some(record) = &report.artifact {
            emit(
                self.bus.as_ref(),
                Event::ArtifactUploaded(ArtifactUploadedPayload {
                    run_id,
                    key: record.key.clone(),
                    file_count: record.files.len(),
                    total_bytes: record.total_bytes(),
                    uploaded_at: record.uploaded_at,
                }),
            )
            .await;
        }
        emit(
            self.bus.as_ref(),
            Event::JobCompleted(JobCompletedPayload {
                run_id,
                job_name: report.name.clone(),
                group: report.group,
                status: report.status,
                failure_kind: report.failure.as_ref().map(|f| f.kind),
                duration_ms: report.duration_ms,
                completed_at: Utc::now(),
            }),
        )
        .await;
    }
}
