//! Job pipelines: the strictly sequential steps one job runs on its own
//! workspace.

use std::sync::Arc;
use tracing::{info, warn};
use wheelwright_core::artifact::{ArtifactRecord, IfNoFilesFound};
use wheelwright_core::job::JobSpec;
use wheelwright_core::pipeline::SdistConfig;
use wheelwright_core::ports::{ArtifactStore, Workspace, WorkspaceProvisioner};
use wheelwright_core::run::{StepKind, TestDuration};
use wheelwright_core::{Error, StepError};
use wheelwright_runner::{SourceDistBuilder, Verifier, WheelBuilder};

/// What a successful wheel job leaves behind.
#[derive(Debug, Clone)]
pub struct CollectedJob {
    pub record: ArtifactRecord,
    pub slowest: Vec<TestDuration>,
}

async fn acquire(
    workspaces: &dyn WorkspaceProvisioner,
    name: &str,
) -> Result<Workspace, StepError> {
    workspaces
        .acquire(name)
        .await
        .map_err(|e| StepError::new(StepKind::Workspace, e))
}

async fn release(workspaces: &dyn WorkspaceProvisioner, workspace: &Workspace) {
    if let Err(e) = workspaces.release(workspace).await {
        warn!(root = %workspace.root.display(), error = %e, "Failed to release workspace");
    }
}

/// Build, verify, collect.
pub struct WheelJob {
    workspaces: Arc<dyn WorkspaceProvisioner>,
    builder: WheelBuilder,
    verifier: Arc<Verifier>,
    store: Arc<dyn ArtifactStore>,
    artifact_glob: String,
}

impl WheelJob {
    pub fn new(
        workspaces: Arc<dyn WorkspaceProvisioner>,
        builder: WheelBuilder,
        verifier: Arc<Verifier>,
        store: Arc<dyn ArtifactStore>,
        artifact_glob: impl Into<String>,
    ) -> Self {
        Self {
            workspaces,
            builder,
            verifier,
            store,
            artifact_glob: artifact_glob.into(),
        }
    }

    pub async fn run(&self, job: &JobSpec) -> Result<CollectedJob, StepError> {
        let workspace = acquire(self.workspaces.as_ref(), &job.display_name()).await?;
        let result = self.run_in(job, &workspace).await;
        release(self.workspaces.as_ref(), &workspace).await;
        result
    }

    async fn run_in(&self, job: &JobSpec, workspace: &Workspace) -> Result<CollectedJob, StepError> {
        let output = self.builder.build(job, workspace).await?;

        let artifact = output.primary(job).ok_or_else(|| {
            StepError::new(
                StepKind::Build,
                Error::MissingArtifact {
                    key: job.artifact_key().to_string(),
                    location: output.output_dir.display().to_string(),
                },
            )
        })?;
        let slowest = self
            .verifier
            .verify_artifact(job.python(), artifact, workspace)
            .await?;

        let record = self
            .store
            .upload(
                job.artifact_key(),
                &output.output_dir,
                &self.artifact_glob,
                IfNoFilesFound::Error,
            )
            .await
            .map_err(|e| StepError::new(StepKind::Collect, e))?;

        info!(
            job = %job.id(),
            key = %record.key,
            files = record.files.len(),
            "Collected artifacts"
        );
        Ok(CollectedJob { record, slowest })
    }
}

/// The unmatrixed source distribution job: build, collect.
pub struct SourceJob {
    workspaces: Arc<dyn WorkspaceProvisioner>,
    builder: SourceDistBuilder,
    store: Arc<dyn ArtifactStore>,
    config: SdistConfig,
}

impl SourceJob {
    pub fn new(
        workspaces: Arc<dyn WorkspaceProvisioner>,
        builder: SourceDistBuilder,
        store: Arc<dyn ArtifactStore>,
        config: SdistConfig,
    ) -> Self {
        Self {
            workspaces,
            builder,
            store,
            config,
        }
    }

    pub fn name(&self) -> &'static str {
        "build_sdist"
    }

    pub async fn run(&self) -> Result<ArtifactRecord, StepError> {
        let workspace = acquire(self.workspaces.as_ref(), self.name()).await?;
        let result = self.run_in(&workspace).await;
        release(self.workspaces.as_ref(), &workspace).await;
        result
    }

    async fn run_in(&self, workspace: &Workspace) -> Result<ArtifactRecord, StepError> {
        let output_dir = self.builder.build(workspace).await?;
        let record = self
            .store
            .upload(
                &self.config.artifact_key,
                &output_dir,
                &self.config.artifact_glob,
                IfNoFilesFound::Error,
            )
            .await
            .map_err(|e| StepError::new(StepKind::Collect, e))?;

        info!(key = %record.key, files = record.files.len(), "Collected source distribution");
        Ok(record)
    }
}
