//! Per-job binary artifact builder.
//!
//! Dependencies, compile, capture. Any failing step aborts the job and the
//! step's exit status becomes the job's.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use wheelwright_core::job::JobSpec;
use wheelwright_core::pipeline::{CompileSettings, DependencyConfig, WheelsConfig};
use wheelwright_core::ports::{
    CompileRequest, CompileTool, DependencyInstaller, ImageSelector, Workspace,
};
use wheelwright_core::run::StepKind;
use wheelwright_core::{ConfigError, Error, StepError};

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub compile: CompileSettings,
    pub dependencies: DependencyConfig,
    pub output_dir: String,
    pub artifact_glob: String,
}

impl From<&WheelsConfig> for BuildSettings {
    fn from(config: &WheelsConfig) -> Self {
        Self {
            compile: config.build.clone(),
            dependencies: config.dependencies.clone(),
            output_dir: config.output_dir.clone(),
            artifact_glob: config.artifact_glob.clone(),
        }
    }
}

/// Files a successful build left in the job's output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub output_dir: PathBuf,
    pub artifacts: Vec<PathBuf>,
}

impl BuildOutput {
    /// The artifact to verify: the first one tagged with the job's runtime,
    /// or the first one produced.
    pub fn primary(&self, job: &JobSpec) -> Option<&Path> {
        let abi = job.python().abi_tag();
        self.artifacts
            .iter()
            .find(|path| {
                path.file_name()
                    .is_some_and(|name| name.to_string_lossy().contains(&abi))
            })
            .or_else(|| self.artifacts.first())
            .map(PathBuf::as_path)
    }
}

/// Files in `dir` matching `pattern`, sorted.
pub fn capture_artifacts(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let full = dir.join(pattern);
    let paths = glob::glob(&full.to_string_lossy()).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    let mut files: Vec<PathBuf> = paths
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

pub struct WheelBuilder {
    installer: Arc<dyn DependencyInstaller>,
    compiler: Arc<dyn CompileTool>,
    settings: BuildSettings,
}

impl WheelBuilder {
    pub fn new(
        installer: Arc<dyn DependencyInstaller>,
        compiler: Arc<dyn CompileTool>,
        settings: BuildSettings,
    ) -> Self {
        Self {
            installer,
            compiler,
            settings,
        }
    }

    /// Install system dependencies, compile, and capture the output files.
    pub async fn build(&self, job: &JobSpec, workspace: &Workspace) -> Result<BuildOutput, StepError> {
        let procedure = job.dependency_procedure(&self.settings.dependencies);
        let deps = self
            .installer
            .install(&procedure, workspace)
            .await
            .map_err(|e| StepError::new(StepKind::Dependencies, e))?;
        if !deps.is_success() {
            return Err(StepError::new(
                StepKind::Dependencies,
                Error::DependencyInstallFailed {
                    exit_code: deps.exit_code,
                },
            ));
        }

        let request = self.compile_request(job, workspace);
        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|e| StepError::new(StepKind::Build, e))?;

        info!(
            job = %job.id(),
            build = %request.build_identifier,
            family = %job.family(),
            "Compiling"
        );
        let output = self
            .compiler
            .compile(&request)
            .await
            .map_err(|e| StepError::new(StepKind::Build, e))?;
        if !output.is_success() {
            return Err(StepError::new(
                StepKind::Build,
                Error::BuildFailed {
                    exit_code: output.exit_code,
                    message: output.summary(),
                },
            ));
        }

        let artifacts = capture_artifacts(&request.output_dir, &self.settings.artifact_glob)
            .map_err(|e| StepError::new(StepKind::Build, e))?;
        if artifacts.is_empty() {
            warn!(job = %job.id(), dir = %request.output_dir.display(), "Build produced no artifacts");
            return Err(StepError::new(
                StepKind::Build,
                Error::MissingArtifact {
                    key: job.artifact_key().to_string(),
                    location: request.output_dir.display().to_string(),
                },
            ));
        }

        info!(job = %job.id(), artifacts = artifacts.len(), "Build complete");
        Ok(BuildOutput {
            output_dir: request.output_dir,
            artifacts,
        })
    }

    fn compile_request(&self, job: &JobSpec, workspace: &Workspace) -> CompileRequest {
        let image = job.platform().image_variable().and_then(|variable| {
            job.image()
                .or(self.settings.compile.image.as_deref())
                .map(|image| ImageSelector {
                    variable: variable.to_string(),
                    image: image.to_string(),
                })
        });

        CompileRequest {
            project_dir: workspace.project_dir.clone(),
            output_dir: workspace.path(&self.settings.output_dir),
            build_identifier: job.build_identifier().to_string(),
            archs: self.settings.compile.archs.clone(),
            image,
            verbosity: self.settings.compile.verbosity,
        }
    }
}
