//! Process-backed compile and source build tools.

use crate::command::{CommandExecutor, CommandSpec};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use wheelwright_core::ports::{CompileRequest, CompileTool, SourceBuildTool, ToolOutput};
use wheelwright_core::{Error, Result};

/// Drives an external wheel builder configured through `CIBW_*` variables.
pub struct CibuildwheelTool {
    executor: Arc<dyn CommandExecutor>,
    program: String,
}

impl CibuildwheelTool {
    pub fn new(executor: Arc<dyn CommandExecutor>, program: impl Into<String>) -> Self {
        Self {
            executor,
            program: program.into(),
        }
    }

    pub fn command(&self, request: &CompileRequest) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program)
            .arg(request.project_dir.display().to_string())
            .arg("--output-dir")
            .arg(request.output_dir.display().to_string())
            .env("CIBW_BUILD", &request.build_identifier)
            .env("CIBW_ARCHS", &request.archs)
            .env("CIBW_BUILD_VERBOSITY", request.verbosity.to_string())
            .current_dir(&request.project_dir);
        if let Some(image) = &request.image {
            spec = spec.env(&image.variable, &image.image);
        }
        spec
    }
}

#[async_trait]
impl CompileTool for CibuildwheelTool {
    async fn compile(&self, request: &CompileRequest) -> Result<ToolOutput> {
        self.executor.run(&self.command(request)).await
    }
}

/// Runs a configured source distribution command such as
/// `pipx run build --sdist`, appending the output directory and project.
pub struct SourceBuildCommand {
    executor: Arc<dyn CommandExecutor>,
    argv: Vec<String>,
}

impl SourceBuildCommand {
    pub fn new(executor: Arc<dyn CommandExecutor>, argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() {
            return Err(Error::Config(wheelwright_core::ConfigError::EmptyField(
                "sdist.command",
            )));
        }
        Ok(Self { executor, argv })
    }

    pub fn command(&self, project_dir: &Path, output_dir: &Path) -> CommandSpec {
        CommandSpec::new(&self.argv[0])
            .args(self.argv[1..].iter().cloned())
            .arg("--outdir")
            .arg(output_dir.display().to_string())
            .arg(project_dir.display().to_string())
            .current_dir(project_dir)
    }
}

#[async_trait]
impl SourceBuildTool for SourceBuildCommand {
    async fn build(&self, project_dir: &Path, output_dir: &Path) -> Result<ToolOutput> {
        tokio::fs::create_dir_all(output_dir).await?;
        self.executor
            .run(&self.command(project_dir, output_dir))
            .await
    }
}
