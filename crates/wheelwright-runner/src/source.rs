//! Source distribution job: manifest check, then build. No compile step and
//! no system dependencies.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use wheelwright_core::pipeline::SdistConfig;
use wheelwright_core::ports::{SourceBuildTool, Workspace};
use wheelwright_core::run::StepKind;
use wheelwright_core::{Error, StepError};

pub struct SourceDistBuilder {
    tool: Arc<dyn SourceBuildTool>,
    config: SdistConfig,
}

impl SourceDistBuilder {
    pub fn new(tool: Arc<dyn SourceBuildTool>, config: SdistConfig) -> Self {
        Self { tool, config }
    }

    /// Build into the workspace's output directory and return it.
    pub async fn build(&self, workspace: &Workspace) -> Result<PathBuf, StepError> {
        self.config
            .manifest
            .check(&workspace.project_dir)
            .map_err(|e| StepError::new(StepKind::Configure, e))?;

        let output_dir = workspace.path(&self.config.output_dir);
        let output = self
            .tool
            .build(&workspace.project_dir, &output_dir)
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

        info!(dir = %output_dir.display(), "Source distribution built");
        Ok(output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use wheelwright_core::ports::ToolOutput;
    use wheelwright_core::run::FailureKind;

    struct Tool;

    #[async_trait]
    impl SourceBuildTool for Tool {
        async fn build(
            &self,
            _project_dir: &Path,
            output_dir: &Path,
        ) -> wheelwright_core::Result<ToolOutput> {
            tokio::fs::create_dir_all(output_dir).await?;
            tokio::fs::write(output_dir.join("demo-1.0.tar.gz"), b"src").await?;
            Ok(ToolOutput::success())
        }
    }

    #[tokio::test]
    async fn test_builds_when_manifest_satisfied() {
        let project = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join("LICENSE"), "MIT").unwrap();
        std::fs::write(project.path().join("README.md"), "readme").unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let ws = Workspace {
            root: scratch.path().to_path_buf(),
            project_dir: project.path().to_path_buf(),
        };
        let dir = SourceDistBuilder::new(Arc::new(Tool), SdistConfig::default())
            .build(&ws)
            .await
            .unwrap();
        assert!(dir.join("demo-1.0.tar.gz").exists());
    }

    #[tokio::test]
    async fn test_missing_manifest_path_is_configuration_error() {
        let project = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join("README.md"), "readme").unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let ws = Workspace {
            root: scratch.path().to_path_buf(),
            project_dir: project.path().to_path_buf(),
        };
        let err = SourceDistBuilder::new(Arc::new(Tool), SdistConfig::default())
            .build(&ws)
            .await
            .unwrap_err();
        assert_eq!(err.step, StepKind::Configure);
        assert_eq!(err.source.kind(), FailureKind::Configuration);
        assert!(!scratch.path().join("dist").exists());
    }
}
