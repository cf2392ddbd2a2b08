//! Per-job scratch directories.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;
use wheelwright_core::Result;
use wheelwright_core::ports::{Workspace, WorkspaceProvisioner};

/// Hands out a fresh directory under `base_dir` for every job.
pub struct LocalWorkspaceProvisioner {
    base_dir: PathBuf,
    project_dir: PathBuf,
    keep: bool,
}

impl LocalWorkspaceProvisioner {
    pub fn new(base_dir: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            project_dir: project_dir.into(),
            keep: false,
        }
    }

    /// Leave workspaces on disk after release, for debugging.
    pub fn keep_workspaces(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    fn dir_name(job_name: &str) -> String {
        let slug: String = job_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{}", slug.trim_matches('_'), &suffix[..8])
    }
}

#[async_trait]
impl WorkspaceProvisioner for LocalWorkspaceProvisioner {
    async fn acquire(&self, job_name: &str) -> Result<Workspace> {
        let root = self.base_dir.join(Self::dir_name(job_name));
        tokio::fs::create_dir_all(&root).await?;
        debug!(job = %job_name, root = %root.display(), "Acquired workspace");
        Ok(Workspace {
            root,
            project_dir: self.project_dir.clone(),
        })
    }

    async fn release(&self, workspace: &Workspace) -> Result<()> {
        if self.keep {
            return Ok(());
        }
        if let Err(e) = tokio::fs::remove_dir_all(&workspace.root).await {
            warn!(root = %workspace.root.display(), error = %e, "Failed to remove workspace");
        }
        Ok(())
    }
}
