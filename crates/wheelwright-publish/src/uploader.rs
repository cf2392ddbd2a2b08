//! Package upload through an external publish tool.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use wheelwright_core::ports::{PublishReport, PublishRequest, PublishTool, PublishToken, ToolOutput};
use wheelwright_core::{Error, Result};
use wheelwright_runner::{CommandExecutor, CommandSpec};

const DISTRIBUTION_SUFFIXES: [&str; 3] = [".whl", ".tar.gz", ".zip"];

/// `twine upload` with token authentication.
pub struct TwineUploader {
    executor: Arc<dyn CommandExecutor>,
    program: String,
}

impl TwineUploader {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            program: "twine".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn command(
        &self,
        request: &PublishRequest,
        token: &PublishToken,
        files: &[PathBuf],
    ) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program)
            .args(["upload", "--non-interactive", "--disable-progress-bar"])
            .arg("--repository-url")
            .arg(&request.index.upload_url)
            .env("TWINE_USERNAME", "__token__")
            .env("TWINE_PASSWORD", token.expose());
        if request.skip_existing {
            spec = spec.arg("--skip-existing");
        }
        spec.args(files.iter().map(|f| f.display().to_string()))
    }
}

async fn distributions(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type().await?.is_file()
            && DISTRIBUTION_SUFFIXES.iter().any(|s| name.ends_with(s))
        {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Files the tool reported as skipped because the index already has them.
fn skipped_files(output: &ToolOutput) -> Vec<String> {
    output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Skipping ")?;
            let (file, reason) = rest.split_once(' ')?;
            reason.contains("already exist").then(|| file.to_string())
        })
        .collect()
}

/// The file an "already exists" rejection refers to, if the failure was one.
fn conflicting_file(output: &ToolOutput, files: &[String]) -> Option<String> {
    let text = format!("{}\n{}", output.stdout, output.stderr);
    if !text.contains("already exists") {
        return None;
    }
    files
        .iter()
        .find(|f| text.contains(f.as_str()))
        .cloned()
        .or_else(|| files.first().cloned())
}

#[async_trait]
impl PublishTool for TwineUploader {
    async fn publish(&self, request: &PublishRequest, token: &PublishToken) -> Result<PublishReport> {
        let files = distributions(&request.dist_dir).await?;
        if files.is_empty() {
            return Err(Error::PublishFailed(format!(
                "no distributions in {}",
                request.dist_dir.display()
            )));
        }
        let mut names: Vec<String> = files.iter().map(|f| file_name(f)).collect();

        info!(index = %request.index.name, files = names.len(), "Uploading distributions");
        let output = self
            .executor
            .run(&self.command(request, token, &files))
            .await?;

        if !output.is_success() {
            if let Some(file) = conflicting_file(&output, &names) {
                warn!(file = %file, "Distribution already exists on index");
                // The tool uploads in argument order and stops at the first rejection.
                let at = names.iter().position(|n| *n == file).unwrap_or(0);
                let remaining = names.split_off(at + 1);
                names.pop();
                return Err(Error::PublishConflict {
                    file,
                    uploaded: names,
                    remaining,
                });
            }
            return Err(Error::PublishFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.exit_code,
                output.summary()
            )));
        }

        let skipped = skipped_files(&output);
        let uploaded = names
            .into_iter()
            .filter(|n| !skipped.contains(n))
            .collect();
        Ok(PublishReport { uploaded, skipped })
    }
}
