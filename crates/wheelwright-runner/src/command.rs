//! External command execution on the host.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};
use wheelwright_core::ports::ToolOutput;
use wheelwright_core::{Error, Result};

/// A program invocation. Arguments are passed as-is, never through a shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs commands to completion and captures their output.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<ToolOutput>;
}

/// Spawns real processes. Output lines are logged as they arrive.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

async fn drain<R>(reader: R, stream: &'static str) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut captured = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "wheelwright::output", stream, "{}", line);
        captured.push_str(&line);
        captured.push('\n');
    }
    captured
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<ToolOutput> {
        let start = std::time::Instant::now();
        info!(command = %spec.display(), "Executing command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| Error::CommandFailed {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::CommandFailed {
            program: spec.program.clone(),
            reason: "stdout not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| Error::CommandFailed {
            program: spec.program.clone(),
            reason: "stderr not captured".to_string(),
        })?;

        let stdout_handle = tokio::spawn(drain(stdout, "stdout"));
        let stderr_handle = tokio::spawn(drain(stderr, "stderr"));

        let status = child.wait().await.map_err(|e| Error::CommandFailed {
            program: spec.program.clone(),
            reason: format!("failed to wait for process: {}", e),
        })?;

        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();

        let exit_code = status.code().unwrap_or(-1);
        debug!(
            program = %spec.program,
            exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "Command completed"
        );

        Ok(ToolOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}
