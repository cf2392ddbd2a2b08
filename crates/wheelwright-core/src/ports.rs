//! Port traits (hexagonal architecture).
//!
//! The compile tool, installer, test runner, artifact store, token exchange
//! and publish tool are all external collaborators. The pipeline reaches
//! them only through these traits.

use crate::artifact::{ArtifactRecord, IfNoFilesFound};
use crate::events::Event;
use crate::pipeline::IndexConfig;
use crate::platform::{DependencyProcedure, PythonVersion};
use crate::run::TestDuration;
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Stream of events from the event bus.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event>> + Send>>;

/// Event bus for publishing and subscribing to events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: Event) -> Result<()>;

    /// Subscribe to events whose subject matches a dotted pattern
    /// (`*` matches one token, `>` the rest).
    async fn subscribe(&self, pattern: &str) -> Result<EventStream>;
}

/// Isolated working area for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Scratch directory owned by the job.
    pub root: PathBuf,
    /// Project source tree the job builds from. Read-only.
    pub project_dir: PathBuf,
}

impl Workspace {
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }
}

/// Exit status and captured output of an external tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stderr line, falling back to stdout.
    pub fn summary(&self) -> String {
        let last = |s: &str| {
            s.lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
        };
        last(&self.stderr)
            .or_else(|| last(&self.stdout))
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait WorkspaceProvisioner: Send + Sync {
    /// Create a clean, empty workspace for the named job.
    async fn acquire(&self, job_name: &str) -> Result<Workspace>;

    /// Dispose of a workspace. Best effort.
    async fn release(&self, workspace: &Workspace) -> Result<()>;
}

#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    async fn install(
        &self,
        procedure: &DependencyProcedure,
        workspace: &Workspace,
    ) -> Result<ToolOutput>;
}

/// Container image override for Linux builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSelector {
    pub variable: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub project_dir: PathBuf,
    pub output_dir: PathBuf,
    pub build_identifier: String,
    pub archs: String,
    pub image: Option<ImageSelector>,
    pub verbosity: u8,
}

/// External binary artifact compiler.
#[async_trait]
pub trait CompileTool: Send + Sync {
    async fn compile(&self, request: &CompileRequest) -> Result<ToolOutput>;
}

/// External source distribution builder.
#[async_trait]
pub trait SourceBuildTool: Send + Sync {
    async fn build(&self, project_dir: &Path, output_dir: &Path) -> Result<ToolOutput>;
}

/// Interpreter provisioned for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runtime {
    pub version: PythonVersion,
    pub interpreter: PathBuf,
}

#[async_trait]
pub trait RuntimeProvisioner: Send + Sync {
    async fn provision(&self, version: PythonVersion, workspace: &Workspace) -> Result<Runtime>;
}

/// Where an install resolves the package from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallSource {
    /// A file produced earlier in the same job.
    LocalFile(PathBuf),
    /// A package index, by simple-API URL. `None` is pip's default index.
    Index { url: Option<String>, pre: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub package: String,
    pub extras: Vec<String>,
    pub source: InstallSource,
}

impl InstallRequest {
    /// Requirement string such as `pkg[full]` or `dist/pkg.whl[full]`.
    pub fn requirement(&self) -> String {
        let base = match &self.source {
            InstallSource::LocalFile(path) => path.display().to_string(),
            InstallSource::Index { .. } => self.package.clone(),
        };
        if self.extras.is_empty() {
            base
        } else {
            format!("{}[{}]", base, self.extras.join(","))
        }
    }
}

#[async_trait]
pub trait PackageInstaller: Send + Sync {
    async fn install(&self, runtime: &Runtime, request: &InstallRequest) -> Result<ToolOutput>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRequest {
    pub working_dir: PathBuf,
    pub roots: Vec<PathBuf>,
    pub slowest: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub exit_code: i32,
    pub slowest: Vec<TestDuration>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, runtime: &Runtime, request: &TestRequest) -> Result<TestReport>;
}

/// Keyed storage shared by every job of a run.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload files in `dir` matching `pattern` under `key`.
    async fn upload(
        &self,
        key: &str,
        dir: &Path,
        pattern: &str,
        if_no_files_found: IfNoFilesFound,
    ) -> Result<ArtifactRecord>;

    /// Download every artifact whose key matches `key_pattern` into `dest`.
    /// With `merge`, all files land directly in `dest`; otherwise each key
    /// gets its own subdirectory.
    async fn download(&self, key_pattern: &str, dest: &Path, merge: bool) -> Result<Vec<PathBuf>>;

    async fn list(&self) -> Result<Vec<ArtifactRecord>>;
}

/// Ambient workload identity token (OIDC).
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken(String);

/// Short-lived index API token.
#[derive(Clone, PartialEq, Eq)]
pub struct PublishToken(String);

macro_rules! redacted_token {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn expose(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(***)"))
            }
        }
    };
}

redacted_token!(IdentityToken);
redacted_token!(PublishToken);

#[async_trait]
pub trait IdentityTokenSource: Send + Sync {
    async fn fetch(&self, audience: &str) -> Result<IdentityToken>;
}

#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, identity: &IdentityToken) -> Result<PublishToken>;
}

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub dist_dir: PathBuf,
    pub index: IndexConfig,
    pub skip_existing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
}

#[async_trait]
pub trait PublishTool: Send + Sync {
    async fn publish(&self, request: &PublishRequest, token: &PublishToken)
    -> Result<PublishReport>;
}
