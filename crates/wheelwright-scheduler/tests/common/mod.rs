//! In-memory collaborators for orchestration scenarios.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use wheelwright_artifacts::FilesystemStore;
use wheelwright_core::pipeline::{MatrixEntry, PipelineDefinition};
use wheelwright_core::platform::{DependencyProcedure, PythonVersion};
use wheelwright_core::ports::{
    CompileRequest, CompileTool, DependencyInstaller, IdentityToken, IdentityTokenSource,
    InstallRequest, InstallSource, PackageInstaller, PublishReport, PublishRequest, PublishTool,
    PublishToken, Runtime, RuntimeProvisioner, SourceBuildTool, TestReport, TestRequest,
    TestRunner, TokenExchange, ToolOutput, Workspace,
};
use wheelwright_core::{Error, Result};
use wheelwright_runner::LocalWorkspaceProvisioner;
use wheelwright_scheduler::{LocalEventBus, Orchestrator, Toolchain};

/// Route logs through the test harness so they show up on failure.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,wheelwright_scheduler=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub struct Deps;

#[async_trait]
impl DependencyInstaller for Deps {
    async fn install(&self, _procedure: &DependencyProcedure, _workspace: &Workspace) -> Result<ToolOutput> {
        Ok(ToolOutput::success())
    }
}

/// Writes `demo-1.0-<build>.whl` unless told otherwise for a build selector.
#[derive(Default)]
pub struct StubCompiler {
    pub failing: Mutex<HashSet<String>>,
    pub silent: Mutex<HashSet<String>>,
    pub panicking: Mutex<HashSet<String>>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl StubCompiler {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail(&self, build: &str) {
        self.failing.lock().unwrap().insert(build.to_string());
    }

    pub fn silence(&self, build: &str) {
        self.silent.lock().unwrap().insert(build.to_string());
    }

    pub fn panic_on(&self, build: &str) {
        self.panicking.lock().unwrap().insert(build.to_string());
    }
}

#[async_trait]
impl CompileTool for StubCompiler {
    async fn compile(&self, request: &CompileRequest) -> Result<ToolOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let build = &request.build_identifier;
        if self.panicking.lock().unwrap().contains(build) {
            panic!("compiler crashed on {}", build);
        }
        if self.failing.lock().unwrap().contains(build) {
            return Ok(ToolOutput::failed(2, "error: linker failed"));
        }
        if !self.silent.lock().unwrap().contains(build) {
            let name = format!("demo-1.0-{}.whl", build);
            tokio::fs::write(request.output_dir.join(name), build.as_bytes()).await?;
        }
        Ok(ToolOutput::success())
    }
}

pub struct StubSdist;

#[async_trait]
impl SourceBuildTool for StubSdist {
    async fn build(&self, _project_dir: &Path, output_dir: &Path) -> Result<ToolOutput> {
        tokio::fs::create_dir_all(output_dir).await?;
        tokio::fs::write(output_dir.join("demo-1.0.tar.gz"), b"source").await?;
        Ok(ToolOutput::success())
    }
}

pub struct StubRuntime;

#[async_trait]
impl RuntimeProvisioner for StubRuntime {
    async fn provision(&self, version: PythonVersion, workspace: &Workspace) -> Result<Runtime> {
        Ok(Runtime {
            version,
            interpreter: workspace.path(format!(".venv-{}/bin/python", version)),
        })
    }
}

/// Local files install when they exist; index installs only when the
/// package has been published.
#[derive(Default)]
pub struct StubInstaller {
    pub published: bool,
    pub requests: Mutex<Vec<InstallRequest>>,
}

impl StubInstaller {
    pub fn with_published(published: bool) -> Self {
        Self {
            published,
            ..Self::default()
        }
    }

    pub fn sources(&self) -> Vec<InstallSource> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.source.clone())
            .collect()
    }
}

#[async_trait]
impl PackageInstaller for StubInstaller {
    async fn install(&self, _runtime: &Runtime, request: &InstallRequest) -> Result<ToolOutput> {
        self.requests.lock().unwrap().push(request.clone());
        match &request.source {
            InstallSource::LocalFile(path) if path.is_file() => Ok(ToolOutput::success()),
            InstallSource::LocalFile(path) => Ok(ToolOutput::failed(
                1,
                format!("ERROR: {} does not exist", path.display()),
            )),
            InstallSource::Index { .. } if self.published => Ok(ToolOutput::success()),
            InstallSource::Index { .. } => Ok(ToolOutput::failed(
                1,
                format!(
                    "ERROR: No matching distribution found for {}",
                    request.requirement()
                ),
            )),
        }
    }
}

pub struct PassingTests;

#[async_trait]
impl TestRunner for PassingTests {
    async fn run(&self, _runtime: &Runtime, _request: &TestRequest) -> Result<TestReport> {
        Ok(TestReport {
            exit_code: 0,
            slowest: vec![],
        })
    }
}

pub struct Identity;

#[async_trait]
impl IdentityTokenSource for Identity {
    async fn fetch(&self, audience: &str) -> Result<IdentityToken> {
        Ok(IdentityToken::new(format!("oidc-for-{}", audience)))
    }
}

pub struct Exchange;

#[async_trait]
impl TokenExchange for Exchange {
    async fn exchange(&self, identity: &IdentityToken) -> Result<PublishToken> {
        Ok(PublishToken::new(format!("pypi-{}", identity.expose())))
    }
}

/// A package index that remembers every file ever uploaded.
#[derive(Default)]
pub struct FakeIndex {
    pub files: Mutex<HashSet<String>>,
    pub calls: AtomicUsize,
}

impl FakeIndex {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublishTool for FakeIndex {
    async fn publish(&self, request: &PublishRequest, _token: &PublishToken) -> Result<PublishReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut names = vec![];
        for entry in std::fs::read_dir(&request.dist_dir)? {
            names.push(entry?.file_name().to_string_lossy().to_string());
        }
        names.sort();

        let mut files = self.files.lock().unwrap();
        let mut report = PublishReport::default();
        for (i, name) in names.iter().cloned().enumerate() {
            if files.contains(&name) {
                if !request.skip_existing {
                    return Err(Error::PublishConflict {
                        file: name,
                        uploaded: report.uploaded,
                        remaining: names[i + 1..].to_vec(),
                    });
                }
                report.skipped.push(name);
            } else {
                files.insert(name.clone());
                report.uploaded.push(name);
            }
        }
        Ok(report)
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub compiler: Arc<StubCompiler>,
    pub installer: Arc<StubInstaller>,
    pub index: Arc<FakeIndex>,
    pub store: Arc<FilesystemStore>,
    pub bus: Arc<LocalEventBus>,
    pub toolchain: Toolchain,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(StubCompiler::default(), Arc::new(FakeIndex::default()), false)
    }

    pub fn with_compiler(compiler: StubCompiler) -> Self {
        Self::build(compiler, Arc::new(FakeIndex::default()), false)
    }

    pub fn with_index(index: Arc<FakeIndex>) -> Self {
        Self::build(StubCompiler::default(), index, false)
    }

    pub fn with_published_package(published: bool) -> Self {
        Self::build(StubCompiler::default(), Arc::new(FakeIndex::default()), published)
    }

    fn build(compiler: StubCompiler, index: Arc<FakeIndex>, published: bool) -> Self {
        init_tracing();
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("project");
        std::fs::create_dir_all(project.join("tests")).unwrap();
        std::fs::write(project.join("LICENSE"), "MIT").unwrap();
        std::fs::write(project.join("README.md"), "# demo").unwrap();

        let compiler = Arc::new(compiler);
        let installer = Arc::new(StubInstaller::with_published(published));
        let store = Arc::new(FilesystemStore::new(tmp.path().join("store")));
        let bus = Arc::new(LocalEventBus::new());

        let toolchain = Toolchain {
            workspaces: Arc::new(LocalWorkspaceProvisioner::new(
                tmp.path().join("work"),
                &project,
            )),
            dependencies: Arc::new(Deps),
            compiler: compiler.clone(),
            source_builder: Arc::new(StubSdist),
            runtimes: Arc::new(StubRuntime),
            installer: installer.clone(),
            tests: Arc::new(PassingTests),
            store: store.clone(),
            identity: Arc::new(Identity),
            exchange: Arc::new(Exchange),
            publisher: index.clone(),
        };

        Self {
            tmp,
            compiler,
            installer,
            index,
            store,
            bus,
            toolchain,
        }
    }

    pub fn project_dir(&self) -> std::path::PathBuf {
        self.tmp.path().join("project")
    }

    pub fn orchestrator(&self, definition: PipelineDefinition) -> Orchestrator {
        Orchestrator::new(definition, self.toolchain.clone(), self.bus.clone()).unwrap()
    }
}

pub fn entry(os: &str, python: &str, platform: &str) -> MatrixEntry {
    MatrixEntry {
        os: os.to_string(),
        python: python.to_string(),
        platform_id: platform.to_string(),
        image: None,
    }
}

pub fn definition(include: Vec<MatrixEntry>) -> PipelineDefinition {
    let mut definition = PipelineDefinition::from_yaml(
        r#"
version: "1"
name: demo
package:
  name: demo
triggers:
  - type: manual
  - type: pull_request
  - type: push
    branches: [main]
  - type: release
regression:
  include:
    - { os: ubuntu-latest, python: "3.12" }
    - { os: macos-latest, python: "3.12" }
"#,
    )
    .unwrap();
    definition.wheels.include = include;
    definition
}

pub fn three_linux_jobs() -> Vec<MatrixEntry> {
    vec![
        entry("ubuntu-latest", "39", "manylinux_x86_64"),
        entry("ubuntu-latest", "310", "manylinux_x86_64"),
        entry("ubuntu-latest", "311", "manylinux_x86_64"),
    ]
}
