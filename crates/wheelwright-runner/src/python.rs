//! Interpreter provisioning, package installation and test execution.

use crate::command::{CommandExecutor, CommandSpec};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use wheelwright_core::platform::PythonVersion;
use wheelwright_core::ports::{
    InstallRequest, InstallSource, PackageInstaller, Runtime, RuntimeProvisioner, TestReport,
    TestRequest, TestRunner, ToolOutput, Workspace,
};
use wheelwright_core::run::TestDuration;
use wheelwright_core::{Error, Result};

/// Creates a virtual environment from the host interpreter `python<major>.<minor>`.
pub struct VenvProvisioner {
    executor: Arc<dyn CommandExecutor>,
}

impl VenvProvisioner {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl RuntimeProvisioner for VenvProvisioner {
    async fn provision(&self, version: PythonVersion, workspace: &Workspace) -> Result<Runtime> {
        let host = format!("python{}", version.dotted());
        let venv = workspace.path(format!(".venv-{}", version.dotted()));

        let spec = CommandSpec::new(&host)
            .args(["-m", "venv"])
            .arg(venv.display().to_string())
            .current_dir(&workspace.root);
        let output = match self.executor.run(&spec).await {
            Ok(output) => output,
            Err(Error::CommandFailed { reason, .. }) => {
                return Err(Error::RuntimeUnavailable(format!("{}: {}", host, reason)));
            }
            Err(e) => return Err(e),
        };
        if !output.is_success() {
            return Err(Error::RuntimeUnavailable(format!(
                "{} exited with {}: {}",
                host,
                output.exit_code,
                output.summary()
            )));
        }

        info!(version = %version, venv = %venv.display(), "Provisioned runtime");
        Ok(Runtime {
            version,
            interpreter: venv.join("bin").join("python"),
        })
    }
}

/// `python -m pip install`.
pub struct PipInstaller {
    executor: Arc<dyn CommandExecutor>,
}

impl PipInstaller {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    pub fn command(&self, runtime: &Runtime, request: &InstallRequest) -> CommandSpec {
        let mut spec = CommandSpec::new(runtime.interpreter.display().to_string())
            .args(["-m", "pip", "install"]);
        if let InstallSource::Index { url, pre } = &request.source {
            if let Some(url) = url {
                spec = spec.arg("--index-url").arg(url);
            }
            if *pre {
                spec = spec.arg("--pre");
            }
        }
        spec.arg(request.requirement())
    }
}

#[async_trait]
impl PackageInstaller for PipInstaller {
    async fn install(&self, runtime: &Runtime, request: &InstallRequest) -> Result<ToolOutput> {
        self.executor.run(&self.command(runtime, request)).await
    }
}

/// `python -m pytest <roots> --durations=N`.
pub struct PytestRunner {
    executor: Arc<dyn CommandExecutor>,
}

impl PytestRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    pub fn command(&self, runtime: &Runtime, request: &TestRequest) -> CommandSpec {
        CommandSpec::new(runtime.interpreter.display().to_string())
            .args(["-m", "pytest"])
            .args(request.roots.iter().map(|r| r.display().to_string()))
            .arg(format!("--durations={}", request.slowest))
            .current_dir(&request.working_dir)
    }
}

#[async_trait]
impl TestRunner for PytestRunner {
    async fn run(&self, runtime: &Runtime, request: &TestRequest) -> Result<TestReport> {
        let output = self.executor.run(&self.command(runtime, request)).await?;
        let mut slowest = parse_durations(&output.stdout);
        slowest.truncate(request.slowest as usize);
        Ok(TestReport {
            exit_code: output.exit_code,
            slowest,
        })
    }
}

/// Parse the slowest-durations section of pytest output:
///
/// ```text
/// 1.52s call     tests/test_logic.py::test_parse
/// 0.40s setup    tests/test_tw.py::test_make
/// ```
pub fn parse_durations(stdout: &str) -> Vec<TestDuration> {
    let mut durations: Vec<TestDuration> = stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let seconds = parts.next()?.strip_suffix('s')?.parse::<f64>().ok()?;
            let phase = parts.next()?;
            if !matches!(phase, "call" | "setup" | "teardown") {
                return None;
            }
            let test = parts.collect::<Vec<_>>().join(" ");
            if test.is_empty() {
                return None;
            }
            Some(TestDuration {
                name: format!("{} ({})", test, phase),
                seconds,
            })
        })
        .collect();
    durations.sort_by(|a, b| b.seconds.total_cmp(&a.seconds));
    durations
}

/// Source roots handed to the test runner: the configured test paths plus
/// the package's own source tree.
pub fn test_roots(project_dir: &std::path::Path, test_paths: &[String], package: &str) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = test_paths.iter().map(|p| project_dir.join(p)).collect();
    let source = project_dir.join(package.replace('-', "_"));
    if !roots.contains(&source) {
        roots.push(source);
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedExecutor;
    use pretty_assertions::assert_eq;

    const PYTEST_OUTPUT: &str = "\
============================= test session starts ==============================
collected 412 items

tests/test_tw.py ........                                                [  2%]
============================ slowest 3 durations =============================
0.40s setup    tests/test_tw.py::test_make
3.21s call     textworld/logic/tests/test_logic.py::test_parse
1.02s call     tests/test_tw.py::test_make
======================= 412 passed in 48.12s ==================================
";

    fn runtime() -> Runtime {
        Runtime {
            version: PythonVersion::new(3, 9),
            interpreter: PathBuf::from("/ws/.venv-3.9/bin/python"),
        }
    }

    #[test]
    fn test_parse_durations_sorted() {
        let durations = parse_durations(PYTEST_OUTPUT);
        assert_eq!(durations.len(), 3);
        assert_eq!(
            durations[0].name,
            "textworld/logic/tests/test_logic.py::test_parse (call)"
        );
        assert_eq!(durations[0].seconds, 3.21);
        assert_eq!(durations[2].seconds, 0.40);
    }

    #[test]
    fn test_pip_local_file_with_extras() {
        let installer = PipInstaller::new(Arc::new(ScriptedExecutor::new()));
        let request = InstallRequest {
            package: "textworld".into(),
            extras: vec!["full".into()],
            source: InstallSource::LocalFile(PathBuf::from("/ws/wheelhouse/tw.whl")),
        };
        assert_eq!(
            installer.command(&runtime(), &request).display(),
            "/ws/.venv-3.9/bin/python -m pip install /ws/wheelhouse/tw.whl[full]"
        );
    }

    #[test]
    fn test_pip_index_with_prereleases() {
        let installer = PipInstaller::new(Arc::new(ScriptedExecutor::new()));
        let request = InstallRequest {
            package: "textworld".into(),
            extras: vec!["full".into()],
            source: InstallSource::Index {
                url: None,
                pre: true,
            },
        };
        assert_eq!(
            installer.command(&runtime(), &request).display(),
            "/ws/.venv-3.9/bin/python -m pip install --pre textworld[full]"
        );
    }

    #[test]
    fn test_pip_custom_index_url() {
        let installer = PipInstaller::new(Arc::new(ScriptedExecutor::new()));
        let request = InstallRequest {
            package: "textworld".into(),
            extras: vec![],
            source: InstallSource::Index {
                url: Some("https://test.pypi.org/simple/".into()),
                pre: false,
            },
        };
        assert_eq!(
            installer.command(&runtime(), &request).display(),
            "/ws/.venv-3.9/bin/python -m pip install --index-url https://test.pypi.org/simple/ textworld"
        );
    }

    #[tokio::test]
    async fn test_pytest_reports_slowest() {
        let executor = Arc::new(ScriptedExecutor::new().respond(
            "python",
            ToolOutput {
                exit_code: 1,
                stdout: PYTEST_OUTPUT.to_string(),
                stderr: String::new(),
            },
        ));
        let runner = PytestRunner::new(executor.clone());
        let request = TestRequest {
            working_dir: PathBuf::from("/src"),
            roots: vec![PathBuf::from("/src/tests"), PathBuf::from("/src/textworld")],
            slowest: 2,
        };

        let report = runner.run(&runtime(), &request).await.unwrap();
        assert!(!report.passed());
        assert_eq!(report.slowest.len(), 2);
        assert_eq!(
            executor.calls()[0].args,
            vec!["-m", "pytest", "/src/tests", "/src/textworld", "--durations=2"]
        );
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_runtime_unavailable() {
        struct Missing;
        #[async_trait]
        impl CommandExecutor for Missing {
            async fn run(&self, spec: &CommandSpec) -> Result<ToolOutput> {
                Err(Error::CommandFailed {
                    program: spec.program.clone(),
                    reason: "No such file or directory".into(),
                })
            }
        }

        let ws = Workspace {
            root: PathBuf::from("/ws"),
            project_dir: PathBuf::from("/src"),
        };
        let err = VenvProvisioner::new(Arc::new(Missing))
            .provision(PythonVersion::new(3, 13), &ws)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RuntimeUnavailable(_)));
    }

    #[test]
    fn test_roots_include_package_source() {
        let roots = test_roots(std::path::Path::new("/src"), &["tests".to_string()], "text-world");
        assert_eq!(
            roots,
            vec![PathBuf::from("/src/tests"), PathBuf::from("/src/text_world")]
        );
    }
}
