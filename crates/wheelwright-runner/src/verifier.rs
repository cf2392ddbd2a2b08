//! Artifact verification: provision, install, test.

use crate::python::test_roots;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use wheelwright_core::pipeline::{IndexConfig, PackageConfig, VerifyConfig};
use wheelwright_core::platform::PythonVersion;
use wheelwright_core::ports::{
    InstallRequest, InstallSource, PackageInstaller, RuntimeProvisioner, TestRequest, TestRunner,
    Workspace,
};
use wheelwright_core::run::{StepKind, TestDuration};
use wheelwright_core::{Error, StepError};

pub struct Verifier {
    runtimes: Arc<dyn RuntimeProvisioner>,
    installer: Arc<dyn PackageInstaller>,
    tests: Arc<dyn TestRunner>,
    package: PackageConfig,
    config: VerifyConfig,
}

impl Verifier {
    pub fn new(
        runtimes: Arc<dyn RuntimeProvisioner>,
        installer: Arc<dyn PackageInstaller>,
        tests: Arc<dyn TestRunner>,
        package: PackageConfig,
        config: VerifyConfig,
    ) -> Self {
        Self {
            runtimes,
            installer,
            tests,
            package,
            config,
        }
    }

    /// Install the artifact file just built and run the suite against it.
    pub async fn verify_artifact(
        &self,
        version: PythonVersion,
        artifact: &Path,
        workspace: &Workspace,
    ) -> Result<Vec<TestDuration>, StepError> {
        self.run(
            version,
            InstallSource::LocalFile(artifact.to_path_buf()),
            workspace,
        )
        .await
    }

    /// Install the published package from the index and run the suite.
    pub async fn verify_published(
        &self,
        version: PythonVersion,
        index: &IndexConfig,
        pre: bool,
        workspace: &Workspace,
    ) -> Result<Vec<TestDuration>, StepError> {
        let source = InstallSource::Index {
            url: index.install_url.clone(),
            pre,
        };
        self.run(version, source, workspace).await
    }

    async fn run(
        &self,
        version: PythonVersion,
        source: InstallSource,
        workspace: &Workspace,
    ) -> Result<Vec<TestDuration>, StepError> {
        let runtime = self
            .runtimes
            .provision(version, workspace)
            .await
            .map_err(|e| StepError::new(StepKind::Runtime, e))?;

        let request = InstallRequest {
            package: self.package.name.clone(),
            extras: self.package.extras.clone(),
            source,
        };
        info!(requirement = %request.requirement(), python = %version, "Installing package");
        let installed = self
            .installer
            .install(&runtime, &request)
            .await
            .map_err(|e| StepError::new(StepKind::Install, e))?;
        if !installed.is_success() {
            return Err(StepError::new(
                StepKind::Install,
                Error::InstallFailed {
                    exit_code: installed.exit_code,
                    message: installed.summary(),
                },
            ));
        }

        let request = TestRequest {
            working_dir: workspace.project_dir.clone(),
            roots: test_roots(
                &workspace.project_dir,
                &self.config.test_paths,
                &self.package.name,
            ),
            slowest: self.config.slowest,
        };
        let report = self
            .tests
            .run(&runtime, &request)
            .await
            .map_err(|e| StepError::new(StepKind::Test, e))?;

        for test in &report.slowest {
            info!(test = %test.name, seconds = test.seconds, "Slow test");
        }

        if !report.passed() {
            warn!(exit_code = report.exit_code, python = %version, "Test suite failed");
            return Err(StepError::new(
                StepKind::Test,
                Error::TestsFailed {
                    exit_code: report.exit_code,
                    slowest: report.slowest,
                },
            ));
        }
        Ok(report.slowest)
    }
}
