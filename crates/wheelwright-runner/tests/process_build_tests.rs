//! End-to-end builder tests against real processes, with a shell script
//! standing in for the compile tool.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wheelwright_core::job::JobSpec;
use wheelwright_core::pipeline::WheelsConfig;
use wheelwright_core::platform::RunnerImage;
use wheelwright_core::ports::{Workspace, WorkspaceProvisioner};
use wheelwright_core::run::{FailureKind, StepKind};
use wheelwright_runner::{
    BuildSettings, CibuildwheelTool, LocalWorkspaceProvisioner, ProcessExecutor,
    SystemDependencyInstaller, WheelBuilder,
};

/// Script that writes `<CIBW_BUILD>.whl` into the directory after `--output-dir`.
const FAKE_COMPILER: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output-dir" ]; then out="$2"; fi
  shift
done
[ -n "$out" ] || exit 2
echo "verbosity=$CIBW_BUILD_VERBOSITY archs=$CIBW_ARCHS"
touch "$out/demo-1.0-$CIBW_BUILD.whl"
"#;

const SILENT_COMPILER: &str = "#!/bin/sh\nexit 0\n";

const BROKEN_COMPILER: &str = "#!/bin/sh\necho 'error: command gcc failed' >&2\nexit 4\n";

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn job() -> JobSpec {
    JobSpec::new(
        0,
        RunnerImage::parse("ubuntu-latest").unwrap(),
        "3.9".parse().unwrap(),
        "manylinux_x86_64".parse().unwrap(),
        None,
        "cibw-wheels",
    )
    .unwrap()
}

async fn build_with(compiler: &str) -> (tempfile::TempDir, Workspace, WheelBuilder) {
    let tmp = tempfile::tempdir().unwrap();
    let program = script(tmp.path(), "fake-cibuildwheel", compiler);

    let executor = Arc::new(ProcessExecutor::new());
    let builder = WheelBuilder::new(
        Arc::new(SystemDependencyInstaller::new(executor.clone())),
        Arc::new(CibuildwheelTool::new(
            executor,
            program.display().to_string(),
        )),
        BuildSettings::from(&WheelsConfig::default()),
    );

    let provisioner = LocalWorkspaceProvisioner::new(tmp.path().join("work"), tmp.path());
    let workspace = provisioner.acquire("build_wheels").await.unwrap();
    (tmp, workspace, builder)
}

#[tokio::test]
async fn test_build_with_process_compiler() {
    let (_tmp, workspace, builder) = build_with(FAKE_COMPILER).await;

    let output = builder.build(&job(), &workspace).await.unwrap();
    assert_eq!(
        output.artifacts,
        vec![workspace.path("wheelhouse/demo-1.0-cp39-manylinux_x86_64.whl")]
    );
}

#[tokio::test]
async fn test_silent_compiler_is_missing_artifact() {
    let (_tmp, workspace, builder) = build_with(SILENT_COMPILER).await;

    let err = builder.build(&job(), &workspace).await.unwrap_err();
    assert_eq!(err.source.kind(), FailureKind::MissingArtifact);
}

#[tokio::test]
async fn test_broken_compiler_reports_exit_code_and_message() {
    let (_tmp, workspace, builder) = build_with(BROKEN_COMPILER).await;

    let err = builder.build(&job(), &workspace).await.unwrap_err();
    assert_eq!(err.step, StepKind::Build);
    assert_eq!(err.source.exit_code(), Some(4));
    assert!(err.to_string().contains("error: command gcc failed"));
}
