//! Pipeline discovery, directory layout and the validation pass.

use anyhow::{Context, bail};
use std::path::{Path, PathBuf};
use wheelwright_core::artifact::check_key;
use wheelwright_core::pipeline::PipelineDefinition;
use wheelwright_core::platform::{PythonVersion, RunnerImage};
use wheelwright_scheduler::{DagBuilder, MatrixExpander, ScheduleSpec};

/// Locations searched, in order, when no pipeline file is given.
const SEARCH_PATHS: &[&str] = &[
    "wheelwright.yaml",
    "wheelwright.yml",
    ".wheelwright/pipeline.yaml",
    ".wheelwright/pipeline.yml",
];

/// Everything a command needs to know about where things live.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub pipeline_path: PathBuf,
    pub project_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub keep_workspaces: bool,
    pub use_sudo: bool,
    pub definition: PipelineDefinition,
}

impl CliConfig {
    pub fn resolve(
        file: Option<PathBuf>,
        workspace: Option<PathBuf>,
        artifact_dir: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("Could not determine current directory")?;
        let pipeline_path = match file {
            Some(path) => path,
            None => discover(&cwd)?,
        };
        let project_dir = project_root(&pipeline_path, &cwd);

        let content = std::fs::read_to_string(&pipeline_path)
            .with_context(|| format!("Failed to read {}", pipeline_path.display()))?;
        let definition = PipelineDefinition::from_yaml(&content)
            .with_context(|| format!("Failed to parse {}", pipeline_path.display()))?;

        let state_dir = project_dir.join(".wheelwright");
        Ok(Self {
            workspace_dir: workspace.unwrap_or_else(|| state_dir.join("work")),
            artifact_dir: artifact_dir.unwrap_or_else(|| state_dir.join("artifacts")),
            keep_workspaces: false,
            use_sudo: true,
            pipeline_path,
            project_dir,
            definition,
        })
    }
}

/// Find the pipeline file under `dir`.
pub fn discover(dir: &Path) -> anyhow::Result<PathBuf> {
    for candidate in SEARCH_PATHS {
        let path = dir.join(candidate);
        if path.is_file() {
            return Ok(path);
        }
    }
    bail!(
        "No pipeline file found in {} (looked for {})",
        dir.display(),
        SEARCH_PATHS.join(", ")
    )
}

/// The project is the directory holding the pipeline file, or the parent of
/// `.wheelwright/`.
fn project_root(pipeline_path: &Path, cwd: &Path) -> PathBuf {
    let parent = match pipeline_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => return cwd.to_path_buf(),
    };
    if parent.file_name().is_some_and(|n| n == ".wheelwright") {
        parent.parent().map(Path::to_path_buf).unwrap_or(parent)
    } else {
        parent
    }
}

/// Collect every configuration problem without running anything.
pub fn problems(definition: &PipelineDefinition) -> Vec<String> {
    let mut problems = vec![];

    if definition.package.name.trim().is_empty() {
        problems.push("package.name is empty".to_string());
    }
    if definition.sdist.command.is_empty() {
        problems.push("sdist.command is empty".to_string());
    }
    if let Err(e) = check_key(&definition.sdist.artifact_key) {
        problems.push(format!("sdist.artifact_key: {}", e));
    }

    for (i, trigger) in definition.triggers.iter().enumerate() {
        if let Some(cron) = &trigger.cron {
            if let Err(e) = ScheduleSpec::parse(cron) {
                problems.push(format!("triggers[{}]: {}", i, e));
            }
        }
    }

    for rejected in MatrixExpander::new().expand(&definition.wheels).rejected {
        problems.push(format!("wheels.include[{}]: {}", rejected.index, rejected.error));
    }

    if let Err(e) = DagBuilder::new().build(&definition.release) {
        problems.push(format!("release.needs: {}", e));
    }

    if let Some(regression) = &definition.regression {
        if let Err(e) = ScheduleSpec::parse(&regression.cron) {
            problems.push(format!("regression.cron: {}", e));
        }
        for (i, entry) in regression.include.iter().enumerate() {
            if let Err(e) = RunnerImage::parse(&entry.os) {
                problems.push(format!("regression.include[{}]: {}", i, e));
            }
            if let Err(e) = entry.python.parse::<PythonVersion>() {
                problems.push(format!("regression.include[{}]: {}", i, e));
            }
        }
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"
version: "1"
name: demo
package:
  name: demo
wheels:
  include:
    - { os: ubuntu-latest, python: "39", platform_id: manylinux_x86_64 }
"#;

    #[test]
    fn test_discover_prefers_root_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".wheelwright")).unwrap();
        std::fs::write(dir.path().join(".wheelwright/pipeline.yaml"), MINIMAL).unwrap();
        assert_eq!(
            discover(dir.path()).unwrap(),
            dir.path().join(".wheelwright/pipeline.yaml")
        );

        std::fs::write(dir.path().join("wheelwright.yaml"), MINIMAL).unwrap();
        assert_eq!(discover(dir.path()).unwrap(), dir.path().join("wheelwright.yaml"));
    }

    #[test]
    fn test_discover_fails_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains("No pipeline file found"));
    }

    #[test]
    fn test_resolve_defaults_under_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".wheelwright")).unwrap();
        let path = dir.path().join(".wheelwright/pipeline.yaml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = CliConfig::resolve(Some(path), None, Some("/tmp/artifacts".into())).unwrap();
        assert_eq!(config.project_dir, dir.path());
        assert_eq!(config.workspace_dir, dir.path().join(".wheelwright/work"));
        assert_eq!(config.artifact_dir, PathBuf::from("/tmp/artifacts"));
        assert_eq!(config.definition.name, "demo");
    }

    #[test]
    fn test_valid_definition_has_no_problems() {
        let definition = PipelineDefinition::from_yaml(MINIMAL).unwrap();
        assert!(problems(&definition).is_empty());
    }

    #[test]
    fn test_problems_are_collected() {
        let definition = PipelineDefinition::from_yaml(
            r#"
version: "1"
name: demo
package:
  name: demo
sdist:
  artifact_key: "cibw/sdist"
triggers:
  - type: schedule
    cron: "every day"
wheels:
  include:
    - { os: ubuntu-latest, python: "39", platform_id: macosx_arm64 }
    - { os: macos-14, python: "3.12", platform_id: macosx_arm64 }
release:
  needs: [build_wheels, build_docs]
regression:
  cron: "0 0 1 * *"
  include:
    - { os: windows-latest, python: "3.12" }
"#,
        )
        .unwrap();

        let problems = problems(&definition);
        assert_eq!(problems.len(), 5);
        assert!(problems[0].starts_with("sdist.artifact_key:"));
        assert!(problems[1].starts_with("triggers[0]:"));
        assert!(problems[2].starts_with("wheels.include[0]:"));
        assert!(problems[3].starts_with("release.needs:"));
        assert!(problems[4].starts_with("regression.include[0]:"));
    }
}
