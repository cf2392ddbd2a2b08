//! OS-family system dependency installation.

use crate::command::{CommandExecutor, CommandSpec};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use wheelwright_core::Result;
use wheelwright_core::platform::DependencyProcedure;
use wheelwright_core::ports::{DependencyInstaller, ToolOutput, Workspace};

/// Installs system packages with the family's package manager.
pub struct SystemDependencyInstaller {
    executor: Arc<dyn CommandExecutor>,
    use_sudo: bool,
}

impl SystemDependencyInstaller {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            use_sudo: true,
        }
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    /// Commands for a procedure, in order. Empty when there is nothing to install.
    pub fn commands(&self, procedure: &DependencyProcedure) -> Vec<CommandSpec> {
        if procedure.packages().is_empty() {
            return vec![];
        }

        match procedure {
            DependencyProcedure::Apt { packages } => {
                let apt = |args: Vec<String>| {
                    let spec = if self.use_sudo {
                        CommandSpec::new("sudo").arg("apt-get")
                    } else {
                        CommandSpec::new("apt-get")
                    };
                    spec.args(args).env("DEBIAN_FRONTEND", "noninteractive")
                };
                vec![
                    apt(vec!["update".to_string()]),
                    apt(["install", "-y"]
                        .iter()
                        .map(|s| s.to_string())
                        .chain(packages.iter().cloned())
                        .collect()),
                ]
            }
            DependencyProcedure::Homebrew { packages } => vec![
                CommandSpec::new("brew")
                    .arg("install")
                    .args(packages.iter().cloned())
                    .env("HOMEBREW_NO_AUTO_UPDATE", "1"),
            ],
        }
    }
}

#[async_trait]
impl DependencyInstaller for SystemDependencyInstaller {
    async fn install(
        &self,
        procedure: &DependencyProcedure,
        workspace: &Workspace,
    ) -> Result<ToolOutput> {
        let commands = self.commands(procedure);
        if commands.is_empty() {
            debug!("No system dependencies declared");
            return Ok(ToolOutput::success());
        }

        info!(packages = ?procedure.packages(), "Installing system dependencies");
        let mut last = ToolOutput::success();
        for command in commands {
            last = self
                .executor
                .run(&command.current_dir(&workspace.root))
                .await?;
            if !last.is_success() {
                break;
            }
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedExecutor;
    use std::path::PathBuf;
    use wheelwright_core::pipeline::DependencyConfig;
    use wheelwright_core::platform::OsFamily;

    fn workspace() -> Workspace {
        Workspace {
            root: PathBuf::from("/tmp/ws"),
            project_dir: PathBuf::from("/src"),
        }
    }

    fn config() -> DependencyConfig {
        DependencyConfig {
            linux: vec!["graphviz".into()],
            macos: vec!["graphviz".into(), "libomp".into()],
        }
    }

    #[test]
    fn test_apt_commands() {
        let installer = SystemDependencyInstaller::new(Arc::new(ScriptedExecutor::new()));
        let procedure = DependencyProcedure::for_family(OsFamily::Linux, &config());
        let commands = installer.commands(&procedure);

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].display(), "sudo apt-get update");
        assert_eq!(commands[1].display(), "sudo apt-get install -y graphviz");
    }

    #[test]
    fn test_brew_commands() {
        let installer = SystemDependencyInstaller::new(Arc::new(ScriptedExecutor::new()));
        let procedure = DependencyProcedure::for_family(OsFamily::Macos, &config());
        let commands = installer.commands(&procedure);

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].display(), "brew install graphviz libomp");
    }

    #[tokio::test]
    async fn test_empty_package_list_runs_nothing() {
        let executor = Arc::new(ScriptedExecutor::new());
        let installer = SystemDependencyInstaller::new(executor.clone());
        let procedure = DependencyProcedure::Apt { packages: vec![] };

        let output = installer.install(&procedure, &workspace()).await.unwrap();
        assert!(output.is_success());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let executor = Arc::new(
            ScriptedExecutor::new().respond("sudo", ToolOutput::failed(100, "E: lock held")),
        );
        let installer = SystemDependencyInstaller::new(executor.clone());
        let procedure = DependencyProcedure::for_family(OsFamily::Linux, &config());

        let output = installer.install(&procedure, &workspace()).await.unwrap();
        assert_eq!(output.exit_code, 100);
        assert_eq!(executor.calls().len(), 1);
    }
}
