//! Command handlers.
//!
//! Each handler returns `Ok(true)` when the command succeeded and `Ok(false)`
//! when it ran to completion but the outcome is a failure (bad config, a
//! failed job, a failed release).

use crate::commands::TriggerKind;
use crate::config::{self, CliConfig};
use anyhow::{Context, bail};
use chrono::Utc;
use console::style;
use std::sync::Arc;
use tracing::info;
use wheelwright_artifacts::FilesystemStore;
use wheelwright_core::approval::EnvironmentApproval;
use wheelwright_core::pipeline::PipelineDefinition;
use wheelwright_core::ports::IdentityTokenSource;
use wheelwright_core::run::{JobReport, PipelineReport, ReleaseStatus};
use wheelwright_publish::{ActionsIdentityToken, EnvIdentityToken, MintTokenExchange, TwineUploader};
use wheelwright_runner::{
    CibuildwheelTool, CommandExecutor, LocalWorkspaceProvisioner, PipInstaller, ProcessExecutor,
    PytestRunner, SourceBuildCommand, SystemDependencyInstaller, VenvProvisioner,
};
use wheelwright_scheduler::{
    LocalEventBus, MatrixExpander, Orchestrator, RegressionRunner, ScheduleSpec, Toolchain,
    TriggerEvent,
};

/// Fallback identity token variable for hosts without an OIDC endpoint.
const IDENTITY_TOKEN_VAR: &str = "WHEELWRIGHT_ID_TOKEN";

/// Print the pipeline definition schema.
pub fn schema() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(PipelineDefinition);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Validate the pipeline definition.
pub fn validate(config: &CliConfig) -> anyhow::Result<bool> {
    let definition = &config.definition;
    let problems = config::problems(definition);

    if problems.is_empty() {
        println!(
            "{} Pipeline \"{}\" is valid",
            style("✓").green(),
            definition.name
        );
        println!("  Wheel jobs: {}", definition.wheels.include.len());
        println!(
            "  Release: {}",
            if definition.release.enabled { "enabled" } else { "disabled" }
        );
        return Ok(true);
    }

    println!(
        "{} Pipeline \"{}\" has {} problem(s)",
        style("✗").red(),
        definition.name,
        problems.len()
    );
    for problem in &problems {
        println!("    - {}", problem);
    }
    Ok(false)
}

/// Print the expanded build matrix.
pub fn plan(config: &CliConfig, json: bool) -> anyhow::Result<bool> {
    let expansion = MatrixExpander::new().expand(&config.definition.wheels);

    if json {
        println!("{}", serde_json::to_string_pretty(&expansion)?);
        return Ok(expansion.rejected.is_empty());
    }

    println!(
        "{} {} job(s), {} rejected",
        style("▶").cyan(),
        expansion.jobs.len(),
        expansion.rejected.len()
    );
    if let Some(limit) = expansion.max_parallel {
        println!("  max parallel: {}", limit);
    }
    for job in &expansion.jobs {
        println!(
            "    {} {}",
            style(job.artifact_key()).bold(),
            job.display_name()
        );
    }
    for rejected in &expansion.rejected {
        println!(
            "    {} {}: {}",
            style("✗").red(),
            rejected.display_name(),
            rejected.error
        );
    }
    println!("    {} build_sdist", style(&config.definition.sdist.artifact_key).bold());
    Ok(expansion.rejected.is_empty())
}

/// Translate the command line into the event a CI host would have sent.
pub fn trigger_event(
    kind: TriggerKind,
    git_ref: Option<&str>,
    base: Option<&str>,
    actor: Option<String>,
) -> anyhow::Result<TriggerEvent> {
    let branch = |git_ref: &str| {
        git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(git_ref)
            .to_string()
    };
    Ok(match kind {
        TriggerKind::Manual => TriggerEvent::Manual { actor },
        TriggerKind::Push => {
            let Some(git_ref) = git_ref else {
                bail!("A push run needs --ref");
            };
            TriggerEvent::Push {
                branch: branch(git_ref),
            }
        }
        TriggerKind::PullRequest => {
            let (Some(git_ref), Some(base)) = (git_ref, base) else {
                bail!("A pull request run needs --ref and --base");
            };
            TriggerEvent::PullRequest {
                source_branch: branch(git_ref),
                target_branch: branch(base),
            }
        }
        TriggerKind::Release => {
            let Some(tag) = git_ref.map(|r| r.strip_prefix("refs/tags/").unwrap_or(r)) else {
                bail!("A release run needs --ref");
            };
            TriggerEvent::Release {
                tag: tag.to_string(),
            }
        }
    })
}

/// Approval of the release environment for this run. `--approve` decides it
/// on behalf of the invoking user; otherwise it stays pending.
pub fn environment_approval(definition: &PipelineDefinition, approve: bool) -> EnvironmentApproval {
    let mut approval = EnvironmentApproval::pending(definition.release.environment.clone());
    if approve {
        let user = std::env::var("USER").unwrap_or_else(|_| "cli".to_string());
        approval.decide(true, user);
    }
    approval
}

/// Run the build pipeline once, if the event matches a configured trigger.
pub async fn run(
    config: &CliConfig,
    event: TriggerEvent,
    approve: bool,
    arm: bool,
    json: bool,
) -> anyhow::Result<bool> {
    let definition = &config.definition;
    let orchestrator = Orchestrator::new(
        definition.clone(),
        toolchain(config)?,
        Arc::new(LocalEventBus::new()),
    )?
    .arm_release(arm);

    let approval = environment_approval(definition, approve);
    info!(
        environment = %approval.environment,
        status = ?approval.status,
        "Release environment"
    );

    let Some(report) = orchestrator.handle_trigger(event.clone(), approval.status).await else {
        println!(
            "{} No trigger of \"{}\" matches this {} event, nothing to run",
            style("i").blue(),
            definition.name,
            event.trigger_type()
        );
        return Ok(true);
    };
    print_report(&report, json)?;
    Ok(report.success())
}

/// Install the published package from the index and run its tests.
pub async fn regress(config: &CliConfig, json: bool) -> anyhow::Result<bool> {
    let definition = &config.definition;
    let Some(regression) = definition.regression.clone() else {
        bail!("Pipeline \"{}\" has no regression section", definition.name);
    };
    let toolchain = toolchain(config)?;
    let runner = RegressionRunner::new(
        format!("{}-regression", definition.name),
        regression,
        definition.release.index.clone(),
        toolchain.workspaces.clone(),
        toolchain.verifier(definition),
        Arc::new(LocalEventBus::new()),
    )?;

    let report = runner.run().await;
    print_report(&report, json)?;
    Ok(report.success())
}

/// Show upcoming regression run times.
pub fn schedule(config: &CliConfig, count: usize) -> anyhow::Result<bool> {
    let Some(regression) = &config.definition.regression else {
        println!("{} No regression schedule configured", style("i").blue());
        return Ok(true);
    };
    let spec = ScheduleSpec::parse(&regression.cron)?;

    println!("Regression schedule: {}", style(spec.expression()).bold());
    let mut after = Utc::now();
    for _ in 0..count {
        let Some(next) = spec.next_after(after) else {
            break;
        };
        println!("  {}", next.to_rfc3339());
        after = next;
    }
    Ok(true)
}

fn toolchain(config: &CliConfig) -> anyhow::Result<Toolchain> {
    let definition = &config.definition;
    let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessExecutor::new());

    let identity: Arc<dyn IdentityTokenSource> = match ActionsIdentityToken::from_env() {
        Some(source) => Arc::new(source),
        None => Arc::new(EnvIdentityToken::new(IDENTITY_TOKEN_VAR)),
    };
    let source_builder = SourceBuildCommand::new(executor.clone(), definition.sdist.command.clone())
        .context("Invalid sdist command")?;

    info!(
        project = %config.project_dir.display(),
        workspaces = %config.workspace_dir.display(),
        artifacts = %config.artifact_dir.display(),
        "Using directories"
    );

    Ok(Toolchain {
        workspaces: Arc::new(
            LocalWorkspaceProvisioner::new(&config.workspace_dir, &config.project_dir)
                .keep_workspaces(config.keep_workspaces),
        ),
        dependencies: Arc::new(
            SystemDependencyInstaller::new(executor.clone()).with_sudo(config.use_sudo),
        ),
        compiler: Arc::new(CibuildwheelTool::new(
            executor.clone(),
            definition.wheels.build.program.clone(),
        )),
        source_builder: Arc::new(source_builder),
        runtimes: Arc::new(VenvProvisioner::new(executor.clone())),
        installer: Arc::new(PipInstaller::new(executor.clone())),
        tests: Arc::new(PytestRunner::new(executor.clone())),
        store: Arc::new(FilesystemStore::new(&config.artifact_dir)),
        identity,
        exchange: Arc::new(MintTokenExchange::new(
            definition.release.index.mint_token_url.clone(),
        )),
        publisher: Arc::new(TwineUploader::new(executor)),
    })
}

fn print_report(report: &PipelineReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let marker = if report.success() {
        style("✓").green()
    } else {
        style("✗").red()
    };
    println!(
        "{} {} ({}) finished in {}ms",
        marker,
        style(&report.pipeline_name).bold(),
        report.trigger.trigger_type,
        report.duration_ms()
    );
    for job in &report.jobs {
        print_job(job);
    }

    match &report.release {
        ReleaseStatus::Disabled => println!("  release: {}", style("disabled").dim()),
        ReleaseStatus::NotEligible { reason } => {
            println!("  release: {} ({})", style("skipped").yellow(), reason)
        }
        ReleaseStatus::Published { uploaded, skipped } => println!(
            "  release: {} ({} uploaded, {} already present)",
            style("published").green(),
            uploaded.len(),
            skipped.len()
        ),
        ReleaseStatus::Failed { message } => {
            println!("  release: {} ({})", style("failed").red(), message)
        }
    }
    Ok(())
}

fn print_job(job: &JobReport) {
    match &job.failure {
        None => {
            let files = job
                .artifact
                .as_ref()
                .map(|a| a.file_names().join(", "))
                .unwrap_or_default();
            println!("    {} {} {}", style("✓").green(), job.name, style(files).dim());
        }
        Some(failure) => {
            println!(
                "    {} {} [{} at {}] {}",
                style("✗").red(),
                job.name,
                failure.kind,
                failure.step,
                failure.message
            );
            for test in &job.slowest_tests {
                println!("        {:>8.2}s {}", test.seconds, test.name);
            }
        }
    }
}
