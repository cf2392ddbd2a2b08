//! Wheelwright CLI entrypoint.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;


use commands::Commands;
use config::CliConfig;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "wheelwright")]
#[command(author, version, about = "Build, verify and release Python wheels", long_about = None)]
struct Cli {
    /// Path to the pipeline file (searched for when omitted)
    #[arg(short, long, global = true, env = "WHEELWRIGHT_PIPELINE")]
    file: Option<PathBuf>,

    /// Directory that per-job workspaces are created under
    #[arg(long, global = true, env = "WHEELWRIGHT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Directory the artifact store keeps collected files in
    #[arg(long, global = true, env = "WHEELWRIGHT_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,

    /// Leave job workspaces on disk after each job
    #[arg(long, global = true, env = "WHEELWRIGHT_KEEP_WORKSPACES")]
    keep_workspaces: bool,

    /// Run system package managers without sudo
    #[arg(long, global = true)]
    no_sudo: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Commands::Schema = cli.command {
        handlers::schema()?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = CliConfig::resolve(cli.file, cli.workspace, cli.artifact_dir)?;
    config.keep_workspaces = cli.keep_workspaces;
    config.use_sudo = !cli.no_sudo;

    let ok = match cli.command {
        Commands::Validate => handlers::validate(&config)?,
        Commands::Plan { json } => handlers::plan(&config, json)?,
        Commands::Run {
            trigger,
            git_ref,
            base,
            approve,
            arm,
            json,
        } => {
            let event = handlers::trigger_event(
                trigger,
                git_ref.as_deref(),
                base.as_deref(),
                std::env::var("USER").ok(),
            )?;
            handlers::run(&config, event, approve, arm, json).await?
        }
        Commands::Regress { json } => handlers::regress(&config, json).await?,
        Commands::Schedule { count } => handlers::schedule(&config, count)?,
        Commands::Schema => true,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use commands::TriggerKind;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_release_run() {
        let cli = Cli::try_parse_from([
            "wheelwright",
            "run",
            "--trigger",
            "release",
            "--ref",
            "refs/tags/v2.0.0",
            "--approve",
        ])
        .unwrap();
        assert!(!cli.keep_workspaces);
        assert!(!cli.no_sudo);
        match cli.command {
            Commands::Run {
                trigger,
                git_ref,
                base,
                approve,
                arm,
                ..
            } => {
                assert_eq!(trigger, TriggerKind::Release);
                assert_eq!(git_ref.as_deref(), Some("refs/tags/v2.0.0"));
                assert_eq!(base, None);
                assert!(approve);
                assert!(!arm);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_pull_request_run_with_host_flags() {
        let cli = Cli::try_parse_from([
            "wheelwright",
            "--keep-workspaces",
            "run",
            "--trigger",
            "pull-request",
            "--ref",
            "refs/heads/feature/simd",
            "--base",
            "main",
            "--no-sudo",
        ])
        .unwrap();
        assert!(cli.keep_workspaces);
        assert!(cli.no_sudo);
        match cli.command {
            Commands::Run { trigger, base, .. } => {
                assert_eq!(trigger, TriggerKind::PullRequest);
                assert_eq!(base.as_deref(), Some("main"));
            }
            _ => panic!("expected run"),
        }
    }
}
