//! CLI command definitions.

use clap::{Subcommand, ValueEnum};
use wheelwright_core::pipeline::TriggerType;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the pipeline definition
    Validate,

    /// Print the expanded build matrix
    Plan {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the build pipeline once
    Run {
        /// Event that started the run
        #[arg(short, long, value_enum, default_value_t = TriggerKind::Manual)]
        trigger: TriggerKind,

        /// Git ref the run builds, e.g. refs/tags/v1.2.0
        #[arg(long = "ref", env = "GITHUB_REF")]
        git_ref: Option<String>,

        /// Branch a pull request targets
        #[arg(long, env = "GITHUB_BASE_REF")]
        base: Option<String>,

        /// Grant the release environment approval
        #[arg(long)]
        approve: bool,

        /// Arm the release gate even when the definition leaves it disabled
        #[arg(long)]
        arm: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install the published package from the index and run its tests
    Regress {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show upcoming regression run times
    Schedule {
        /// Number of fire times to show
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },

    /// Print the JSON Schema of the pipeline definition
    Schema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerKind {
    Manual,
    PullRequest,
    Push,
    Release,
}

impl From<TriggerKind> for TriggerType {
    fn from(kind: TriggerKind) -> Self {
        match kind {
            TriggerKind::Manual => TriggerType::Manual,
            TriggerKind::PullRequest => TriggerType::PullRequest,
            TriggerKind::Push => TriggerType::Push,
            TriggerKind::Release => TriggerType::Release,
        }
    }
}
