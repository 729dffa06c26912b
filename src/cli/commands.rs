//! Command-line grammar for the `cairn` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Declare resources, preview the changes, apply them in dependency order.
#[derive(Parser, Debug)]
#[command(name = "cairn")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Declaration file; searched upward from the working directory when omitted.
    #[arg(short, long, global = true, env = "CAIRN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level (overridden by CAIRN_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// How results are printed on stdout.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// What to do.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter `cairn.yaml` and `.env.example`.
    Init {
        /// Target directory.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite files that already exist.
        #[arg(short, long)]
        force: bool,
    },

    /// Check the declarations without touching state.
    Validate {
        /// Also print warnings.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show what `apply` would change.
    #[command(alias = "plan")]
    Preview {
        /// Show dependencies and changed properties.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Create, update and delete resources to match the declarations.
    Apply {
        /// Do not ask before applying.
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete every recorded resource.
    Destroy {
        /// Do not ask before destroying.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the recorded stack outputs.
    Outputs,

    /// Inspect or repair the recorded state.
    State {
        /// What to do with the state.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// Subcommands of `cairn state`.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Print the recorded resources and outputs.
    Show,

    /// Show recent runs.
    History {
        /// Most recent runs to print.
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Release a lock left behind by an interrupted run.
    Unlock {
        /// Release the lock with this id.
        #[arg(long)]
        lock_id: Option<String>,

        /// Release whatever lock is held, expired or not.
        #[arg(long)]
        force: bool,
    },
}

/// Rendering of command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Tables and colored text.
    #[default]
    Text,
    /// One JSON document.
    Json,
}

impl Cli {
    /// Parses `std::env::args`, exiting on usage errors.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply_with_json_output() {
        let cli = Cli::try_parse_from(["cairn", "apply", "--yes", "--output", "json"]).expect("parse");
        assert!(matches!(cli.command, Commands::Apply { yes: true }));
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn test_plan_is_an_alias_for_preview() {
        let cli = Cli::try_parse_from(["cairn", "plan"]).expect("parse");
        assert!(matches!(cli.command, Commands::Preview { detailed: false }));
    }

    #[test]
    fn test_state_unlock_flags() {
        let cli = Cli::try_parse_from(["cairn", "state", "unlock", "--force"]).expect("parse");
        assert!(matches!(
            cli.command,
            Commands::State {
                command: StateCommands::Unlock { lock_id: None, force: true }
            }
        ));
    }
}
