//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Converge - declarative resource reconciliation.
#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "CONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new project.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Compute and display the plan without changing anything.
    Plan {
        /// Plan the destruction of everything in state.
        #[arg(long)]
        destroy: bool,

        /// Replace a resource even if it is unchanged (TYPE.NAME).
        #[arg(long, value_name = "KEY")]
        replace: Vec<String>,

        /// Show attribute-level changes.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Compute the plan and apply it.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Maximum number of concurrent provider operations.
        #[arg(short, long)]
        parallelism: Option<usize>,

        /// Keep applying independent resources after a failure.
        #[arg(long)]
        continue_on_error: bool,

        /// Replace a resource even if it is unchanged (TYPE.NAME).
        #[arg(long, value_name = "KEY")]
        replace: Vec<String>,
    },

    /// Destroy every resource recorded in state.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Read every recorded object and update state.
    Refresh,

    /// Show the dependency graph layer by layer.
    Graph,

    /// Inspect and edit state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// List recorded resources.
    List,

    /// Show one recorded resource.
    Show {
        /// Resource key (TYPE.NAME).
        key: String,
    },

    /// Forget a resource without destroying it.
    Rm {
        /// Resource key (TYPE.NAME).
        key: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
