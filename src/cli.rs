use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vigil", about = "Monitoring deployment provisioning wizard")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "vigil.toml")]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Auto)]
    pub output: OutputFormat,

    /// Keep step log lines visible after each step completes
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress step log lines
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create vigil.toml via the interactive wizard
    Init {
        /// Skip the wizard and write a default config
        #[arg(long)]
        defaults: bool,
    },

    /// Show the install sequence without executing it
    Plan,

    /// Provision the deployment
    Install {
        /// Seed for the simulated backend (reproducible runs)
        #[arg(long)]
        seed: Option<u64>,

        /// Give up after a step fails this many attempts
        /// (default: retry indefinitely)
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Show the last recorded deployment
    Status,

    /// Show install run logs
    Log {
        /// Show the most recent failed run
        #[arg(long)]
        failed: bool,

        /// List all completed runs
        #[arg(long)]
        all: bool,

        /// Show the vigil debug log instead of run transcripts
        #[arg(long)]
        debug: bool,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Interactive on a TTY, plain otherwise
    Auto,
    Interactive,
    Plain,
    Json,
}
