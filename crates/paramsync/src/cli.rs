//! Clap derive structures for the `paramsync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// paramsync -- optimistic parameter state synchronization
#[derive(Debug, Parser)]
#[command(
    name = "paramsync",
    version,
    about = "Drive and inspect the paramsync parameter engine",
    long_about = "Keeps a local, optimistically-updated mirror of a remote engine's\n\
        parameters. The demo command runs the engine against an in-process\n\
        loopback peer and shows every reconciliation step.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "PARAMSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one `id=value` per line (scripting)
    Plain,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the engine against a loopback peer and report the result
    Demo(DemoArgs),

    /// Inspect or create the configuration file
    #[command(alias = "cfg")]
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct DemoArgs {
    /// Snapshot attempts the peer rejects on every (re)connect
    #[arg(long, default_value = "2")]
    pub fail_snapshots: u32,

    /// Give up waiting for the engine after this many seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Skip the change log and print only the final parameters
    #[arg(long)]
    pub no_changes: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (defaults, file and environment)
    Show,

    /// Print the config file path
    Path,

    /// Write a config file populated with the defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
