//! Command-line interface definitions.

pub mod check;
pub mod output;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// msgload - Load generator for message brokers.
#[derive(Parser, Debug)]
#[command(name = "msgload")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a load test against the in-process broker
    Run(RunArgs),

    /// Run diagnostic checks
    #[command(subcommand)]
    Check(CheckCommand),
}

/// Subcommands for `msgload check`
#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Validate configuration file
    Config(ConfigPathArg),
}

/// Shared argument for commands that only need a config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override number of producer workers
    #[arg(long)]
    pub producers: Option<usize>,

    /// Override number of consumer workers
    #[arg(long)]
    pub consumers: Option<usize>,

    /// Override run duration in seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Throttle producers to this many messages/second in aggregate
    #[arg(long)]
    pub rate: Option<u64>,

    /// Override log level (debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Use JSON log format instead of pretty
    #[arg(long)]
    pub json_logs: bool,
}
