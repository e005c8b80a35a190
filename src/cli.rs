// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `dagrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagrun",
    version,
    about = "Run DAGs of shell steps and keep track of their runs.",
    long_about = None
)]
pub struct CliArgs {
    /// Home directory holding `settings.toml` and the status history.
    ///
    /// If omitted, `DAGRUN_HOME` or `~/.dagrun` is used.
    #[arg(long, value_name = "DIR", global = true)]
    pub home: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the DAG in this process until it finishes.
    Start {
        /// Path to the DAG definition (TOML).
        dag: PathBuf,
        /// Parameter string; defaults to the DAG's `params`.
        #[arg(long, allow_hyphen_values = true)]
        params: Option<String>,
        /// Use this request id instead of generating one.
        #[arg(long, value_name = "ID")]
        request_id: Option<String>,
    },
    /// Print the current status as JSON.
    Status { dag: PathBuf },
    /// Ask the running process to cancel the run.
    Stop { dag: PathBuf },
    /// Stop the current run, wait for it to end, then start again.
    Restart {
        dag: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        params: Option<String>,
    },
    /// Start a new run with the parameters of an earlier one.
    Retry {
        dag: PathBuf,
        /// Request id of the run to repeat.
        #[arg(long = "req", value_name = "ID")]
        request_id: String,
    },
    /// Print the most recent runs as JSON, newest first.
    History {
        dag: PathBuf,
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// Parse + validate, print the steps, but don't execute anything.
    DryRun { dag: PathBuf },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
