//! CLI interface and argument parsing
//!
//! Exit codes:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0    | Every unit written |
//! | 1    | Finished with failed units |
//! | 2    | Configuration or planning error |
//! | 4    | Analytics API or store unreachable, discovery failed |
//! | 5    | Fatal error |
//! | 130  | Interrupted by a signal |

pub mod commands;

use crate::core::export::AggregateResult;
use crate::domain::{QuarryError, StorageError};
use clap::{Parser, Subcommand};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_CONNECTION: i32 = 4;
pub const EXIT_FATAL: i32 = 5;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Quarry - parallel analytics exporter
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(version, about, long_about = None)]
#[command(author = "Quarry Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "quarry.toml", env = "QUARRY_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "QUARRY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export events or profiles into the configured destination
    Export(commands::export::ExportArgs),

    /// Re-export the failed units of an earlier run
    Retry(commands::retry::RetryArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

/// Exit code for an error that ended a command
pub fn exit_code_for(error: &QuarryError) -> i32 {
    match error {
        QuarryError::Configuration(_) | QuarryError::Planning(_) | QuarryError::Validation(_) => {
            EXIT_CONFIG
        }
        QuarryError::Discovery(_)
        | QuarryError::Source(_)
        | QuarryError::Storage(StorageError::ConnectionFailed(_)) => EXIT_CONNECTION,
        _ => EXIT_FATAL,
    }
}

/// Exit code for a run that finished
pub fn exit_code_for_result(result: &AggregateResult) -> i32 {
    if result.interrupted {
        EXIT_INTERRUPTED
    } else if result.has_failures() {
        EXIT_PARTIAL
    } else {
        EXIT_SUCCESS
    }
}
