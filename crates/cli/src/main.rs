//! # synccap
//!
//! Command-line entry point.
//!
//! Provides:
//! - Synchronized recording sessions (`record`, `info`)
//! - Offline recording checks (`validate`, `sync-check`, `dump`)
//! - Constant-rate re-encoding (`encode`)
//!
//! Exit codes: 0 pass, 1 fail, 2 error.

mod cli;
mod commands;
mod error;

use std::process::ExitCode;

use clap::Parser;
use observability::ObservabilityConfig;
use tracing::{error, info};

use cli::{Cli, Commands};
use commands::{run_dump, run_encode, run_info, run_record, run_sync_check, run_validate};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: (cli.metrics_port != 0).then_some(cli.metrics_port),
        default_log_level: cli.default_log_level().to_string(),
    };
    if let Err(e) = observability::init_with_config(config) {
        eprintln!("Error: {e:#}");
        return commands::Verdict::exit_error();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "synccap starting");

    let result = match &cli.command {
        Commands::Record(args) => run_record(args).await,
        Commands::Info(args) => run_info(args),
        Commands::Validate(args) => run_validate(args),
        Commands::SyncCheck(args) => run_sync_check(args),
        Commands::Dump(args) => run_dump(args),
        Commands::Encode(args) => run_encode(args),
    };

    match result {
        Ok(verdict) => verdict.exit_code(),
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("Error: {e:#}");
            commands::Verdict::exit_error()
        }
    }
}
