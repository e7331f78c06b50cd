//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// synccap - synchronized multi-camera recording
#[derive(Parser, Debug)]
#[command(
    name = "synccap",
    author,
    version,
    about = "Synchronized multi-camera recording and recording validation",
    long_about = "Records from several cameras whose clocks are disciplined to a shared \n\
                  reference, starting them all on one scheduled trigger instant, and \n\
                  validates the resulting raw recordings offline.\n\n\
                  Exit codes: 0 pass, 1 fail, 2 error."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SYNCCAP_VERBOSE")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (logs go to stderr)
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SYNCCAP_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Prometheus metrics port (0 = disabled)
    #[arg(long, default_value = "0", global = true, env = "SYNCCAP_METRICS_PORT")]
    pub metrics_port: u16,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Filter used when `RUST_LOG` is not set
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a recording session
    Record(RecordArgs),

    /// Show a session configuration and its disk estimate
    Info(InfoArgs),

    /// Check the raw recordings of a session directory (V1..V8)
    Validate(ValidateArgs),

    /// Compare per-frame timestamps across devices
    SyncCheck(SyncCheckArgs),

    /// Print the headers of one raw file
    Dump(DumpArgs),

    /// Re-encode one device's raw files at a constant frame rate
    Encode(EncodeArgs),
}

/// Arguments for the `record` command
#[derive(Parser, Debug, Clone)]
pub struct RecordArgs {
    /// Path to session configuration (TOML or JSON)
    #[arg(short, long, default_value = "session.toml", env = "SYNCCAP_CONFIG")]
    pub config: PathBuf,

    /// Override recording duration in seconds
    #[arg(long, env = "SYNCCAP_DURATION")]
    pub duration: Option<f64>,

    /// Override delay in seconds before the first trigger
    #[arg(long, env = "SYNCCAP_START_DELAY")]
    pub start_delay: Option<f64>,

    /// Override output format
    #[arg(long, value_enum, env = "SYNCCAP_FORMAT")]
    pub format: Option<OutputFormatArg>,

    /// Override the parent directory for session directories
    #[arg(long, env = "SYNCCAP_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Load and check the configuration, print the plan, then exit
    #[arg(long)]
    pub dry_run: bool,

    /// Print the recording report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to session configuration
    #[arg(short, long, default_value = "session.toml", env = "SYNCCAP_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Session directory
    pub session_dir: PathBuf,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `sync-check` command
#[derive(Parser, Debug)]
pub struct SyncCheckArgs {
    /// Session directory
    pub session_dir: PathBuf,

    /// Maximum allowed per-frame spread in milliseconds
    #[arg(long, default_value_t = validation::DEFAULT_THRESHOLD_MS)]
    pub threshold_ms: f64,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `dump` command
#[derive(Parser, Debug)]
pub struct DumpArgs {
    /// Raw file
    pub raw_file: PathBuf,

    /// List every frame header
    #[arg(long)]
    pub all: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `encode` command
#[derive(Parser, Debug)]
pub struct EncodeArgs {
    /// Session directory
    pub session_dir: PathBuf,

    /// Device serial to encode
    #[arg(long)]
    pub serial: String,

    /// Output frame rate
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,

    /// Session configuration supplying the transcoder settings
    #[arg(short, long, env = "SYNCCAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the frame plan without encoding
    #[arg(long)]
    pub dry_run: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

/// Output format override
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormatArg {
    /// Split raw files
    Raw,
    /// Piped into the transcoder
    Transcoded,
}

impl From<OutputFormatArg> for contracts::OutputFormat {
    fn from(format: OutputFormatArg) -> Self {
        match format {
            OutputFormatArg::Raw => Self::Raw,
            OutputFormatArg::Transcoded => Self::Transcoded,
        }
    }
}
