//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "encoder", version, about = "Encoder axis CLI (simulated backend)")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit results as JSON lines instead of key: value text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Count the simulated sensor reports at mechanical angle zero
    #[arg(long, value_name = "COUNTS", default_value_t = 0)]
    pub sim_zero_count: i32,

    /// True resolution of the simulated sensor, independent of the
    /// configured cpr
    #[arg(long, value_name = "COUNTS", default_value_t = 8192)]
    pub sim_cpr: i32,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Measure the electrical-zero offset (index search first when configured)
    Calibrate,
    /// Determine the motor-to-sensor counting direction
    DirectionFind,
    /// Spin until the index pulse rebases the count origin
    IndexSearch,
    /// Track a constant-speed spin of the simulated shaft and report estimates
    Estimate {
        /// Mechanical travel in revolutions
        #[arg(long, default_value_t = 1.0)]
        turns: f64,
        /// Estimation ticks to spread the travel over
        #[arg(long, default_value_t = 8000)]
        ticks: u32,
    },
    /// Quick health check (config parses, simulated axis builds)
    SelfCheck,
}
