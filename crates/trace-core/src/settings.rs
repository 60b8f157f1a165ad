use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::models::DimensionPolicy;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Demultiplex sensor logs into per-sensor time series and compute windowed statistics
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sensor-trace",
    about = "Demultiplex sensor logs into per-sensor time series and compute windowed statistics",
    version
)]
pub struct Settings {
    #[command(subcommand)]
    pub command: Command,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path (in addition to stderr)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Parse log files into per-sensor time series (JSON on stdout)
    Parse(ParseArgs),
    /// Compute running means and standard deviations for a JSON stats request
    Stats(StatsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    /// Log files or directories to scan
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Built-in preset (google, single) or the name of a saved schema
    #[arg(long)]
    pub preset: Option<String>,

    /// Schema JSON file (takes precedence over --preset)
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// What to do with a line whose value count disagrees with its sensor
    #[arg(long, default_value = "skip", value_parser = ["skip", "abort"])]
    pub dimension_policy: String,

    /// Maximum number of files parsed concurrently (1-64)
    #[arg(long, default_value = "4", value_parser = clap::value_parser!(u32).range(1..=64))]
    pub jobs: u32,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// JSON file holding `{avg_period, stdev_period, <channel>: [values...]}`
    #[arg(long)]
    pub request: PathBuf,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments and apply the `--debug` override.
    pub fn load() -> Self {
        Self::resolve(Settings::parse())
    }

    /// Same as [`Settings::load`] but from an explicit argument list,
    /// enabling unit-testing without spawning subprocesses.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Settings::try_parse_from(args).map(Self::resolve)
    }

    /// `--debug` overrides the log level.
    fn resolve(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

impl ParseArgs {
    /// The dimension policy selected on the command line.
    pub fn dimension_policy(&self) -> DimensionPolicy {
        DimensionPolicy::from_name(&self.dimension_policy).unwrap_or_default()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
