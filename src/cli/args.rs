//! Command-line argument definitions for the QC runner
//!
//! Uses the clap derive API. Input files are CSV tables with a header row;
//! the configuration may be JSON or YAML.

use crate::config::EngineSettings;
use crate::constants::{DEFAULT_OUTPUT_DIR, RESULTS_FILE_SUFFIX, columns};
use crate::error::{QcError, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// Run QARTOD quality-control tests over tabular observation files
#[derive(Debug, Clone, Parser)]
#[command(
    name = "qartod-qc",
    version,
    about = "Run QARTOD quality-control tests over observation files",
    long_about = "Evaluates a QC configuration (JSON or YAML) against CSV observation \
                  files and writes one flag column per stream and test, plus a per-stream \
                  rollup, to CSV or Parquet. Each results file gets a sidecar holding the \
                  configuration that produced it."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run a QC configuration against one or more input files
    Run(RunArgs),
    /// Parse a QC configuration and report what it contains
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Debug, Clone, Parser)]
pub struct RunArgs {
    /// Input CSV files or glob patterns
    #[arg(value_name = "INPUT", required = true, help = "Input CSV files or glob patterns")]
    pub inputs: Vec<String>,

    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        help = "QC configuration file (.json, .yaml or .yml)"
    )]
    pub config: PathBuf,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "DIR",
        default_value = DEFAULT_OUTPUT_DIR,
        help = "Directory for results files"
    )]
    pub output: PathBuf,

    #[arg(
        short = 'f',
        long = "format",
        value_enum,
        default_value = "parquet",
        help = "Results file format"
    )]
    pub format: ResultFormat,

    /// Number of files processed concurrently; defaults to the CPU count
    #[arg(short = 'j', long = "jobs", value_name = "N", help = "Files to process concurrently")]
    pub jobs: Option<usize>,

    #[arg(long = "time-column", value_name = "NAME", default_value = columns::TIME)]
    pub time_column: String,

    #[arg(long = "z-column", value_name = "NAME", default_value = columns::Z)]
    pub z_column: String,

    #[arg(long = "lat-column", value_name = "NAME", default_value = columns::LAT)]
    pub lat_column: String,

    #[arg(long = "lon-column", value_name = "NAME", default_value = columns::LON)]
    pub lon_column: String,

    /// Point geometry column used when the lat/lon columns are absent
    #[arg(long = "geom-column", value_name = "NAME", default_value = columns::GEOM)]
    pub geom_column: String,

    #[arg(long = "no-values", help = "Store only flag and axis columns")]
    pub no_values: bool,

    #[arg(long = "no-rollup", help = "Skip the per-stream rollup column")]
    pub no_rollup: bool,

    #[arg(long = "no-timestamp-checks", help = "Do not warn about unsorted timestamps")]
    pub no_timestamp_checks: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

/// Arguments for the `validate` command
#[derive(Debug, Clone, Parser)]
pub struct ValidateArgs {
    #[arg(value_name = "CONFIG", help = "QC configuration file to check")]
    pub config: PathBuf,

    /// Print the configuration in canonical form after parsing
    #[arg(long = "show", help = "Print the canonical configuration")]
    pub show: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Enable verbose logging (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResultFormat {
    Csv,
    Parquet,
}

impl ResultFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ResultFormat::Csv => "csv",
            ResultFormat::Parquet => "parquet",
        }
    }
}

/// Map a `-v` count to a tracing level
fn log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

impl RunArgs {
    pub fn get_log_level(&self) -> &'static str {
        log_level(self.verbose, self.quiet)
    }

    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::new()
            .with_time_column(&self.time_column)
            .with_z_column(&self.z_column)
            .with_position_columns(&self.lat_column, &self.lon_column)
            .with_geom_column(&self.geom_column);
        if self.no_values {
            settings = settings.without_values();
        }
        if self.no_timestamp_checks {
            settings = settings.without_timestamp_checks();
        }
        settings
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == Some(0) {
            return Err(QcError::configuration("--jobs", "must be at least 1"));
        }
        self.engine_settings().validate()
    }

    /// Expand the input patterns into a sorted, de-duplicated file list
    pub fn input_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for pattern in &self.inputs {
            let paths = glob::glob(pattern)
                .map_err(|e| QcError::configuration(pattern.clone(), e.to_string()))?;
            for entry in paths {
                let path = entry.map_err(|e| QcError::Io(e.into()))?;
                if path.is_file() {
                    files.push(path);
                }
            }
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Results path for an input: `<output>/<stem>_qc.<ext>`
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results".to_string());
        self.output.join(format!(
            "{}{}.{}",
            stem,
            RESULTS_FILE_SUFFIX,
            self.format.extension()
        ))
    }
}

impl ValidateArgs {
    pub fn get_log_level(&self) -> &'static str {
        log_level(self.verbose, false)
    }
}
