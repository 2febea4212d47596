//! Command implementations for the QC runner
//!
//! `run` evaluates a configuration against every input file, a bounded number
//! at a time, and writes one results file per input. `validate` parses a
//! configuration and reports its shape.

use crate::cli::args::{Args, Commands, RunArgs, ValidateArgs};
use crate::config::{Config, EngineSettings};
use crate::error::Result;
use crate::results::{FlagCounts, StreamSummary, collect_results, rollup, summarize_flags};
use crate::store::{ResultStore, StoredResults};
use crate::streams::{FrameStream, StreamSource};
use anyhow::Context;
use colored::Colorize;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Outcome of running the configuration over one input file
#[derive(Debug, Clone)]
pub struct FileReport {
    pub input: PathBuf,
    pub stored: StoredResults,
    /// Per-stream counts over the individual tests, before rollup
    pub summaries: Vec<StreamSummary>,
}

/// Dispatch a parsed command line
pub async fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Some(Commands::Run(run_args)) => run_command(run_args).await,
        Some(Commands::Validate(validate_args)) => validate_command(validate_args),
        None => Ok(()),
    }
}

/// Set up structured logging on stderr
///
/// `RUST_LOG` takes precedence over the level derived from `-v`/`-q`.
pub fn setup_logging(log_level: &str, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("qartod_qc={}", log_level)));

    let layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr);

    let installed = if quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_timer(fmt::time::uptime()))
            .try_init()
    };

    // A subscriber is already set when commands run more than once per process
    if installed.is_ok() {
        debug!("Logging initialized at level: {}", log_level);
    }
}

/// Evaluate `config` over one CSV file and store the flags at `output`
pub fn process_file(
    input: &Path,
    output: &Path,
    config: &Config,
    settings: EngineSettings,
    with_rollup: bool,
) -> Result<FileReport> {
    let source = FrameStream::read_csv(input, settings.clone())?;
    let mut collected = collect_results(source.run(config))?;
    let summaries = summarize_flags(&collected);

    if with_rollup {
        let mut rolled = Vec::new();
        for stream_id in config.stream_ids() {
            if let Some(result) = rollup(&collected, stream_id)? {
                rolled.push(result);
            }
        }
        collected.extend(rolled);
    }

    if collected.is_empty() {
        warn!("No configured stream was found in {}", input.display());
    }

    let stored = ResultStore::new(settings).write(&collected, config, output)?;
    Ok(FileReport {
        input: input.to_path_buf(),
        stored,
        summaries,
    })
}

async fn run_command(args: RunArgs) -> anyhow::Result<()> {
    setup_logging(args.get_log_level(), args.quiet);
    args.validate()?;
    let start = Instant::now();

    let config = Config::from_path(&args.config)
        .with_context(|| {
            format!("Failed to load QC configuration from {}", args.config.display())
        })?;
    info!(
        "Loaded {} context(s) with {} test(s) from {}",
        config.contexts().len(),
        config.test_count(),
        args.config.display()
    );

    let files = args.input_files()?;
    if files.is_empty() {
        anyhow::bail!("No input files matched {}", args.inputs.join(", "));
    }
    tokio::fs::create_dir_all(&args.output)
        .await
        .with_context(|| format!("Failed to create output directory {}", args.output.display()))?;

    let jobs = args.jobs();
    info!("Processing {} file(s) with {} concurrent job(s)", files.len(), jobs);

    let config = Arc::new(config);
    let settings = args.engine_settings();
    let with_rollup = !args.no_rollup;
    let progress = create_progress_bar(files.len() as u64, args.quiet);

    let outcomes: Vec<(PathBuf, anyhow::Result<FileReport>)> = stream::iter(files)
        .map(|input| {
            let output = args.output_path(&input);
            let config = Arc::clone(&config);
            let settings = settings.clone();
            async move {
                let task_input = input.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    process_file(&task_input, &output, &config, settings, with_rollup)
                })
                .await
                .context("QC task panicked")
                .and_then(|result| result.map_err(anyhow::Error::from));
                (input, outcome)
            }
        })
        .buffer_unordered(jobs)
        .inspect(|(input, _)| {
            progress.set_message(input.display().to_string());
            progress.inc(1);
        })
        .collect()
        .await;

    progress.finish_and_clear();

    let mut failed = 0;
    let mut totals = FlagCounts::default();
    for (input, outcome) in &outcomes {
        match outcome {
            Ok(report) => {
                for summary in &report.summaries {
                    totals.pass += summary.counts.pass;
                    totals.not_evaluated += summary.counts.not_evaluated;
                    totals.suspect += summary.counts.suspect;
                    totals.fail += summary.counts.fail;
                    totals.missing += summary.counts.missing;
                }
                if !args.quiet {
                    print_file_report(report);
                }
            }
            Err(e) => {
                failed += 1;
                error!("{}: {:#}", input.display(), e);
                eprintln!("{} {}: {:#}", "✗".red(), input.display(), e);
            }
        }
    }

    if !args.quiet {
        println!();
        println!(
            "{} {} file(s) in {:.2}s, {} failed",
            "Processed".bold(),
            outcomes.len(),
            start.elapsed().as_secs_f64(),
            failed
        );
        println!("  {}", format_counts(&totals));
    }

    if failed > 0 {
        anyhow::bail!("{} of {} file(s) failed", failed, outcomes.len());
    }
    Ok(())
}

fn validate_command(args: ValidateArgs) -> anyhow::Result<()> {
    setup_logging(args.get_log_level(), false);

    let config = Config::from_path(&args.config)
        .with_context(|| format!("Invalid QC configuration {}", args.config.display()))?;

    println!("{} {}", "✓".green(), args.config.display());
    println!("  contexts: {}", config.contexts().len());
    println!("  streams:  {}", config.stream_ids().join(", "));
    println!("  tests:    {}", config.test_count());

    if args.show {
        println!();
        print!("{}", config.to_yaml()?);
    }
    Ok(())
}

fn create_progress_bar(total: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar
}

fn print_file_report(report: &FileReport) {
    println!(
        "{} {} → {} ({} rows, {} flag columns)",
        "✓".green(),
        report.input.display(),
        report.stored.path.display(),
        report.stored.rows,
        report.stored.flag_columns
    );
    for summary in &report.summaries {
        println!(
            "    {:<24} {} test(s)  {}",
            summary.stream_id,
            summary.tests,
            format_counts(&summary.counts)
        );
    }
}

fn format_counts(counts: &FlagCounts) -> String {
    let fail = format!("fail={}", counts.fail);
    let suspect = format!("suspect={}", counts.suspect);
    format!(
        "{} {} {} not_evaluated={} missing={}",
        format!("pass={}", counts.pass).green(),
        if counts.suspect > 0 { suspect.yellow() } else { suspect.normal() },
        if counts.fail > 0 { fail.red() } else { fail.normal() },
        counts.not_evaluated,
        counts.missing
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::ResultFormat;
    use clap::Parser;

    const CONFIG: &str = r#"
sea_water_temperature:
  qartod:
    gross_range_test:
      fail_span: [0, 40]
      suspect_span: [5, 30]
"#;

    const CSV: &str = "time,sea_water_temperature\n\
2024-01-01T00:00:00Z,10.0\n\
2024-01-01T01:00:00Z,2.0\n\
2024-01-01T02:00:00Z,45.0\n";

    fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
        let config = dir.join("qc.yaml");
        let input = dir.join("buoy.csv");
        std::fs::write(&config, CONFIG).unwrap();
        std::fs::write(&input, CSV).unwrap();
        (config, input)
    }

    #[test]
    fn test_process_file_writes_flags_and_rollup() {
        let dir = tempfile::tempdir().unwrap();
        let (config_path, input) = write_inputs(dir.path());
        let config = Config::from_path(&config_path).unwrap();
        let output = dir.path().join("out").join("buoy_qc.csv");

        let report =
            process_file(&input, &output, &config, EngineSettings::default(), true).unwrap();
        assert_eq!(report.stored.rows, 3);
        assert_eq!(report.stored.flag_columns, 2);
        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.summaries[0].counts.pass, 1);
        assert_eq!(report.summaries[0].counts.suspect, 1);
        assert_eq!(report.summaries[0].counts.fail, 1);

        let text = std::fs::read_to_string(&output).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.contains("sea_water_temperature_qartod_gross_range_test"));
        assert!(header.contains("sea_water_temperature_qartod_rollup"));
        assert_eq!(Config::from_store_sidecar(&output).unwrap(), config);
    }

    #[tokio::test]
    async fn test_run_command_over_glob() {
        let dir = tempfile::tempdir().unwrap();
        let (config_path, _) = write_inputs(dir.path());
        std::fs::write(dir.path().join("mooring.csv"), CSV).unwrap();
        let out = dir.path().join("results");

        let pattern = dir.path().join("*.csv").to_string_lossy().into_owned();
        let args = Args::parse_from([
            "qartod-qc",
            "run",
            pattern.as_str(),
            "-c",
            config_path.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "-j",
            "2",
            "-q",
        ]);
        run(args).await.unwrap();

        assert!(out.join("buoy_qc.parquet").exists());
        assert!(out.join("mooring_qc.parquet").exists());
        assert!(out.join("mooring_qc.parquet.qc.json").exists());
    }

    #[tokio::test]
    async fn test_run_command_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (config_path, _) = write_inputs(dir.path());
        let broken = "depth,sea_water_temperature\n1.0,2.0\n";
        std::fs::write(dir.path().join("broken.csv"), broken).unwrap();

        let args = RunArgs {
            inputs: vec![dir.path().join("*.csv").to_string_lossy().into_owned()],
            config: config_path,
            output: dir.path().join("results"),
            format: ResultFormat::Csv,
            jobs: Some(1),
            time_column: "time".to_string(),
            z_column: "z".to_string(),
            lat_column: "lat".to_string(),
            lon_column: "lon".to_string(),
            geom_column: "geom".to_string(),
            no_values: false,
            no_rollup: false,
            no_timestamp_checks: false,
            verbose: 0,
            quiet: true,
        };
        let err = run_command(args).await.unwrap_err();
        assert!(err.to_string().contains("1 of 2"));
    }

    #[test]
    fn test_validate_rejects_unknown_test() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"temp": {"qartod": {"no_such_test": {}}}}"#).unwrap();
        let args = ValidateArgs {
            config: path,
            show: false,
            verbose: 0,
        };
        assert!(validate_command(args).is_err());
    }
}
