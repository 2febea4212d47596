use clap::Parser;
use qartod_qc::cli::{self, Args};
use std::process;

fn main() {
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        tokio::select! {
            result = cli::run(args) => result,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nReceived CTRL+C, shutting down...");
                Err(anyhow::anyhow!("Interrupted by user"))
            }
        }
    });

    if let Err(error) = result {
        eprintln!("Error: {:#}", error);
        process::exit(1);
    }
}

fn show_help_and_commands() {
    println!("qartod-qc - QARTOD quality control for observation files");
    println!("=========================================================");
    println!();
    println!("USAGE:");
    println!("    qartod-qc <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    run         Run a QC configuration against CSV files");
    println!("    validate    Parse a QC configuration and report its contents");
    println!("    help        Show this help message or help for specific commands");
    println!();
    println!("EXAMPLES:");
    println!("    # Flag every CSV in a directory, writing Parquet results:");
    println!("    qartod-qc run 'data/*.csv' --config qc.yaml --output results");
    println!();
    println!("    # Check a configuration and print its canonical form:");
    println!("    qartod-qc validate qc.yaml --show");
    println!();
    println!("For detailed help on any command, use:");
    println!("    qartod-qc <COMMAND> --help");
}
