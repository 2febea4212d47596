//! Command-line interface for the QC runner
//!
//! Argument parsing lives in [`args`]; the `run` and `validate` commands are
//! implemented in [`commands`].

pub mod args;
pub mod commands;

pub use args::{Args, Commands, ResultFormat, RunArgs, ValidateArgs};
pub use commands::{FileReport, process_file, run};
