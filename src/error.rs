//! Error handling for QC configuration and evaluation.
//!
//! Configuration problems are reported when a configuration object is built,
//! with enough context (variable, module, test, field) to fix the source.
//! Missing or NaN samples are never errors; they become `Flag::Missing`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Date/time parsing error: {0}")]
    DateTimeParsing(#[from] chrono::ParseError),

    #[error("Configuration error at {location}: {message}")]
    Configuration { location: String, message: String },

    #[error("Unknown QC test '{module}.{test}'")]
    UnknownTest { module: String, test: String },

    #[error("Invalid span at {location}: low {low} is greater than high {high}")]
    InvalidSpan {
        location: String,
        low: f64,
        high: f64,
    },

    #[error("Length mismatch for {what}: expected {expected}, found {found}")]
    LengthMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("Test '{test}' requires the '{axis}' axis, which was not provided")]
    MissingAxis { test: String, axis: String },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Column '{column}' could not be read: {reason}")]
    InvalidColumn { column: String, reason: String },
}

impl QcError {
    /// Create a configuration error anchored at a location such as `temp.qartod.spike_test`
    pub fn configuration(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            location: location.into(),
            message: message.into(),
        }
    }

    pub fn length_mismatch(what: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::LengthMismatch {
            what: what.into(),
            expected,
            found,
        }
    }

    pub fn missing_axis(test: impl Into<String>, axis: impl Into<String>) -> Self {
        Self::MissingAxis {
            test: test.into(),
            axis: axis.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QcError>;
