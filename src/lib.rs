//! QARTOD Quality Control Library
//!
//! A configuration-driven engine for running automated quality-control
//! checks against oceanographic time series.
//!
//! This library provides tools for:
//! - The QARTOD flag algebra and aggregation rules
//! - The QARTOD test library (range, spike, rate of change, flat line,
//!   attenuated signal, climatology, location, density inversion) and the
//!   Argo pressure and speed checks
//! - Parsing QC configurations from JSON, YAML or in-memory values into a
//!   validated context/stream/test hierarchy
//! - Evaluating configurations lazily against array, tabular and gridded
//!   sources
//! - Collecting results across contexts, rolling them up, and storing them
//!   as CSV or Parquet with a configuration sidecar
//!
//! ```no_run
//! use qartod_qc::{Config, StreamSource, collect_results};
//! use qartod_qc::streams::ArrayStream;
//! # fn main() -> qartod_qc::Result<()> {
//! # let time = vec![];
//! let config = Config::from_yaml_str(
//!     "temp: {qartod: {gross_range_test: {fail_span: [0, 10], suspect_span: [0, 8]}}}",
//! )?;
//! let source = ArrayStream::new(time).with_variable("temp", vec![])?;
//! let collected = collect_results(source.run(&config))?;
//! # Ok(())
//! # }
//! ```

pub mod argo;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod geo;
pub mod models;
pub mod qartod;
pub mod results;
pub mod store;
pub mod streams;

pub use config::{Config, ContextConfig, EngineSettings, StreamConfig, TestKind, TestParams};
pub use error::{QcError, Result};
pub use models::{Flag, Samples, Span, TimeWindow};
pub use qartod::{aggregate, check_timestamps};
pub use results::{
    CollectedResult, QcResult, ResultCollector, collect_results, rollup, summarize_flags,
};
pub use store::ResultStore;
pub use streams::{ResultCursor, StreamSource};
