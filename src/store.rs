//! Persist collected results as CSV or Parquet with a configuration sidecar.
//!
//! The frame holds the axis columns, optionally one data column per stream,
//! and one `UInt8` flag column per `{stream}.{module}.{test}` (made CF-safe).
//! The sidecar `<file>.qc.json` carries the canonical configuration and the
//! flag column metadata, so the run can be re-parsed later.

use crate::config::{Config, EngineSettings, SIDECAR_CONFIG_KEY, TestKind, sidecar_path};
use crate::constants::{ROLLUP_TEST_NAME, flag_values};
use crate::error::{QcError, Result};
use crate::results::CollectedResult;
use polars::prelude::*;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

type Pattern = LazyLock<std::result::Result<Regex, regex::Error>>;

static UNSAFE_CHARS: Pattern = LazyLock::new(|| Regex::new(r"[^_a-zA-Z0-9]"));
static LEADING_CHAR: Pattern = LazyLock::new(|| Regex::new(r"^[0-9_]"));

fn compiled(pattern: &'static Pattern) -> Result<&'static Regex> {
    pattern.as_ref().map_err(|e| QcError::Regex(e.clone()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("csv") => Ok(OutputFormat::Csv),
            Some("parquet") | Some("pq") => Ok(OutputFormat::Parquet),
            _ => Err(QcError::configuration(
                path.display().to_string(),
                "output must end in .csv or .parquet",
            )),
        }
    }
}

/// Make a variable name safe for CF conventions
///
/// Characters outside `[A-Za-z0-9_]` become `_`, and names starting with a
/// digit or underscore gain a `v_` prefix.
pub fn cf_safe_name(name: &str) -> Result<String> {
    let unsafe_chars = compiled(&UNSAFE_CHARS)?;
    let leading = compiled(&LEADING_CHAR)?;

    let name = if leading.is_match(name) {
        format!("v_{}", name)
    } else {
        name.to_string()
    };
    Ok(unsafe_chars.replace_all(&name, "_").into_owned())
}

/// Flag metadata of a collected result for the sidecar
fn flag_metadata(result: &CollectedResult, column: &str) -> Value {
    let kind = if result.test == ROLLUP_TEST_NAME {
        Some(TestKind::Aggregate)
    } else {
        TestKind::from_path(&result.module, &result.test).ok()
    };
    json!({
        "column": column,
        "stream_id": result.stream_id,
        "module": result.module,
        "test": result.test,
        "standard_name": kind.map(TestKind::standard_name),
        "long_name": kind.map(TestKind::long_name),
        "flag_values": flag_values::ALL_VALUES,
        "flag_meanings": "PASS NOT_EVALUATED SUSPECT FAIL MISSING",
    })
}

/// What a store write produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResults {
    pub path: PathBuf,
    pub sidecar: PathBuf,
    pub rows: usize,
    pub flag_columns: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    settings: EngineSettings,
}

impl ResultStore {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    /// Build the results frame; every collected result must share one length
    pub fn build_frame(&self, collected: &[CollectedResult]) -> Result<DataFrame> {
        let Some(first) = collected.first() else {
            return Ok(DataFrame::empty());
        };
        let rows = first.len();
        if let Some(other) = collected.iter().find(|c| c.len() != rows) {
            return Err(QcError::length_mismatch(other.name(), rows, other.len()));
        }

        let mut columns: Vec<Column> = Vec::new();

        let time: Vec<Option<i64>> = (0..rows)
            .map(|i| {
                collected
                    .iter()
                    .find_map(|c| c.time[i])
                    .map(|t| t.timestamp_millis())
            })
            .collect();
        let time = Series::new(self.settings.time_column.as_str().into(), time)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
        columns.push(time.into());

        let axes = [
            (&self.settings.z_column, axis_of(collected, rows, |c| c.depth.as_ref())),
            (&self.settings.lat_column, axis_of(collected, rows, |c| c.lat.as_ref())),
            (&self.settings.lon_column, axis_of(collected, rows, |c| c.lon.as_ref())),
        ];
        for (name, axis) in axes {
            if let Some(axis) = axis {
                columns.push(Series::new(name.as_str().into(), axis).into());
            }
        }

        if self.settings.store_values {
            let mut seen: Vec<&str> = Vec::new();
            for result in collected {
                if seen.contains(&result.stream_id.as_str()) {
                    continue;
                }
                seen.push(&result.stream_id);
                let values = (0..rows)
                    .map(|i| {
                        collected
                            .iter()
                            .filter(|c| c.stream_id == result.stream_id)
                            .find_map(|c| c.values[i])
                    })
                    .collect::<Vec<Option<f64>>>();
                columns.push(Series::new(cf_safe_name(&result.stream_id)?.into(), values).into());
            }
        }

        for result in collected {
            let flags: Vec<u8> = result.flags.iter().map(|f| u8::from(*f)).collect();
            columns.push(Series::new(cf_safe_name(&result.name())?.into(), flags).into());
        }

        let frame = DataFrame::new(columns)?;
        debug!("Built results frame {:?}", frame.shape());
        Ok(frame)
    }

    /// Write results and the configuration sidecar; format follows the extension
    pub fn write(
        &self,
        collected: &[CollectedResult],
        config: &Config,
        path: &Path,
    ) -> Result<StoredResults> {
        let format = OutputFormat::from_path(path)?;
        let mut frame = self.build_frame(collected)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        match format {
            OutputFormat::Csv => {
                CsvWriter::new(file).include_header(true).finish(&mut frame)?;
            }
            OutputFormat::Parquet => {
                ParquetWriter::new(file)
                    .with_compression(ParquetCompression::Snappy)
                    .finish(&mut frame)?;
            }
        }

        let sidecar = self.write_sidecar(collected, config, path)?;
        info!(
            "Wrote {} rows and {} flag columns to {}",
            frame.height(),
            collected.len(),
            path.display()
        );
        Ok(StoredResults {
            path: path.to_path_buf(),
            sidecar,
            rows: frame.height(),
            flag_columns: collected.len(),
        })
    }

    fn write_sidecar(
        &self,
        collected: &[CollectedResult],
        config: &Config,
        path: &Path,
    ) -> Result<PathBuf> {
        let sidecar = sidecar_path(path, &self.settings.sidecar_suffix);
        let flags = collected
            .iter()
            .map(|c| Ok(flag_metadata(c, &cf_safe_name(&c.name())?)))
            .collect::<Result<Vec<Value>>>()?;

        let mut document = Map::new();
        document.insert(SIDECAR_CONFIG_KEY.to_string(), config.to_value()?);
        document.insert("flags".to_string(), Value::Array(flags));
        std::fs::write(&sidecar, serde_json::to_string_pretty(&Value::Object(document))?)?;
        Ok(sidecar)
    }
}

fn axis_of<F>(collected: &[CollectedResult], rows: usize, axis: F) -> Option<Vec<Option<f64>>>
where
    F: Fn(&CollectedResult) -> Option<&Vec<Option<f64>>>,
{
    if !collected.iter().any(|c| axis(c).is_some()) {
        return None;
    }
    Some(
        (0..rows)
            .map(|i| collected.iter().filter_map(&axis).find_map(|a| a[i]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Flag;
    use crate::qartod::test_support::hourly;

    fn collected() -> Vec<CollectedResult> {
        let time = hourly(3);
        vec![CollectedResult {
            stream_id: "sea_water_temperature".to_string(),
            module: "qartod".to_string(),
            test: "gross_range_test".to_string(),
            flags: vec![Flag::Pass, Flag::Fail, Flag::NotEvaluated],
            time: vec![Some(time[0]), Some(time[1]), None],
            values: vec![Some(10.0), Some(50.0), None],
            depth: None,
            lat: None,
            lon: None,
        }]
    }

    #[test]
    fn test_cf_safe_name() {
        assert_eq!(cf_safe_name("temp.qartod.spike_test").unwrap(), "temp_qartod_spike_test");
        assert_eq!(cf_safe_name("1st-sensor").unwrap(), "v_1st_sensor");
        assert_eq!(cf_safe_name("_hidden").unwrap(), "v__hidden");
    }

    #[test]
    fn test_cf_patterns_compiled_once() {
        let first = compiled(&UNSAFE_CHARS).unwrap();
        assert_eq!(cf_safe_name("a b").unwrap(), "a_b");
        assert!(std::ptr::eq(first, compiled(&UNSAFE_CHARS).unwrap()));
        assert!(std::ptr::eq(
            compiled(&LEADING_CHAR).unwrap(),
            compiled(&LEADING_CHAR).unwrap()
        ));
    }

    #[test]
    fn test_output_format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("a.CSV")).unwrap(), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path(Path::new("a.parquet")).unwrap(), OutputFormat::Parquet);
        assert!(OutputFormat::from_path(Path::new("a.nc")).is_err());
    }

    #[test]
    fn test_build_frame_columns() {
        let frame = ResultStore::default().build_frame(&collected()).unwrap();
        let names: Vec<String> = frame.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "time",
                "sea_water_temperature",
                "sea_water_temperature_qartod_gross_range_test"
            ]
        );
        let flags = frame
            .column("sea_water_temperature_qartod_gross_range_test")
            .unwrap()
            .as_materialized_series()
            .u8()
            .unwrap()
            .into_iter()
            .collect::<Vec<_>>();
        assert_eq!(flags, vec![Some(1), Some(4), Some(2)]);
    }

    #[test]
    fn test_values_can_be_left_out() {
        let store = ResultStore::new(EngineSettings::new().without_values());
        let frame = store.build_frame(&collected()).unwrap();
        assert_eq!(frame.width(), 2);
    }
}
