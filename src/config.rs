//! Configuration hierarchy and engine settings.
//!
//! A QC configuration is an ordered list of contexts, each binding a set of
//! streams to an optional region and time window. Sources may be given in
//! three shapes, all converging on [`Config`]:
//!
//! - `{"contexts": [...]}`: the canonical top-level form
//! - a single context, recognised by `streams`, `region` or `window`
//! - a bare `{variable: {module: {test: params}}}` mapping, treated as one
//!   unconstrained context
//!
//! Every test reference is resolved through the static registry and its
//! parameters validated when the configuration is built.

pub mod context;
pub mod registry;
pub mod stream;

pub use context::ContextConfig;
pub use registry::{TestKind, TestParams};
pub use stream::StreamConfig;

use crate::constants::{self, CONFIG_SIDECAR_SUFFIX, columns, config_keys};
use crate::error::{QcError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Top-level QC configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    contexts: Vec<ContextConfig>,
}

impl Config {
    pub fn new(contexts: Vec<ContextConfig>) -> Self {
        Self { contexts }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| QcError::configuration("config", "configuration must be a mapping"))?;

        if let Some(contexts) = map.get(config_keys::CONTEXTS) {
            if let Some(key) = map.keys().find(|k| k.as_str() != config_keys::CONTEXTS) {
                return Err(QcError::configuration(
                    "config",
                    format!("unexpected key '{}' beside contexts", key),
                ));
            }
            let contexts = contexts
                .as_array()
                .ok_or_else(|| {
                    QcError::configuration(config_keys::CONTEXTS, "contexts must be a list")
                })?;
            let contexts = contexts
                .iter()
                .enumerate()
                .map(|(i, c)| ContextConfig::from_value(c, &format!("contexts[{}]", i)))
                .collect::<Result<Vec<_>>>()?;
            debug!("Parsed top-level configuration with {} contexts", contexts.len());
            return Ok(Self { contexts });
        }

        if map.keys().any(|k| constants::is_context_marker(k)) {
            debug!("Parsed single-context configuration");
            return Ok(Self::new(vec![ContextConfig::from_value(value, "context")?]));
        }

        let streams = map
            .iter()
            .map(|(stream_id, tests)| StreamConfig::from_value(stream_id, tests))
            .collect::<Result<Vec<_>>>()?;
        debug!("Parsed bare stream mapping with {} streams", streams.len());
        Ok(Self::new(vec![ContextConfig::new(streams)]))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_value(&value)
    }

    /// Load from a file; `.yaml`/`.yml` is read as YAML, anything else as JSON
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(QcError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        debug!("Loading QC configuration from {}", path.display());
        if is_yaml {
            Self::from_yaml_str(&text)
        } else {
            Self::from_json_str(&text)
        }
    }

    /// Re-parse the configuration stored next to a results file
    pub fn from_store_sidecar(results_path: &Path) -> Result<Self> {
        Self::from_sidecar_file(&sidecar_path(results_path, CONFIG_SIDECAR_SUFFIX))
    }

    /// Parse a sidecar document written by [`crate::store::ResultStore`]
    pub fn from_sidecar_file(sidecar: &Path) -> Result<Self> {
        if !sidecar.exists() {
            return Err(QcError::ConfigNotFound {
                path: sidecar.to_path_buf(),
            });
        }
        let document: Value = serde_json::from_str(&std::fs::read_to_string(sidecar)?)?;
        let config = document
            .get(SIDECAR_CONFIG_KEY)
            .ok_or_else(|| {
                QcError::configuration(sidecar.display().to_string(), "sidecar has no config")
            })?;
        Self::from_value(config)
    }

    /// Canonical `{"contexts": [...]}` form
    pub fn to_value(&self) -> Result<Value> {
        let contexts = self
            .contexts
            .iter()
            .map(ContextConfig::to_value)
            .collect::<Result<Vec<_>>>()?;
        let mut map = Map::new();
        map.insert(config_keys::CONTEXTS.to_string(), Value::Array(contexts));
        Ok(Value::Object(map))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value()?)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_value()?)?)
    }

    pub fn contexts(&self) -> &[ContextConfig] {
        &self.contexts
    }

    /// Distinct stream ids in first-seen order
    pub fn stream_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for stream in self.contexts.iter().flat_map(|c| c.streams()) {
            if !ids.contains(&stream.stream_id()) {
                ids.push(stream.stream_id());
            }
        }
        ids
    }

    pub fn test_count(&self) -> usize {
        self.contexts
            .iter()
            .flat_map(|c| c.streams())
            .map(|s| s.tests().len())
            .sum()
    }
}

/// Key under which the store sidecar holds the configuration
pub const SIDECAR_CONFIG_KEY: &str = "qc_config";

pub fn sidecar_path(results_path: &Path, suffix: &str) -> std::path::PathBuf {
    let mut name = results_path.as_os_str().to_owned();
    name.push(suffix);
    name.into()
}

/// Runtime settings shared by adapters and the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub time_column: String,
    pub z_column: String,
    pub lat_column: String,
    pub lon_column: String,
    /// Point geometry column, read when the lat/lon columns are absent
    pub geom_column: String,
    /// Suffix appended to a results file name for its configuration sidecar
    pub sidecar_suffix: String,
    /// Log a warning when a stream's time axis is not strictly increasing
    pub check_timestamps: bool,
    /// Include the evaluated values beside the flag columns when storing
    pub store_values: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            time_column: columns::TIME.to_string(),
            z_column: columns::Z.to_string(),
            lat_column: columns::LAT.to_string(),
            lon_column: columns::LON.to_string(),
            geom_column: columns::GEOM.to_string(),
            sidecar_suffix: CONFIG_SIDECAR_SUFFIX.to_string(),
            check_timestamps: true,
            store_values: true,
        }
    }
}

impl EngineSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_column(mut self, column: impl Into<String>) -> Self {
        self.time_column = column.into();
        self
    }

    pub fn with_z_column(mut self, column: impl Into<String>) -> Self {
        self.z_column = column.into();
        self
    }

    pub fn with_position_columns(mut self, lat: impl Into<String>, lon: impl Into<String>) -> Self {
        self.lat_column = lat.into();
        self.lon_column = lon.into();
        self
    }

    pub fn with_geom_column(mut self, column: impl Into<String>) -> Self {
        self.geom_column = column.into();
        self
    }

    pub fn with_sidecar_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.sidecar_suffix = suffix.into();
        self
    }

    pub fn without_timestamp_checks(mut self) -> Self {
        self.check_timestamps = false;
        self
    }

    pub fn without_values(mut self) -> Self {
        self.store_values = false;
        self
    }

    /// Names of the axis columns, which are never treated as variables
    pub fn axis_columns(&self) -> [&str; 5] {
        [
            self.time_column.as_str(),
            self.z_column.as_str(),
            self.lat_column.as_str(),
            self.lon_column.as_str(),
            self.geom_column.as_str(),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        let axes = self.axis_columns();
        for (i, axis) in axes.iter().enumerate() {
            if axis.is_empty() {
                return Err(QcError::configuration(
                    "settings",
                    "axis column names must not be empty",
                ));
            }
            if axes[i + 1..].contains(axis) {
                return Err(QcError::configuration(
                    "settings",
                    format!("axis column '{}' is used twice", axis),
                ));
            }
        }
        if self.sidecar_suffix.is_empty() {
            return Err(QcError::configuration("settings", "sidecar suffix must not be empty"));
        }
        Ok(())
    }
}
