//! Gridded datasets whose variables may carry their own coordinates.
//!
//! Variables are fetched through a [`VariableLoader`], so large datasets can
//! be read one variable at a time instead of being materialized up front.

use super::StreamSource;
use crate::error::{QcError, Result};
use crate::models::Samples;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::debug;

/// A flattened variable and whichever coordinates it defines itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridVariable {
    pub values: Vec<Option<f64>>,
    pub time: Option<Vec<DateTime<Utc>>>,
    pub depth: Option<Vec<Option<f64>>>,
    pub lat: Option<Vec<Option<f64>>>,
    pub lon: Option<Vec<Option<f64>>>,
}

impl GridVariable {
    pub fn new(values: Vec<Option<f64>>) -> Self {
        Self {
            values,
            ..Default::default()
        }
    }

    pub fn with_time(mut self, time: Vec<DateTime<Utc>>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_depth(mut self, depth: Vec<Option<f64>>) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_position(mut self, lat: Vec<Option<f64>>, lon: Vec<Option<f64>>) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }
}

pub trait VariableLoader {
    fn load(&self, name: &str) -> Result<Option<GridVariable>>;
}

impl<F> VariableLoader for F
where
    F: Fn(&str) -> Result<Option<GridVariable>>,
{
    fn load(&self, name: &str) -> Result<Option<GridVariable>> {
        self(name)
    }
}

/// Fully materialized variables keyed by name
#[derive(Debug, Clone, Default)]
pub struct InMemoryGrid {
    variables: HashMap<String, GridVariable>,
}

impl InMemoryGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, variable: GridVariable) -> Self {
        self.variables.insert(name.into(), variable);
        self
    }
}

impl VariableLoader for InMemoryGrid {
    fn load(&self, name: &str) -> Result<Option<GridVariable>> {
        Ok(self.variables.get(name).cloned())
    }
}

/// Dataset-level coordinates plus a loader for the variables
pub struct GriddedStream<L: VariableLoader> {
    loader: L,
    time: Option<Vec<DateTime<Utc>>>,
    depth: Option<Vec<Option<f64>>>,
    lat: Option<Vec<Option<f64>>>,
    lon: Option<Vec<Option<f64>>>,
    timestamp_checks: bool,
}

impl<L: VariableLoader> GriddedStream<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            time: None,
            depth: None,
            lat: None,
            lon: None,
            timestamp_checks: true,
        }
    }

    pub fn with_time(mut self, time: Vec<DateTime<Utc>>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_depth(mut self, depth: Vec<Option<f64>>) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_position(mut self, lat: Vec<Option<f64>>, lon: Vec<Option<f64>>) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    pub fn without_timestamp_checks(mut self) -> Self {
        self.timestamp_checks = false;
        self
    }
}

/// The variable's own axis when it fits, else the dataset axis when it fits
fn resolve<'v, T: Clone>(
    own: Option<&'v Vec<T>>,
    shared: Option<&'v Vec<T>>,
    len: usize,
) -> Option<Vec<T>> {
    own.filter(|axis| axis.len() == len)
        .or_else(|| shared.filter(|axis| axis.len() == len))
        .cloned()
}

impl<L: VariableLoader> StreamSource for GriddedStream<L> {
    fn samples(&self, stream_id: &str) -> Result<Option<Cow<'_, Samples>>> {
        let Some(variable) = self.loader.load(stream_id)? else {
            return Ok(None);
        };
        let n = variable.values.len();

        let time = resolve(variable.time.as_ref(), self.time.as_ref(), n).ok_or_else(|| {
            QcError::length_mismatch(
                format!("{} time coordinate", stream_id),
                n,
                variable
                    .time
                    .as_ref()
                    .or(self.time.as_ref())
                    .map_or(0, Vec::len),
            )
        })?;

        let lat = resolve(variable.lat.as_ref(), self.lat.as_ref(), n);
        let lon = resolve(variable.lon.as_ref(), self.lon.as_ref(), n);
        let mut samples = Samples::new(time, variable.values)?;
        samples.depth = resolve(variable.depth.as_ref(), self.depth.as_ref(), n);
        if let (Some(lat), Some(lon)) = (lat, lon) {
            samples = samples.with_position(lat, lon)?;
        }
        debug!(
            "Loaded gridded variable '{}' with {} points (depth: {}, position: {})",
            stream_id,
            n,
            samples.depth.is_some(),
            samples.lat.is_some()
        );
        Ok(Some(Cow::Owned(samples)))
    }

    fn checks_timestamps(&self) -> bool {
        self.timestamp_checks
    }
}
