//! Tabular input backed by a polars `DataFrame`.
//!
//! Axis columns (time, z, lat, lon) are located by the names in
//! [`EngineSettings`]; every other numeric column is a candidate variable.
//! Without lat/lon columns, positions come from the point geometry column.

use super::StreamSource;
use crate::config::EngineSettings;
use crate::error::{QcError, Result};
use crate::geo::parse_point;
use crate::models::{Samples, parse_timestamp};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, info};

pub struct FrameStream {
    frame: DataFrame,
    settings: EngineSettings,
    time: Vec<DateTime<Utc>>,
    depth: Option<Vec<Option<f64>>>,
    lat: Option<Vec<Option<f64>>>,
    lon: Option<Vec<Option<f64>>>,
}

impl FrameStream {
    pub fn new(frame: DataFrame) -> Result<Self> {
        Self::with_settings(frame, EngineSettings::default())
    }

    /// Wrap a frame, reading the axis columns once up front
    pub fn with_settings(frame: DataFrame, settings: EngineSettings) -> Result<Self> {
        settings.validate()?;
        let time = time_axis(&frame, &settings.time_column)?;
        let depth = optional_float_column(&frame, &settings.z_column)?;
        let mut lat = optional_float_column(&frame, &settings.lat_column)?;
        let mut lon = optional_float_column(&frame, &settings.lon_column)?;
        if lat.is_some() != lon.is_some() {
            return Err(QcError::InvalidColumn {
                column: format!("{}/{}", settings.lat_column, settings.lon_column),
                reason: "latitude and longitude must be given together".to_string(),
            });
        }
        if lat.is_none() {
            if let Some((lats, lons)) = geometry_axes(&frame, &settings.geom_column)? {
                debug!("Positions read from geometry column '{}'", settings.geom_column);
                lat = Some(lats);
                lon = Some(lons);
            }
        }
        debug!(
            "Frame stream with {} rows, depth: {}, position: {}",
            frame.height(),
            depth.is_some(),
            lat.is_some()
        );
        Ok(Self {
            frame,
            settings,
            time,
            depth,
            lat,
            lon,
        })
    }

    /// Read a CSV file with a header row, parsing date columns
    pub fn read_csv(path: &Path, settings: EngineSettings) -> Result<Self> {
        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .map_parse_options(|options| options.with_try_parse_dates(true))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;
        info!("Read {} rows from {}", frame.height(), path.display());
        Self::with_settings(frame, settings)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Numeric columns that are not axes
    pub fn variable_names(&self) -> Vec<String> {
        let axes = self.settings.axis_columns();
        self.frame
            .get_columns()
            .iter()
            .filter(|c| c.dtype().is_float() || c.dtype().is_integer())
            .map(|c| c.name().to_string())
            .filter(|name| !axes.contains(&name.as_str()))
            .collect()
    }
}

impl StreamSource for FrameStream {
    fn samples(&self, stream_id: &str) -> Result<Option<Cow<'_, Samples>>> {
        if self.settings.axis_columns().contains(&stream_id) {
            return Ok(None);
        }
        let Some(values) = optional_float_column(&self.frame, stream_id)? else {
            return Ok(None);
        };
        let mut samples = Samples::new(self.time.clone(), values)?;
        samples.depth = self.depth.clone();
        samples.lat = self.lat.clone();
        samples.lon = self.lon.clone();
        Ok(Some(Cow::Owned(samples)))
    }

    fn checks_timestamps(&self) -> bool {
        self.settings.check_timestamps
    }
}

fn optional_float_column(frame: &DataFrame, name: &str) -> Result<Option<Vec<Option<f64>>>> {
    let Ok(column) = frame.column(name) else {
        return Ok(None);
    };
    let cast = column
        .cast(&DataType::Float64)
        .map_err(|e| QcError::InvalidColumn {
            column: name.to_string(),
            reason: e.to_string(),
        })?;
    let values = cast.as_materialized_series().f64()?.into_iter().collect();
    Ok(Some(values))
}

/// Split a point geometry column into latitude and longitude
///
/// Null geometries give missing positions; text that is not a point is an error.
type Positions = (Vec<Option<f64>>, Vec<Option<f64>>);

fn geometry_axes(frame: &DataFrame, name: &str) -> Result<Option<Positions>> {
    let Ok(column) = frame.column(name) else {
        return Ok(None);
    };
    let invalid = |reason: String| QcError::InvalidColumn {
        column: name.to_string(),
        reason,
    };
    if column.dtype() != &DataType::String {
        return Err(invalid(format!("expected point text, found {}", column.dtype())));
    }

    let mut lats = Vec::with_capacity(column.len());
    let mut lons = Vec::with_capacity(column.len());
    for text in column.as_materialized_series().str()?.into_iter() {
        let point = match text {
            Some(text) => {
                let point = parse_point(text)
                    .ok_or_else(|| invalid(format!("'{}' is not a point geometry", text)))?;
                Some(point)
            }
            None => None,
        };
        lons.push(point.map(|(lon, _)| lon));
        lats.push(point.map(|(_, lat)| lat));
    }
    Ok(Some((lats, lons)))
}

fn time_axis(frame: &DataFrame, name: &str) -> Result<Vec<DateTime<Utc>>> {
    let column = frame.column(name).map_err(|_| QcError::InvalidColumn {
        column: name.to_string(),
        reason: "time column not found".to_string(),
    })?;

    let null_time = || QcError::InvalidColumn {
        column: name.to_string(),
        reason: "time values must not be null".to_string(),
    };

    match column.dtype() {
        DataType::String => column
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|text| text.ok_or_else(null_time).and_then(parse_timestamp))
            .collect(),
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            column
                .cast(&DataType::Int64)?
                .as_materialized_series()
                .i64()?
                .into_iter()
                .map(|raw| raw.and_then(|raw| from_physical(raw, unit)).ok_or_else(null_time))
                .collect()
        }
        _ => column
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
            .cast(&DataType::Int64)?
            .as_materialized_series()
            .i64()?
            .into_iter()
            .map(|ms| ms.and_then(DateTime::from_timestamp_millis).ok_or_else(null_time))
            .collect(),
    }
}

/// Physical datetime value to UTC; a time zone only affects display
fn from_physical(raw: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(raw)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(raw),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(raw),
    }
}
