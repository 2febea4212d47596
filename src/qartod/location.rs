//! Location test: check positions against a bounding box or region.

use crate::constants::METRES_PER_DEGREE;
use crate::error::{QcError, Result};
use crate::geo::{Region, haversine_m};
use crate::models::{Flag, finite};
use crate::qartod::{check_length, check_threshold};
use serde::{Deserialize, Serialize};

const GLOBE: [f64; 4] = [-180.0, -90.0, 180.0, 90.0];

fn default_bbox() -> [f64; 4] {
    GLOBE
}

fn is_default_bbox(bbox: &[f64; 4]) -> bool {
    *bbox == GLOBE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationParams {
    /// `[lon_min, lat_min, lon_max, lat_max]`
    #[serde(default = "default_bbox", skip_serializing_if = "is_default_bbox")]
    pub bbox: [f64; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    /// Metres from the boundary within which positions are SUSPECT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<f64>,
    /// Largest plausible jump in metres between consecutive positions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_max: Option<f64>,
}

impl Default for LocationParams {
    fn default() -> Self {
        Self {
            bbox: GLOBE,
            region: None,
            buffer: None,
            range_max: None,
        }
    }
}

impl LocationParams {
    pub fn validate(&self, location: &str) -> Result<()> {
        let [xmin, ymin, xmax, ymax] = self.bbox;
        if self.bbox.iter().any(|v| v.is_nan()) || xmin > xmax || ymin > ymax {
            return Err(QcError::configuration(
                format!("{}.bbox", location),
                format!("expected [lon_min, lat_min, lon_max, lat_max], got {:?}", self.bbox),
            ));
        }
        if let Some(buffer) = self.buffer {
            check_threshold(location, "buffer", buffer)?;
        }
        if let Some(range_max) = self.range_max {
            check_threshold(location, "range_max", range_max)?;
        }
        Ok(())
    }

    fn inside(&self, lon: f64, lat: f64) -> bool {
        let [xmin, ymin, xmax, ymax] = self.bbox;
        let in_bbox = lon >= xmin && lon <= xmax && lat >= ymin && lat <= ymax;
        in_bbox && self.region.as_ref().is_none_or(|r| r.contains(lon, lat))
    }

    /// Distance to the region boundary, or to the bbox edges without a region
    fn boundary_distance_m(&self, lon: f64, lat: f64) -> f64 {
        if let Some(region) = &self.region {
            return region.boundary_distance_m(lon, lat);
        }
        let [xmin, ymin, xmax, ymax] = self.bbox;
        let scale_x = lat.to_radians().cos() * METRES_PER_DEGREE;
        let dx = (lon - xmin).min(xmax - lon) * scale_x;
        let dy = (lat - ymin).min(ymax - lat) * METRES_PER_DEGREE;
        dx.min(dy)
    }
}

/// FAIL outside the bbox or region, SUSPECT within `buffer` of the boundary
/// or after a jump longer than `range_max`; unusable coordinates are MISSING.
pub fn location_test(
    lat: &[Option<f64>],
    lon: &[Option<f64>],
    params: &LocationParams,
) -> Result<Vec<Flag>> {
    check_length("lon", lat.len(), lon.len())?;

    let mut previous: Option<(f64, f64)> = None;
    let mut flags = Vec::with_capacity(lat.len());
    for (y, x) in lat.iter().zip(lon) {
        let (Some(y), Some(x)) = (finite(*y), finite(*x)) else {
            flags.push(Flag::Missing);
            continue;
        };

        let mut flag = if !params.inside(x, y) {
            Flag::Fail
        } else if params
            .buffer
            .is_some_and(|buffer| params.boundary_distance_m(x, y) < buffer)
        {
            Flag::Suspect
        } else {
            Flag::Pass
        };

        if let (Some(range_max), Some((px, py))) = (params.range_max, previous) {
            if haversine_m(px, py, x, y) > range_max {
                flag = flag.max(Flag::Suspect);
            }
        }
        previous = Some((x, y));
        flags.push(flag);
    }
    Ok(flags)
}
