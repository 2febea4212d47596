//! Planar and great-circle geometry for region filters and location tests.
//!
//! Regions are GeoJSON `Polygon`/`MultiPolygon` geometries, optionally
//! wrapped in a `Feature` or `FeatureCollection`. Coordinates are
//! `[lon, lat]` in degrees.

use crate::constants::{EARTH_RADIUS_M, METRES_PER_DEGREE};
use crate::error::{QcError, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::sync::LazyLock;

static WKT_POINT: LazyLock<std::result::Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"(?i)^POINT\s*(?:Z\s*)?\(\s*([^\s()]+)\s+([^\s()]+)(?:\s+[^\s()]+)?\s*\)$")
});

type Ring = Vec<[f64; 2]>;

/// One polygon: exterior ring followed by any holes
#[derive(Debug, Clone, PartialEq)]
struct Polygon {
    rings: Vec<Ring>,
}

impl Polygon {
    fn contains(&self, lon: f64, lat: f64) -> bool {
        let Some((exterior, holes)) = self.rings.split_first() else {
            return false;
        };
        ring_contains(exterior, lon, lat) && !holes.iter().any(|h| ring_contains(h, lon, lat))
    }
}

/// A geographic region parsed from GeoJSON
///
/// The source document is kept so serialization reproduces it exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    polygons: Vec<Polygon>,
    source: Value,
}

impl Region {
    pub fn from_geojson(value: &Value, location: &str) -> Result<Self> {
        let mut polygons = Vec::new();
        collect_polygons(value, location, &mut polygons)?;
        if polygons.is_empty() {
            return Err(QcError::configuration(location, "region contains no polygons"));
        }
        Ok(Self {
            polygons,
            source: value.clone(),
        })
    }

    pub fn to_geojson(&self) -> &Value {
        &self.source
    }

    /// Ray-casting point-in-polygon over every member polygon
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.polygons.iter().any(|p| p.contains(lon, lat))
    }

    /// Approximate distance in metres from a point to the nearest ring edge
    pub fn boundary_distance_m(&self, lon: f64, lat: f64) -> f64 {
        self.polygons
            .iter()
            .flat_map(|p| p.rings.iter())
            .map(|ring| ring_distance_m(ring, lon, lat))
            .fold(f64::INFINITY, f64::min)
    }
}

impl Serialize for Region {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.source.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Region::from_geojson(&value, "region").map_err(serde::de::Error::custom)
    }
}

fn collect_polygons(value: &Value, location: &str, out: &mut Vec<Polygon>) -> Result<()> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| QcError::configuration(location, "GeoJSON object has no 'type'"))?;

    match kind {
        "Polygon" => out.push(parse_polygon(coordinates(value, location)?, location)?),
        "MultiPolygon" => {
            let members = coordinates(value, location)?
                .as_array()
                .ok_or_else(|| {
                    QcError::configuration(location, "MultiPolygon coordinates must be an array")
                })?;
            for member in members {
                out.push(parse_polygon(member, location)?);
            }
        }
        "Feature" => {
            let geometry = value
                .get("geometry")
                .ok_or_else(|| QcError::configuration(location, "Feature has no geometry"))?;
            collect_polygons(geometry, location, out)?;
        }
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    QcError::configuration(location, "FeatureCollection has no features")
                })?;
            for feature in features {
                collect_polygons(feature, location, out)?;
            }
        }
        other => {
            return Err(QcError::configuration(
                location,
                format!("unsupported GeoJSON type '{}', expected a polygon geometry", other),
            ));
        }
    }
    Ok(())
}

fn coordinates<'a>(value: &'a Value, location: &str) -> Result<&'a Value> {
    value
        .get("coordinates")
        .ok_or_else(|| QcError::configuration(location, "geometry has no coordinates"))
}

fn parse_polygon(value: &Value, location: &str) -> Result<Polygon> {
    let rings = serde_json::from_value::<Vec<Vec<Vec<f64>>>>(value.clone())
        .map_err(|e| {
            QcError::configuration(location, format!("invalid polygon coordinates: {}", e))
        })?;

    if rings.is_empty() {
        return Err(QcError::configuration(location, "polygon needs an exterior ring"));
    }

    let mut parsed = Vec::with_capacity(rings.len());
    for ring in rings {
        let points = ring
            .into_iter()
            .map(|position| match position.as_slice() {
                [lon, lat, ..] => Ok([*lon, *lat]),
                _ => Err(QcError::configuration(location, "position needs at least two values")),
            })
            .collect::<Result<Ring>>()?;
        if points.len() < 3 {
            return Err(QcError::configuration(
                location,
                "polygon ring needs at least three positions",
            ));
        }
        parsed.push(points);
    }
    Ok(Polygon { rings: parsed })
}

fn ring_contains(ring: &[[f64; 2]], lon: f64, lat: f64) -> bool {
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn ring_distance_m(ring: &[[f64; 2]], lon: f64, lat: f64) -> f64 {
    let scale_x = lat.to_radians().cos() * METRES_PER_DEGREE;
    let project = |[x, y]: [f64; 2]| ((x - lon) * scale_x, (y - lat) * METRES_PER_DEGREE);

    ring.iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(a, b)| origin_to_segment(project(*a), project(*b)))
        .fold(f64::INFINITY, f64::min)
}

/// Distance from the origin to segment `a`-`b` in a local planar frame
fn origin_to_segment(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length_sq = dx * dx + dy * dy;
    let t = if length_sq == 0.0 {
        0.0
    } else {
        (-(a.0 * dx + a.1 * dy) / length_sq).clamp(0.0, 1.0)
    };
    let (px, py) = (a.0 + t * dx, a.1 + t * dy);
    (px * px + py * py).sqrt()
}

/// `(lon, lat)` of a point stored as GeoJSON text or WKT `POINT (x y)`
///
/// A GeoJSON `Feature` wrapping a point is accepted. Returns `None` for
/// anything else.
pub fn parse_point(text: &str) -> Option<(f64, f64)> {
    let text = text.trim();
    if text.starts_with('{') {
        let value: Value = serde_json::from_str(text).ok()?;
        return point_from_geojson(&value);
    }
    let captures = WKT_POINT.as_ref().ok()?.captures(text)?;
    let lon = captures[1].parse().ok()?;
    let lat = captures[2].parse().ok()?;
    Some((lon, lat))
}

fn point_from_geojson(value: &Value) -> Option<(f64, f64)> {
    match value.get("type")?.as_str()? {
        "Point" => match value.get("coordinates")?.as_array()?.as_slice() {
            [lon, lat, ..] => Some((lon.as_f64()?, lat.as_f64()?)),
            _ => None,
        },
        "Feature" => point_from_geojson(value.get("geometry")?),
        _ => None,
    }
}

/// Great-circle distance in metres between two `(lon, lat)` points
pub fn haversine_m(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}
