//! A group of streams sharing a region and time window.

use super::stream::StreamConfig;
use crate::constants::config_keys;
use crate::error::{QcError, Result};
use crate::geo::Region;
use crate::models::TimeWindow;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextConfig {
    pub region: Option<Region>,
    pub window: TimeWindow,
    pub attrs: Map<String, Value>,
    streams: Vec<StreamConfig>,
}

impl ContextConfig {
    pub fn new(streams: Vec<StreamConfig>) -> Self {
        Self {
            streams,
            ..Default::default()
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// Parse `{region, window, attrs, streams}`; `location` prefixes errors
    pub fn from_value(value: &Value, location: &str) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| QcError::configuration(location, "context must be a mapping"))?;

        if let Some(key) = map.keys().find(|k| {
            ![
                config_keys::STREAMS,
                config_keys::REGION,
                config_keys::WINDOW,
                config_keys::ATTRS,
            ]
            .contains(&k.as_str())
        }) {
            return Err(QcError::configuration(
                location,
                format!("unexpected key '{}' in context", key),
            ));
        }

        let region = match map.get(config_keys::REGION) {
            None | Some(Value::Null) => None,
            Some(geojson) => Some(Region::from_geojson(
                geojson,
                &format!("{}.{}", location, config_keys::REGION),
            )?),
        };

        let window_at = format!("{}.{}", location, config_keys::WINDOW);
        let window = match map.get(config_keys::WINDOW) {
            None | Some(Value::Null) => TimeWindow::default(),
            Some(window) => serde_json::from_value::<TimeWindow>(window.clone())
                .map_err(|e| QcError::configuration(&window_at, e.to_string()))?,
        };
        window.validate(&window_at)?;

        let attrs = match map.get(config_keys::ATTRS) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(attrs)) => attrs.clone(),
            Some(_) => {
                return Err(QcError::configuration(
                    format!("{}.{}", location, config_keys::ATTRS),
                    "attrs must be a mapping",
                ));
            }
        };

        let streams = match map.get(config_keys::STREAMS) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(streams)) => streams
                .iter()
                .map(|(stream_id, tests)| StreamConfig::from_value(stream_id, tests))
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(QcError::configuration(
                    format!("{}.{}", location, config_keys::STREAMS),
                    "streams must be a mapping of variable -> tests",
                ));
            }
        };

        Ok(Self {
            region,
            window,
            attrs,
            streams,
        })
    }

    /// Canonical form, always carrying every key
    pub fn to_value(&self) -> Result<Value> {
        let mut streams = Map::new();
        for stream in &self.streams {
            streams.insert(stream.stream_id().to_string(), stream.to_value()?);
        }

        let mut map = Map::new();
        map.insert(
            config_keys::REGION.to_string(),
            self.region.as_ref().map_or(Value::Null, |r| r.to_geojson().clone()),
        );
        map.insert(config_keys::WINDOW.to_string(), serde_json::to_value(self.window)?);
        map.insert(config_keys::ATTRS.to_string(), Value::Object(self.attrs.clone()));
        map.insert(config_keys::STREAMS.to_string(), Value::Object(streams));
        Ok(Value::Object(map))
    }

    pub fn streams(&self) -> &[StreamConfig] {
        &self.streams
    }

    pub fn stream(&self, stream_id: &str) -> Option<&StreamConfig> {
        self.streams.iter().find(|s| s.stream_id() == stream_id)
    }

    pub fn is_unconstrained(&self) -> bool {
        self.region.is_none() && self.window.is_unbounded()
    }

    /// Whether a sample at this time and position falls inside the context
    ///
    /// Samples without a position pass the region filter.
    pub fn covers(
        &self,
        time: &chrono::DateTime<chrono::Utc>,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> bool {
        if !self.window.contains(time) {
            return false;
        }
        match (&self.region, lat, lon) {
            (Some(region), Some(lat), Some(lon)) => region.contains(lon, lat),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn source() -> Value {
        json!({
            "region": {
                "type": "Polygon",
                "coordinates": [[[-80, 30], [-60, 30], [-60, 50], [-80, 50], [-80, 30]]]
            },
            "window": {"starting": "2020-01-01T00:00:00Z", "ending": "2020-04-01T00:00:00Z"},
            "attrs": {"comment": "winter limits"},
            "streams": {
                "temp": {"qartod": {"gross_range_test": {"fail_span": [-2, 30]}}},
                "salinity": {"qartod": {"gross_range_test": {"fail_span": [0, 42]}}}
            }
        })
    }

    #[test]
    fn test_parse_context() {
        let context = ContextConfig::from_value(&source(), "contexts[0]").unwrap();
        assert!(context.region.is_some());
        assert_eq!(context.streams().len(), 2);
        assert_eq!(context.attrs.get("comment"), Some(&json!("winter limits")));
        assert!(context.stream("salinity").is_some());
        assert!(context.stream("oxygen").is_none());
        assert!(!context.is_unconstrained());
    }

    #[test]
    fn test_round_trip() {
        let context = ContextConfig::from_value(&source(), "contexts[0]").unwrap();
        let again = ContextConfig::from_value(&context.to_value().unwrap(), "contexts[0]").unwrap();
        assert_eq!(context, again);
    }

    #[test]
    fn test_covers() {
        let context = ContextConfig::from_value(&source(), "contexts[0]").unwrap();
        let winter = Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap();
        let spring = Utc.with_ymd_and_hms(2020, 4, 1, 0, 0, 0).unwrap();
        assert!(context.covers(&winter, Some(40.0), Some(-70.0)));
        assert!(!context.covers(&winter, Some(10.0), Some(-70.0)));
        assert!(!context.covers(&spring, Some(40.0), Some(-70.0)));
        assert!(context.covers(&winter, None, None));
    }

    #[test]
    fn test_rejects_unknown_keys_and_inverted_window() {
        assert!(ContextConfig::from_value(&json!({"streams": {}, "extra": 1}), "c").is_err());
        let inverted = json!({"window": {"starting": "2021-01-01", "ending": "2020-01-01"}});
        assert!(ContextConfig::from_value(&inverted, "c").is_err());
    }

    #[test]
    fn test_rejects_misspelled_window_key() {
        let misspelled = json!({
            "window": {"starting": "2020-01-01T00:00:00Z", "end": "2020-02-01T00:00:00Z"},
            "streams": {}
        });
        let err = ContextConfig::from_value(&misspelled, "contexts[0]").unwrap_err();
        assert!(err.to_string().contains("contexts[0].window"));
    }

    #[test]
    fn test_rejects_empty_region() {
        let empty = json!({"region": {"type": "Polygon", "coordinates": []}, "streams": {}});
        assert!(ContextConfig::from_value(&empty, "contexts[0]").is_err());
    }
}
