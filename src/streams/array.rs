//! In-memory arrays sharing one set of axes.

use super::StreamSource;
use crate::error::{QcError, Result};
use crate::models::Samples;
use chrono::{DateTime, Utc};
use std::borrow::Cow;

/// Named value vectors over a shared time axis and optional depth/position
#[derive(Debug, Clone)]
pub struct ArrayStream {
    base: Samples,
    variables: Vec<(String, Samples)>,
    timestamp_checks: bool,
}

impl ArrayStream {
    pub fn new(time: Vec<DateTime<Utc>>) -> Self {
        let values = vec![None; time.len()];
        Self {
            base: Samples {
                time,
                values,
                ..Default::default()
            },
            variables: Vec::new(),
            timestamp_checks: true,
        }
    }

    /// Set the shared depth axis; must precede [`Self::with_variable`]
    pub fn with_depth(mut self, depth: Vec<Option<f64>>) -> Result<Self> {
        self.ensure_no_variables("depth")?;
        self.base = self.base.with_depth(depth)?;
        Ok(self)
    }

    /// Set the shared position axes; must precede [`Self::with_variable`]
    pub fn with_position(mut self, lat: Vec<Option<f64>>, lon: Vec<Option<f64>>) -> Result<Self> {
        self.ensure_no_variables("position")?;
        self.base = self.base.with_position(lat, lon)?;
        Ok(self)
    }

    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self> {
        let name = name.into();
        if values.len() != self.base.len() {
            return Err(QcError::length_mismatch(name, self.base.len(), values.len()));
        }
        let samples = Samples {
            values,
            ..self.base.clone()
        };
        match self.variables.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => *existing = samples,
            None => self.variables.push((name, samples)),
        }
        Ok(self)
    }

    pub fn without_timestamp_checks(mut self) -> Self {
        self.timestamp_checks = false;
        self
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(name, _)| name.as_str())
    }

    fn ensure_no_variables(&self, axis: &str) -> Result<()> {
        if !self.variables.is_empty() {
            return Err(QcError::configuration(
                "array stream",
                format!("the {} axis must be set before adding variables", axis),
            ));
        }
        Ok(())
    }
}

impl StreamSource for ArrayStream {
    fn samples(&self, stream_id: &str) -> Result<Option<Cow<'_, Samples>>> {
        Ok(self
            .variables
            .iter()
            .find(|(name, _)| name == stream_id)
            .map(|(_, samples)| Cow::Borrowed(samples)))
    }

    fn checks_timestamps(&self) -> bool {
        self.timestamp_checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qartod::test_support::{hourly, some};

    #[test]
    fn test_variables_share_axes() {
        let stream = ArrayStream::new(hourly(3))
            .with_depth(some(&[1.0, 2.0, 3.0]))
            .unwrap()
            .with_variable("temp", some(&[10.0, 11.0, 12.0]))
            .unwrap()
            .with_variable("salt", some(&[35.0, 35.1, 35.2]))
            .unwrap();

        let samples = stream.samples("salt").unwrap().unwrap();
        assert_eq!(samples.values[1], Some(35.1));
        assert_eq!(samples.depth.as_ref().map(Vec::len), Some(3));
        assert!(stream.samples("oxygen").unwrap().is_none());
        assert_eq!(stream.variable_names().collect::<Vec<_>>(), vec!["temp", "salt"]);
    }

    #[test]
    fn test_length_and_order_checks() {
        assert!(ArrayStream::new(hourly(3)).with_variable("temp", some(&[1.0])).is_err());
        let with_var = ArrayStream::new(hourly(1)).with_variable("temp", some(&[1.0])).unwrap();
        assert!(with_var.with_depth(some(&[1.0])).is_err());
    }
}
