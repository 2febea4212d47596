//! Density inversion test for vertical profiles.

use crate::error::{QcError, Result};
use crate::models::{Flag, finite};
use crate::qartod::{check_length, check_threshold};
use serde::{Deserialize, Serialize};

/// Thresholds are positive tolerances on the density decrease with depth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DensityInversionParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspect_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_threshold: Option<f64>,
}

impl DensityInversionParams {
    pub fn validate(&self, location: &str) -> Result<()> {
        if let Some(t) = self.suspect_threshold {
            check_threshold(location, "suspect_threshold", t)?;
        }
        if let Some(t) = self.fail_threshold {
            check_threshold(location, "fail_threshold", t)?;
        }
        if let (Some(suspect), Some(fail)) = (self.suspect_threshold, self.fail_threshold) {
            if suspect > fail {
                return Err(QcError::configuration(
                    location,
                    format!("suspect_threshold {} exceeds fail_threshold {}", suspect, fail),
                ));
            }
        }
        Ok(())
    }
}

/// `values` are densities and `depth` is positive down
///
/// Both members of an inverted pair receive the flag. A missing density or
/// depth marks that record and the following one MISSING.
pub fn density_inversion_test(
    values: &[Option<f64>],
    depth: &[Option<f64>],
    params: &DensityInversionParams,
) -> Result<Vec<Flag>> {
    check_length("depth", values.len(), depth.len())?;
    let n = values.len();
    let records: Vec<Option<(f64, f64)>> = values
        .iter()
        .zip(depth)
        .map(|(rho, z)| finite(*rho).zip(finite(*z)))
        .collect();

    if n == 1 {
        let flag = if records[0].is_some() { Flag::NotEvaluated } else { Flag::Missing };
        return Ok(vec![flag]);
    }

    let mut flags = vec![Flag::Pass; n];
    for i in 0..n {
        if records[i].is_none() {
            flags[i] = Flag::Missing;
            if i + 1 < n {
                flags[i + 1] = Flag::Missing;
            }
        }
    }

    for i in 1..n {
        let (Some((rho0, z0)), Some((rho1, z1))) = (records[i - 1], records[i]) else {
            continue;
        };
        let dz = z1 - z0;
        if dz == 0.0 {
            continue;
        }
        let inversion = -(dz.signum() * (rho1 - rho0));
        let flag = if params.fail_threshold.is_some_and(|t| inversion > t) {
            Flag::Fail
        } else if params.suspect_threshold.is_some_and(|t| inversion > t) {
            Flag::Suspect
        } else {
            continue;
        };
        flags[i - 1] = flags[i - 1].max(flag);
        flags[i] = flags[i].max(flag);
    }
    Ok(flags)
}
