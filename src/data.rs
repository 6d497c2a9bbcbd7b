//! Astrometric data.
//!
//! A [`Dataset`] is an ordered table of relative-astrometry measurements of the
//! secondary bodies. Each [`Observation`] carries its epoch (MJD), the 1-based
//! index of the body it measures, the measurement type and two measured values
//! with their uncertainties:
//!
//! - [`QuantityType::RaDec`]: right ascension and declination offsets (mas)
//! - [`QuantityType::SepPa`]: separation (mas) and position angle (degrees east of north)
//!
//! Reading files is left to the caller; datasets can be built in code or loaded
//! through serde.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{OrbitFitError, Result};

/// Kind of relative astrometry stored in an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityType {
    /// `quant1` = RA offset (mas), `quant2` = Dec offset (mas)
    RaDec,
    /// `quant1` = separation (mas), `quant2` = position angle (degrees)
    SepPa,
}

/// A single astrometric measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Epoch of the observation (MJD)
    pub epoch: f64,
    /// 1-based index of the secondary body
    pub object: usize,
    pub quant1: f64,
    pub quant1_err: f64,
    pub quant2: f64,
    pub quant2_err: f64,
    pub quant_type: QuantityType,
}

impl Observation {
    /// RA/Dec offset measurement.
    pub fn radec(epoch: f64, object: usize, ra: f64, ra_err: f64, dec: f64, dec_err: f64) -> Self {
        Self {
            epoch,
            object,
            quant1: ra,
            quant1_err: ra_err,
            quant2: dec,
            quant2_err: dec_err,
            quant_type: QuantityType::RaDec,
        }
    }

    /// Separation/position-angle measurement.
    pub fn seppa(epoch: f64, object: usize, sep: f64, sep_err: f64, pa: f64, pa_err: f64) -> Self {
        Self {
            epoch,
            object,
            quant1: sep,
            quant1_err: sep_err,
            quant2: pa,
            quant2_err: pa_err,
            quant_type: QuantityType::SepPa,
        }
    }

    /// Separation, position angle and their uncertainties, converting RA/Dec if needed.
    ///
    /// For RA/Dec measurements the separation error is the mean of the two offset
    /// errors and the position angle error is that length seen from the separation.
    pub fn as_seppa(&self) -> (f64, f64, f64, f64) {
        match self.quant_type {
            QuantityType::SepPa => (self.quant1, self.quant1_err, self.quant2, self.quant2_err),
            QuantityType::RaDec => {
                let (sep, pa) = radec_to_seppa(self.quant1, self.quant2);
                let sep_err = 0.5 * (self.quant1_err + self.quant2_err);
                let pa_err = if sep > 0.0 {
                    (sep_err / sep).to_degrees()
                } else {
                    180.0
                };
                (sep, sep_err, pa, pa_err)
            }
        }
    }

    fn validate(&self, row: usize) -> Result<()> {
        let values = [self.epoch, self.quant1, self.quant2];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(OrbitFitError::InvalidData(format!(
                "observation {} has non-finite values",
                row
            )));
        }
        for err in [self.quant1_err, self.quant2_err] {
            if !(err.is_finite() && err > 0.0) {
                return Err(OrbitFitError::InvalidData(format!(
                    "observation {} has a non-positive uncertainty ({})",
                    row, err
                )));
            }
        }
        if self.object == 0 {
            return Err(OrbitFitError::InvalidData(format!(
                "observation {} references body 0; secondary bodies are numbered from 1",
                row
            )));
        }
        Ok(())
    }
}

/// An ordered table of observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    observations: Vec<Observation>,
}

impl Dataset {
    /// Build a dataset, validating every row.
    pub fn new(observations: Vec<Observation>) -> Result<Self> {
        let dataset = Self { observations };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Check every row; useful for datasets loaded through serde.
    pub fn validate(&self) -> Result<()> {
        for (row, obs) in self.observations.iter().enumerate() {
            obs.validate(row)?;
        }
        Ok(())
    }

    /// Append a validated observation.
    pub fn push(&mut self, observation: Observation) -> Result<()> {
        observation.validate(self.observations.len())?;
        self.observations.push(observation);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    /// Epochs of all observations.
    pub fn epochs(&self) -> Array1<f64> {
        self.observations.iter().map(|o| o.epoch).collect()
    }

    /// Highest body index referenced by the data (0 when empty).
    pub fn max_object(&self) -> usize {
        self.observations.iter().map(|o| o.object).max().unwrap_or(0)
    }

    /// Measured values, shape `(n_obs, 2)`.
    pub fn values(&self) -> Array2<f64> {
        let mut values = Array2::zeros((self.len(), 2));
        for (i, obs) in self.observations.iter().enumerate() {
            values[[i, 0]] = obs.quant1;
            values[[i, 1]] = obs.quant2;
        }
        values
    }

    /// Measurement uncertainties, shape `(n_obs, 2)`.
    pub fn errors(&self) -> Array2<f64> {
        let mut errors = Array2::zeros((self.len(), 2));
        for (i, obs) in self.observations.iter().enumerate() {
            errors[[i, 0]] = obs.quant1_err;
            errors[[i, 1]] = obs.quant2_err;
        }
        errors
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}

/// Convert an RA/Dec offset pair to separation and position angle (degrees in `[0, 360)`).
pub fn radec_to_seppa(ra: f64, dec: f64) -> (f64, f64) {
    let sep = ra.hypot(dec);
    let pa = ra.atan2(dec).to_degrees().rem_euclid(360.0);
    (sep, pa)
}

/// Convert separation and position angle (degrees) to RA/Dec offsets.
pub fn seppa_to_radec(sep: f64, pa: f64) -> (f64, f64) {
    let pa = pa.to_radians();
    (sep * pa.sin(), sep * pa.cos())
}

/// Element-wise [`radec_to_seppa`] over arrays.
pub fn radec2seppa(ra: &Array1<f64>, dec: &Array1<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
    if ra.len() != dec.len() {
        return Err(OrbitFitError::DimensionMismatch(format!(
            "ra has {} entries but dec has {}",
            ra.len(),
            dec.len()
        )));
    }

    let mut sep = Array1::zeros(ra.len());
    let mut pa = Array1::zeros(ra.len());
    for i in 0..ra.len() {
        let (s, p) = radec_to_seppa(ra[i], dec[i]);
        sep[i] = s;
        pa[i] = p;
    }
    Ok((sep, pa))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_radec2seppa() {
        let ra = array![-1.0, 0.0, -1.0, 1.0];
        let dec = array![0.0, -1.0, -1.0, 1.0];
        let (sep, pa) = radec2seppa(&ra, &dec).unwrap();

        let expected_sep = [1.0, 1.0, 2f64.sqrt(), 2f64.sqrt()];
        let expected_pa = [270.0, 180.0, 225.0, 45.0];
        for i in 0..4 {
            assert_relative_eq!(sep[i], expected_sep[i], epsilon = 1e-12);
            assert_relative_eq!(pa[i], expected_pa[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_seppa_radec_inverse() {
        let (ra, dec) = seppa_to_radec(250.0, 123.0);
        let (sep, pa) = radec_to_seppa(ra, dec);
        assert_relative_eq!(sep, 250.0, epsilon = 1e-9);
        assert_relative_eq!(pa, 123.0, epsilon = 1e-9);
    }

    #[test]
    fn test_dataset_validation() {
        assert!(Dataset::new(vec![Observation::seppa(55000.0, 1, 100.0, 0.0, 90.0, 1.0)]).is_err());
        assert!(Dataset::new(vec![Observation::radec(55000.0, 0, 1.0, 1.0, 1.0, 1.0)]).is_err());
        assert!(Dataset::new(vec![Observation::radec(f64::NAN, 1, 1.0, 1.0, 1.0, 1.0)]).is_err());

        let mut data = Dataset::default();
        data.push(Observation::radec(55000.0, 2, 1.0, 0.1, 2.0, 0.2)).unwrap();
        data.push(Observation::seppa(55100.0, 1, 100.0, 1.0, 90.0, 0.5)).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.max_object(), 2);
        assert_eq!(data.values()[[0, 1]], 2.0);
        assert_eq!(data.errors()[[1, 1]], 0.5);
        assert_eq!(data.epochs()[1], 55100.0);
    }

    #[test]
    fn test_as_seppa_from_radec() {
        let obs = Observation::radec(55000.0, 1, 3.0, 0.1, 4.0, 0.3);
        let (sep, sep_err, pa, pa_err) = obs.as_seppa();
        assert_relative_eq!(sep, 5.0, epsilon = 1e-12);
        assert_relative_eq!(sep_err, 0.2, epsilon = 1e-12);
        assert_relative_eq!(pa, 3f64.atan2(4.0).to_degrees(), epsilon = 1e-12);
        assert_relative_eq!(pa_err, (0.2f64 / 5.0).to_degrees(), epsilon = 1e-12);
    }
}
