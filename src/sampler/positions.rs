//! Helpers for editing walker position arrays.
//!
//! Position arrays have shape `(temperatures, walkers, parameters)`. These
//! functions cover the usual edits made between runs: wrapping a periodic
//! angle back into range, reflecting half of the walkers across a degenerate
//! angle, and seeding walkers around a known solution.

use ndarray::{s, Array3, ArrayView1, Axis};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{OrbitFitError, Result};

/// Fail unless `positions` has exactly the `expected` shape.
pub fn check_shape(positions: &Array3<f64>, expected: (usize, usize, usize)) -> Result<()> {
    let (t, w, p) = expected;
    if positions.shape() != [t, w, p] {
        return Err(OrbitFitError::DimensionMismatch(format!(
            "positions have shape {:?}, expected [{}, {}, {}]",
            positions.shape(),
            t,
            w,
            p
        )));
    }
    Ok(())
}

/// Wrap every entry of dimension `dim` into `[0, period)`.
pub fn wrap_angle(positions: &mut Array3<f64>, dim: usize, period: f64) -> Result<()> {
    check_dim(positions, dim)?;
    check_period(period)?;

    positions
        .slice_mut(s![.., .., dim])
        .mapv_inplace(|x| wrap_value(x, period));
    Ok(())
}

/// Add `offset` to dimension `dim` of the first half of the walkers of every
/// temperature, then wrap the dimension into `[0, period)`.
pub fn offset_half_walkers(
    positions: &mut Array3<f64>,
    dim: usize,
    offset: f64,
    period: f64,
) -> Result<()> {
    check_dim(positions, dim)?;
    check_period(period)?;

    let half = positions.len_of(Axis(1)) / 2;
    positions
        .slice_mut(s![.., ..half, dim])
        .mapv_inplace(|x| x + offset);
    wrap_angle(positions, dim, period)
}

/// Walkers scattered around `center` with per-dimension standard deviations `scales`.
///
/// A zero scale keeps that dimension at its centre value in every walker.
pub fn gaussian_ball<R: Rng + ?Sized>(
    center: ArrayView1<f64>,
    scales: ArrayView1<f64>,
    num_temps: usize,
    num_walkers: usize,
    rng: &mut R,
) -> Result<Array3<f64>> {
    if center.len() != scales.len() {
        return Err(OrbitFitError::DimensionMismatch(format!(
            "center has {} entries but scales has {}",
            center.len(),
            scales.len()
        )));
    }
    if scales.iter().any(|s| !s.is_finite() || *s < 0.0) {
        return Err(OrbitFitError::InvalidConfiguration(
            "scales must be finite and non-negative".to_string(),
        ));
    }

    let mut positions = Array3::zeros((num_temps, num_walkers, center.len()));
    for mut walker in positions.lanes_mut(Axis(2)) {
        for (j, x) in walker.iter_mut().enumerate() {
            let noise: f64 = rng.sample(StandardNormal);
            *x = center[j] + scales[j] * noise;
        }
    }
    Ok(positions)
}

fn wrap_value(x: f64, period: f64) -> f64 {
    let wrapped = x.rem_euclid(period);
    // rem_euclid can round up to `period` for tiny negative inputs
    if wrapped >= period {
        0.0
    } else {
        wrapped
    }
}

fn check_dim(positions: &Array3<f64>, dim: usize) -> Result<()> {
    let num_params = positions.len_of(Axis(2));
    if dim >= num_params {
        return Err(OrbitFitError::DimensionMismatch(format!(
            "dimension {} out of range for {} parameters",
            dim, num_params
        )));
    }
    Ok(())
}

fn check_period(period: f64) -> Result<()> {
    if !(period.is_finite() && period > 0.0) {
        return Err(OrbitFitError::InvalidConfiguration(format!(
            "period must be positive and finite, got {}",
            period
        )));
    }
    Ok(())
}
