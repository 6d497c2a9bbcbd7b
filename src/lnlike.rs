//! Chi-square scoring of model predictions against astrometry.

use ndarray::{Array2, Array3, Axis, Zip};

use crate::error::{OrbitFitError, Result};

/// Per-element chi-square log-likelihood, `-0.5 * ((data - model) / err)^2`.
///
/// All three arrays have shape `(n_obs, 2)`. For the rows listed in
/// `seppa_rows` the second column is a position angle in degrees and its
/// residual is wrapped into `[-180, 180)` before scoring, so a model PA of
/// 359 against a measurement of 1 counts as a 2 degree miss.
///
/// # Examples
///
/// ```
/// use ndarray::Array2;
/// use orbitfit_rs::lnlike::chi2_lnlike;
///
/// let data = Array2::from_elem((3, 2), 5.0);
/// let errors = Array2::ones((3, 2));
/// let model = Array2::from_elem((3, 2), 4.0);
/// let chi2 = chi2_lnlike(&data, &errors, &model, &[]).unwrap();
/// assert!(chi2.iter().all(|&v| v == -0.5));
/// ```
pub fn chi2_lnlike(
    data: &Array2<f64>,
    errors: &Array2<f64>,
    model: &Array2<f64>,
    seppa_rows: &[usize],
) -> Result<Array2<f64>> {
    if data.shape() != errors.shape() || data.shape() != model.shape() {
        return Err(OrbitFitError::DimensionMismatch(format!(
            "data {:?}, errors {:?} and model {:?} must share a shape",
            data.shape(),
            errors.shape(),
            model.shape()
        )));
    }
    if data.ncols() != 2 {
        return Err(OrbitFitError::DimensionMismatch(format!(
            "expected two columns, got {}",
            data.ncols()
        )));
    }

    let mut residuals = data - model;
    for &row in seppa_rows {
        if row >= residuals.nrows() {
            return Err(OrbitFitError::DimensionMismatch(format!(
                "seppa row {} out of range for {} observations",
                row,
                residuals.nrows()
            )));
        }
        residuals[[row, 1]] = wrap_degrees(residuals[[row, 1]]);
    }

    let mut chi2 = Array2::zeros(data.raw_dim());
    Zip::from(&mut chi2)
        .and(&residuals)
        .and(errors)
        .for_each(|c, &r, &e| *c = -0.5 * (r / e).powi(2));

    Ok(chi2)
}

/// [`chi2_lnlike`] for many models at once.
///
/// `data` and `errors` have shape `(n_obs, 2)` and `model` has shape
/// `(n_obs, 2, n_models)`, as produced by
/// [`System::compute_model_batch`](crate::System::compute_model_batch).
/// The result has the shape of `model`.
pub fn chi2_lnlike_batch(
    data: &Array2<f64>,
    errors: &Array2<f64>,
    model: &Array3<f64>,
    seppa_rows: &[usize],
) -> Result<Array3<f64>> {
    if model.shape()[..2] != *data.shape() {
        return Err(OrbitFitError::DimensionMismatch(format!(
            "model {:?} does not stack data of shape {:?}",
            model.shape(),
            data.shape()
        )));
    }

    let mut chi2 = Array3::zeros(model.raw_dim());
    for (mut out, slice) in chi2.axis_iter_mut(Axis(2)).zip(model.axis_iter(Axis(2))) {
        out.assign(&chi2_lnlike(data, errors, &slice.to_owned(), seppa_rows)?);
    }
    Ok(chi2)
}

/// Wrap an angle difference in degrees into `[-180, 180)`.
pub fn wrap_degrees(delta: f64) -> f64 {
    (delta + 180.0).rem_euclid(360.0) - 180.0
}
