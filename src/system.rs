//! # System Model
//!
//! A [`System`] bundles the astrometric [`Dataset`], the [`ParameterIndexer`],
//! one [`Prior`] per parameter slot and an [`OrbitPropagator`]. It is a pure
//! scoring object: given a full parameter vector it predicts the astrometry,
//! scores the residuals and adds the prior log-densities of the free dimensions.
//!
//! Every secondary body follows its own Keplerian orbit around the shared total
//! mass; bodies do not perturb each other.
//!
//! ## Example Usage
//!
//! ```rust
//! use orbitfit_rs::data::{Dataset, Observation};
//! use orbitfit_rs::system::System;
//!
//! let data = Dataset::new(vec![
//!     Observation::seppa(55000.0, 1, 1000.0, 10.0, 120.0, 1.0),
//!     Observation::seppa(55400.0, 1, 1010.0, 10.0, 121.0, 1.0),
//! ])
//! .unwrap();
//!
//! // Fixed parallax, Gaussian total mass
//! let system = System::new(1, data, 1.5, 50.0, 0.1, 0.0).unwrap();
//! assert_eq!(system.labels().len(), 8);
//! assert_eq!(system.num_free_params(), 7);
//! ```

use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use std::f64::consts::PI;
use std::f64::NEG_INFINITY;
use std::sync::Arc;

use crate::data::{radec_to_seppa, Dataset, QuantityType};
use crate::error::{OrbitFitError, Result};
use crate::kepler::{KeplerPropagator, OrbitElements, OrbitPropagator};
use crate::lnlike::{chi2_lnlike, chi2_lnlike_batch};
use crate::parameters::{ParameterIndexer, ELEMENTS_PER_BODY};
use crate::priors::{NegativePolicy, Prior};

/// Default reference epoch for `tau` (MJD 58849, 2020-01-01).
pub const DEFAULT_TAU_REF_EPOCH: f64 = 58849.0;

/// Optional settings for [`System::with_options`].
#[derive(Debug, Clone)]
pub struct SystemOptions {
    /// Reference epoch (MJD) that `tau` is measured from
    pub tau_ref_epoch: f64,

    /// Complete prior list replacing the defaults; must match the parameter count
    pub priors: Option<Vec<Prior>>,

    /// Per-label priors applied after the defaults (or the full list)
    pub prior_overrides: Vec<(String, Prior)>,

    /// Orbit propagator used to predict astrometry
    pub propagator: Arc<dyn OrbitPropagator>,
}

impl Default for SystemOptions {
    fn default() -> Self {
        Self {
            tau_ref_epoch: DEFAULT_TAU_REF_EPOCH,
            priors: None,
            prior_overrides: Vec::new(),
            propagator: Arc::new(KeplerPropagator::default()),
        }
    }
}

impl SystemOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reference epoch for `tau`.
    pub fn with_tau_ref_epoch(mut self, tau_ref_epoch: f64) -> Self {
        self.tau_ref_epoch = tau_ref_epoch;
        self
    }

    /// Replace the full prior list.
    pub fn with_priors(mut self, priors: Vec<Prior>) -> Self {
        self.priors = Some(priors);
        self
    }

    /// Override the prior of a single labelled parameter, e.g. `"ecc1"`.
    pub fn with_prior(mut self, name: impl Into<String>, prior: Prior) -> Self {
        self.prior_overrides.push((name.into(), prior));
        self
    }

    /// Use a custom orbit propagator.
    pub fn with_propagator(mut self, propagator: Arc<dyn OrbitPropagator>) -> Self {
        self.propagator = propagator;
        self
    }
}

/// Dataset, parameter layout, priors and likelihood of a multi-body system.
#[derive(Debug, Clone)]
pub struct System {
    data: Dataset,
    indexer: ParameterIndexer,
    priors: Vec<Prior>,
    free_indices: Vec<usize>,
    tau_ref_epoch: f64,
    propagator: Arc<dyn OrbitPropagator>,

    // Cached views of the data
    values: Array2<f64>,
    errors: Array2<f64>,
    seppa_rows: Vec<usize>,
}

impl System {
    /// Build a system with the default priors.
    ///
    /// A zero `mass_err` or `plx_err` fixes that parameter; otherwise it gets a
    /// Gaussian prior that rejects negative draws.
    pub fn new(
        num_bodies: usize,
        data: Dataset,
        system_mass: f64,
        plx: f64,
        mass_err: f64,
        plx_err: f64,
    ) -> Result<Self> {
        Self::with_options(
            num_bodies,
            data,
            system_mass,
            plx,
            mass_err,
            plx_err,
            SystemOptions::default(),
        )
    }

    /// Build a system with explicit options.
    pub fn with_options(
        num_bodies: usize,
        data: Dataset,
        system_mass: f64,
        plx: f64,
        mass_err: f64,
        plx_err: f64,
        options: SystemOptions,
    ) -> Result<Self> {
        let indexer = ParameterIndexer::new(num_bodies)?;

        data.validate()?;
        if let Some(obs) = data.iter().find(|o| o.object > num_bodies) {
            return Err(OrbitFitError::InvalidData(format!(
                "observation at epoch {} references body {} but the system has {} bodies",
                obs.epoch, obs.object, num_bodies
            )));
        }
        if !options.tau_ref_epoch.is_finite() {
            return Err(OrbitFitError::InvalidConfiguration(
                "tau_ref_epoch must be finite".to_string(),
            ));
        }

        let mut priors = match options.priors {
            Some(priors) => {
                if priors.len() != indexer.len() {
                    return Err(OrbitFitError::DimensionMismatch(format!(
                        "expected {} priors for {} bodies, got {}",
                        indexer.len(),
                        num_bodies,
                        priors.len()
                    )));
                }
                priors
            }
            None => default_priors(num_bodies, system_mass, plx, mass_err, plx_err)?,
        };

        for (name, prior) in options.prior_overrides {
            let idx = indexer.require(&name)?;
            priors[idx] = prior;
        }

        let values = data.values();
        let errors = data.errors();
        let seppa_rows = data
            .iter()
            .enumerate()
            .filter(|(_, o)| o.quant_type == QuantityType::SepPa)
            .map(|(i, _)| i)
            .collect();
        let free_indices = free_indices(&priors);

        log::debug!(
            "Built system with {} bodies, {} observations, {} free parameters",
            num_bodies,
            data.len(),
            free_indices.len()
        );

        Ok(Self {
            data,
            indexer,
            priors,
            free_indices,
            tau_ref_epoch: options.tau_ref_epoch,
            propagator: options.propagator,
            values,
            errors,
            seppa_rows,
        })
    }

    /// Replace the prior of a labelled parameter.
    pub fn set_prior(&mut self, name: &str, prior: Prior) -> Result<()> {
        let idx = self.indexer.require(name)?;
        self.priors[idx] = prior;
        self.free_indices = free_indices(&self.priors);
        Ok(())
    }

    pub fn indexer(&self) -> &ParameterIndexer {
        &self.indexer
    }

    pub fn labels(&self) -> &[String] {
        self.indexer.labels()
    }

    pub fn num_bodies(&self) -> usize {
        self.indexer.num_bodies()
    }

    /// Length of the full parameter vector.
    pub fn num_params(&self) -> usize {
        self.indexer.len()
    }

    pub fn priors(&self) -> &[Prior] {
        &self.priors
    }

    /// Positions of the dimensions whose prior is not fixed.
    pub fn free_indices(&self) -> &[usize] {
        &self.free_indices
    }

    pub fn num_free_params(&self) -> usize {
        self.free_indices.len()
    }

    pub fn data(&self) -> &Dataset {
        &self.data
    }

    pub fn tau_ref_epoch(&self) -> f64 {
        self.tau_ref_epoch
    }

    pub fn propagator(&self) -> &dyn OrbitPropagator {
        self.propagator.as_ref()
    }

    /// Rows of separation/position-angle data for `body` (empty for the primary, body 0).
    pub fn seppa_indices(&self, body: usize) -> Vec<usize> {
        self.rows_of(body, QuantityType::SepPa)
    }

    /// Rows of RA/Dec data for `body` (empty for the primary, body 0).
    pub fn radec_indices(&self, body: usize) -> Vec<usize> {
        self.rows_of(body, QuantityType::RaDec)
    }

    fn rows_of(&self, body: usize, quant_type: QuantityType) -> Vec<usize> {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, o)| o.object == body && o.quant_type == quant_type)
            .map(|(i, _)| i)
            .collect()
    }

    /// Orbital elements of the 1-based `body` taken from `params`.
    pub fn elements(&self, params: ArrayView1<f64>, body: usize) -> OrbitElements {
        OrbitElements::from_params(params, self.indexer.body_offset(body))
    }

    /// Predicted astrometry, shape `(n_obs, 2)`, in each observation's native units.
    pub fn compute_model(&self, params: ArrayView1<f64>) -> Result<Array2<f64>> {
        self.check_len(params.len())?;

        let mut model = Array2::zeros((self.data.len(), 2));
        for (row, obs) in self.data.iter().enumerate() {
            let elements = self.elements(params, obs.object);
            let (ra, dec) = self
                .propagator
                .radec(&elements, obs.epoch, self.tau_ref_epoch);

            let (q1, q2) = match obs.quant_type {
                QuantityType::RaDec => (ra, dec),
                QuantityType::SepPa => radec_to_seppa(ra, dec),
            };
            model[[row, 0]] = q1;
            model[[row, 1]] = q2;
        }
        Ok(model)
    }

    /// Predicted astrometry for many orbits at once.
    ///
    /// `params` has one orbit per row, shape `(n_orbits, P)`; the result has
    /// shape `(n_obs, 2, n_orbits)`.
    pub fn compute_model_batch(&self, params: ArrayView2<f64>) -> Result<Array3<f64>> {
        self.check_len(params.ncols())?;

        let mut model = Array3::zeros((self.data.len(), 2, params.nrows()));
        for (k, row) in params.outer_iter().enumerate() {
            let single = self.compute_model(row)?;
            model.slice_mut(s![.., .., k]).assign(&single);
        }
        Ok(model)
    }

    /// Whether every body's elements describe a bound orbit with positive scales.
    pub fn is_physical(&self, params: ArrayView1<f64>) -> bool {
        params.len() == self.indexer.len()
            && (1..=self.num_bodies()).all(|body| self.elements(params, body).is_physical())
    }

    /// Chi-square log-likelihood of the data; `-inf` for unphysical inputs.
    pub fn log_likelihood(&self, params: ArrayView1<f64>) -> f64 {
        if !self.is_physical(params) {
            return NEG_INFINITY;
        }

        let model = match self.compute_model(params) {
            Ok(model) => model,
            Err(_) => return NEG_INFINITY,
        };
        let lnlike = match chi2_lnlike(&self.values, &self.errors, &model, &self.seppa_rows) {
            Ok(chi2) => chi2.sum(),
            Err(_) => return NEG_INFINITY,
        };

        if lnlike.is_nan() {
            NEG_INFINITY
        } else {
            lnlike
        }
    }

    /// [`System::log_likelihood`] for every row of `params`, shape `(n_orbits, P)`.
    pub fn log_likelihood_batch(&self, params: ArrayView2<f64>) -> Result<Array1<f64>> {
        let model = self.compute_model_batch(params)?;
        let chi2 = chi2_lnlike_batch(&self.values, &self.errors, &model, &self.seppa_rows)?;

        let mut lnlike = chi2.sum_axis(Axis(0)).sum_axis(Axis(0));
        for (ll, row) in lnlike.iter_mut().zip(params.outer_iter()) {
            if ll.is_nan() || !self.is_physical(row) {
                *ll = NEG_INFINITY;
            }
        }
        Ok(lnlike)
    }

    /// Sum of the log-densities of the free dimensions.
    pub fn log_prior(&self, params: ArrayView1<f64>) -> f64 {
        if params.len() != self.indexer.len() {
            return NEG_INFINITY;
        }
        self.free_indices
            .iter()
            .map(|&i| self.priors[i].log_density(params[i]))
            .sum()
    }

    /// `log_prior + log_likelihood`; the likelihood is skipped when the prior is `-inf`.
    pub fn log_probability(&self, params: ArrayView1<f64>) -> f64 {
        let lp = self.log_prior(params);
        if lp == NEG_INFINITY || lp.is_nan() {
            return NEG_INFINITY;
        }

        let total = lp + self.log_likelihood(params);
        if total.is_nan() {
            NEG_INFINITY
        } else {
            total
        }
    }

    /// Draw one full parameter vector from the priors.
    pub fn draw_from_priors<R: Rng + ?Sized>(&self, rng: &mut R) -> Array1<f64> {
        self.priors.iter().map(|prior| prior.draw(rng)).collect()
    }

    /// Draw `n` parameter vectors from the priors, shape `(n, P)`.
    pub fn sample_priors<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Array2<f64> {
        let mut samples = Array2::zeros((n, self.indexer.len()));
        for (j, prior) in self.priors.iter().enumerate() {
            samples.column_mut(j).assign(&prior.sample(n, rng));
        }
        samples
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.indexer.len() {
            return Err(OrbitFitError::DimensionMismatch(format!(
                "parameter vector has {} entries, expected {}",
                len,
                self.indexer.len()
            )));
        }
        Ok(())
    }
}

fn free_indices(priors: &[Prior]) -> Vec<usize> {
    priors
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_fixed())
        .map(|(i, _)| i)
        .collect()
}

/// Default prior list for `num_bodies` bodies.
fn default_priors(
    num_bodies: usize,
    system_mass: f64,
    plx: f64,
    mass_err: f64,
    plx_err: f64,
) -> Result<Vec<Prior>> {
    let mut priors = Vec::with_capacity(num_bodies * ELEMENTS_PER_BODY + 2);
    for _ in 0..num_bodies {
        priors.push(Prior::log_uniform(0.001, 1e7)?);
        priors.push(Prior::uniform(0.0, 1.0)?);
        priors.push(Prior::sine());
        priors.push(Prior::uniform(0.0, 2.0 * PI)?);
        priors.push(Prior::uniform(0.0, 2.0 * PI)?);
        priors.push(Prior::uniform(0.0, 1.0)?);
    }
    priors.push(shared_prior("plx", plx, plx_err)?);
    priors.push(shared_prior("mtot", system_mass, mass_err)?);
    Ok(priors)
}

fn shared_prior(name: &str, value: f64, err: f64) -> Result<Prior> {
    if !value.is_finite() || value <= 0.0 {
        return Err(OrbitFitError::InvalidConfiguration(format!(
            "{} must be positive and finite, got {}",
            name, value
        )));
    }
    if !err.is_finite() || err < 0.0 {
        return Err(OrbitFitError::InvalidConfiguration(format!(
            "{} uncertainty must be non-negative, got {}",
            name, err
        )));
    }

    if err == 0.0 {
        Ok(Prior::fixed(value))
    } else {
        Ok(Prior::gaussian_with(value, err, NegativePolicy::Resample)?)
    }
}
