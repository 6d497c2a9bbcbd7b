//! Orbits For The Impatient (OFTI) rejection sampler.
//!
//! Candidates are drawn in batches. With [`OftiProposal::ScaleAndRotate`] every
//! body's orbit is first drawn from the priors with a unit semi-major axis,
//! then scaled and rotated so that it passes through a position drawn from the
//! measurement at that body's reference epoch (its observation with the
//! smallest separation uncertainty). The epoch of periastron is re-phased so
//! the body keeps the same mean anomaly at the reference epoch, and the node
//! is folded into `[0, π)`, which leaves the sky positions unchanged.
//!
//! A candidate with log-likelihood `L` is accepted when `ln u < L - max(L)`,
//! the maximum taken over its batch.

use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::f64::NEG_INFINITY;

use super::{build_pool, install, Sampler};
use crate::data::radec_to_seppa;
use crate::error::{OrbitFitError, Result};
use crate::kepler::OrbitElements;
use crate::parameters::OrbitalElement;
use crate::results::{Results, RunRecord};
use crate::system::System;

/// How OFTI generates candidate orbits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OftiProposal {
    /// Scale and rotate prior draws through one measured position per body
    #[default]
    ScaleAndRotate,
    /// Draw every parameter from its prior
    Prior,
}

/// Configuration of the [`Ofti`] sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OftiConfig {
    /// Candidates generated per batch
    pub batch_size: usize,

    /// Candidate generation scheme
    pub proposal: OftiProposal,

    /// Worker threads; `None` uses rayon's global pool
    pub num_threads: Option<usize>,

    /// Seed of the master random number generator
    pub seed: u64,

    /// Give up after this many batches in a single run
    pub max_batches: Option<usize>,

    /// Give up after this many consecutive batches without a single candidate
    /// of non-zero posterior probability
    #[serde(default = "default_max_empty_batches")]
    pub max_empty_batches: usize,
}

fn default_max_empty_batches() -> usize {
    100
}

impl Default for OftiConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            proposal: OftiProposal::ScaleAndRotate,
            num_threads: None,
            seed: 42,
            max_batches: None,
            max_empty_batches: default_max_empty_batches(),
        }
    }
}

impl OftiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_proposal(mut self, proposal: OftiProposal) -> Self {
        self.proposal = proposal;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_batches(mut self, max_batches: usize) -> Self {
        self.max_batches = Some(max_batches);
        self
    }

    pub fn with_max_empty_batches(mut self, max_empty_batches: usize) -> Self {
        self.max_empty_batches = max_empty_batches;
        self
    }
}

/// Measurement an orbit is scaled and rotated through.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ReferenceEpoch {
    epoch: f64,
    sep: f64,
    sep_err: f64,
    pa: f64,
    pa_err: f64,
}

/// Per-body data needed by the scale-and-rotate proposal.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BodyProposal {
    offset: usize,
    reference: ReferenceEpoch,
}

/// OFTI rejection sampler.
#[derive(Debug)]
pub struct Ofti {
    system: System,
    config: OftiConfig,
    results: Results,
    rng: StdRng,
    pool: Option<ThreadPool>,
    bodies: Vec<BodyProposal>,
}

impl Ofti {
    pub fn new(system: System, config: OftiConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(OrbitFitError::InvalidConfiguration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if config.max_batches == Some(0) {
            return Err(OrbitFitError::InvalidConfiguration(
                "max_batches must be at least 1".to_string(),
            ));
        }
        if config.max_empty_batches == 0 {
            return Err(OrbitFitError::InvalidConfiguration(
                "max_empty_batches must be at least 1".to_string(),
            ));
        }

        let pool = build_pool(config.num_threads, "ofti")?;
        let bodies = match config.proposal {
            OftiProposal::ScaleAndRotate => scalable_bodies(&system),
            OftiProposal::Prior => Vec::new(),
        };
        log::debug!(
            "OFTI ({:?}) scaling {} of {} bodies, batches of {}",
            config.proposal,
            bodies.len(),
            system.num_bodies(),
            config.batch_size
        );

        let results = Results::new("OFTI", system.labels().to_vec());
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            system,
            config,
            results,
            rng,
            pool,
            bodies,
        })
    }

    pub fn config(&self) -> &OftiConfig {
        &self.config
    }

    /// Generate one batch of candidates with their log-likelihoods.
    ///
    /// Returns `(candidates, lnlike)` with shapes `(n, P)` and `(n,)`. Candidates
    /// outside the prior support score `-inf`, so they are never accepted.
    pub fn prepare_samples(&mut self, n: usize) -> (Array2<f64>, Array1<f64>) {
        let seeds: Vec<u64> = (0..n).map(|_| self.rng.gen()).collect();

        let system = &self.system;
        let bodies = &self.bodies;
        let candidates: Vec<(Array1<f64>, f64)> = install(self.pool.as_ref(), || {
            seeds
                .par_iter()
                .map(|&seed| {
                    let mut rng = StdRng::seed_from_u64(seed);
                    let params = propose(system, bodies, &mut rng);
                    let lnprior = system.log_prior(params.view());
                    let lnlike = if lnprior == NEG_INFINITY || lnprior.is_nan() {
                        NEG_INFINITY
                    } else {
                        system.log_likelihood(params.view())
                    };
                    (params, lnlike)
                })
                .collect()
        });

        let mut samples = Array2::zeros((n, system.num_params()));
        let mut lnlike = Array1::zeros(n);
        for (i, (params, ll)) in candidates.into_iter().enumerate() {
            samples.row_mut(i).assign(&params);
            lnlike[i] = ll;
        }
        (samples, lnlike)
    }

    /// Rejection step over one batch; returns the indices of accepted candidates.
    fn reject(&mut self, lnlike: &Array1<f64>) -> Vec<usize> {
        let max_lnlike = lnlike
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(NEG_INFINITY, f64::max);
        if max_lnlike == NEG_INFINITY {
            return Vec::new();
        }

        lnlike
            .iter()
            .enumerate()
            .filter_map(|(i, &ll)| {
                let ln_u = self.rng.gen::<f64>().ln();
                (ln_u < ll - max_lnlike).then_some(i)
            })
            .collect()
    }

    /// Sample until exactly `n_accept` orbits are accepted and append them to the results.
    ///
    /// Returns `SamplingExhausted` and leaves the results untouched when
    /// `max_batches` runs out, or when `max_empty_batches` consecutive batches
    /// hold no candidate of non-zero posterior probability.
    pub fn run(&mut self, n_accept: usize) -> Result<usize> {
        let p = self.system.num_params();
        let mut accepted = Array2::zeros((0, p));
        let mut accepted_lnlike = Array1::zeros(0);
        let mut num_batches = 0;
        let mut num_empty = 0;
        let mut num_proposed = 0;

        while accepted.nrows() < n_accept {
            if let Some(max_batches) = self.config.max_batches {
                if num_batches >= max_batches {
                    return Err(OrbitFitError::SamplingExhausted(format!(
                        "{}/{} orbits accepted after {} batches",
                        accepted.nrows(),
                        n_accept,
                        num_batches
                    )));
                }
            }

            let (samples, lnlike) = self.prepare_samples(self.config.batch_size);
            let keep = self.reject(&lnlike);
            num_batches += 1;
            num_proposed += self.config.batch_size;

            // The best finite candidate of a batch is always kept
            if keep.is_empty() {
                num_empty += 1;
                if num_empty >= self.config.max_empty_batches {
                    return Err(OrbitFitError::SamplingExhausted(format!(
                        "no candidate with non-zero posterior probability in {} consecutive batches \
                         ({}/{} orbits accepted)",
                        num_empty,
                        accepted.nrows(),
                        n_accept
                    )));
                }
            } else {
                num_empty = 0;
                let rows = samples.select(Axis(0), &keep);
                let rows_lnlike = lnlike.select(Axis(0), &keep);
                accepted = stack_rows(accepted.view(), rows.view())?;
                accepted_lnlike = concatenate(
                    Axis(0),
                    &[accepted_lnlike.view(), rows_lnlike.view()],
                )
                .map_err(|e| OrbitFitError::DimensionMismatch(e.to_string()))?;
            }

            log::info!(
                "{}/{} orbits accepted",
                accepted.nrows().min(n_accept),
                n_accept
            );
        }

        let total_accepted = accepted.nrows();
        let post = accepted.slice(s![..n_accept, ..]);
        let lnlike = accepted_lnlike.slice(s![..n_accept]);
        self.results.add_samples(post, lnlike)?;
        self.results.record_run(RunRecord {
            sampler: self.name().to_string(),
            samples_added: n_accept,
            acceptance_fraction: (num_proposed > 0)
                .then(|| total_accepted as f64 / num_proposed as f64),
        });

        Ok(n_accept)
    }
}

impl Sampler for Ofti {
    fn name(&self) -> &str {
        "OFTI"
    }

    fn system(&self) -> &System {
        &self.system
    }

    fn results(&self) -> &Results {
        &self.results
    }

    fn run_sampler(&mut self, total_orbits: usize) -> Result<usize> {
        self.run(total_orbits)
    }
}

/// Bodies that have astrometry and free `sma`, `pan` and `tau`; the others are
/// drawn straight from their priors.
fn scalable_bodies(system: &System) -> Vec<BodyProposal> {
    let indexer = system.indexer();
    let priors = system.priors();
    let mut bodies = Vec::new();

    for body in 1..=system.num_bodies() {
        let free = [
            OrbitalElement::SemiMajorAxis,
            OrbitalElement::PositionAngleOfNodes,
            OrbitalElement::EpochOfPeriastron,
        ]
        .iter()
        .all(|&element| {
            indexer
                .body_index(body, element)
                .map(|idx| !priors[idx].is_fixed())
                .unwrap_or(false)
        });
        if !free {
            log::debug!("body {} has fixed geometry; drawing it from the priors", body);
            continue;
        }

        let reference = system
            .data()
            .iter()
            .filter(|obs| obs.object == body)
            .map(|obs| {
                let (sep, sep_err, pa, pa_err) = obs.as_seppa();
                ReferenceEpoch {
                    epoch: obs.epoch,
                    sep,
                    sep_err,
                    pa,
                    pa_err,
                }
            })
            .min_by(|a, b| {
                a.sep_err
                    .partial_cmp(&b.sep_err)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        match reference {
            Some(reference) => {
                if let Ok(offset) = indexer.body_index(body, OrbitalElement::SemiMajorAxis) {
                    bodies.push(BodyProposal { offset, reference });
                }
            }
            None => log::debug!("body {} has no astrometry; drawing it from the priors", body),
        }
    }
    bodies
}

/// One candidate parameter vector.
fn propose<R: Rng + ?Sized>(system: &System, bodies: &[BodyProposal], rng: &mut R) -> Array1<f64> {
    let mut params = system.draw_from_priors(rng);

    for body in bodies {
        let sma = body.offset;
        let aop = body.offset + OrbitalElement::ArgumentOfPeriastron.offset();
        let pan = body.offset + OrbitalElement::PositionAngleOfNodes.offset();
        let tau = body.offset + OrbitalElement::EpochOfPeriastron.offset();
        let reference = &body.reference;

        params[sma] = 1.0;
        let unit = OrbitElements::from_params(params.view(), body.offset);
        let (ra, dec) = system
            .propagator()
            .radec(&unit, reference.epoch, system.tau_ref_epoch());
        let (sep_model, pa_model) = radec_to_seppa(ra, dec);

        let noise_sep: f64 = rng.sample(StandardNormal);
        let noise_pa: f64 = rng.sample(StandardNormal);
        let sep_target = reference.sep + reference.sep_err * noise_sep;
        let pa_target = reference.pa + reference.pa_err * noise_pa;

        // Unusable geometry; the likelihood rejects it
        if !(sep_model > 0.0 && sep_target > 0.0) {
            params[sma] = f64::NAN;
            continue;
        }

        params[sma] = sep_target / sep_model;
        params[pan] += (pa_target - pa_model).to_radians();

        // Keep the mean anomaly at the reference epoch
        let scaled = OrbitElements::from_params(params.view(), body.offset);
        let dt = reference.epoch - system.tau_ref_epoch();
        params[tau] =
            (params[tau] + dt / scaled.period_days() - dt / unit.period_days()).rem_euclid(1.0);

        let mut node = params[pan].rem_euclid(2.0 * PI);
        let mut periastron = params[aop];
        if node >= PI {
            node -= PI;
            periastron += PI;
        }
        params[pan] = node;
        params[aop] = periastron.rem_euclid(2.0 * PI);
    }

    params
}

fn stack_rows<'a>(a: ArrayView2<'a, f64>, b: ArrayView2<'a, f64>) -> Result<Array2<f64>> {
    concatenate(Axis(0), &[a, b])
        .map_err(|e| OrbitFitError::DimensionMismatch(e.to_string()))
}
