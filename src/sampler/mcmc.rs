//! Parallel-tempered affine-invariant ensemble sampler.
//!
//! Each temperature holds an ensemble of walkers advanced with the
//! Goodman & Weare stretch move: the ensemble is split into two halves and
//! every walker of one half is stretched towards a random walker of the other
//! half. Only the free (non-fixed) dimensions move.
//!
//! With more than one temperature the likelihood of temperature `i` is raised
//! to `beta_i = 1 / T_i` for a geometric ladder `T_i = step^i`, and walkers of
//! adjacent temperatures propose to exchange positions after every step. Only
//! the `T = 0` (`beta = 1`) walkers are recorded as posterior samples.

use ndarray::{s, Array1, Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::f64::NEG_INFINITY;

use super::positions::check_shape;
use super::{build_pool, install, Sampler};
use crate::error::{OrbitFitError, Result};
use crate::results::{Results, RunRecord};
use crate::system::System;

/// Configuration of the [`Mcmc`] sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McmcConfig {
    /// Number of temperatures (1 disables tempering)
    pub num_temps: usize,

    /// Walkers per temperature
    pub num_walkers: usize,

    /// Worker threads; `None` uses rayon's global pool
    pub num_threads: Option<usize>,

    /// Keep every `thin`-th step
    pub thin: usize,

    /// Stretch move scale `a`
    pub stretch_scale: f64,

    /// Seed of the master random number generator
    pub seed: u64,

    /// Ratio between adjacent temperatures; `None` picks `1 + sqrt(2 / d)`
    pub temperature_step: Option<f64>,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            num_temps: 20,
            num_walkers: 1000,
            num_threads: None,
            thin: 1,
            stretch_scale: 2.0,
            seed: 42,
            temperature_step: None,
        }
    }
}

impl McmcConfig {
    /// Default values:
    /// - 20 temperatures of 1000 walkers
    /// - no thinning, stretch scale 2
    /// - seed 42
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_temps(mut self, num_temps: usize) -> Self {
        self.num_temps = num_temps;
        self
    }

    pub fn with_num_walkers(mut self, num_walkers: usize) -> Self {
        self.num_walkers = num_walkers;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn with_thin(mut self, thin: usize) -> Self {
        self.thin = thin;
        self
    }

    pub fn with_stretch_scale(mut self, a: f64) -> Self {
        self.stretch_scale = a;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_temperature_step(mut self, step: f64) -> Self {
        self.temperature_step = Some(step);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.num_temps == 0 {
            return Err(OrbitFitError::InvalidConfiguration(
                "num_temps must be at least 1".to_string(),
            ));
        }
        if self.num_walkers < 2 {
            return Err(OrbitFitError::InvalidConfiguration(format!(
                "the stretch move needs at least 2 walkers, got {}",
                self.num_walkers
            )));
        }
        if self.thin == 0 {
            return Err(OrbitFitError::InvalidConfiguration(
                "thin must be at least 1".to_string(),
            ));
        }
        if !(self.stretch_scale.is_finite() && self.stretch_scale > 1.0) {
            return Err(OrbitFitError::InvalidConfiguration(format!(
                "stretch scale must be > 1, got {}",
                self.stretch_scale
            )));
        }
        if let Some(step) = self.temperature_step {
            if !(step.is_finite() && step > 1.0) {
                return Err(OrbitFitError::InvalidConfiguration(format!(
                    "temperature step must be > 1, got {}",
                    step
                )));
            }
        }
        Ok(())
    }
}

/// Lifecycle of an [`Mcmc`] sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum McmcState {
    /// Walkers drawn (or set) but not yet advanced
    Initialized,
    /// Advancing without recording samples
    BurnIn,
    /// Recording samples
    Sampling,
}

/// A stretch-move proposal for one walker.
struct Proposal {
    temp: usize,
    walker: usize,
    params: Array1<f64>,
    ln_z: f64,
    ln_u: f64,
}

/// Ensemble MCMC sampler with optional parallel tempering.
#[derive(Debug)]
pub struct Mcmc {
    system: System,
    config: McmcConfig,
    results: Results,
    state: McmcState,
    rng: StdRng,
    pool: Option<ThreadPool>,

    betas: Array1<f64>,
    positions: Array3<f64>,
    lnprior: Array2<f64>,
    lnlike: Array2<f64>,
    stale: bool,

    accepted: Array2<usize>,
    proposed: Array2<usize>,
    swaps_accepted: Array1<usize>,
    swaps_proposed: Array1<usize>,
}

impl Mcmc {
    /// Build the sampler and draw the initial walkers from the priors.
    pub fn new(system: System, config: McmcConfig) -> Result<Self> {
        config.validate()?;

        let d = system.num_free_params();
        if d == 0 {
            return Err(OrbitFitError::InvalidConfiguration(
                "every parameter is fixed; nothing to sample".to_string(),
            ));
        }
        if config.num_walkers < 2 * d {
            log::warn!(
                "{} walkers for {} free parameters; at least {} are recommended",
                config.num_walkers,
                d,
                2 * d
            );
        }

        let step = config
            .temperature_step
            .unwrap_or_else(|| 1.0 + (2.0 / d as f64).sqrt());
        let betas = Array1::from_shape_fn(config.num_temps, |i| step.powi(-(i as i32)));

        let pool = build_pool(config.num_threads, "mcmc")?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let (t, w, p) = (config.num_temps, config.num_walkers, system.num_params());
        let mut positions = Array3::zeros((t, w, p));
        for mut walker in positions.lanes_mut(Axis(2)) {
            walker.assign(&system.draw_from_priors(&mut rng));
        }

        log::debug!(
            "MCMC with {} temperatures x {} walkers over {} free parameters (betas {:?})",
            t,
            w,
            d,
            betas
        );

        let results = Results::new("MCMC", system.labels().to_vec());
        let num_swaps = t.saturating_sub(1);

        Ok(Self {
            system,
            config,
            results,
            state: McmcState::Initialized,
            rng,
            pool,
            betas,
            positions,
            lnprior: Array2::zeros((t, w)),
            lnlike: Array2::zeros((t, w)),
            stale: true,
            accepted: Array2::zeros((t, w)),
            proposed: Array2::zeros((t, w)),
            swaps_accepted: Array1::zeros(num_swaps),
            swaps_proposed: Array1::zeros(num_swaps),
        })
    }

    pub fn config(&self) -> &McmcConfig {
        &self.config
    }

    pub fn state(&self) -> McmcState {
        self.state
    }

    /// Inverse temperatures, `betas[0] == 1`.
    pub fn betas(&self) -> &Array1<f64> {
        &self.betas
    }

    /// Current walker positions, shape `(num_temps, num_walkers, num_params)`.
    pub fn curr_pos(&self) -> &Array3<f64> {
        &self.positions
    }

    /// Replace the walker positions.
    ///
    /// The array must have the same shape as [`Mcmc::curr_pos`]. Values are
    /// not checked against the priors; walkers outside the support simply
    /// start with zero probability.
    pub fn set_curr_pos(&mut self, positions: Array3<f64>) -> Result<()> {
        check_shape(&positions, self.shape())?;
        self.positions = positions;
        self.stale = true;
        Ok(())
    }

    /// Log-likelihood of every walker at its current position.
    pub fn curr_lnlike(&self) -> &Array2<f64> {
        &self.lnlike
    }

    /// Per-walker fraction of accepted stretch moves, shape `(num_temps, num_walkers)`.
    pub fn acceptance_fraction(&self) -> Array2<f64> {
        let mut fraction = Array2::zeros(self.accepted.raw_dim());
        ndarray::Zip::from(&mut fraction)
            .and(&self.accepted)
            .and(&self.proposed)
            .for_each(|f, &a, &n| {
                if n > 0 {
                    *f = a as f64 / n as f64;
                }
            });
        fraction
    }

    /// Fraction of accepted exchanges between temperatures `i` and `i + 1`.
    pub fn swap_acceptance_fraction(&self) -> Array1<f64> {
        self.swaps_accepted
            .iter()
            .zip(self.swaps_proposed.iter())
            .map(|(&a, &n)| if n > 0 { a as f64 / n as f64 } else { 0.0 })
            .collect()
    }

    /// Advance `n_steps` without recording samples.
    pub fn burn_in(&mut self, n_steps: usize) -> Result<()> {
        self.state = McmcState::BurnIn;
        self.ensure_evaluated();

        for step in 0..n_steps {
            self.step();
            self.log_progress("burn-in", step, n_steps);
        }
        Ok(())
    }

    /// Advance `n_steps` and append every `thin`-th step of the `T = 0`
    /// walkers to the results, walker by walker. Returns the number of rows added.
    pub fn run(&mut self, n_steps: usize) -> Result<usize> {
        self.state = McmcState::Sampling;
        self.ensure_evaluated();

        let (_, w, p) = self.shape();
        let n_saved = n_steps / self.config.thin;
        let mut chain = Array3::zeros((w, n_saved, p));
        let mut chain_lnlike = Array2::zeros((w, n_saved));

        let accepted_before = self.accepted.row(0).sum();
        let proposed_before = self.proposed.row(0).sum();

        for step in 0..n_steps {
            self.step();

            if (step + 1) % self.config.thin == 0 {
                let k = (step + 1) / self.config.thin - 1;
                chain
                    .slice_mut(s![.., k, ..])
                    .assign(&self.positions.slice(s![0, .., ..]));
                chain_lnlike.column_mut(k).assign(&self.lnlike.row(0));
            }
            self.log_progress("sampling", step, n_steps);
        }

        let added = w * n_saved;
        let post = chain
            .into_shape((added, p))
            .map_err(|e| OrbitFitError::DimensionMismatch(e.to_string()))?;
        let lnlike = chain_lnlike
            .into_shape(added)
            .map_err(|e| OrbitFitError::DimensionMismatch(e.to_string()))?;
        self.results.add_samples(post.view(), lnlike.view())?;

        let accepted = self.accepted.row(0).sum() - accepted_before;
        let proposed = self.proposed.row(0).sum() - proposed_before;
        self.results.record_run(RunRecord {
            sampler: self.name().to_string(),
            samples_added: added,
            acceptance_fraction: (proposed > 0).then(|| accepted as f64 / proposed as f64),
        });

        log::info!("MCMC run finished: {} steps, {} samples stored", n_steps, added);
        Ok(added)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.config.num_temps,
            self.config.num_walkers,
            self.system.num_params(),
        )
    }

    fn log_progress(&self, phase: &str, step: usize, n_steps: usize) {
        let every = (n_steps / 10).max(1);
        if (step + 1) % every == 0 {
            log::info!("{}: {}/{} steps completed", phase, step + 1, n_steps);
        }
    }

    /// Recompute log-prior and log-likelihood of all walkers after their positions changed.
    fn ensure_evaluated(&mut self) {
        if !self.stale {
            return;
        }

        let (t, w, _) = self.shape();
        let system = &self.system;
        let positions = &self.positions;
        let scores: Vec<(f64, f64)> = install(self.pool.as_ref(), || {
            (0..t * w)
                .into_par_iter()
                .map(|k| score(system, positions.slice(s![k / w, k % w, ..]).to_owned()))
                .collect()
        });

        let mut zero_probability = 0;
        for (k, (lp, ll)) in scores.into_iter().enumerate() {
            self.lnprior[[k / w, k % w]] = lp;
            self.lnlike[[k / w, k % w]] = ll;
            if lp + ll == NEG_INFINITY {
                zero_probability += 1;
            }
        }
        if zero_probability > 0 {
            log::warn!(
                "{} of {} walkers start outside the support of the posterior",
                zero_probability,
                t * w
            );
        }
        self.stale = false;
    }

    /// One full step: both half-ensemble updates, then temperature swaps.
    fn step(&mut self) {
        let w = self.config.num_walkers;
        let half = w / 2;
        self.update_half(0..half, half..w);
        self.update_half(half..w, 0..half);

        if self.config.num_temps > 1 {
            self.swap_temperatures();
        }
    }

    /// Stretch every walker in `active` towards a random walker in `complementary`,
    /// at every temperature.
    fn update_half(
        &mut self,
        active: std::ops::Range<usize>,
        complementary: std::ops::Range<usize>,
    ) {
        let a = self.config.stretch_scale;
        let free = self.system.free_indices();

        // Draw everything random up front so results do not depend on the thread count
        let mut proposals = Vec::with_capacity(self.config.num_temps * active.len());
        for temp in 0..self.config.num_temps {
            for walker in active.clone() {
                let u: f64 = self.rng.gen();
                let z = ((a - 1.0) * u + 1.0).powi(2) / a;
                let partner = self.rng.gen_range(complementary.clone());

                let mut params = self.positions.slice(s![temp, walker, ..]).to_owned();
                for &i in free {
                    let c = self.positions[[temp, partner, i]];
                    params[i] = c + z * (params[i] - c);
                }

                let ln_u = self.rng.gen::<f64>().ln();
                proposals.push(Proposal {
                    temp,
                    walker,
                    params,
                    ln_z: z.ln(),
                    ln_u,
                });
            }
        }

        let system = &self.system;
        let scores: Vec<(f64, f64)> = install(self.pool.as_ref(), || {
            proposals
                .par_iter()
                .map(|proposal| score(system, proposal.params.clone()))
                .collect()
        });

        let d = free.len() as f64;
        for (proposal, (lp_new, ll_new)) in proposals.into_iter().zip(scores) {
            let (t, k) = (proposal.temp, proposal.walker);
            self.proposed[[t, k]] += 1;
            if lp_new == NEG_INFINITY || ll_new == NEG_INFINITY {
                continue;
            }

            let beta = self.betas[t];
            let ln_ratio = (d - 1.0) * proposal.ln_z
                + beta * (ll_new - self.lnlike[[t, k]])
                + (lp_new - self.lnprior[[t, k]]);

            if proposal.ln_u < ln_ratio {
                self.positions
                    .slice_mut(s![t, k, ..])
                    .assign(&proposal.params);
                self.lnprior[[t, k]] = lp_new;
                self.lnlike[[t, k]] = ll_new;
                self.accepted[[t, k]] += 1;
            }
        }
    }

    /// Propose exchanges between randomly paired walkers of adjacent temperatures,
    /// hottest pair first.
    fn swap_temperatures(&mut self) {
        let w = self.config.num_walkers;
        let mut hot: Vec<usize> = (0..w).collect();
        let mut cold: Vec<usize> = (0..w).collect();

        for t in (1..self.config.num_temps).rev() {
            hot.shuffle(&mut self.rng);
            cold.shuffle(&mut self.rng);
            let d_beta = self.betas[t - 1] - self.betas[t];

            for (&j, &i) in hot.iter().zip(cold.iter()) {
                let ln_u = self.rng.gen::<f64>().ln();
                let ln_ratio = d_beta * (self.lnlike[[t, j]] - self.lnlike[[t - 1, i]]);
                self.swaps_proposed[t - 1] += 1;

                // NaN (both walkers at -inf) compares false and rejects
                if ln_u < ln_ratio {
                    self.exchange(t, j, t - 1, i);
                    self.swaps_accepted[t - 1] += 1;
                }
            }
        }
    }

    fn exchange(&mut self, t1: usize, w1: usize, t2: usize, w2: usize) {
        let first = self.positions.slice(s![t1, w1, ..]).to_owned();
        let second = self.positions.slice(s![t2, w2, ..]).to_owned();
        self.positions.slice_mut(s![t1, w1, ..]).assign(&second);
        self.positions.slice_mut(s![t2, w2, ..]).assign(&first);

        let lp = self.lnprior[[t1, w1]];
        self.lnprior[[t1, w1]] = self.lnprior[[t2, w2]];
        self.lnprior[[t2, w2]] = lp;

        let ll = self.lnlike[[t1, w1]];
        self.lnlike[[t1, w1]] = self.lnlike[[t2, w2]];
        self.lnlike[[t2, w2]] = ll;
    }
}

/// Log-prior and log-likelihood of one position; the likelihood is skipped
/// outside the prior support.
fn score(system: &System, params: Array1<f64>) -> (f64, f64) {
    let lp = system.log_prior(params.view());
    if lp == NEG_INFINITY || lp.is_nan() {
        return (NEG_INFINITY, NEG_INFINITY);
    }
    (lp, system.log_likelihood(params.view()))
}

impl Sampler for Mcmc {
    fn name(&self) -> &str {
        "MCMC"
    }

    fn system(&self) -> &System {
        &self.system
    }

    fn results(&self) -> &Results {
        &self.results
    }

    /// Runs `total_orbits / num_walkers` steps.
    fn run_sampler(&mut self, total_orbits: usize) -> Result<usize> {
        let n_steps = total_orbits / self.config.num_walkers;
        if n_steps == 0 {
            return Err(OrbitFitError::InvalidConfiguration(format!(
                "total_orbits ({}) must be at least num_walkers ({})",
                total_orbits, self.config.num_walkers
            )));
        }
        self.run(n_steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, Observation};
    use crate::priors::Prior;
    use crate::system::SystemOptions;

    fn small_system() -> System {
        let data = Dataset::new(vec![
            Observation::seppa(55000.0, 1, 1000.0, 20.0, 120.0, 1.0),
            Observation::seppa(55365.0, 1, 1005.0, 20.0, 125.0, 1.0),
            Observation::seppa(55730.0, 1, 1010.0, 20.0, 130.0, 1.0),
        ])
        .unwrap();
        System::new(1, data, 1.5, 50.0, 0.1, 0.0).unwrap()
    }

    fn small_config() -> McmcConfig {
        McmcConfig::new()
            .with_num_temps(2)
            .with_num_walkers(20)
            .with_num_threads(2)
            .with_seed(3)
    }

    #[test]
    fn test_config_validation() {
        let system = small_system();
        assert!(Mcmc::new(system.clone(), small_config().with_num_temps(0)).is_err());
        assert!(Mcmc::new(system.clone(), small_config().with_num_walkers(1)).is_err());
        assert!(Mcmc::new(system.clone(), small_config().with_thin(0)).is_err());
        assert!(Mcmc::new(system.clone(), small_config().with_stretch_scale(1.0)).is_err());
        assert!(Mcmc::new(system.clone(), small_config().with_temperature_step(0.5)).is_err());
        assert!(Mcmc::new(system.clone(), small_config().with_num_threads(0)).is_err());
        assert!(Mcmc::new(system, small_config()).is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = small_config().with_temperature_step(1.5);
        let json = serde_json::to_string(&config).unwrap();
        let restored: McmcConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn test_temperature_ladder() {
        let mcmc = Mcmc::new(small_system(), small_config().with_num_temps(4)).unwrap();
        let step = 1.0 + (2.0f64 / 7.0).sqrt();
        assert_eq!(mcmc.betas().len(), 4);
        assert_eq!(mcmc.betas()[0], 1.0);
        for i in 1..4 {
            assert!((mcmc.betas()[i] - step.powi(-(i as i32))).abs() < 1e-12);
        }
    }

    #[test]
    fn test_initial_positions_respect_priors() {
        let mcmc = Mcmc::new(small_system(), small_config()).unwrap();
        assert_eq!(mcmc.state(), McmcState::Initialized);
        assert_eq!(mcmc.curr_pos().shape(), &[2, 20, 8]);
        let system = mcmc.system();
        for walker in mcmc.curr_pos().lanes(Axis(2)) {
            assert!(system.log_prior(walker).is_finite());
            assert_eq!(walker[6], 50.0);
        }
    }

    #[test]
    fn test_fixed_dimensions_never_move() {
        let options = SystemOptions::new().with_prior("ecc1", Prior::fixed(0.25));
        let data = small_system().data().clone();
        let system = System::with_options(1, data, 1.5, 50.0, 0.1, 0.0, options).unwrap();
        let mut mcmc = Mcmc::new(system, small_config()).unwrap();

        mcmc.run(20).unwrap();
        assert_eq!(mcmc.state(), McmcState::Sampling);
        assert!(mcmc.curr_pos().slice(s![.., .., 1]).iter().all(|&x| x == 0.25));
        assert!(mcmc.curr_pos().slice(s![.., .., 6]).iter().all(|&x| x == 50.0));
        assert!(mcmc.results().post().column(1).iter().all(|&x| x == 0.25));
    }

    #[test]
    fn test_run_records_thinned_cold_chain() {
        let mut mcmc = Mcmc::new(small_system(), small_config().with_thin(5)).unwrap();
        mcmc.burn_in(5).unwrap();
        assert_eq!(mcmc.state(), McmcState::BurnIn);
        assert!(mcmc.results().is_empty());

        let added = mcmc.run(10).unwrap();
        assert_eq!(added, 20 * 2);
        assert_eq!(mcmc.results().num_samples(), 40);
        assert_eq!(mcmc.results().history().len(), 1);

        // Rows are walker-major; the second saved step of every walker is the final step
        let post = mcmc.results().post();
        let last_saved = post.slice(s![1..;2, ..]);
        assert_eq!(last_saved, mcmc.curr_pos().slice(s![0, .., ..]));
        let lnlike = mcmc.results().lnlike();
        assert_eq!(lnlike.slice(s![1..;2]), mcmc.curr_lnlike().row(0));

        // A run shorter than `thin` stores nothing
        assert_eq!(mcmc.run(4).unwrap(), 0);
        assert_eq!(mcmc.results().num_samples(), 40);
        assert_eq!(mcmc.results().history().len(), 2);
        assert_eq!(mcmc.results().history()[1].samples_added, 0);

        let fractions = mcmc.acceptance_fraction();
        assert!(fractions.iter().all(|&f| (0.0..=1.0).contains(&f)));
        assert_eq!(mcmc.swap_acceptance_fraction().len(), 1);
    }

    #[test]
    fn test_runs_are_reproducible_across_thread_counts() {
        let mut a = Mcmc::new(small_system(), small_config().with_num_threads(1)).unwrap();
        let mut b = Mcmc::new(small_system(), small_config().with_num_threads(3)).unwrap();
        a.run(5).unwrap();
        b.run(5).unwrap();
        assert_eq!(a.curr_pos(), b.curr_pos());
        assert_eq!(a.results().post(), b.results().post());
    }

    #[test]
    fn test_set_curr_pos() {
        let mut mcmc = Mcmc::new(small_system(), small_config()).unwrap();
        let mut positions = mcmc.curr_pos().clone();
        positions.slice_mut(s![.., .., 2]).fill(1.0);
        mcmc.set_curr_pos(positions.clone()).unwrap();
        assert_eq!(mcmc.curr_pos(), &positions);

        assert!(mcmc.set_curr_pos(Array3::zeros((2, 20, 7))).is_err());
        assert!(mcmc.set_curr_pos(Array3::zeros((1, 20, 8))).is_err());
        assert_eq!(mcmc.curr_pos(), &positions);
    }

    #[test]
    fn test_run_sampler_steps() {
        let mut mcmc = Mcmc::new(small_system(), small_config()).unwrap();
        assert!(mcmc.run_sampler(10).is_err());
        assert_eq!(mcmc.run_sampler(100).unwrap(), 100);
        assert_eq!(mcmc.results().num_samples(), 100);
    }
}
