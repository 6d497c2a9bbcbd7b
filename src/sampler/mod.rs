//! # Samplers
//!
//! Two strategies turn a [`System`] into posterior samples:
//!
//! - [`Mcmc`]: an affine-invariant ensemble sampler with optional parallel
//!   tempering. It keeps a `(temperatures, walkers, parameters)` position array
//!   between runs, so runs can be resumed and positions can be replaced by the
//!   caller through [`Mcmc::set_curr_pos`].
//! - [`Ofti`]: rejection sampling of orbits that are scaled and rotated to pass
//!   through one measured position per body. Each batch is independent.
//!
//! Both append to a [`Results`] container that grows across runs.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use orbitfit_rs::data::{Dataset, Observation};
//! use orbitfit_rs::sampler::{Mcmc, McmcConfig, Sampler};
//! use orbitfit_rs::system::System;
//!
//! let data = Dataset::new(vec![
//!     Observation::seppa(55000.0, 1, 1000.0, 10.0, 120.0, 1.0),
//!     Observation::seppa(55400.0, 1, 1010.0, 10.0, 121.0, 1.0),
//! ])
//! .unwrap();
//! let system = System::new(1, data, 1.5, 50.0, 0.1, 0.0).unwrap();
//!
//! let config = McmcConfig::new().with_num_temps(3).with_num_walkers(50);
//! let mut mcmc = Mcmc::new(system, config).unwrap();
//!
//! // Reflect half the walkers in `pan1` before running
//! let pan = mcmc.system().indexer().require("pan1").unwrap();
//! let mut pos = mcmc.curr_pos().clone();
//! orbitfit_rs::sampler::positions::offset_half_walkers(&mut pos, pan, std::f64::consts::PI, 2.0 * std::f64::consts::PI).unwrap();
//! mcmc.set_curr_pos(pos).unwrap();
//!
//! mcmc.run_sampler(5000).unwrap();
//! println!("{} samples", mcmc.results().num_samples());
//! ```

pub mod mcmc;
pub mod ofti;
pub mod positions;

pub use mcmc::{Mcmc, McmcConfig, McmcState};
pub use ofti::{Ofti, OftiConfig, OftiProposal};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{OrbitFitError, Result};
use crate::results::Results;
use crate::system::System;

/// Common interface of the posterior samplers.
pub trait Sampler {
    /// Short name recorded in the results, e.g. `"MCMC"`.
    fn name(&self) -> &str;

    /// The system being fitted.
    fn system(&self) -> &System;

    /// Samples accumulated so far.
    fn results(&self) -> &Results;

    /// Produce roughly `total_orbits` posterior samples and return how many were added.
    fn run_sampler(&mut self, total_orbits: usize) -> Result<usize>;
}

/// Dedicated worker pool, or `None` to use rayon's global pool.
pub(crate) fn build_pool(num_threads: Option<usize>, label: &str) -> Result<Option<ThreadPool>> {
    match num_threads {
        None => Ok(None),
        Some(0) => Err(OrbitFitError::InvalidConfiguration(
            "num_threads must be at least 1".to_string(),
        )),
        Some(n) => {
            let label = label.to_string();
            let pool = ThreadPoolBuilder::new()
                .num_threads(n)
                .thread_name(move |i| format!("{}-worker-{}", label, i))
                .build()?;
            Ok(Some(pool))
        }
    }
}

/// Run `op` inside `pool` when one is configured.
pub(crate) fn install<OP, R>(pool: Option<&ThreadPool>, op: OP) -> R
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}
