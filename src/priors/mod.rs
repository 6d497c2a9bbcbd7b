//! # Priors
//!
//! Prior distributions over individual orbital parameters.
//!
//! [`Prior`] is a closed set of distribution families dispatched through a single
//! evaluation interface:
//!
//! - [`Prior::log_density`]: natural log of the density, `-inf` outside the support
//! - [`Prior::sample`]: independent draws from the distribution
//!
//! A [`Prior::Fixed`] entry holds its dimension constant. It still occupies a slot
//! in the parameter vector but is excluded from the count of free dimensions.
//!
//! ## Example Usage
//!
//! ```rust
//! use orbitfit_rs::priors::{NegativePolicy, Prior};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let mut rng = StdRng::seed_from_u64(7);
//!
//! let inc = Prior::sine();
//! let draws = inc.sample(100, &mut rng);
//! assert!(draws.iter().all(|&x| (0.0..=std::f64::consts::PI).contains(&x)));
//!
//! let mass = Prior::gaussian_with(1.2, 0.1, NegativePolicy::Resample).unwrap();
//! assert!(mass.log_density(-0.1).is_infinite());
//! ```

pub mod prior;


pub use prior::{GaussianPrior, LogUniformPrior, NegativePolicy, Prior, PriorError, UniformPrior};
