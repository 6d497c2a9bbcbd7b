//! # orbitfit-rs
//!
//! `orbitfit-rs` fits Keplerian orbits to relative astrometry of binary and
//! multi-body systems.
//!
//! The library provides:
//! - A closed set of priors (uniform, log-uniform, Gaussian, sine, fixed)
//! - A parameter indexer mapping labels such as `ecc1` to vector positions
//! - A system model scoring parameter vectors against astrometric data
//! - A parallel-tempered ensemble MCMC sampler with editable walker positions
//! - An OFTI rejection sampler
//! - An append-only results container with summary statistics
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use orbitfit_rs::{Dataset, Observation, Ofti, OftiConfig, Sampler, System};
//!
//! let data = Dataset::new(vec![
//!     Observation::seppa(55000.0, 1, 1000.0, 10.0, 120.0, 1.0),
//!     Observation::seppa(55400.0, 1, 1010.0, 10.0, 121.0, 1.0),
//! ])
//! .unwrap();
//!
//! // One secondary, total mass 1.5 +/- 0.1 Msun, parallax fixed at 50 mas
//! let system = System::new(1, data, 1.5, 50.0, 0.1, 0.0).unwrap();
//!
//! let mut ofti = Ofti::new(system, OftiConfig::default()).unwrap();
//! ofti.run_sampler(500).unwrap();
//!
//! let summary = ofti.results().summary(&[0.68]).unwrap();
//! println!("sma1 = {:.2} AU", summary.medians["sma1"]);
//! ```

pub mod data;
pub mod driver;
pub mod error;
pub mod kepler;
pub mod lnlike;
pub mod parameters;
pub mod priors;
pub mod results;
pub mod sampler;
pub mod system;

// Re-exports for convenience
pub use data::{Dataset, Observation, QuantityType};
pub use driver::{Driver, SamplerKind};
pub use error::{OrbitFitError, Result};
pub use kepler::{KeplerPropagator, OrbitElements, OrbitPropagator};
pub use parameters::{OrbitalElement, ParameterIndexer};
pub use priors::{NegativePolicy, Prior};
pub use results::{PosteriorSummary, Results, RunRecord};
pub use sampler::{Mcmc, McmcConfig, McmcState, Ofti, OftiConfig, OftiProposal, Sampler};
pub use system::{System, SystemOptions};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
