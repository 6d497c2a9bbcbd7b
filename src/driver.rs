//! Convenience wiring of a [`System`] and a sampler.
//!
//! The [`Driver`] only composes the core types; everything it does can be done
//! by building a [`System`] and an [`Mcmc`] or [`Ofti`] directly.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use orbitfit_rs::data::{Dataset, Observation};
//! use orbitfit_rs::driver::{Driver, SamplerKind};
//! use orbitfit_rs::sampler::OftiConfig;
//!
//! let data = Dataset::new(vec![
//!     Observation::seppa(55000.0, 1, 1000.0, 10.0, 120.0, 1.0),
//!     Observation::seppa(55400.0, 1, 1010.0, 10.0, 121.0, 1.0),
//! ])
//! .unwrap();
//!
//! let mut driver = Driver::new(data, SamplerKind::Ofti(OftiConfig::default()), 1, 1.5, 50.0, 0.1, 0.0)
//!     .unwrap();
//! driver.sampler_mut().run_sampler(1000).unwrap();
//! ```

use serde::{Deserialize, Serialize};

use crate::data::Dataset;
use crate::error::Result;
use crate::sampler::{Mcmc, McmcConfig, Ofti, OftiConfig, Sampler};
use crate::system::{System, SystemOptions};

/// Which sampler a [`Driver`] builds, with its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sampler", rename_all = "snake_case")]
pub enum SamplerKind {
    Ofti(OftiConfig),
    Mcmc(McmcConfig),
}

#[derive(Debug)]
enum DriverSampler {
    Ofti(Box<Ofti>),
    Mcmc(Box<Mcmc>),
}

/// A system together with the sampler fitting it.
#[derive(Debug)]
pub struct Driver {
    sampler: DriverSampler,
}

impl Driver {
    /// Build the system with default priors and the requested sampler.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data: Dataset,
        kind: SamplerKind,
        num_bodies: usize,
        system_mass: f64,
        plx: f64,
        mass_err: f64,
        plx_err: f64,
    ) -> Result<Self> {
        Self::with_options(
            data,
            kind,
            num_bodies,
            system_mass,
            plx,
            mass_err,
            plx_err,
            SystemOptions::default(),
        )
    }

    /// Build the system with explicit options and the requested sampler.
    #[allow(clippy::too_many_arguments)]
    pub fn with_options(
        data: Dataset,
        kind: SamplerKind,
        num_bodies: usize,
        system_mass: f64,
        plx: f64,
        mass_err: f64,
        plx_err: f64,
        options: SystemOptions,
    ) -> Result<Self> {
        let system = System::with_options(
            num_bodies,
            data,
            system_mass,
            plx,
            mass_err,
            plx_err,
            options,
        )?;

        let sampler = match kind {
            SamplerKind::Ofti(config) => DriverSampler::Ofti(Box::new(Ofti::new(system, config)?)),
            SamplerKind::Mcmc(config) => DriverSampler::Mcmc(Box::new(Mcmc::new(system, config)?)),
        };
        Ok(Self { sampler })
    }

    pub fn system(&self) -> &System {
        self.sampler().system()
    }

    pub fn sampler(&self) -> &dyn Sampler {
        match &self.sampler {
            DriverSampler::Ofti(ofti) => ofti.as_ref(),
            DriverSampler::Mcmc(mcmc) => mcmc.as_ref(),
        }
    }

    pub fn sampler_mut(&mut self) -> &mut dyn Sampler {
        match &mut self.sampler {
            DriverSampler::Ofti(ofti) => ofti.as_mut(),
            DriverSampler::Mcmc(mcmc) => mcmc.as_mut(),
        }
    }

    /// The MCMC sampler, if this driver built one.
    pub fn mcmc_mut(&mut self) -> Option<&mut Mcmc> {
        match &mut self.sampler {
            DriverSampler::Mcmc(mcmc) => Some(mcmc.as_mut()),
            DriverSampler::Ofti(_) => None,
        }
    }

    /// The OFTI sampler, if this driver built one.
    pub fn ofti_mut(&mut self) -> Option<&mut Ofti> {
        match &mut self.sampler {
            DriverSampler::Ofti(ofti) => Some(ofti.as_mut()),
            DriverSampler::Mcmc(_) => None,
        }
    }
}
