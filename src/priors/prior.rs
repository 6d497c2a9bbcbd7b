//! Prior distribution definitions
//!
//! Every dimension of the parameter vector carries exactly one [`Prior`]. The set of
//! distribution families is closed so that the behaviour of each dimension can be
//! enumerated exhaustively: uniform, log-uniform (Jeffreys), Gaussian, sine (for
//! inclinations) and fixed values.

use ndarray::Array1;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, SQRT_2};
use std::f64::NEG_INFINITY;
use std::fmt;
use thiserror::Error;

/// Maximum number of redraws for a Gaussian prior that rejects negative values.
const MAX_RESAMPLE_ATTEMPTS: usize = 10_000;

/// Errors that can occur when constructing priors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriorError {
    #[error("Invalid range: min ({min}) must be less than max ({max})")]
    InvalidRange { min: f64, max: f64 },

    #[error("Log-uniform prior requires a positive lower bound, got {min}")]
    NonPositiveLowerBound { min: f64 },

    #[error("Gaussian prior requires a positive, finite sigma, got {sigma}")]
    InvalidSigma { sigma: f64 },

    #[error("Prior parameter must be finite, got {value}")]
    NonFinite { value: f64 },
}

/// How a Gaussian prior treats values below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativePolicy {
    /// Negative values are allowed (plain normal distribution).
    #[default]
    Allow,
    /// Negative draws are redrawn; the density is truncated at zero and renormalized.
    Resample,
    /// Negative draws are clamped to zero; the density is `-inf` below zero.
    Clamp,
}

/// Uniform distribution on `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformPrior {
    min: f64,
    max: f64,
    log_norm: f64,
}

impl UniformPrior {
    fn new(min: f64, max: f64) -> Result<Self, PriorError> {
        check_finite(min)?;
        check_finite(max)?;
        if min >= max {
            return Err(PriorError::InvalidRange { min, max });
        }

        Ok(Self {
            min,
            max,
            log_norm: -(max - min).ln(),
        })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Log-uniform (Jeffreys) distribution on `[min, max]`, `p(x) ∝ 1/x`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogUniformPrior {
    min: f64,
    max: f64,
    log_norm: f64,
}

impl LogUniformPrior {
    fn new(min: f64, max: f64) -> Result<Self, PriorError> {
        check_finite(min)?;
        check_finite(max)?;
        if min <= 0.0 {
            return Err(PriorError::NonPositiveLowerBound { min });
        }
        if min >= max {
            return Err(PriorError::InvalidRange { min, max });
        }

        Ok(Self {
            min,
            max,
            log_norm: -(max / min).ln().ln(),
        })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Normal distribution with optional handling of negative values.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianPrior {
    mu: f64,
    sigma: f64,
    negatives: NegativePolicy,
    log_norm: f64,
}

impl GaussianPrior {
    fn new(mu: f64, sigma: f64, negatives: NegativePolicy) -> Result<Self, PriorError> {
        check_finite(mu)?;
        if sigma <= 0.0 || !sigma.is_finite() {
            return Err(PriorError::InvalidSigma { sigma });
        }

        let mut log_norm = -(sigma * (2.0 * PI).sqrt()).ln();
        if negatives == NegativePolicy::Resample {
            // Mass of the untruncated normal above zero
            log_norm -= ln_normal_upper_tail(-mu / sigma);
        }

        Ok(Self {
            mu,
            sigma,
            negatives,
            log_norm,
        })
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn negatives(&self) -> NegativePolicy {
        self.negatives
    }

    fn draw_unbounded<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let z: f64 = StandardNormal.sample(rng);
        self.mu + self.sigma * z
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let x = self.draw_unbounded(rng);
        match self.negatives {
            NegativePolicy::Allow => x,
            NegativePolicy::Clamp => x.max(0.0),
            NegativePolicy::Resample => {
                if x >= 0.0 {
                    return x;
                }
                for _ in 0..MAX_RESAMPLE_ATTEMPTS {
                    let x = self.draw_unbounded(rng);
                    if x >= 0.0 {
                        return x;
                    }
                }
                log::warn!(
                    "Gaussian prior N({}, {}) produced no non-negative draw in {} attempts; clamping to 0",
                    self.mu,
                    self.sigma,
                    MAX_RESAMPLE_ATTEMPTS
                );
                0.0
            }
        }
    }
}

/// A prior distribution over a single parameter.
///
/// # Examples
///
/// ```
/// use orbitfit_rs::priors::Prior;
///
/// let ecc = Prior::uniform(0.0, 1.0).unwrap();
/// assert_eq!(ecc.log_density(0.5), 0.0);
/// assert_eq!(ecc.log_density(1.5), f64::NEG_INFINITY);
///
/// let plx = Prior::fixed(56.95);
/// assert!(plx.is_fixed());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PriorSpec", into = "PriorSpec")]
pub enum Prior {
    Uniform(UniformPrior),
    LogUniform(LogUniformPrior),
    Gaussian(GaussianPrior),
    /// `p(x) = sin(x) / 2` on `[0, π]`.
    Sine,
    /// Zero-width prior: the dimension is held constant.
    Fixed(f64),
}

impl Prior {
    /// Uniform prior on `[min, max]`.
    pub fn uniform(min: f64, max: f64) -> Result<Self, PriorError> {
        Ok(Prior::Uniform(UniformPrior::new(min, max)?))
    }

    /// Log-uniform (Jeffreys) prior on `[min, max]`.
    pub fn log_uniform(min: f64, max: f64) -> Result<Self, PriorError> {
        Ok(Prior::LogUniform(LogUniformPrior::new(min, max)?))
    }

    /// Gaussian prior that allows negative values.
    pub fn gaussian(mu: f64, sigma: f64) -> Result<Self, PriorError> {
        Self::gaussian_with(mu, sigma, NegativePolicy::Allow)
    }

    /// Gaussian prior with an explicit policy for negative values.
    pub fn gaussian_with(mu: f64, sigma: f64, negatives: NegativePolicy) -> Result<Self, PriorError> {
        Ok(Prior::Gaussian(GaussianPrior::new(mu, sigma, negatives)?))
    }

    /// Sine prior on `[0, π]`, isotropic for inclinations.
    pub fn sine() -> Self {
        Prior::Sine
    }

    /// Fixed value.
    pub fn fixed(value: f64) -> Self {
        Prior::Fixed(value)
    }

    /// Whether this prior holds its dimension constant.
    pub fn is_fixed(&self) -> bool {
        matches!(self, Prior::Fixed(_))
    }

    /// The constant of a fixed prior.
    pub fn fixed_value(&self) -> Option<f64> {
        match self {
            Prior::Fixed(value) => Some(*value),
            _ => None,
        }
    }

    /// Closed support of the distribution.
    pub fn support(&self) -> (f64, f64) {
        match self {
            Prior::Uniform(p) => (p.min, p.max),
            Prior::LogUniform(p) => (p.min, p.max),
            Prior::Gaussian(p) => match p.negatives {
                NegativePolicy::Allow => (NEG_INFINITY, f64::INFINITY),
                NegativePolicy::Resample | NegativePolicy::Clamp => (0.0, f64::INFINITY),
            },
            Prior::Sine => (0.0, PI),
            Prior::Fixed(value) => (*value, *value),
        }
    }

    /// Natural log of the probability density at `x`.
    ///
    /// Returns `f64::NEG_INFINITY` outside the support. Never returns NaN for a
    /// finite `x`.
    pub fn log_density(&self, x: f64) -> f64 {
        if x.is_nan() {
            return NEG_INFINITY;
        }
        match self {
            Prior::Uniform(p) => {
                if x < p.min || x > p.max {
                    NEG_INFINITY
                } else {
                    p.log_norm
                }
            }
            Prior::LogUniform(p) => {
                if x < p.min || x > p.max {
                    NEG_INFINITY
                } else {
                    p.log_norm - x.ln()
                }
            }
            Prior::Gaussian(p) => {
                if x < 0.0 && p.negatives != NegativePolicy::Allow {
                    return NEG_INFINITY;
                }
                let z = (x - p.mu) / p.sigma;
                p.log_norm - 0.5 * z * z
            }
            Prior::Sine => {
                if !(0.0..=PI).contains(&x) {
                    return NEG_INFINITY;
                }
                let s = x.sin();
                if s <= 0.0 {
                    NEG_INFINITY
                } else {
                    s.ln() - 2f64.ln()
                }
            }
            Prior::Fixed(value) => {
                if x == *value {
                    0.0
                } else {
                    NEG_INFINITY
                }
            }
        }
    }

    /// Draw a single value.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Prior::Uniform(p) => Uniform::new_inclusive(p.min, p.max).sample(rng),
            Prior::LogUniform(p) => {
                Uniform::new_inclusive(p.min.ln(), p.max.ln())
                    .sample(rng)
                    .exp()
                    .clamp(p.min, p.max)
            }
            Prior::Gaussian(p) => p.draw(rng),
            Prior::Sine => {
                let u: f64 = rng.gen();
                (1.0 - 2.0 * u).clamp(-1.0, 1.0).acos()
            }
            Prior::Fixed(value) => *value,
        }
    }

    /// Draw `n` independent values.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Array1<f64> {
        Array1::from_iter((0..n).map(|_| self.draw(rng)))
    }
}

impl fmt::Display for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prior::Uniform(p) => write!(f, "Uniform({}, {})", p.min, p.max),
            Prior::LogUniform(p) => write!(f, "LogUniform({}, {})", p.min, p.max),
            Prior::Gaussian(p) => match p.negatives {
                NegativePolicy::Allow => write!(f, "Gaussian({}, {})", p.mu, p.sigma),
                policy => write!(f, "Gaussian({}, {}, {:?})", p.mu, p.sigma, policy),
            },
            Prior::Sine => write!(f, "Sine"),
            Prior::Fixed(value) => write!(f, "Fixed({})", value),
        }
    }
}

/// Serialized form of a prior; cached normalizers are rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PriorSpec {
    Uniform {
        min: f64,
        max: f64,
    },
    LogUniform {
        min: f64,
        max: f64,
    },
    Gaussian {
        mu: f64,
        sigma: f64,
        #[serde(default)]
        negatives: NegativePolicy,
    },
    Sine,
    Fixed {
        value: f64,
    },
}

impl TryFrom<PriorSpec> for Prior {
    type Error = PriorError;

    fn try_from(spec: PriorSpec) -> Result<Self, Self::Error> {
        match spec {
            PriorSpec::Uniform { min, max } => Prior::uniform(min, max),
            PriorSpec::LogUniform { min, max } => Prior::log_uniform(min, max),
            PriorSpec::Gaussian {
                mu,
                sigma,
                negatives,
            } => Prior::gaussian_with(mu, sigma, negatives),
            PriorSpec::Sine => Ok(Prior::Sine),
            PriorSpec::Fixed { value } => Ok(Prior::Fixed(value)),
        }
    }
}

impl From<Prior> for PriorSpec {
    fn from(prior: Prior) -> Self {
        match prior {
            Prior::Uniform(p) => PriorSpec::Uniform {
                min: p.min,
                max: p.max,
            },
            Prior::LogUniform(p) => PriorSpec::LogUniform {
                min: p.min,
                max: p.max,
            },
            Prior::Gaussian(p) => PriorSpec::Gaussian {
                mu: p.mu,
                sigma: p.sigma,
                negatives: p.negatives,
            },
            Prior::Sine => PriorSpec::Sine,
            Prior::Fixed(value) => PriorSpec::Fixed { value },
        }
    }
}

fn check_finite(value: f64) -> Result<(), PriorError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PriorError::NonFinite { value })
    }
}

/// Natural log of the standard normal upper tail, `ln P(Z > x)`.
///
/// Stays finite and accurate far into the tail, where `1 - cdf(x)` cancels.
fn ln_normal_upper_tail(x: f64) -> f64 {
    let z = x / SQRT_2;
    if z >= 0.0 {
        0.5f64.ln() + ln_erfc(z)
    } else {
        (-0.5 * ln_erfc(-z).exp()).ln_1p()
    }
}

/// Natural log of the complementary error function for `z >= 0`.
///
/// Chebyshev fit from Numerical Recipes (`erfcc`); relative error below 1.2e-7.
fn ln_erfc(z: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398
                                + t * (1.48851587 + t * (-0.82215223 + t * 0.17087277))))))));
    t.ln() - z * z + poly
}
