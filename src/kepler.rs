//! Keplerian orbit propagation.
//!
//! The system model never solves orbits itself: it asks an [`OrbitPropagator`] for
//! the sky-projected offset of a body at an epoch. [`KeplerPropagator`] is the
//! default implementation. It solves Kepler's equation with Newton-Raphson and
//! falls back to a bracketed bisection solver whenever Newton fails to converge
//! (very high eccentricities), so callers always receive a converged anomaly.

use ndarray::ArrayView1;
use std::f64::consts::PI;
use std::fmt;

/// Days per Julian year.
pub const DAYS_PER_YEAR: f64 = 365.25;

const TWO_PI: f64 = 2.0 * PI;

/// Enough halvings of `[0, 2π]` to reach the spacing of adjacent doubles.
const MAX_BISECTIONS: usize = 64;

/// Orbital elements of one body together with the shared system parameters.
///
/// Units: `sma` in AU, angles in radians, `tau` as a fraction of the period,
/// `plx` in mas and `mtot` in solar masses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitElements {
    pub sma: f64,
    pub ecc: f64,
    pub inc: f64,
    pub aop: f64,
    pub pan: f64,
    pub tau: f64,
    pub plx: f64,
    pub mtot: f64,
}

impl OrbitElements {
    /// Read the block starting at `offset` plus the two trailing shared parameters.
    pub fn from_params(params: ArrayView1<f64>, offset: usize) -> Self {
        let n = params.len();
        Self {
            sma: params[offset],
            ecc: params[offset + 1],
            inc: params[offset + 2],
            aop: params[offset + 3],
            pan: params[offset + 4],
            tau: params[offset + 5],
            plx: params[n - 2],
            mtot: params[n - 1],
        }
    }

    /// Orbital period in days (Kepler's third law in AU / years / solar masses).
    pub fn period_days(&self) -> f64 {
        (self.sma.powi(3) / self.mtot).sqrt() * DAYS_PER_YEAR
    }

    /// Whether the elements describe a bound, physically meaningful orbit.
    pub fn is_physical(&self) -> bool {
        let finite = [
            self.sma, self.ecc, self.inc, self.aop, self.pan, self.tau, self.plx, self.mtot,
        ]
        .iter()
        .all(|v| v.is_finite());

        finite
            && self.sma > 0.0
            && self.mtot > 0.0
            && self.plx > 0.0
            && (0.0..1.0).contains(&self.ecc)
    }

    /// Mean anomaly at `epoch` (radians, not wrapped).
    pub fn mean_anomaly(&self, epoch: f64, tau_ref_epoch: f64) -> f64 {
        let mean_motion = TWO_PI / self.period_days();
        mean_motion * (epoch - tau_ref_epoch) - TWO_PI * self.tau
    }
}

/// Source of predicted astrometry.
///
/// Implementations must be thread-safe: samplers evaluate many walkers at once.
pub trait OrbitPropagator: Send + Sync + fmt::Debug {
    /// RA and Dec offsets (mas) of the body relative to the primary at `epoch` (MJD).
    fn radec(&self, elements: &OrbitElements, epoch: f64, tau_ref_epoch: f64) -> (f64, f64);
}

/// Default two-body propagator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeplerPropagator {
    /// Convergence tolerance on the eccentric anomaly (radians)
    pub tolerance: f64,

    /// Newton-Raphson iteration limit before the bisection fallback is used
    pub max_iterations: usize,
}

impl Default for KeplerPropagator {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            max_iterations: 50,
        }
    }
}

impl KeplerPropagator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.abs().max(f64::EPSILON);
        self
    }

    /// Set the Newton-Raphson iteration limit.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Eccentric anomaly for mean anomaly `manom` and eccentricity `ecc`.
    pub fn eccentric_anomaly(&self, manom: f64, ecc: f64) -> f64 {
        let m = manom.rem_euclid(TWO_PI);
        if ecc == 0.0 {
            return m;
        }

        match newton_eccentric_anomaly(m, ecc, self.tolerance, self.max_iterations) {
            Some(eanom) => eanom,
            None => {
                log::debug!(
                    "Newton solver did not converge (M = {}, e = {}); using bisection",
                    m,
                    ecc
                );
                bisection_eccentric_anomaly(m, ecc, self.tolerance)
            }
        }
    }
}

impl OrbitPropagator for KeplerPropagator {
    fn radec(&self, elements: &OrbitElements, epoch: f64, tau_ref_epoch: f64) -> (f64, f64) {
        let ecc = elements.ecc;
        let manom = elements.mean_anomaly(epoch, tau_ref_epoch);
        let eanom = self.eccentric_anomaly(manom, ecc);

        let tanom = 2.0 * (((1.0 + ecc) / (1.0 - ecc)).sqrt() * (0.5 * eanom).tan()).atan();
        let radius = elements.sma * (1.0 - ecc * eanom.cos());

        // Thiele-Innes style projection onto the sky
        let c2i2 = (0.5 * elements.inc).cos().powi(2);
        let s2i2 = (0.5 * elements.inc).sin().powi(2);
        let arg1 = tanom + elements.aop + elements.pan;
        let arg2 = tanom + elements.aop - elements.pan;

        let ra = radius * (c2i2 * arg1.sin() - s2i2 * arg2.sin()) * elements.plx;
        let dec = radius * (c2i2 * arg1.cos() + s2i2 * arg2.cos()) * elements.plx;

        (ra, dec)
    }
}

/// Solve `E - e sin E = M` with Newton-Raphson.
///
/// Returns `None` if the iteration limit is reached or the iterate leaves the
/// finite range.
pub fn newton_eccentric_anomaly(manom: f64, ecc: f64, tol: f64, max_iterations: usize) -> Option<f64> {
    let mut eanom = if ecc < 0.8 { manom } else { PI };

    for _ in 0..max_iterations {
        let f = eanom - ecc * eanom.sin() - manom;
        let df = 1.0 - ecc * eanom.cos();
        if df == 0.0 {
            return None;
        }

        let step = f / df;
        eanom -= step;
        if !eanom.is_finite() {
            return None;
        }
        if step.abs() < tol {
            return Some(eanom);
        }
    }

    None
}

/// Solve `E - e sin E = M` for `M` in `[0, 2π)` by bisection on `[0, 2π]`.
///
/// Always converges for `0 <= e < 1` because the residual is monotonic.
pub fn bisection_eccentric_anomaly(manom: f64, ecc: f64, tol: f64) -> f64 {
    let mut lo = 0.0;
    let mut hi = TWO_PI;

    for _ in 0..MAX_BISECTIONS {
        if hi - lo <= tol {
            break;
        }
        let mid = 0.5 * (lo + hi);
        let f = mid - ecc * mid.sin() - manom;
        if f > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    0.5 * (lo + hi)
}
