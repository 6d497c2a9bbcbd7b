//! Tests for the ensemble MCMC sampler
//!
//! Covers:
//! - Reading and replacing walker positions between runs
//! - Custom Gaussian-ball initialization with one dimension left at its prior draws
//! - Seeding walkers from OFTI samples
//! - Untempered runs

use ndarray::{s, Array1, Array3, Axis};
use orbitfit_rs::sampler::positions::gaussian_ball;
use orbitfit_rs::{Mcmc, McmcConfig, McmcState, Ofti, OftiConfig, OrbitFitError, Sampler, System};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::test_helpers::{ks_critical, ks_statistic, reference_orbit, synthetic_dataset};

fn system() -> System {
    let data = synthetic_dataset(&reference_orbit(), 20.0, 1.0);
    System::new(1, data, 1.5, 50.0, 0.1, 0.0).unwrap()
}

fn config(seed: u64) -> McmcConfig {
    McmcConfig::new()
        .with_num_temps(2)
        .with_num_walkers(100)
        .with_seed(seed)
}

#[test]
fn test_curr_pos_round_trip() {
    let mut mcmc = Mcmc::new(system(), config(1)).unwrap();
    let p = mcmc.system().num_params();
    assert_eq!(mcmc.curr_pos().shape(), &[2, 100, p]);

    let replacement = Array3::from_shape_fn((2, 100, p), |(t, w, j)| (t * 1000 + w * 10 + j) as f64);
    mcmc.set_curr_pos(replacement.clone()).unwrap();
    assert_eq!(mcmc.curr_pos(), &replacement);
}

#[test]
fn test_wrong_shape_is_rejected() {
    let mut mcmc = Mcmc::new(system(), config(1)).unwrap();
    let original = mcmc.curr_pos().clone();

    for shape in [(2, 100, 7), (2, 99, 8), (3, 100, 8), (1, 1, 1)] {
        match mcmc.set_curr_pos(Array3::zeros(shape)) {
            Err(OrbitFitError::DimensionMismatch(_)) => {}
            other => panic!("shape {:?} gave {:?}", shape, other),
        }
    }
    assert_eq!(mcmc.curr_pos(), &original);
}

#[test]
fn test_custom_initialization_keeps_prior_dimension() {
    let system = system();
    let ecc = system.indexer().require("ecc1").unwrap();
    let p = system.num_params();

    // Baseline prior draws from an independent sampler
    let baseline = Mcmc::new(system.clone(), config(11)).unwrap();
    let baseline_ecc: Vec<f64> = baseline.curr_pos().slice(s![.., .., ecc]).iter().copied().collect();

    let mut mcmc = Mcmc::new(system.clone(), config(12)).unwrap();
    let default_pos = mcmc.curr_pos().clone();

    let center = Array1::from(vec![30.0, 0.5, 1.0, 1.0, 1.5, 0.4, 50.0, 1.5]);
    let mut scales = Array1::from_elem(p, 0.01);
    scales[6] = 0.0;
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let mut custom = gaussian_ball(center.view(), scales.view(), 2, 100, &mut rng).unwrap();

    // Leave eccentricity at the default draws
    custom
        .slice_mut(s![.., .., ecc])
        .assign(&default_pos.slice(s![.., .., ecc]));
    mcmc.set_curr_pos(custom).unwrap();

    let pos = mcmc.curr_pos();
    let new_ecc: Vec<f64> = pos.slice(s![.., .., ecc]).iter().copied().collect();
    let d = ks_statistic(&new_ecc, &baseline_ecc);
    assert!(d < ks_critical(new_ecc.len(), baseline_ecc.len()), "KS D = {}", d);

    for j in (0..p).filter(|&j| j != ecc) {
        let mean = pos.slice(s![.., .., j]).mean().unwrap();
        assert!(
            (mean - center[j]).abs() < 0.01,
            "dimension {} mean {} vs centre {}",
            j,
            mean,
            center[j]
        );
    }

    // The sampler runs from the custom positions
    mcmc.run(3).unwrap();
    assert_eq!(mcmc.results().num_samples(), 300);
}

#[test]
fn test_seed_walkers_from_ofti() {
    let system = system();
    let mut ofti = Ofti::new(system.clone(), OftiConfig::new().with_batch_size(2000)).unwrap();
    ofti.run(200).unwrap();

    let mut mcmc = Mcmc::new(system, config(3)).unwrap();
    let p = mcmc.system().num_params();
    let post = ofti.results().post();

    // Every temperature starts from the same 100 OFTI orbits
    let mut positions = Array3::zeros((2, 100, p));
    for mut temp in positions.axis_iter_mut(Axis(0)) {
        temp.assign(&post.slice(s![..100, ..]));
    }
    mcmc.set_curr_pos(positions).unwrap();

    mcmc.run(5).unwrap();
    assert_eq!(mcmc.state(), McmcState::Sampling);
    assert!(mcmc.curr_lnlike().row(0).iter().all(|v| v.is_finite()));
    assert!(mcmc.results().lnlike().iter().all(|v| v.is_finite()));
}

#[test]
fn test_untempered_run() {
    let mut mcmc = Mcmc::new(system(), config(8).with_num_temps(1)).unwrap();
    assert_eq!(mcmc.betas().to_vec(), vec![1.0]);
    assert!(mcmc.swap_acceptance_fraction().is_empty());

    mcmc.burn_in(10).unwrap();
    mcmc.run(10).unwrap();
    assert_eq!(mcmc.results().num_samples(), 1000);

    let mean_acceptance = mcmc.acceptance_fraction().mean().unwrap();
    assert!(mean_acceptance > 0.0 && mean_acceptance < 1.0);
}
