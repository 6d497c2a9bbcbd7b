//! Parallel-tempered MCMC fit of the seven-point synthetic dataset

use orbitfit_rs::{Mcmc, McmcConfig, McmcState, Sampler, System};

use crate::test_helpers::{reference_orbit, synthetic_dataset};

#[test]
fn test_mcmc_end_to_end() {
    let data = synthetic_dataset(&reference_orbit(), 20.0, 1.0);
    let system = System::new(1, data, 1.5, 50.0, 0.1, 0.0).unwrap();
    let p = system.num_params();

    let config = McmcConfig::new()
        .with_num_temps(3)
        .with_num_walkers(50)
        .with_num_threads(2)
        .with_seed(99);
    let mut mcmc = Mcmc::new(system, config).unwrap();
    assert_eq!(mcmc.curr_pos().shape(), &[3, 50, p]);

    let n_steps = 500;
    mcmc.run(n_steps).unwrap();

    assert_eq!(mcmc.state(), McmcState::Sampling);
    assert_eq!(mcmc.curr_pos().shape(), &[3, 50, p]);

    let results = mcmc.results();
    assert!(results.num_samples() > 0);
    assert!(results.num_samples() <= n_steps * 50);
    assert_eq!(results.post().ncols(), p);
    assert_eq!(results.lnlike().len(), results.num_samples());

    // Tempering is active and every walker has a valid acceptance record
    assert_eq!(mcmc.betas().len(), 3);
    assert!(mcmc.betas().windows(2).into_iter().all(|w| w[0] > w[1]));
    let swaps = mcmc.swap_acceptance_fraction();
    assert_eq!(swaps.len(), 2);
    assert!(swaps.iter().all(|&f| (0.0..=1.0).contains(&f)));
    assert!(mcmc.acceptance_fraction().iter().all(|&f| (0.0..=1.0).contains(&f)));

    // The fixed parallax never moves; the cold chain ends on finite posteriors
    assert!(mcmc.curr_pos().iter().skip(6).step_by(p).all(|&x| x == 50.0));
    assert!(mcmc.curr_lnlike().row(0).iter().all(|v| v.is_finite()));

    // Runs resume from the stored state
    let before = results.num_samples();
    mcmc.run(10).unwrap();
    assert_eq!(mcmc.results().num_samples(), before + 500);
}
