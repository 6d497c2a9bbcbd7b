//! Results accumulated through the driver, summarized and persisted

use orbitfit_rs::sampler::positions::offset_half_walkers;
use orbitfit_rs::{Driver, McmcConfig, OftiConfig, Results, Sampler, SamplerKind};
use std::f64::consts::PI;

use crate::test_helpers::{approx_eq, reference_orbit, synthetic_dataset};

#[test]
fn test_driver_results_round_trip() {
    let truth = reference_orbit();
    let data = synthetic_dataset(&truth, 20.0, 1.0);
    let kind = SamplerKind::Ofti(OftiConfig::new().with_batch_size(2000).with_seed(5));
    let mut driver = Driver::new(data, kind, 1, 1.5, 50.0, 0.1, 0.0).unwrap();

    driver.sampler_mut().run_sampler(100).unwrap();
    driver.sampler_mut().run_sampler(50).unwrap();

    let results = driver.sampler().results();
    assert_eq!(results.num_samples(), 150);
    assert_eq!(results.history().len(), 2);
    assert_eq!(results.history()[1].samples_added, 50);
    assert!(results.history()[0].acceptance_fraction.unwrap() > 0.0);

    let summary = results.summary(&[0.68, 0.95]).unwrap();
    assert_eq!(summary.num_samples, 150);
    for label in results.labels() {
        let (_, (lo68, hi68)) = summary.percentiles[label][0];
        let (_, (lo95, hi95)) = summary.percentiles[label][1];
        assert!(lo95 <= lo68 && lo68 <= summary.medians[label]);
        assert!(summary.medians[label] <= hi68 && hi68 <= hi95);
    }
    assert!(approx_eq(summary.means["plx"], 50.0, 1e-12));
    assert!(approx_eq(summary.stds["plx"], 0.0, 1e-12));

    let path = std::env::temp_dir().join(format!("orbitfit-driver-{}.json", std::process::id()));
    results.save_json(&path).unwrap();
    let loaded = Results::load_json(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(&loaded, results);
    assert_eq!(loaded.sampler_name(), "OFTI");
}

#[test]
fn test_driver_mcmc_positions() {
    let data = synthetic_dataset(&reference_orbit(), 20.0, 1.0);
    let kind = SamplerKind::Mcmc(McmcConfig::new().with_num_temps(2).with_num_walkers(20));
    let mut driver = Driver::new(data, kind, 1, 1.5, 50.0, 0.1, 0.0).unwrap();

    let mcmc = driver.mcmc_mut().unwrap();
    let aop = mcmc.system().indexer().require("aop1").unwrap();
    let mut pos = mcmc.curr_pos().clone();
    offset_half_walkers(&mut pos, aop, PI, 2.0 * PI).unwrap();
    mcmc.set_curr_pos(pos).unwrap();
    mcmc.burn_in(2).unwrap();

    assert_eq!(driver.sampler_mut().run_sampler(100).unwrap(), 100);
    assert_eq!(driver.sampler().results().num_samples(), 100);
}
