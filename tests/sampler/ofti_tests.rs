//! Tests for the OFTI rejection sampler

use orbitfit_rs::{Dataset, Observation, Ofti, OftiConfig, OftiProposal, OrbitFitError, Sampler, System};

use crate::test_helpers::{reference_orbit, synthetic_dataset};

fn system() -> System {
    let data = synthetic_dataset(&reference_orbit(), 20.0, 1.0);
    System::new(1, data, 1.5, 50.0, 0.1, 0.0).unwrap()
}

#[test]
fn test_each_run_adds_exactly_n_accept() {
    let mut ofti = Ofti::new(system(), OftiConfig::new().with_batch_size(1000).with_seed(4)).unwrap();

    let mut expected = 0;
    for n in [1, 17, 100] {
        let before = ofti.results().num_samples();
        assert_eq!(ofti.run(n).unwrap(), n);
        expected += n;
        assert_eq!(ofti.results().num_samples() - before, n);
    }
    assert_eq!(ofti.results().num_samples(), expected);
    assert_eq!(ofti.results().lnlike().len(), expected);
}

#[test]
fn test_prior_proposals_also_terminate() {
    let config = OftiConfig::new()
        .with_proposal(OftiProposal::Prior)
        .with_batch_size(500)
        .with_seed(2);
    let mut ofti = Ofti::new(system(), config).unwrap();
    assert_eq!(ofti.run_sampler(5).unwrap(), 5);
    assert_eq!(ofti.results().sampler_name(), "OFTI");
}

#[test]
fn test_scale_and_rotate_beats_prior_proposals() {
    let mut scaled = Ofti::new(system(), OftiConfig::new().with_batch_size(2000)).unwrap();
    let mut prior = Ofti::new(
        system(),
        OftiConfig::new()
            .with_batch_size(2000)
            .with_proposal(OftiProposal::Prior),
    )
    .unwrap();

    let (_, lnlike_scaled) = scaled.prepare_samples(2000);
    let (_, lnlike_prior) = prior.prepare_samples(2000);
    let best_scaled = lnlike_scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let best_prior = lnlike_prior.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert!(best_scaled > best_prior);
}

#[test]
fn test_two_bodies_are_scaled_independently() {
    let inner = reference_orbit();
    let mut outer = reference_orbit();
    outer.sma = 80.0;
    outer.pan = 0.3;

    let mut observations: Vec<Observation> = synthetic_dataset(&inner, 20.0, 1.0).iter().cloned().collect();
    for obs in synthetic_dataset(&outer, 40.0, 1.0).iter() {
        let mut obs = obs.clone();
        obs.object = 2;
        observations.push(obs);
    }
    let data = Dataset::new(observations).unwrap();
    let system = System::new(2, data, 1.5, 50.0, 0.1, 0.0).unwrap();

    // Row 0 and row 7 are the reference epochs of the two bodies
    let values = system.data().values();
    let mut ofti = Ofti::new(system, OftiConfig::new().with_batch_size(2000)).unwrap();
    let (candidates, _) = ofti.prepare_samples(50);
    for params in candidates.outer_iter() {
        let model = ofti.system().compute_model(params).unwrap();
        assert!((model[[0, 0]] - values[[0, 0]]).abs() < 6.0 * 20.0);
        assert!((model[[7, 0]] - values[[7, 0]]).abs() < 6.0 * 40.0);
    }

    ofti.run(20).unwrap();
    assert_eq!(ofti.results().num_samples(), 20);
}

#[test]
fn test_exhaustion_is_reported() {
    let config = OftiConfig::new().with_batch_size(5).with_max_batches(2);
    let mut ofti = Ofti::new(system(), config).unwrap();
    ofti.run(1).unwrap();
    let before = ofti.results().num_samples();

    match ofti.run(10_000) {
        Err(OrbitFitError::SamplingExhausted(msg)) => assert!(msg.contains("10000")),
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(ofti.results().num_samples(), before);
}
