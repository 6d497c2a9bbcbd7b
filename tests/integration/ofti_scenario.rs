//! OFTI fit of a seven-point synthetic dataset with a fixed parallax

use orbitfit_rs::{Ofti, OftiConfig, Prior, Sampler, System};

use crate::test_helpers::{ks_uniform, reference_orbit, synthetic_dataset};

#[test]
fn test_ofti_end_to_end() {
    // Loose astrometry along a short arc: eccentricity stays prior-dominated
    let data = synthetic_dataset(&reference_orbit(), 200.0, 10.0);
    let system = System::new(1, data, 1.5, 50.0, 0.1, 0.0).unwrap();

    assert_eq!(system.priors()[6], Prior::fixed(50.0));
    assert!(matches!(system.priors()[7], Prior::Gaussian(_)));
    assert_eq!(system.num_free_params(), 7);

    let mut ofti = Ofti::new(system, OftiConfig::new().with_batch_size(2000).with_seed(2024)).unwrap();
    ofti.run(500).unwrap();

    let results = ofti.results();
    assert_eq!(results.num_samples(), 500);
    assert_eq!(results.post().shape(), &[500, 8]);
    assert!(results.lnlike().iter().all(|v| v.is_finite()));

    // Fixed parallax is carried through unchanged
    assert!(results.parameter("plx").unwrap().iter().all(|&x| x == 50.0));

    let ecc: Vec<f64> = results.parameter("ecc1").unwrap().to_vec();
    assert!(ecc.iter().all(|&e| (0.0..1.0).contains(&e)));
    let d = ks_uniform(&ecc, 0.0, 1.0);
    assert!(d < 0.12, "eccentricity KS D = {}", d);

    let mtot = results.parameter("mtot").unwrap();
    assert!(mtot.iter().all(|&m| m > 0.0));
    assert!((mtot.mean().unwrap() - 1.5).abs() < 0.05);

    // Nodes are folded into [0, pi)
    let pan = results.parameter("pan1").unwrap();
    assert!(pan.iter().all(|&x| (0.0..std::f64::consts::PI).contains(&x)));
}
