//! Tests for degenerate-angle corrections on walker positions

use ndarray::{s, Array3};
use orbitfit_rs::sampler::positions::{offset_half_walkers, wrap_angle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_angles(seed: u64) -> Array3<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array3::from_shape_fn((3, 50, 8), |_| rng.gen_range(0.0..360.0))
}

#[test]
fn test_offset_and_wrap_stays_in_range() {
    for seed in 0..10 {
        let mut positions = random_angles(seed);
        offset_half_walkers(&mut positions, 4, 180.0, 360.0).unwrap();
        assert!(positions
            .slice(s![.., .., 4])
            .iter()
            .all(|&x| (0.0..360.0).contains(&x)));
    }
}

#[test]
fn test_wraparound_is_idempotent() {
    let mut positions = random_angles(42);
    positions.slice_mut(s![.., .., 3]).mapv_inplace(|x| x + 180.0);
    wrap_angle(&mut positions, 3, 360.0).unwrap();
    let once = positions.clone();

    wrap_angle(&mut positions, 3, 360.0).unwrap();
    assert_eq!(positions, once);
    assert!(once.slice(s![.., .., 3]).iter().all(|&x| (0.0..360.0).contains(&x)));
}

#[test]
fn test_offset_touches_only_first_half() {
    let original = random_angles(7);
    let mut positions = original.clone();
    offset_half_walkers(&mut positions, 0, 180.0, 360.0).unwrap();

    for t in 0..3 {
        for w in 0..50 {
            let before = original[[t, w, 0]];
            let after = positions[[t, w, 0]];
            if w < 25 {
                let expected = (before + 180.0) % 360.0;
                assert!((after - expected).abs() < 1e-9);
            } else {
                assert_eq!(after, before);
            }
            // Other dimensions untouched
            assert_eq!(positions[[t, w, 1]], original[[t, w, 1]]);
        }
    }
}
