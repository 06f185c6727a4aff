use latentbridge::core::kv_cache::KvCacheState;
use latentbridge::core::rollout::{rollout, rollout_with, transfer_latent, RolloutConfig, RolloutSession};
use latentbridge::core::titan::linear_algebra::{l2_norm, random_gaussian, random_orthogonal};
use latentbridge::{AlignmentMatrix, AlignmentMethod};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn random_h0(dim: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    random_gaussian(1, dim, 1.0, &mut rng).into_rows().remove(0)
}

fn orthogonal_alignment(dim: usize, seed: u64) -> AlignmentMatrix {
    AlignmentMatrix::new(random_orthogonal(dim, seed).unwrap(), None, AlignmentMethod::Procrustes).unwrap()
}

#[test]
fn identity_alignment_and_forward_is_a_fixed_point() {
    let a = AlignmentMatrix::identity(2);
    let h0 = vec![0.6, 0.8];
    let cfg = RolloutConfig { steps: 10, ..RolloutConfig::default() };
    let out = rollout_with(&h0, &a, cfg, |e| e.to_vec()).unwrap();
    for (x, y) in out.latent_thought.iter().zip(&h0) {
        assert!((x - y).abs() < 1e-12);
    }
    assert!(out.drift.max_drift < 1e-12);
    assert_eq!(out.drift.corrections, 0);
    assert_eq!(out.trajectory.len(), 10);
    assert_eq!(out.drift.trace.len(), 10);
}

#[test]
fn protection_bounds_every_accepted_norm() {
    let a = orthogonal_alignment(16, 3);
    let h0 = random_h0(16, 4);
    let h0_norm = l2_norm(&h0);
    let cfg = RolloutConfig { steps: 12, drift_threshold: 0.2, ..RolloutConfig::default() };
    let out = rollout(&h0, &a, cfg).unwrap();
    for h in &out.trajectory {
        let rel = (l2_norm(h) / h0_norm - 1.0).abs();
        assert!(rel <= cfg.drift_threshold + 1e-9, "relative drift {rel}");
    }
}

#[test]
fn disabling_protection_never_lowers_max_drift() {
    let a = orthogonal_alignment(128, 17);
    let h0 = random_h0(128, 18);
    let on = RolloutConfig { steps: 20, ..RolloutConfig::default() };
    let off = RolloutConfig { drift_protection: false, ..on };

    let protected = rollout(&h0, &a, on).unwrap();
    let unprotected = rollout(&h0, &a, off).unwrap();
    assert!(protected.drift.drift_detected);
    assert!(protected.drift.corrections > 0);
    assert_eq!(unprotected.drift.corrections, 0);
    // `e` is normalized before every forward step, so rescaling never changes the
    // next candidate: both traces agree up to rounding.
    assert!(unprotected.drift.max_drift + 1e-12 >= protected.drift.max_drift);
    for (u, p) in unprotected.drift.trace.iter().zip(&protected.drift.trace) {
        assert!((u - p).abs() < 1e-12);
    }
    assert_eq!(protected.trajectory.len(), 20);
    assert_eq!(unprotected.trajectory.len(), 20);
}

#[test]
fn rectangular_alignment_cannot_feed_itself() {
    let w = latentbridge::Matrix::zeros(3, 4);
    let a = AlignmentMatrix::new(w, None, AlignmentMethod::Ridge).unwrap();
    // Step 1 maps 4 -> 3; forward keeps length 3; step 2 expects 4.
    let err = rollout(&[1.0, 0.0, 0.0, 0.0], &a, RolloutConfig::default()).unwrap_err();
    assert!(err.is_dimension());
}

#[test]
fn session_cache_grows_across_runs_and_transfers() {
    let a = orthogonal_alignment(4, 5);
    let cfg = RolloutConfig { steps: 3, ..RolloutConfig::default() };
    let first = rollout(&[1.0, 0.0, 0.0, 0.0], &a, cfg).unwrap();
    let cache: KvCacheState = first.kv_cache.clone().unwrap();
    assert_eq!(cache.seq_len(), 3);

    let second = RolloutSession::with_cache(&a, cfg, cache)
        .unwrap()
        .run(&first.latent_thought, |e| e.to_vec())
        .unwrap();
    assert_eq!(second.kv_cache.unwrap().seq_len(), 6);

    let select = latentbridge::Matrix::from_fn(2, 4, |i, j| if i == j { 1.0 } else { 0.0 });
    let b = AlignmentMatrix::new(select, None, AlignmentMethod::Ridge).unwrap();
    let moved = transfer_latent(&first, &b).unwrap();
    assert_eq!(moved, first.latent_thought[..2].to_vec());
}

#[test]
fn orthogonalize_option_projects_first() {
    let w = latentbridge::Matrix::from_rows(vec![vec![3.0, 1.0], vec![1.0, 3.0]]).unwrap();
    let a = AlignmentMatrix::new(w, None, AlignmentMethod::Ridge).unwrap();
    let cfg = RolloutConfig { steps: 1, orthogonalize: true, ..RolloutConfig::default() };
    let out = rollout_with(&[0.6, 0.8], &a, cfg, |e| e.to_vec()).unwrap();
    // The projection of an SPD matrix is the identity.
    assert!((out.latent_thought[0] - 0.6).abs() < 1e-9);
    assert!((out.latent_thought[1] - 0.8).abs() < 1e-9);
}
