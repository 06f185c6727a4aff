use latentbridge::core::alignment::anchor::{align_anchor_points, AnchorConfig};
use latentbridge::core::alignment::synthetic::generate_synthetic_anchor_points;
use latentbridge::core::titan::linear_algebra::random_orthogonal;
use latentbridge::core::titan::procrustes::compute_orthogonality_score;
use latentbridge::AlignmentMethod;

#[test]
fn equal_dimensions_use_procrustes() {
    let data = generate_synthetic_anchor_points(6, 6, 40, 0.0, 9).unwrap();
    let r = random_orthogonal(6, 21).unwrap();
    let target: Vec<Vec<f64>> = data.source.iter().map(|x| r.mul_vec(x).unwrap()).collect();

    let cfg = AnchorConfig { low_rank_correction: false, ..AnchorConfig::default() };
    let out = align_anchor_points(&data.source, &target, &cfg).unwrap();
    assert_eq!(out.alignment.metadata.method, AlignmentMethod::Anchor);
    assert!(out.final_epsilon < 1e-8);
    assert!(compute_orthogonality_score(&out.alignment.weights) < 1e-8);
    assert_eq!(out.lora_rank, 0);
}

#[test]
fn different_dimensions_use_least_squares() {
    let data = generate_synthetic_anchor_points(10, 6, 80, 0.01, 12).unwrap();
    let out = align_anchor_points(&data.source, &data.target, &AnchorConfig::default()).unwrap();
    assert_eq!(out.alignment.weights.shape(), (6, 10));
    assert!(out.base_epsilon < 0.05, "base={}", out.base_epsilon);
    assert!(out.final_epsilon <= out.base_epsilon + 1e-6);
    assert_eq!(out.lora_rank, 6);
    // Recovers the generating projection up to noise.
    let dist = out.alignment.weights.sub(&data.projection).unwrap().frobenius_norm();
    assert!(dist < 0.05, "dist={dist}");
    assert!(out.information_retention > 0.0 && out.information_retention <= 1.0 + 1e-6);
    assert!((out.fidelity_score - 1.0 / (1.0 + out.final_epsilon)).abs() < 1e-12);
}

#[test]
fn correction_helps_when_rotation_is_not_enough() {
    // Same dimensions but the true map is a non-orthogonal scaling.
    let data = generate_synthetic_anchor_points(5, 5, 60, 0.0, 14).unwrap();
    let target: Vec<Vec<f64>> = data
        .source
        .iter()
        .map(|x| x.iter().enumerate().map(|(i, v)| v * (1.0 + i as f64)).collect())
        .collect();
    let out = align_anchor_points(&data.source, &target, &AnchorConfig::default()).unwrap();
    assert!(out.final_epsilon < out.base_epsilon);
    assert!(out.improvement_pct > 0.0);
}

#[test]
fn mismatched_pairs_rejected() {
    let err = align_anchor_points(&[vec![1.0, 2.0]], &[], &AnchorConfig::default()).unwrap_err();
    assert!(err.is_dimension());
}
