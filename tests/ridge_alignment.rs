use latentbridge::core::alignment::ridge::{compute_ridge_alignment, ConditionEstimate, RidgeAligner, RidgeConfig};
use latentbridge::core::titan::linear_algebra::random_gaussian;
use latentbridge::{AlignError, Matrix};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn embeddings(vocab: usize, dim: usize, seed: u64) -> Matrix {
    let mut rng = StdRng::seed_from_u64(seed);
    random_gaussian(vocab, dim, 1.0, &mut rng)
}

#[test]
fn tied_embeddings_give_identity() {
    let w_in = embeddings(40, 6, 1);
    let w_out = w_in.transpose();
    for lambda in [1e-4, 1e-8] {
        let r = compute_ridge_alignment(&w_in, &w_out, lambda).unwrap();
        let dist = r.alignment.weights.sub(&Matrix::identity(6)).unwrap().frobenius_norm();
        assert!(dist < 1e-3, "lambda={lambda} dist={dist}");
        assert!(r.alignment.epsilon < 1e-3);
        assert!(!r.retried);
        assert_eq!(r.rank_estimate, 6);
    }
}

#[test]
fn rectangular_shapes() {
    // vocab 30, target 5, source 7.
    let w_in = embeddings(30, 5, 2);
    let w_out = embeddings(30, 7, 3).transpose();
    let r = compute_ridge_alignment(&w_in, &w_out, 1e-3).unwrap();
    assert_eq!(r.alignment.source_dim(), 7);
    assert_eq!(r.alignment.target_dim(), 5);
    assert!(r.condition_number >= 1.0);
}

#[test]
fn vocabulary_mismatch_is_dimension_error() {
    let w_in = embeddings(20, 4, 4);
    let w_out = embeddings(19, 4, 5).transpose();
    assert!(compute_ridge_alignment(&w_in, &w_out, 1e-4).unwrap_err().is_dimension());
}

#[test]
fn singular_system_retries_once() {
    // Duplicate rows in W_out make W_out·W_outᵗ singular without regularization;
    // lambda bumps from 0 stay 0, so the retry also fails.
    let w_in = embeddings(10, 3, 6);
    let row = vec![1.0; 10];
    let w_out = Matrix::from_rows(vec![row.clone(), row.clone(), row]).unwrap();
    let err = RidgeAligner::new(RidgeConfig { lambda: 0.0, ..RidgeConfig::default() })
        .derive(&w_in, &w_out)
        .unwrap_err();
    assert!(matches!(err, AlignError::SingularMatrix(_)));

    // A positive lambda regularizes it.
    let ok = compute_ridge_alignment(&w_in, &w_out, 1e-2).unwrap();
    assert!(ok.alignment.weights.is_finite());
}

#[test]
fn tiny_lambda_succeeds_on_retry() {
    // W_out·W_outᵗ is the rank-one all-tens matrix; λ = 5e-12 sits below the
    // pivot tolerance, λ×10 clears it.
    let w_in = embeddings(10, 3, 7);
    let row = vec![1.0; 10];
    let w_out = Matrix::from_rows(vec![row.clone(), row.clone(), row]).unwrap();
    let lambda = 5e-12;
    let r = RidgeAligner::new(RidgeConfig { lambda, ..RidgeConfig::default() })
        .derive(&w_in, &w_out)
        .unwrap();
    assert!(r.retried);
    assert!((r.lambda_used - 10.0 * lambda).abs() < 1e-24);
    assert!(r.alignment.weights.is_finite());
}

#[test]
fn svd_condition_estimate_is_exact() {
    let w_in = embeddings(25, 4, 8);
    let w_out = w_in.transpose();
    let cheap = RidgeAligner::new(RidgeConfig::default()).derive(&w_in, &w_out).unwrap();
    let exact = RidgeAligner::new(RidgeConfig { condition_estimate: ConditionEstimate::Svd, ..RidgeConfig::default() })
        .derive(&w_in, &w_out)
        .unwrap();
    assert_eq!(exact.condition_estimate, ConditionEstimate::Svd);
    assert!(exact.condition_number >= 1.0);
    assert!(cheap.condition_number >= 1.0);
    assert_eq!(cheap.alignment.weights, exact.alignment.weights);
}
