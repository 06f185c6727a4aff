use latentbridge::core::titan::linear_algebra::random_gaussian;
use latentbridge::core::titan::procrustes::{
    apply_soft_procrustes_constraint, compute_orthogonality_score, is_orthogonal, procrustes_orthogonalize,
};
use latentbridge::Matrix;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn random(rows: usize, cols: usize, seed: u64) -> Matrix {
    let mut rng = StdRng::seed_from_u64(seed);
    random_gaussian(rows, cols, 1.0, &mut rng)
}

#[test]
fn projection_is_orthogonal_and_idempotent() {
    for (seed, n) in [(1, 3), (2, 8), (3, 16)] {
        let w = random(n, n, seed);
        let q = procrustes_orthogonalize(&w).unwrap();
        assert!(compute_orthogonality_score(&q) < 1e-6, "n={n}");
        let qq = procrustes_orthogonalize(&q).unwrap();
        assert!(q.sub(&qq).unwrap().frobenius_norm() < 1e-8, "n={n}");
    }
}

#[test]
fn tall_projection_has_orthonormal_columns() {
    let q = procrustes_orthogonalize(&random(9, 4, 5)).unwrap();
    assert_eq!(q.shape(), (9, 4));
    assert!(is_orthogonal(&q, 1e-8));
}

#[test]
fn symmetric_positive_definite_scenario() {
    let w = Matrix::from_rows(vec![vec![3.0, 1.0], vec![1.0, 3.0]]).unwrap();
    let q = procrustes_orthogonalize(&w).unwrap();
    assert!(compute_orthogonality_score(&q) < 1e-9);
}

#[test]
fn soft_constraint_score_non_increasing_in_alpha() {
    for seed in 0..4 {
        let w = random(6, 6, 40 + seed);
        let scores: Vec<f64> = (0..=10)
            .map(|k| {
                let blended = apply_soft_procrustes_constraint(&w, k as f64 / 10.0).unwrap();
                compute_orthogonality_score(&blended)
            })
            .collect();
        for pair in scores.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9, "seed {seed}: {scores:?}");
        }
        assert!(scores[10] < 1e-6);
    }
}

#[test]
fn soft_constraint_endpoints() {
    let w = random(4, 4, 77);
    assert_eq!(apply_soft_procrustes_constraint(&w, 0.0).unwrap(), w);
    let full = apply_soft_procrustes_constraint(&w, 1.0).unwrap();
    assert_eq!(full, procrustes_orthogonalize(&w).unwrap());
}

#[test]
fn alpha_outside_unit_interval_rejected() {
    let w = Matrix::identity(2);
    assert!(apply_soft_procrustes_constraint(&w, 1.5).is_err());
    assert!(apply_soft_procrustes_constraint(&w, -0.1).is_err());
    assert!(apply_soft_procrustes_constraint(&w, f64::NAN).is_err());
}
