#![allow(clippy::needless_range_loop)]
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::core::error::{AlignError, AlignResult};
use crate::core::titan::matrix::Matrix;

/// Columns whose residual norm falls below this are treated as linearly dependent.
pub const GRAM_SCHMIDT_TOLERANCE: f64 = 1e-10;

pub fn dot_product(v1: &[f64], v2: &[f64]) -> AlignResult<f64> {
    // Computes the dot product of two vectors
    if v1.len() != v2.len() {
        Err(AlignError::dimension(format!(
            "vectors must be of the same length ({} vs {})",
            v1.len(),
            v2.len()
        )))
    } else {
        Ok(dot(v1, v2))
    }
}

/// Unchecked dot product for internal callers that already validated lengths.
pub(crate) fn dot(v1: &[f64], v2: &[f64]) -> f64 {
    v1.iter().zip(v2).map(|(a, b)| a * b).sum()
}

pub fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Unit-length copy of `v`; the zero vector is returned unchanged.
pub fn normalize(v: &[f64]) -> Vec<f64> {
    let n = l2_norm(v);
    if n == 0.0 {
        v.to_vec()
    } else {
        v.iter().map(|x| x / n).collect()
    }
}

pub fn scale_to_norm(v: &[f64], target: f64) -> Vec<f64> {
    normalize(v).into_iter().map(|x| x * target).collect()
}

pub fn matrix_multiply(m1: &Matrix, m2: &Matrix) -> AlignResult<Matrix> {
    m1.matmul(m2)
}

pub fn transpose(matrix: &Matrix) -> Matrix {
    matrix.transpose()
}

/// `AᵗA` without materializing the transpose.
pub fn gram(a: &Matrix) -> Matrix {
    let n = a.cols();
    let mut g = Matrix::zeros(n, n);
    for row in a.as_rows() {
        for i in 0..n {
            let ri = row[i];
            if ri == 0.0 {
                continue;
            }
            for j in i..n {
                g[(i, j)] += ri * row[j];
            }
        }
    }
    for i in 0..n {
        for j in 0..i {
            g[(i, j)] = g[(j, i)];
        }
    }
    g
}

/// Inverse of a square matrix by Gauss-Jordan elimination with partial pivoting.
/// A pivot smaller than `pivot_tolerance` (relative to the largest entry) is singular.
pub fn matrix_inverse(matrix: &Matrix, pivot_tolerance: f64) -> AlignResult<Matrix> {
    let n = matrix.rows();
    if !matrix.is_square() {
        return Err(AlignError::dimension(format!(
            "matrix must be square, got {}x{}",
            matrix.rows(),
            matrix.cols()
        )));
    }
    if n == 0 {
        return Err(AlignError::dimension("cannot invert an empty matrix"));
    }
    if !matrix.is_finite() {
        return Err(AlignError::singular("matrix contains non-finite entries"));
    }

    let scale = matrix.max_abs().max(f64::MIN_POSITIVE);
    let mut augmented: Vec<Vec<f64>> = matrix
        .as_rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut extended_row = row.clone();
            extended_row.extend((0..n).map(|j| if i == j { 1.0 } else { 0.0 }));
            extended_row
        })
        .collect();

    for i in 0..n {
        // Partial pivot: largest magnitude in column i at or below row i
        let pivot_row = (i..n)
            .max_by(|&a, &b| augmented[a][i].abs().total_cmp(&augmented[b][i].abs()))
            .unwrap_or(i);
        if augmented[pivot_row][i].abs() <= pivot_tolerance * scale {
            return Err(AlignError::singular(format!(
                "pivot {:.3e} at column {i} is below tolerance",
                augmented[pivot_row][i]
            )));
        }
        augmented.swap(i, pivot_row);

        let pivot = augmented[i][i];
        for j in 0..2 * n {
            augmented[i][j] /= pivot;
        }

        for k in 0..n {
            if k != i {
                let factor = augmented[k][i];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..2 * n {
                    augmented[k][j] -= factor * augmented[i][j];
                }
            }
        }
    }

    Matrix::from_rows(augmented.into_iter().map(|row| row[n..2 * n].to_vec()).collect())
}

/// Modified Gram-Schmidt over the columns of `m`, in place of drift-prone columns.
///
/// A column that collapses (dependent on earlier ones, or zero) is replaced by the
/// first standard basis vector that survives orthogonalization, so the output
/// always has orthonormal columns as long as `cols <= rows`.
pub fn gram_schmidt(m: &Matrix) -> AlignResult<Matrix> {
    let (rows, cols) = m.shape();
    if cols > rows {
        return Err(AlignError::dimension(format!(
            "cannot orthonormalize {cols} columns in {rows}-dimensional space"
        )));
    }
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(cols);
    for j in 0..cols {
        let mut v = orthogonalize_against(&m.column(j), &basis);
        if l2_norm(&v) <= GRAM_SCHMIDT_TOLERANCE {
            v = (0..rows)
                .map(|k| {
                    let mut e = vec![0.0; rows];
                    e[k] = 1.0;
                    orthogonalize_against(&e, &basis)
                })
                .find(|c| l2_norm(c) > GRAM_SCHMIDT_TOLERANCE)
                .ok_or_else(|| AlignError::dimension("basis exhausted during Gram-Schmidt"))?;
        }
        basis.push(normalize(&v));
    }
    Matrix::from_columns(&basis)
}

fn orthogonalize_against(v: &[f64], basis: &[Vec<f64>]) -> Vec<f64> {
    let mut out = v.to_vec();
    // Two passes keep the result orthogonal to working precision.
    for _ in 0..2 {
        for q in basis {
            let proj = dot(&out, q);
            for (o, qi) in out.iter_mut().zip(q) {
                *o -= proj * qi;
            }
        }
    }
    out
}

/// Random orthogonal `n×n` matrix: Gram-Schmidt over a Gaussian matrix.
pub fn random_orthogonal(n: usize, seed: u64) -> AlignResult<Matrix> {
    let mut rng = StdRng::seed_from_u64(seed);
    let g = random_gaussian(n, n, 1.0, &mut rng);
    gram_schmidt(&g)
}

/// Random Gaussian matrix, handy for fixtures and synthetic data.
pub fn random_gaussian(rows: usize, cols: usize, std_dev: f64, rng: &mut StdRng) -> Matrix {
    Matrix::from_fn(rows, cols, |_, _| {
        let z: f64 = StandardNormal.sample(&mut *rng);
        z * std_dev
    })
}

/// Stack equal-length vectors as the rows of a matrix.
pub fn stack_rows(vectors: &[Vec<f64>]) -> AlignResult<Matrix> {
    Matrix::from_rows(vectors.to_vec())
}
