//! Dense row-major matrix used by every Titan routine.
//!
//! Rows are stored as `Vec<Vec<f64>>` so callers can keep using `m[i][j]`-style
//! access, but construction always goes through a shape check: every row has
//! exactly `cols` entries. Serializes as a plain nested numeric array.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::core::error::{AlignError, AlignResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Vec<f64>>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![vec![0.0; cols]; rows] }
    }

    pub fn identity(size: usize) -> Self {
        let mut m = Self::zeros(size, size);
        for i in 0..size {
            m.data[i][i] = 1.0;
        }
        m
    }

    /// Build from nested rows; ragged input is a `DimensionError`.
    pub fn from_rows(data: Vec<Vec<f64>>) -> AlignResult<Self> {
        let rows = data.len();
        let cols = data.first().map_or(0, Vec::len);
        if let Some((i, row)) = data.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(AlignError::dimension(format!(
                "ragged matrix: row {i} has {} entries, expected {cols}",
                row.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        let data = (0..rows).map(|i| (0..cols).map(|j| f(i, j)).collect()).collect();
        Self { rows, cols, data }
    }

    /// Square diagonal matrix from the given entries.
    pub fn diagonal(values: &[f64]) -> Self {
        let mut m = Self::zeros(values.len(), values.len());
        for (i, &v) in values.iter().enumerate() {
            m.data[i][i] = v;
        }
        m
    }

    /// Matrix whose columns are the given vectors (all of equal length).
    pub fn from_columns(columns: &[Vec<f64>]) -> AlignResult<Self> {
        let cols = columns.len();
        let rows = columns.first().map_or(0, Vec::len);
        if columns.iter().any(|c| c.len() != rows) {
            return Err(AlignError::dimension("columns must share one length"));
        }
        Ok(Self::from_fn(rows, cols, |i, j| columns[j][i]))
    }

    pub fn rows(&self) -> usize { self.rows }
    pub fn cols(&self) -> usize { self.cols }
    pub fn shape(&self) -> (usize, usize) { (self.rows, self.cols) }
    pub fn is_empty(&self) -> bool { self.rows == 0 || self.cols == 0 }
    pub fn is_square(&self) -> bool { self.rows == self.cols }

    pub fn row(&self, i: usize) -> &[f64] { &self.data[i] }
    pub fn as_rows(&self) -> &[Vec<f64>] { &self.data }
    pub fn into_rows(self) -> Vec<Vec<f64>> { self.data }

    pub fn column(&self, j: usize) -> Vec<f64> {
        self.data.iter().map(|row| row[j]).collect()
    }

    pub fn columns(&self) -> Vec<Vec<f64>> {
        (0..self.cols).map(|j| self.column(j)).collect()
    }

    /// Keep only the first `k` columns.
    pub fn truncate_columns(&self, k: usize) -> Self {
        let k = k.min(self.cols);
        Self::from_fn(self.rows, k, |i, j| self.data[i][j])
    }

    pub fn transpose(&self) -> Self {
        Self::from_fn(self.cols, self.rows, |i, j| self.data[j][i])
    }

    pub fn matmul(&self, other: &Matrix) -> AlignResult<Matrix> {
        if self.cols != other.rows {
            return Err(AlignError::dimension(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            let lhs = &self.data[i];
            let dst = &mut out.data[i];
            for (k, &a) in lhs.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                for (d, &b) in dst.iter_mut().zip(&other.data[k]) {
                    *d += a * b;
                }
            }
        }
        Ok(out)
    }

    /// `M·x` for a column vector `x`.
    pub fn mul_vec(&self, x: &[f64]) -> AlignResult<Vec<f64>> {
        if x.len() != self.cols {
            return Err(AlignError::dimension(format!(
                "vector of length {} does not match {}x{} matrix",
                x.len(),
                self.rows,
                self.cols
            )));
        }
        Ok(self
            .data
            .iter()
            .map(|row| row.iter().zip(x).map(|(a, b)| a * b).sum())
            .collect())
    }

    /// `x·M` for a row vector `x`.
    pub fn vec_mul(&self, x: &[f64]) -> AlignResult<Vec<f64>> {
        if x.len() != self.rows {
            return Err(AlignError::dimension(format!(
                "row vector of length {} does not match {}x{} matrix",
                x.len(),
                self.rows,
                self.cols
            )));
        }
        let mut out = vec![0.0; self.cols];
        for (row, &xi) in self.data.iter().zip(x) {
            for (o, &m) in out.iter_mut().zip(row) {
                *o += xi * m;
            }
        }
        Ok(out)
    }

    pub fn add(&self, other: &Matrix) -> AlignResult<Matrix> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Matrix) -> AlignResult<Matrix> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn scale(&self, factor: f64) -> Matrix {
        self.map(|v| v * factor)
    }

    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Matrix {
        Self::from_fn(self.rows, self.cols, |i, j| f(self.data[i][j]))
    }

    fn zip_with<F: Fn(f64, f64) -> f64>(&self, other: &Matrix, f: F) -> AlignResult<Matrix> {
        if self.shape() != other.shape() {
            return Err(AlignError::dimension(format!(
                "shape mismatch: {}x{} vs {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        Ok(Self::from_fn(self.rows, self.cols, |i, j| f(self.data[i][j], other.data[i][j])))
    }

    /// `self += factor * other`, in place. Shapes must already agree.
    pub fn axpy(&mut self, factor: f64, other: &Matrix) -> AlignResult<()> {
        if self.shape() != other.shape() {
            return Err(AlignError::dimension("axpy shape mismatch"));
        }
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d += factor * s;
            }
        }
        Ok(())
    }

    pub fn frobenius_norm(&self) -> f64 {
        self.data.iter().flatten().map(|v| v * v).sum::<f64>().sqrt()
    }

    pub fn max_abs(&self) -> f64 {
        self.data.iter().flatten().fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().flatten().all(|v| v.is_finite())
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;
    fn index(&self, (i, j): (usize, usize)) -> &f64 { &self.data[i][j] }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 { &mut self.data[i][j] }
}

impl Index<usize> for Matrix {
    type Output = [f64];
    fn index(&self, i: usize) -> &[f64] { &self.data[i] }
}

impl TryFrom<Vec<Vec<f64>>> for Matrix {
    type Error = AlignError;
    fn try_from(rows: Vec<Vec<f64>>) -> AlignResult<Self> { Matrix::from_rows(rows) }
}

impl From<Matrix> for Vec<Vec<f64>> {
    fn from(m: Matrix) -> Self { m.data }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_rejected() {
        let err = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(err.is_dimension());
    }

    #[test]
    fn matmul_and_vec_products() {
        let a = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let b = Matrix::from_rows(vec![vec![5.0, 6.0], vec![7.0, 8.0]]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.into_rows(), vec![vec![19.0, 22.0], vec![43.0, 50.0]]);
        assert_eq!(a.mul_vec(&[1.0, 1.0]).unwrap(), vec![3.0, 7.0]);
        assert_eq!(a.vec_mul(&[1.0, 1.0]).unwrap(), vec![4.0, 6.0]);
        assert!(a.mul_vec(&[1.0]).unwrap_err().is_dimension());
    }

    #[test]
    fn serde_uses_nested_arrays() {
        let m = Matrix::from_rows(vec![vec![1.0, 0.5], vec![-2.0, 3.0]]).unwrap();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "[[1.0,0.5],[-2.0,3.0]]");
        let back: Matrix = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
        assert!(serde_json::from_str::<Matrix>("[[1.0],[2.0,3.0]]").is_err());
    }
}
