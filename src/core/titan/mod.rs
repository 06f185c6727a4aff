//! Titan dense linear algebra: matrix type, kernel routines, SVD, Procrustes.

pub mod linear_algebra;
pub mod matrix;
pub mod procrustes;
pub mod svd;

pub use matrix::Matrix;
