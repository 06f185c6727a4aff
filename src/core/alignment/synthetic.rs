//! Synthetic anchor points for exercising the learners without a model runtime.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::HiddenState;
use crate::core::error::{AlignError, AlignResult};
use crate::core::titan::linear_algebra::random_gaussian;
use crate::core::titan::matrix::Matrix;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyntheticAnchors {
    pub source: Vec<HiddenState>,
    pub target: Vec<HiddenState>,
    /// Ground-truth map, `target_dim × source_dim`.
    pub projection: Matrix,
}

/// `y = P·x + noise` with `P ~ N(0, 1/source_dim)` entrywise and `x ~ N(0, 1)`.
pub fn generate_synthetic_anchor_points(
    source_dim: usize,
    target_dim: usize,
    n_points: usize,
    noise_level: f64,
    seed: u64,
) -> AlignResult<SyntheticAnchors> {
    if source_dim == 0 || target_dim == 0 || n_points == 0 {
        return Err(AlignError::dimension("synthetic anchors need non-zero dimensions and count"));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let projection = random_gaussian(target_dim, source_dim, 1.0 / (source_dim as f64).sqrt(), &mut rng);
    let xs = random_gaussian(n_points, source_dim, 1.0, &mut rng);
    let noise = random_gaussian(n_points, target_dim, noise_level, &mut rng);

    let mut target = Vec::with_capacity(n_points);
    for i in 0..n_points {
        let mut y = projection.mul_vec(xs.row(i))?;
        for (yi, ni) in y.iter_mut().zip(noise.row(i)) {
            *yi += ni;
        }
        target.push(y);
    }
    Ok(SyntheticAnchors { source: xs.into_rows(), target, projection })
}
