use thiserror::Error;

/// Fatal errors raised by the alignment core.
///
/// Numerical trouble (slow Jacobi convergence, activation drift, an ill-conditioned
/// ridge system that recovers after the regularization bump) is never reported here;
/// it is logged through `tracing` and surfaced in the result diagnostics instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignError {
    #[error("Dimension Error: {0}")]
    Dimension(String),
    #[error("Singular Matrix Error: {0}")]
    SingularMatrix(String),
    #[error("Invalid Argument: {0}")]
    InvalidArgument(String),
}

pub type AlignResult<T> = Result<T, AlignError>;

impl AlignError {
    pub fn dimension(message: impl Into<String>) -> Self { AlignError::Dimension(message.into()) }
    pub fn singular(message: impl Into<String>) -> Self { AlignError::SingularMatrix(message.into()) }
    pub fn invalid(message: impl Into<String>) -> Self { AlignError::InvalidArgument(message.into()) }

    pub fn is_dimension(&self) -> bool { matches!(self, AlignError::Dimension(_)) }
    pub fn is_singular(&self) -> bool { matches!(self, AlignError::SingularMatrix(_)) }
}
