//! Library-wide error type.
use thiserror::Error;

/// Errors produced by the geometry, basis and packing kernels.
///
/// Negative entity indices are *not* errors: they are treated as padding and produce
/// zero-filled output for the corresponding slot.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested operation is not supported for the given configuration.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// The input violates a precondition of the operation (mismatched shapes, invalid indices, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The Newton iteration used to pull back a physical point did not converge.
    #[error("pull-back of point {point:?} did not converge after {iterations} iterations (cell {cell:?})")]
    Convergence {
        point: Vec<f64>,
        cell: Option<usize>,
        iterations: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Attaches the index of the cell being processed to a convergence error.
    ///
    /// Other errors are returned unchanged.
    pub fn in_cell(self, cell_index: usize) -> Self {
        match self {
            Self::Convergence { point, iterations, .. } => Self::Convergence {
                point,
                cell: Some(cell_index),
                iterations,
            },
            other => other,
        }
    }
}
