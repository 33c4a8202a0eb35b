//! Error types for geostat

use thiserror::Error;

use crate::variogram::VariogramModel;

/// Main error type for geostat operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Dataset is unusable: too few observations, mismatched lengths,
    /// non-finite values or coincident locations where they are not allowed.
    #[error("Invalid input data: {0}")]
    InputData(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// Trend design matrix is not of full column rank.
    #[error("Singular design matrix at column '{column}': {reason}")]
    SingularDesign { column: String, reason: String },

    /// Cholesky factorization failed on a covariance matrix.
    #[error("Covariance matrix is not positive definite (pivot {pivot:e})")]
    NonPositiveDefinite { pivot: f64 },

    /// Optimizer ran out of iterations. `best` is the best iterate found.
    #[error(
        "No convergence after {iterations} iterations (best objective {objective:.6e}, \
         nugget {:.6}, partial sill {:.6}, range {:.6})",
        .best.nugget, .best.partial_sill, .best.range
    )]
    ConvergenceFailure {
        iterations: usize,
        objective: f64,
        best: VariogramModel,
    },

    /// Augmented kriging matrix is singular for a target.
    #[error("Singular kriging system (pivot {pivot:e}); duplicate or near-duplicate locations?")]
    SingularKrigingSystem { pivot: f64 },

    /// Prediction variance came out below round-off tolerance.
    #[error("Negative kriging variance {variance:e}; numerical or model-specification error")]
    NegativeVariance { variance: f64 },
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`].
    pub fn invalid_parameter(name: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for geostat operations
pub type Result<T> = std::result::Result<T, Error>;
