//! # geostat Algorithms
//!
//! Variogram analysis and kriging for geostat.
//!
//! ## Available Algorithm Categories
//!
//! - **interpolation**: empirical variogram, WLS/MLE model fitting,
//!   ordinary/universal/simple kriging, regression kriging, cross-validation
//! - **statistics**: OLS trend, Moran's I
//! - **linalg**: dense LU, Cholesky and QR for the small systems above

pub mod interpolation;
pub mod linalg;
pub(crate) mod maybe_rayon;
pub mod statistics;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::interpolation::{
        empirical_variogram, fit_best_wls, fit_mle, fit_wls, leave_one_out, EmpiricalVariogram,
        EmpiricalVariogramPoint, InitialGuess, KrigingMean, KrigingParams, KrigingPredictor,
        MleFit, MleParams, NuggetTreatment, RegressionKriging, RegressionKrigingParams,
        ResidualVariogram, SearchNeighborhood, Semivariogram, VariogramParams, WeightScheme,
        WlsFit, WlsParams,
    };
    pub use crate::statistics::{fit_trend, morans_i, LinearTrend, OlsFit, SpatialWeights};
    pub use geostat_core::prelude::*;
}
