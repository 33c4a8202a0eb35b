//! Geostatistical interpolation
//!
//! From scattered observations to predictions with uncertainty:
//! - Variogram: empirical semivariogram of values or residuals
//! - Fitting: variogram model by WLS or maximum likelihood
//! - Kriging: ordinary, universal and simple kriging at point targets
//! - Regression Kriging: OLS trend + OK on residuals
//! - Cross-validation: leave-one-out diagnostics

pub mod cross_validation;
pub mod fitting;
pub mod kriging;
pub mod regression_kriging;
pub mod variogram;

pub use cross_validation::{leave_one_out, CrossValidation, CrossValidationPoint};
pub use fitting::{
    fit_best_wls, fit_mle, fit_wls, profile_log_likelihood, InitialGuess, MleFit, MleParams,
    NuggetTreatment, ParameterBounds, ProfileLikelihood, WeightScheme, WlsFit, WlsParams,
};
pub use kriging::{
    KrigingMean, KrigingParams, KrigingPredictor, KrigingWeights, SearchNeighborhood,
    KRIGING_PIVOT_TOLERANCE,
};
pub use regression_kriging::{
    RegressionKriging, RegressionKrigingParams, RegressionKrigingPredictor, ResidualVariogram,
};
pub use variogram::{
    empirical_variogram, empirical_variogram_of, DistanceBin, EmpiricalVariogram,
    EmpiricalVariogramPoint, Semivariogram, VariogramParams,
};
