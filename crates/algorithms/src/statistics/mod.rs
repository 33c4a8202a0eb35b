//! Statistical analysis of point data
//!
//! - **trend**: OLS fit of the large-scale trend
//! - **autocorrelation**: Spatial autocorrelation (Moran's I)

pub mod autocorrelation;
pub mod trend;

pub use autocorrelation::{morans_i, MoransIResult, SpatialWeights};
pub use trend::{fit_ols, fit_ols_with_tolerance, fit_trend, LinearTrend, OlsFit, OlsParams, DEFAULT_RANK_TOLERANCE};
