//! Variogram model fitting
//!
//! Two independent modes:
//! - **WLS** ([`fit_wls`]): weighted least squares of a model to the
//!   empirical variogram, solved by projected Levenberg–Marquardt.
//! - **MLE** ([`fit_mle`]): Gaussian maximum likelihood on the raw
//!   observations with the trend coefficients profiled out by GLS, solved by
//!   bounded Nelder–Mead.
//!
//! Both need an explicit [`InitialGuess`]; the result is a local optimum and
//! depends on it. Whether the nugget is estimated or held fixed is an
//! explicit [`NuggetTreatment`].

mod mle;
mod nelder_mead;
mod wls;

use geostat_core::{Error, Result, SpatialDataset};
use serde::{Deserialize, Serialize};

use crate::interpolation::variogram::EmpiricalVariogramPoint;

pub use mle::{fit_mle, profile_log_likelihood, MleFit, MleParams, ProfileLikelihood};
pub use wls::{fit_best_wls, fit_wls, WeightScheme, WlsFit, WlsParams};

/// Starting point for (nugget, partial sill, range).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialGuess {
    pub nugget: f64,
    pub partial_sill: f64,
    pub range: f64,
}

impl InitialGuess {
    /// Checks nugget ≥ 0, partial_sill > 0 and range > 0.
    pub fn new(nugget: f64, partial_sill: f64, range: f64) -> Result<Self> {
        let guess = Self {
            nugget,
            partial_sill,
            range,
        };
        guess.validate()?;
        Ok(guess)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.nugget.is_finite() && self.nugget >= 0.0) {
            return Err(Error::invalid_parameter("initial.nugget", self.nugget, "must be >= 0"));
        }
        if !(self.partial_sill.is_finite() && self.partial_sill > 0.0) {
            return Err(Error::invalid_parameter(
                "initial.partial_sill",
                self.partial_sill,
                "must be > 0",
            ));
        }
        if !(self.range.is_finite() && self.range > 0.0) {
            return Err(Error::invalid_parameter("initial.range", self.range, "must be > 0"));
        }
        Ok(())
    }
}

/// Whether the nugget is a free parameter or pinned at the initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NuggetTreatment {
    /// Hold the nugget at `InitialGuess::nugget`
    Fixed,
    /// Estimate the nugget, starting from `InitialGuess::nugget`
    Estimate,
}

impl NuggetTreatment {
    #[inline]
    pub fn is_free(self) -> bool {
        matches!(self, NuggetTreatment::Estimate)
    }
}

/// Box for the variogram parameters searched by [`fit_wls`] and [`fit_mle`].
///
/// An explicit [`InitialGuess`] must lie inside it; a guess outside the box
/// is rejected, never moved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub nugget: (f64, f64),
    pub partial_sill: (f64, f64),
    pub range: (f64, f64),
}

impl ParameterBounds {
    /// Bounds scaled to the data: variances relative to the sample variance
    /// of the values, range relative to the separations.
    ///
    /// - nugget ∈ [0, 100·s²]
    /// - partial sill ∈ [1e-8·s², 100·s²]
    /// - range ∈ [1e-3·d_max, 10·d_max]
    pub fn from_dataset(dataset: &SpatialDataset) -> Result<Self> {
        let var = dataset.value_variance();
        if !(var > 0.0) {
            return Err(Error::InputData("observation values have zero variance".into()));
        }
        let d_max = dataset.max_distance();
        if !(d_max > 0.0) {
            return Err(Error::InputData("all observations share one location".into()));
        }
        Ok(Self {
            nugget: (0.0, 100.0 * var),
            partial_sill: (1e-8 * var, 100.0 * var),
            range: (1e-3 * d_max, 10.0 * d_max),
        })
    }

    /// Bounds scaled to an empirical variogram with largest lag h_max and
    /// largest semivariance γ_max:
    ///
    /// - nugget ∈ [0, 2·γ_max]
    /// - partial sill ∈ [0, 2·γ_max]
    /// - range ∈ [1e-9·h_max, 4·h_max]
    pub fn from_variogram(points: &[EmpiricalVariogramPoint]) -> Result<Self> {
        let max_h = points.iter().fold(0.0_f64, |m, p| m.max(p.distance));
        let max_g = points.iter().fold(0.0_f64, |m, p| m.max(p.semivariance));
        if !(max_h > 0.0) {
            return Err(Error::InputData("variogram lags are all at zero distance".into()));
        }
        if !(max_g > 0.0) {
            return Err(Error::InputData("all semivariances are zero".into()));
        }
        Ok(Self {
            nugget: (0.0, 2.0 * max_g),
            partial_sill: (0.0, 2.0 * max_g),
            range: (1e-9 * max_h, 4.0 * max_h),
        })
    }

    pub fn validate(&self) -> Result<()> {
        let ok = |(lo, hi): (f64, f64)| lo.is_finite() && hi.is_finite() && lo <= hi;
        if !ok(self.nugget) || self.nugget.0 < 0.0 {
            return Err(Error::invalid_parameter("bounds.nugget", format!("{:?}", self.nugget), "need 0 <= lo <= hi"));
        }
        if !ok(self.partial_sill) || self.partial_sill.0 < 0.0 {
            return Err(Error::invalid_parameter(
                "bounds.partial_sill",
                format!("{:?}", self.partial_sill),
                "need 0 <= lo <= hi",
            ));
        }
        if !ok(self.range) || self.range.0 <= 0.0 {
            return Err(Error::invalid_parameter("bounds.range", format!("{:?}", self.range), "need 0 < lo <= hi"));
        }
        Ok(())
    }

    /// Reject an initial guess outside the box. A fixed nugget is not
    /// searched, so only an estimated one is checked.
    pub fn check_initial(&self, initial: &InitialGuess, nugget: NuggetTreatment) -> Result<()> {
        let inside = |v: f64, (lo, hi): (f64, f64)| lo <= v && v <= hi;
        if nugget.is_free() && !inside(initial.nugget, self.nugget) {
            return Err(Error::invalid_parameter(
                "initial.nugget",
                initial.nugget,
                format!("outside the search bounds {:?}", self.nugget),
            ));
        }
        if !inside(initial.partial_sill, self.partial_sill) {
            return Err(Error::invalid_parameter(
                "initial.partial_sill",
                initial.partial_sill,
                format!("outside the search bounds {:?}", self.partial_sill),
            ));
        }
        if !inside(initial.range, self.range) {
            return Err(Error::invalid_parameter(
                "initial.range",
                initial.range,
                format!("outside the search bounds {:?}", self.range),
            ));
        }
        Ok(())
    }
}
