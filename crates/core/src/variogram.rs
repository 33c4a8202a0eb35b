//! Parametric variogram models
//!
//! An isotropic variogram model is a nugget plus a structured component:
//! ```text
//! γ(h) = c₀ + c · f(h; a)
//! ```
//! where c₀ is the nugget, c the partial sill, a the (practical) range and
//! f the normalized structure function of the model family (f(0) = 0,
//! f → 1 at or beyond the range).
//!
//! The matching covariance is C(h) = c · (1 − f(h; a)) for h > 0 and
//! C(0) = c₀ + c (the sill).
//!
//! Reference:
//! Cressie, N. (1993). Statistics for Spatial Data. Wiley.
//! Webster, R. & Oliver, M. (2007). Geostatistics for Environmental Scientists.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Theoretical variogram model family.
///
/// The range parameter is the practical range: exponential and Gaussian
/// reach ~95% of the partial sill at h = a, spherical reaches it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariogramFamily {
    /// f(h) = 1 - exp(-3h/a)
    Exponential,
    /// f(h) = 1.5(h/a) - 0.5(h/a)³ for h < a, 1 otherwise
    Spherical,
    /// f(h) = 1 - exp(-3h²/a²)
    Gaussian,
}

impl VariogramFamily {
    /// All supported families, in a stable order.
    pub const ALL: [VariogramFamily; 3] = [
        VariogramFamily::Exponential,
        VariogramFamily::Spherical,
        VariogramFamily::Gaussian,
    ];

    /// Normalized structure function f(h; a).
    #[inline]
    pub fn structure(self, h: f64, range: f64) -> f64 {
        let h = h.max(0.0);
        match self {
            VariogramFamily::Exponential => 1.0 - (-3.0 * h / range).exp(),
            VariogramFamily::Spherical => {
                if h >= range {
                    1.0
                } else {
                    let hr = h / range;
                    1.5 * hr - 0.5 * hr * hr * hr
                }
            }
            VariogramFamily::Gaussian => 1.0 - (-3.0 * h * h / (range * range)).exp(),
        }
    }

    /// Partial derivative ∂f/∂a of the structure function.
    #[inline]
    pub fn structure_d_range(self, h: f64, range: f64) -> f64 {
        let h = h.max(0.0);
        match self {
            VariogramFamily::Exponential => {
                -(-3.0 * h / range).exp() * 3.0 * h / (range * range)
            }
            VariogramFamily::Spherical => {
                if h >= range {
                    0.0
                } else {
                    let a2 = range * range;
                    -1.5 * h / a2 + 1.5 * h * h * h / (a2 * a2)
                }
            }
            VariogramFamily::Gaussian => {
                let a2 = range * range;
                -(-3.0 * h * h / a2).exp() * 6.0 * h * h / (a2 * range)
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VariogramFamily::Exponential => "exponential",
            VariogramFamily::Spherical => "spherical",
            VariogramFamily::Gaussian => "gaussian",
        }
    }
}

impl std::fmt::Display for VariogramFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fitted (or user-specified) variogram model parameters.
///
/// Produced by the fitters and consumed read-only by kriging. Construct with
/// [`VariogramModel::new`] to have the parameter bounds checked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariogramModel {
    /// Model family
    pub family: VariogramFamily,
    /// Nugget (c₀): semivariance discontinuity at the origin
    pub nugget: f64,
    /// Partial sill (c): semivariance contributed by spatial correlation
    pub partial_sill: f64,
    /// Practical range (a)
    pub range: f64,
}

impl VariogramModel {
    /// Create a model, checking nugget ≥ 0, partial_sill ≥ 0, range > 0.
    pub fn new(family: VariogramFamily, nugget: f64, partial_sill: f64, range: f64) -> Result<Self> {
        let model = Self {
            family,
            nugget,
            partial_sill,
            range,
        };
        model.validate()?;
        Ok(model)
    }

    /// Check the parameter bounds.
    pub fn validate(&self) -> Result<()> {
        if !(self.nugget.is_finite() && self.nugget >= 0.0) {
            return Err(Error::invalid_parameter("nugget", self.nugget, "must be finite and >= 0"));
        }
        if !(self.partial_sill.is_finite() && self.partial_sill >= 0.0) {
            return Err(Error::invalid_parameter(
                "partial_sill",
                self.partial_sill,
                "must be finite and >= 0",
            ));
        }
        if !(self.range.is_finite() && self.range > 0.0) {
            return Err(Error::invalid_parameter("range", self.range, "must be finite and > 0"));
        }
        Ok(())
    }

    /// Total sill c₀ + c.
    #[inline]
    pub fn sill(&self) -> f64 {
        self.nugget + self.partial_sill
    }

    /// Semivariance γ(h). γ(0) equals the nugget.
    #[inline]
    pub fn semivariance(&self, h: f64) -> f64 {
        self.nugget + self.partial_sill * self.family.structure(h, self.range)
    }

    /// Covariance C(h): the sill at h = 0, c·(1 − f(h)) otherwise.
    #[inline]
    pub fn covariance(&self, h: f64) -> f64 {
        if h <= 0.0 {
            self.sill()
        } else {
            self.partial_sill * (1.0 - self.family.structure(h, self.range))
        }
    }

    /// Gradient of γ(h) with respect to (nugget, partial_sill, range).
    #[inline]
    pub fn semivariance_gradient(&self, h: f64) -> [f64; 3] {
        [
            1.0,
            self.family.structure(h, self.range),
            self.partial_sill * self.family.structure_d_range(h, self.range),
        ]
    }
}
