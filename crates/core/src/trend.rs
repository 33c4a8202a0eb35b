//! Large-scale trend (drift) specification and coefficients
//!
//! A trend is a linear model of the mean, m(s) = x(s)ᵀβ, where x(s) is a
//! basis row with a leading intercept. The basis is either the intercept
//! alone, named covariates, or a polynomial in the coordinates.

use serde::{Deserialize, Serialize};

use crate::dataset::Coordinate;
use crate::error::{Error, Result};

/// Name of the intercept term in [`TrendCoefficients::names`].
pub const INTERCEPT: &str = "(Intercept)";

/// Polynomial drift order for coordinate trends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftOrder {
    /// {1, x, y}
    Linear,
    /// {1, x, y, x², xy, y²}
    Quadratic,
}

/// Which basis functions make up the mean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendSpec {
    /// Intercept only (constant mean)
    Constant,
    /// Intercept plus the named dataset covariates
    Covariates(Vec<String>),
    /// Intercept plus a polynomial in the coordinates
    Coordinates(DriftOrder),
}

impl TrendSpec {
    /// Number of basis functions p, intercept included.
    pub fn len(&self) -> usize {
        match self {
            TrendSpec::Constant => 1,
            TrendSpec::Covariates(names) => names.len() + 1,
            TrendSpec::Coordinates(DriftOrder::Linear) => 3,
            TrendSpec::Coordinates(DriftOrder::Quadratic) => 6,
        }
    }

    /// Always false: every trend carries an intercept.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of covariate values a site must supply.
    pub fn covariate_count(&self) -> usize {
        match self {
            TrendSpec::Covariates(names) => names.len(),
            _ => 0,
        }
    }

    /// Term names, intercept first.
    pub fn term_names(&self) -> Vec<String> {
        let mut names = vec![INTERCEPT.to_string()];
        match self {
            TrendSpec::Constant => {}
            TrendSpec::Covariates(cov) => names.extend(cov.iter().cloned()),
            TrendSpec::Coordinates(order) => {
                names.extend(["x", "y"].map(String::from));
                if *order == DriftOrder::Quadratic {
                    names.extend(["x^2", "x*y", "y^2"].map(String::from));
                }
            }
        }
        names
    }

    /// Basis row x(s) at a site. `covariates` holds the site's values for
    /// the covariates this trend names, in the same order.
    pub fn basis(&self, location: Coordinate, covariates: &[f64]) -> Result<Vec<f64>> {
        if covariates.len() != self.covariate_count() {
            return Err(Error::InputData(format!(
                "trend needs {} covariate values per site, got {}",
                self.covariate_count(),
                covariates.len()
            )));
        }
        let Coordinate { x, y } = location;
        Ok(match self {
            TrendSpec::Constant => vec![1.0],
            TrendSpec::Covariates(_) => {
                let mut row = Vec::with_capacity(covariates.len() + 1);
                row.push(1.0);
                row.extend_from_slice(covariates);
                row
            }
            TrendSpec::Coordinates(DriftOrder::Linear) => vec![1.0, x, y],
            TrendSpec::Coordinates(DriftOrder::Quadratic) => vec![1.0, x, y, x * x, x * y, y * y],
        })
    }
}

/// Linear trend coefficients β over a basis with leading intercept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendCoefficients {
    /// Term names, intercept first
    pub names: Vec<String>,
    /// Estimated coefficients
    pub values: Vec<f64>,
    /// Standard errors, when the fit has residual degrees of freedom
    pub standard_errors: Option<Vec<f64>>,
}

impl TrendCoefficients {
    /// x(s)ᵀβ for a basis row.
    pub fn evaluate(&self, row: &[f64]) -> f64 {
        row.iter().zip(&self.values).map(|(x, b)| x * b).sum()
    }

    /// Coefficient by term name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|i| self.values[i])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
