//! Ordinary least squares trend
//!
//! Fits the large-scale signal m(s) = x(s)ᵀβ by OLS so that the residuals
//! z(s) − m(s) can be analysed for small-scale spatial structure:
//! ```text
//! β̂ = argmin ‖y − Xβ‖²,   e = y − Xβ̂
//! ```
//! The design is checked for full column rank with a Householder QR before
//! anything is solved; a dependent column is reported, never propagated as NaN.
//!
//! Reference:
//! Hengl, T. et al. (2007). About regression-kriging. Computers & Geosciences.

use geostat_core::{Algorithm, Error, Result, SpatialDataset, TrendCoefficients, TrendSpec};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::linalg::QrDecomposition;

/// Relative R-diagonal threshold for declaring a design column dependent.
pub const DEFAULT_RANK_TOLERANCE: f64 = 1e-10;

/// Result of an OLS trend fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlsFit {
    /// Estimated coefficients, intercept first
    pub coefficients: TrendCoefficients,
    /// Fitted trend x(sᵢ)ᵀβ̂ at each observation
    pub fitted: Vec<f64>,
    /// Residuals yᵢ − x(sᵢ)ᵀβ̂
    pub residuals: Vec<f64>,
    /// σ̂² = RSS / (n − p)
    pub residual_variance: f64,
    /// Coefficient of determination (1 for a constant response)
    pub r_squared: f64,
}

impl OlsFit {
    /// The dataset with its values replaced by the residuals.
    pub fn residual_dataset(&self, dataset: &SpatialDataset) -> Result<SpatialDataset> {
        dataset.with_values(self.residuals.clone())
    }
}

/// Parameters for OLS trend fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlsParams {
    /// Trend basis
    pub trend: TrendSpec,
    /// Rank threshold, see [`DEFAULT_RANK_TOLERANCE`]
    pub rank_tolerance: f64,
}

impl Default for OlsParams {
    fn default() -> Self {
        Self {
            trend: TrendSpec::Constant,
            rank_tolerance: DEFAULT_RANK_TOLERANCE,
        }
    }
}

/// OLS linear trend algorithm
#[derive(Debug, Clone, Default)]
pub struct LinearTrend;

impl Algorithm for LinearTrend {
    type Input = SpatialDataset;
    type Output = OlsFit;
    type Params = OlsParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "LinearTrend"
    }

    fn description(&self) -> &'static str {
        "Fit a linear trend of the observations on covariates by ordinary least squares"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let x = input.design_matrix(&params.trend)?;
        fit_ols_with_tolerance(input.values(), &x, params.trend.term_names(), params.rank_tolerance)
    }
}

/// Fit the trend `spec` to a dataset by OLS.
pub fn fit_trend(dataset: &SpatialDataset, spec: &TrendSpec) -> Result<OlsFit> {
    let x = dataset.design_matrix(spec)?;
    fit_ols(dataset.values(), &x, spec.term_names())
}

/// Fit OLS coefficients for `values` on a design matrix whose first column
/// is the intercept.
///
/// # Errors
/// - [`Error::InputData`] when `values` and the design disagree in length
/// - [`Error::SingularDesign`] when n ≤ p or a column is (numerically) a
///   linear combination of earlier ones
pub fn fit_ols(values: &[f64], design: &Array2<f64>, names: Vec<String>) -> Result<OlsFit> {
    fit_ols_with_tolerance(values, design, names, DEFAULT_RANK_TOLERANCE)
}

/// [`fit_ols`] with an explicit rank tolerance.
pub fn fit_ols_with_tolerance(
    values: &[f64],
    design: &Array2<f64>,
    names: Vec<String>,
    rank_tolerance: f64,
) -> Result<OlsFit> {
    let (n, p) = design.dim();
    if values.len() != n {
        return Err(Error::InputData(format!(
            "{} values for a design with {n} rows",
            values.len()
        )));
    }
    if names.len() != p {
        return Err(Error::invalid_parameter(
            "names",
            names.len(),
            format!("design has {p} columns"),
        ));
    }
    if n <= p {
        return Err(Error::SingularDesign {
            column: names.last().cloned().unwrap_or_default(),
            reason: format!("{n} observations cannot determine {p} coefficients"),
        });
    }

    let qr = QrDecomposition::factor(design);
    if let Some(col) = qr.dependent_column(rank_tolerance) {
        let name = names.get(col).cloned().unwrap_or_else(|| format!("#{col}"));
        tracing::warn!(column = %name, "rank-deficient trend design");
        return Err(Error::SingularDesign {
            column: name,
            reason: "column is collinear with preceding columns".into(),
        });
    }

    let beta = qr.solve_least_squares(values)?;
    let fitted = design.dot(&Array1::from(beta.clone())).to_vec();
    let residuals: Vec<f64> = values.iter().zip(&fitted).map(|(y, f)| y - f).collect();

    let rss: f64 = residuals.iter().map(|e| e * e).sum();
    let dof = (n - p) as f64;
    let residual_variance = rss / dof;

    let mean = values.iter().sum::<f64>() / n as f64;
    let tss: f64 = values.iter().map(|y| (y - mean) * (y - mean)).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 1.0 };

    let xtx_inv = qr.xtx_inverse()?;
    let standard_errors = (0..p)
        .map(|j| (residual_variance * xtx_inv[(j, j)]).max(0.0).sqrt())
        .collect();

    tracing::debug!(n, p, rss, r_squared, "OLS trend fitted");

    Ok(OlsFit {
        coefficients: TrendCoefficients {
            names,
            values: beta,
            standard_errors: Some(standard_errors),
        },
        fitted,
        residuals,
        residual_variance,
        r_squared,
    })
}
