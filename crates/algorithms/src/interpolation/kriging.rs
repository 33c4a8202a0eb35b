//! Kriging prediction at point targets
//!
//! Best linear unbiased prediction from a fitted variogram model. For sample
//! covariances C, trend design X and a target with covariance vector c₀ and
//! basis row x₀, the weights solve the augmented system
//! ```text
//! [ C   X ] [ λ ]   [ c₀ ]
//! [ Xᵀ  0 ] [ μ ] = [ x₀ ]
//! ```
//! with Cᵢⱼ = C(‖sᵢ − sⱼ‖) and the sill on the diagonal. Then
//! ```text
//! ẑ(s₀) = λᵀy,   σ²(s₀) = C(0) − λᵀc₀ − μᵀx₀
//! ```
//! Ordinary kriging is the case X = 1. Simple kriging drops the constraint
//! rows and krige residuals from a known trend.
//!
//! Reference:
//! Matheron, G. (1963). Principles of geostatistics. Economic Geology.
//! Cressie, N. (1993). Statistics for Spatial Data. Wiley.

use geostat_core::{
    Coordinate, Error, KrigingResult, Result, SpatialDataset, TrendCoefficients, TrendSpec, VariogramModel,
};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::linalg::{LuDecomposition, QrDecomposition, SingularMatrix};
use crate::maybe_rayon::*;
use crate::statistics::trend::DEFAULT_RANK_TOLERANCE;

/// Relative LU pivot threshold for the augmented kriging system.
pub const KRIGING_PIVOT_TOLERANCE: f64 = 1e-12;

/// Round-off allowance for negative variances, relative to the sill.
const VARIANCE_ROUNDOFF: f64 = 1e-10;

/// Model for the mean of the field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KrigingMean {
    /// Unknown constant mean
    Ordinary,
    /// Unknown mean, linear in the trend basis (universal kriging)
    Universal(TrendSpec),
    /// Known mean x(s)ᵀβ; residuals are kriged without constraints
    Simple {
        trend: TrendSpec,
        coefficients: TrendCoefficients,
    },
}

impl KrigingMean {
    fn trend(&self) -> TrendSpec {
        match self {
            KrigingMean::Ordinary => TrendSpec::Constant,
            KrigingMean::Universal(trend) | KrigingMean::Simple { trend, .. } => trend.clone(),
        }
    }
}

/// Which observations enter each kriging system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchNeighborhood {
    /// All observations; the system is factored once and reused
    Global,
    /// The `max_points` nearest observations, optionally within `max_radius`
    Local {
        max_points: usize,
        max_radius: Option<f64>,
    },
}

/// Parameters for kriging prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KrigingParams {
    pub mean: KrigingMean,
    pub neighborhood: SearchNeighborhood,
}

impl Default for KrigingParams {
    fn default() -> Self {
        Self {
            mean: KrigingMean::Ordinary,
            neighborhood: SearchNeighborhood::Global,
        }
    }
}

impl KrigingParams {
    pub fn universal(trend: TrendSpec) -> Self {
        Self {
            mean: KrigingMean::Universal(trend),
            ..Default::default()
        }
    }

    pub fn with_neighborhood(mut self, neighborhood: SearchNeighborhood) -> Self {
        self.neighborhood = neighborhood;
        self
    }
}

/// Solved weights for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct KrigingWeights {
    /// Observation indices the weights refer to
    pub indices: Vec<usize>,
    /// Observation weights λ
    pub lambda: Vec<f64>,
    /// Lagrange multipliers μ, one per trend term (empty for simple kriging)
    pub mu: Vec<f64>,
}

impl KrigingWeights {
    pub fn weight_sum(&self) -> f64 {
        self.lambda.iter().sum()
    }
}

/// Kriging predictor prepared for one dataset and variogram model.
///
/// Immutable once built, so it can be shared across threads.
#[derive(Debug)]
pub struct KrigingPredictor<'a> {
    dataset: &'a SpatialDataset,
    model: VariogramModel,
    trend: TrendSpec,
    /// Known coefficients for simple kriging
    known: Option<TrendCoefficients>,
    neighborhood: SearchNeighborhood,
    /// Trend design at the observations (N × p)
    design: Array2<f64>,
    /// Values that are kriged: y, or y − Xβ under a known mean
    kriged_values: Vec<f64>,
    /// Factored global system, when the neighbourhood is global
    global: Option<std::result::Result<LuDecomposition, SingularMatrix>>,
}

impl<'a> KrigingPredictor<'a> {
    /// Prepare a predictor.
    ///
    /// # Errors
    /// - [`Error::InvalidParameter`] for an invalid model, unknown trend
    ///   covariate, mismatched known coefficients or an empty neighbourhood
    /// - [`Error::InputData`] with fewer than p + 1 observations
    /// - [`Error::SingularDesign`] when a trend column is collinear with the
    ///   preceding ones and the mean is estimated
    pub fn new(dataset: &'a SpatialDataset, model: VariogramModel, params: &KrigingParams) -> Result<Self> {
        model.validate()?;
        let trend = params.mean.trend();
        let design = dataset.design_matrix(&trend)?;
        let n = dataset.len();
        let p = trend.len();
        if n < p + 1 {
            return Err(Error::InputData(format!(
                "kriging with {p} trend terms needs at least {} observations, got {n}",
                p + 1
            )));
        }
        if !matches!(params.mean, KrigingMean::Simple { .. })
            && let Some(col) = QrDecomposition::factor(&design).dependent_column(DEFAULT_RANK_TOLERANCE)
        {
            let names = trend.term_names();
            return Err(Error::SingularDesign {
                column: names.get(col).cloned().unwrap_or_else(|| format!("#{col}")),
                reason: "column is collinear with preceding columns".into(),
            });
        }

        if let SearchNeighborhood::Local { max_points, max_radius } = params.neighborhood {
            if max_points == 0 {
                return Err(Error::invalid_parameter("max_points", max_points, "must be > 0"));
            }
            if let Some(r) = max_radius
                && !(r > 0.0)
            {
                return Err(Error::invalid_parameter("max_radius", r, "must be > 0"));
            }
        }

        let (known, kriged_values) = match &params.mean {
            KrigingMean::Simple { coefficients, .. } => {
                if coefficients.len() != p {
                    return Err(Error::invalid_parameter(
                        "coefficients",
                        coefficients.len(),
                        format!("trend has {p} terms"),
                    ));
                }
                let residuals = dataset
                    .values()
                    .iter()
                    .zip(design.rows())
                    .map(|(y, row)| y - coefficients.evaluate(&row.to_vec()))
                    .collect();
                (Some(coefficients.clone()), residuals)
            }
            _ => (None, dataset.values().to_vec()),
        };

        let mut predictor = Self {
            dataset,
            model,
            trend,
            known,
            neighborhood: params.neighborhood,
            design,
            kriged_values,
            global: None,
        };

        if params.neighborhood == SearchNeighborhood::Global {
            let all: Vec<usize> = (0..n).collect();
            let lu = LuDecomposition::factor(&predictor.system_matrix(&all), KRIGING_PIVOT_TOLERANCE);
            if let Err(e) = &lu {
                tracing::warn!(
                    pivot = e.pivot,
                    index = e.index,
                    "global kriging system is singular; every target will fail"
                );
            }
            predictor.global = Some(lu);
        }

        tracing::debug!(n, p, model = ?predictor.model, neighborhood = ?predictor.neighborhood, "kriging predictor ready");
        Ok(predictor)
    }

    pub fn model(&self) -> &VariogramModel {
        &self.model
    }

    pub fn trend(&self) -> &TrendSpec {
        &self.trend
    }

    /// Number of constraint rows in each system.
    fn constraints(&self) -> usize {
        if self.known.is_some() { 0 } else { self.trend.len() }
    }

    /// Augmented matrix for a subset of observations.
    fn system_matrix(&self, indices: &[usize]) -> Array2<f64> {
        let coords = self.dataset.coordinates();
        let k = indices.len();
        let p = self.constraints();
        let mut a = Array2::<f64>::zeros((k + p, k + p));
        for (i, &oi) in indices.iter().enumerate() {
            a[(i, i)] = self.model.sill();
            for (j, &oj) in indices.iter().enumerate().take(i) {
                let c = self.model.covariance(coords[oi].distance(&coords[oj]));
                a[(i, j)] = c;
                a[(j, i)] = c;
            }
            for t in 0..p {
                a[(i, k + t)] = self.design[(oi, t)];
                a[(k + t, i)] = self.design[(oi, t)];
            }
        }
        a
    }

    /// Observation indices used for a target, nearest first.
    fn neighbours(&self, location: Coordinate) -> Vec<usize> {
        match self.neighborhood {
            SearchNeighborhood::Global => (0..self.dataset.len()).collect(),
            SearchNeighborhood::Local { max_points, max_radius } => {
                let mut dists: Vec<(usize, f64)> = self
                    .dataset
                    .coordinates()
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i, c.distance(&location)))
                    .collect();
                if let Some(r) = max_radius {
                    dists.retain(|(_, d)| *d <= r);
                }
                dists.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                dists.truncate(max_points);
                dists.into_iter().map(|(i, _)| i).collect()
            }
        }
    }

    /// Solve for the weights at one target, returning them with c₀ and x₀.
    fn solve(&self, location: Coordinate, covariates: &[f64]) -> Result<(KrigingWeights, Vec<f64>, Vec<f64>)> {
        let x0 = self.trend.basis(location, covariates)?;
        let indices = self.neighbours(location);
        let k = indices.len();
        let p = self.constraints();
        if k < p + 1 {
            return Err(Error::InputData(format!(
                "{k} observations in the search neighbourhood, need at least {}",
                p + 1
            )));
        }

        let coords = self.dataset.coordinates();
        let c0: Vec<f64> = indices
            .iter()
            .map(|&i| self.model.covariance(coords[i].distance(&location)))
            .collect();
        let mut rhs = c0.clone();
        if p > 0 {
            rhs.extend_from_slice(&x0);
        }

        let solution = match &self.global {
            Some(Ok(lu)) => lu.solve(&rhs),
            Some(Err(e)) => return Err(Error::SingularKrigingSystem { pivot: e.pivot }),
            None => {
                let lu = LuDecomposition::factor(&self.system_matrix(&indices), KRIGING_PIVOT_TOLERANCE)
                    .map_err(|e| Error::SingularKrigingSystem { pivot: e.pivot })?;
                lu.solve(&rhs)
            }
        };

        let (lambda, mu) = solution.split_at(k);
        Ok((
            KrigingWeights {
                indices,
                lambda: lambda.to_vec(),
                mu: mu.to_vec(),
            },
            c0,
            x0,
        ))
    }

    /// Kriging weights at `location`. `covariates` are the target's values
    /// of the trend covariates, in trend order (empty otherwise).
    pub fn weights(&self, location: Coordinate, covariates: &[f64]) -> Result<KrigingWeights> {
        self.solve(location, covariates).map(|(w, _, _)| w)
    }

    /// Prediction and variance at one target.
    ///
    /// # Errors
    /// - [`Error::SingularKrigingSystem`] when the system for this target is
    ///   singular (e.g. duplicate observation locations with no nugget)
    /// - [`Error::NegativeVariance`] when the variance is negative beyond
    ///   round-off
    pub fn predict_at(&self, location: Coordinate, covariates: &[f64]) -> Result<KrigingResult> {
        let (weights, c0, x0) = self.solve(location, covariates)?;

        let mut value: f64 = weights
            .indices
            .iter()
            .zip(&weights.lambda)
            .map(|(&i, l)| l * self.kriged_values[i])
            .sum();
        if let Some(beta) = &self.known {
            value += beta.evaluate(&x0);
        }

        let sill = self.model.sill();
        let lambda_c0: f64 = weights.lambda.iter().zip(&c0).map(|(l, c)| l * c).sum();
        let mu_x0: f64 = weights.mu.iter().zip(&x0).map(|(m, x)| m * x).sum();
        let mut variance = sill - lambda_c0 - mu_x0;
        if variance < 0.0 {
            if variance >= -VARIANCE_ROUNDOFF * sill {
                variance = 0.0;
            } else {
                tracing::warn!(variance, x = location.x, y = location.y, "negative kriging variance");
                return Err(Error::NegativeVariance { variance });
            }
        }

        Ok(KrigingResult { value, variance })
    }

    /// Predict at many targets, in parallel when the `parallel` feature is on.
    ///
    /// `covariates` must hold one row per target with the trend covariates
    /// in trend order whenever the trend names covariates. The outer error
    /// covers only that shape check; each target carries its own result.
    pub fn predict(
        &self,
        targets: &[Coordinate],
        covariates: Option<ArrayView2<'_, f64>>,
    ) -> Result<Vec<Result<KrigingResult>>> {
        let needed = self.trend.covariate_count();
        if needed > 0 {
            match covariates {
                Some(cov) if cov.dim() == (targets.len(), needed) => {}
                Some(cov) => {
                    return Err(Error::InputData(format!(
                        "target covariates are {:?}, expected ({}, {needed})",
                        cov.dim(),
                        targets.len()
                    )));
                }
                None => {
                    return Err(Error::InputData(format!(
                        "trend needs {needed} covariate values per target"
                    )));
                }
            }
        }

        let results: Vec<Result<KrigingResult>> = (0..targets.len())
            .into_par_iter()
            .map(|i| {
                let row: Vec<f64> = match (needed, &covariates) {
                    (0, _) | (_, None) => Vec::new(),
                    (_, Some(cov)) => cov.row(i).to_vec(),
                };
                self.predict_at(targets[i], &row)
            })
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(failed, total = targets.len(), "some kriging targets failed");
        }
        Ok(results)
    }
}
