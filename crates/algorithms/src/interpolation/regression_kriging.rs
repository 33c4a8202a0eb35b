//! Regression Kriging (RK)
//!
//! Hybrid method that decomposes the spatial field into:
//! ```text
//! Z(s) = m(s) + ε(s)
//! ```
//! where m(s) is a deterministic trend estimated by OLS regression and ε(s)
//! is a spatially correlated residual interpolated by ordinary kriging.
//!
//! Reference:
//! Hengl, T. et al. (2007). About regression-kriging. Computers & Geosciences.
//! Zhu, Q. & Lin, H. (2010). Comparing ordinary kriging and regression
//! kriging for soil properties. Pedosphere.

use geostat_core::{Coordinate, Error, KrigingResult, Result, SpatialDataset, TrendSpec, VariogramModel};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use super::fitting::{fit_wls, WlsParams};
use super::kriging::{KrigingParams, KrigingPredictor, SearchNeighborhood};
use super::variogram::{empirical_variogram, VariogramParams};
use crate::maybe_rayon::*;
use crate::statistics::trend::{fit_trend, OlsFit};

/// Where the residual variogram comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualVariogram {
    /// Use this model as is
    Model(VariogramModel),
    /// Fit a model by WLS to the empirical variogram of the OLS residuals
    FitWls {
        variogram: VariogramParams,
        wls: WlsParams,
    },
}

/// Parameters for Regression Kriging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionKrigingParams {
    pub trend: TrendSpec,
    pub residual_variogram: ResidualVariogram,
    pub neighborhood: SearchNeighborhood,
}

impl RegressionKrigingParams {
    pub fn new(trend: TrendSpec, residual_variogram: ResidualVariogram) -> Self {
        Self {
            trend,
            residual_variogram,
            neighborhood: SearchNeighborhood::Global,
        }
    }

    pub fn with_neighborhood(mut self, neighborhood: SearchNeighborhood) -> Self {
        self.neighborhood = neighborhood;
        self
    }
}

/// Fitted regression kriging model: OLS trend plus residual variogram.
#[derive(Debug, Clone)]
pub struct RegressionKriging {
    /// OLS trend fit
    pub trend: OlsFit,
    /// Variogram of the residuals
    pub residual_model: VariogramModel,
    trend_spec: TrendSpec,
    residuals: SpatialDataset,
    neighborhood: SearchNeighborhood,
}

impl RegressionKriging {
    /// Fit the trend, then the residual variogram.
    ///
    /// Steps:
    /// 1. Fit OLS trend m(s) = x(s)ᵀβ
    /// 2. Compute residuals ε(sᵢ) = z(sᵢ) − m(sᵢ)
    /// 3. Take or fit the residual variogram
    pub fn fit(dataset: &SpatialDataset, params: &RegressionKrigingParams) -> Result<Self> {
        let trend = fit_trend(dataset, &params.trend)?;
        let residuals = trend.residual_dataset(dataset)?;

        let residual_model = match &params.residual_variogram {
            ResidualVariogram::Model(model) => {
                model.validate()?;
                *model
            }
            ResidualVariogram::FitWls { variogram, wls } => {
                let emp = empirical_variogram(&residuals, variogram)?;
                fit_wls(&emp.points, wls)?.model
            }
        };

        tracing::debug!(
            r_squared = trend.r_squared,
            nugget = residual_model.nugget,
            partial_sill = residual_model.partial_sill,
            range = residual_model.range,
            "regression kriging fitted"
        );

        Ok(Self {
            trend,
            residual_model,
            trend_spec: params.trend.clone(),
            residuals,
            neighborhood: params.neighborhood,
        })
    }

    /// The OLS residuals as a dataset.
    pub fn residuals(&self) -> &SpatialDataset {
        &self.residuals
    }

    /// Prepare the residual kriging system.
    pub fn predictor(&self) -> Result<RegressionKrigingPredictor<'_>> {
        let params = KrigingParams::default().with_neighborhood(self.neighborhood);
        Ok(RegressionKrigingPredictor {
            fit: self,
            residual: KrigingPredictor::new(&self.residuals, self.residual_model, &params)?,
        })
    }
}

/// Predictor combining the trend with ordinary kriging of the residuals.
#[derive(Debug)]
pub struct RegressionKrigingPredictor<'a> {
    fit: &'a RegressionKriging,
    residual: KrigingPredictor<'a>,
}

impl RegressionKrigingPredictor<'_> {
    /// Z̃(s₀) = m(s₀) + ε̃(s₀); the variance is that of the residual kriging.
    pub fn predict_at(&self, location: Coordinate, covariates: &[f64]) -> Result<KrigingResult> {
        let row = self.fit.trend_spec.basis(location, covariates)?;
        let trend = self.fit.trend.coefficients.evaluate(&row);
        let r = self.residual.predict_at(location, &[])?;
        Ok(KrigingResult {
            value: trend + r.value,
            variance: r.variance,
        })
    }

    /// Predict at many targets; see [`KrigingPredictor::predict`].
    pub fn predict(
        &self,
        targets: &[Coordinate],
        covariates: Option<ArrayView2<'_, f64>>,
    ) -> Result<Vec<Result<KrigingResult>>> {
        let needed = self.fit.trend_spec.covariate_count();
        if needed > 0 && !covariates.is_some_and(|c| c.dim() == (targets.len(), needed)) {
            return Err(Error::InputData(format!(
                "trend needs a ({}, {needed}) covariate matrix for the targets",
                targets.len()
            )));
        }

        Ok((0..targets.len())
            .into_par_iter()
            .map(|i| {
                let row: Vec<f64> = match &covariates {
                    Some(cov) if needed > 0 => cov.row(i).to_vec(),
                    _ => Vec::new(),
                };
                self.predict_at(targets[i], &row)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::fitting::{InitialGuess, NuggetTreatment, WeightScheme};
    use geostat_core::{DriftOrder, VariogramFamily};

    fn generate_dataset(n: usize, seed: u64) -> SpatialDataset {
        let mut rng = seed;
        let mut next = || {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (rng >> 33) as f64 / (1u64 << 31) as f64
        };
        let mut coords = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            let x = next() * 100.0;
            let y = next() * 100.0;
            coords.push(Coordinate::new(x, y));
            values.push(100.0 + 2.0 * x - 1.0 * y + 5.0 * (x / 10.0).sin());
        }
        SpatialDataset::new(coords, values).unwrap()
    }

    #[test]
    fn test_rk_recovers_trend() {
        let ds = generate_dataset(60, 42);
        let params = RegressionKrigingParams::new(
            TrendSpec::Coordinates(DriftOrder::Linear),
            ResidualVariogram::Model(VariogramModel::new(VariogramFamily::Gaussian, 0.01, 12.0, 30.0).unwrap()),
        );
        let rk = RegressionKriging::fit(&ds, &params).unwrap();
        let beta = &rk.trend.coefficients;
        assert!((beta.get("x").unwrap() - 2.0).abs() < 0.2, "β_x = {:?}", beta.get("x"));
        assert!((beta.get("y").unwrap() + 1.0).abs() < 0.2, "β_y = {:?}", beta.get("y"));

        let predictor = rk.predictor().unwrap();
        let r = predictor.predict_at(ds.coordinates()[0], &[]).unwrap();
        assert!((r.value - ds.values()[0]).abs() < 1e-6, "RK must honour the data");
    }

    #[test]
    fn test_rk_with_fitted_residual_variogram() {
        let ds = generate_dataset(80, 7);
        let wls = WlsParams::new(
            VariogramFamily::Spherical,
            InitialGuess::new(0.5, 10.0, 30.0).unwrap(),
            NuggetTreatment::Estimate,
            WeightScheme::PairCount,
        );
        let params = RegressionKrigingParams::new(
            TrendSpec::Coordinates(DriftOrder::Linear),
            ResidualVariogram::FitWls {
                variogram: VariogramParams::default(),
                wls,
            },
        );
        match RegressionKriging::fit(&ds, &params) {
            Ok(rk) => {
                assert!(rk.residual_model.validate().is_ok());
                let targets = [Coordinate::new(25.0, 25.0), Coordinate::new(75.0, 50.0)];
                let out = rk.predictor().unwrap().predict(&targets, None).unwrap();
                for r in out {
                    let r = r.unwrap();
                    assert!(r.value.is_finite());
                    assert!(r.variance >= 0.0);
                }
            }
            Err(Error::ConvergenceFailure { best, .. }) => {
                assert!(best.validate().is_ok());
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_rk_too_few_points() {
        let ds = SpatialDataset::new(
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0), Coordinate::new(0.0, 1.0)],
            vec![1.0, 2.0, 3.0],
        )
        .unwrap();
        let params = RegressionKrigingParams::new(
            TrendSpec::Coordinates(DriftOrder::Linear),
            ResidualVariogram::Model(VariogramModel::new(VariogramFamily::Exponential, 0.0, 1.0, 1.0).unwrap()),
        );
        assert!(RegressionKriging::fit(&ds, &params).is_err());
    }
}
