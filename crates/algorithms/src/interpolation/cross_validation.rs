//! Leave-one-out cross-validation of a kriging setup
//!
//! Each observation is predicted from the remaining N − 1 with the same
//! variogram model and kriging parameters. Standardized errors
//! zᵢ = (ẑᵢ − zᵢ)/σᵢ should have mean ≈ 0 and mean square ≈ 1 when the model
//! describes the data well.

use geostat_core::{Error, Result, SpatialDataset, VariogramModel};
use serde::{Deserialize, Serialize};

use super::kriging::{KrigingParams, KrigingPredictor};
use crate::maybe_rayon::*;

/// Prediction of one held-out observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationPoint {
    pub observed: f64,
    pub predicted: f64,
    pub variance: f64,
    /// predicted − observed
    pub residual: f64,
    /// residual / √variance; NaN when the variance is zero
    pub z_score: f64,
}

/// Per-observation predictions and summary statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub points: Vec<CrossValidationPoint>,
    pub mean_error: f64,
    pub rmse: f64,
    /// Mean of z² over points with a finite z-score
    pub mean_squared_z: f64,
}

fn predict_held_out(
    dataset: &SpatialDataset,
    model: VariogramModel,
    params: &KrigingParams,
    index: usize,
) -> Result<CrossValidationPoint> {
    let held_out = dataset
        .observation(index)
        .ok_or_else(|| Error::InputData(format!("no observation {index}")))?;
    let rest = dataset.without(index)?;
    let predictor = KrigingPredictor::new(&rest, model, params)?;
    let covariates = dataset.trend_covariates(predictor.trend(), index)?;
    let r = predictor.predict_at(held_out.location, &covariates)?;

    let residual = r.value - held_out.value;
    let z_score = if r.variance > 0.0 { residual / r.variance.sqrt() } else { f64::NAN };
    Ok(CrossValidationPoint {
        observed: held_out.value,
        predicted: r.value,
        variance: r.variance,
        residual,
        z_score,
    })
}

/// Leave-one-out cross-validation.
///
/// # Errors
/// The first failing fold's error, e.g. [`Error::InputData`] when removing
/// an observation leaves too few for the trend. Folds themselves may fall
/// below the dataset minimum, so ordinary kriging works from N = 3.
pub fn leave_one_out(
    dataset: &SpatialDataset,
    model: VariogramModel,
    params: &KrigingParams,
) -> Result<CrossValidation> {
    let n = dataset.len();
    let points = (0..n)
        .into_par_iter()
        .map(|i| predict_held_out(dataset, model, params, i))
        .collect::<Vec<Result<CrossValidationPoint>>>()
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    let nf = n as f64;
    let mean_error = points.iter().map(|p| p.residual).sum::<f64>() / nf;
    let rmse = (points.iter().map(|p| p.residual * p.residual).sum::<f64>() / nf).sqrt();
    let finite_z: Vec<f64> = points.iter().map(|p| p.z_score).filter(|z| z.is_finite()).collect();
    let mean_squared_z = if finite_z.is_empty() {
        f64::NAN
    } else {
        finite_z.iter().map(|z| z * z).sum::<f64>() / finite_z.len() as f64
    };

    tracing::debug!(n, mean_error, rmse, mean_squared_z, "leave-one-out cross-validation");

    Ok(CrossValidation {
        points,
        mean_error,
        rmse,
        mean_squared_z,
    })
}
