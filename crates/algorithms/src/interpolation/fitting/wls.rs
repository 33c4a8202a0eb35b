//! Weighted least squares fit of a variogram model
//!
//! Minimizes
//! ```text
//! S(θ) = Σ wᵢ (γ̂(hᵢ) − γ(hᵢ; θ))²,   θ = (c₀, c, a)
//! ```
//! by Levenberg–Marquardt with an analytic Jacobian. Steps are projected onto
//! a [`ParameterBounds`] box, scaled to the lags and semivariances unless
//! given explicitly; a parameter held at a bound by the gradient drops out of
//! the step. Model-dependent weights (Cressie) are refreshed at every
//! accepted iterate and held fixed while a step is evaluated.
//!
//! Reference:
//! Cressie, N. (1985). Fitting variogram models by weighted least squares.
//! Mathematical Geology 17, 563–586.
//! Marquardt, D. (1963). An algorithm for least-squares estimation of
//! nonlinear parameters. SIAM J. Appl. Math. 11, 431–441.

use geostat_core::{Error, Result, VariogramFamily, VariogramModel};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{InitialGuess, NuggetTreatment, ParameterBounds};
use crate::interpolation::variogram::EmpiricalVariogramPoint;
use crate::linalg::solve_dense;

/// Weight assigned to each empirical lag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
    /// wᵢ = 1
    Uniform,
    /// wᵢ = nᵢ
    PairCount,
    /// wᵢ = nᵢ / γ(hᵢ; θ)²  (Cressie 1985)
    Cressie,
    /// wᵢ = nᵢ / hᵢ²
    PairsOverDistanceSquared,
}

impl WeightScheme {
    fn weight(self, point: &EmpiricalVariogramPoint, model: &VariogramModel, floor: f64) -> f64 {
        let n = point.pair_count as f64;
        match self {
            WeightScheme::Uniform => 1.0,
            WeightScheme::PairCount => n,
            WeightScheme::Cressie => {
                let g = model.semivariance(point.distance).max(floor);
                n / (g * g)
            }
            WeightScheme::PairsOverDistanceSquared => {
                let h = point.distance.max(floor);
                n / (h * h)
            }
        }
    }
}

/// Parameters for WLS variogram fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WlsParams {
    pub family: VariogramFamily,
    pub initial: InitialGuess,
    pub nugget: NuggetTreatment,
    pub weights: WeightScheme,
    /// Iteration budget (default 200)
    pub max_iterations: usize,
    /// Relative step / objective tolerance (default 1e-9)
    pub tolerance: f64,
    /// Search box; `None` derives it with [`ParameterBounds::from_variogram`]
    pub bounds: Option<ParameterBounds>,
}

impl WlsParams {
    pub fn new(
        family: VariogramFamily,
        initial: InitialGuess,
        nugget: NuggetTreatment,
        weights: WeightScheme,
    ) -> Self {
        Self {
            family,
            initial,
            nugget,
            weights,
            max_iterations: 200,
            tolerance: 1e-9,
            bounds: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_bounds(mut self, bounds: ParameterBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_family(mut self, family: VariogramFamily) -> Self {
        self.family = family;
        self
    }
}

/// Result of a WLS fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WlsFit {
    pub model: VariogramModel,
    /// S(θ̂) with weights evaluated at θ̂
    pub weighted_sse: f64,
    pub iterations: usize,
}

/// Free-parameter layout: indices into (nugget, partial_sill, range).
fn free_indices(nugget: NuggetTreatment) -> &'static [usize] {
    if nugget.is_free() { &[0, 1, 2] } else { &[1, 2] }
}

fn to_model(family: VariogramFamily, theta: [f64; 3]) -> VariogramModel {
    VariogramModel {
        family,
        nugget: theta[0],
        partial_sill: theta[1],
        range: theta[2],
    }
}

fn compute_weights(
    scheme: WeightScheme,
    points: &[EmpiricalVariogramPoint],
    model: &VariogramModel,
    floor: f64,
) -> Vec<f64> {
    points.iter().map(|p| scheme.weight(p, model, floor)).collect()
}

fn weighted_sse(points: &[EmpiricalVariogramPoint], model: &VariogramModel, weights: &[f64]) -> f64 {
    points
        .iter()
        .zip(weights)
        .map(|(p, w)| {
            let r = p.semivariance - model.semivariance(p.distance);
            w * r * r
        })
        .sum()
}

/// (JᵀJ, Jᵀr) of the weighted residuals over the free parameters.
fn normal_equations(
    points: &[EmpiricalVariogramPoint],
    weights: &[f64],
    model: &VariogramModel,
    free: &[usize],
) -> (Array2<f64>, Vec<f64>) {
    let k = free.len();
    let mut jtj = Array2::<f64>::zeros((k, k));
    let mut jtr = vec![0.0_f64; k];
    for (p, w) in points.iter().zip(weights) {
        let sw = w.sqrt();
        let r = sw * (p.semivariance - model.semivariance(p.distance));
        let grad = model.semivariance_gradient(p.distance);
        let jrow: Vec<f64> = free.iter().map(|&f| -sw * grad[f]).collect();
        for a in 0..k {
            jtr[a] += jrow[a] * r;
            for b in 0..k {
                jtj[(a, b)] += jrow[a] * jrow[b];
            }
        }
    }
    (jtj, jtr)
}

/// Fit a variogram model to empirical variogram points by WLS.
///
/// # Errors
/// - [`Error::InputData`] when there are fewer lags than free parameters or
///   a lag is not finite
/// - [`Error::InvalidParameter`] for invalid bounds or an initial guess
///   outside them
/// - [`Error::ConvergenceFailure`] when the iteration budget runs out; the
///   error carries the iterate with the lowest weighted SSE
pub fn fit_wls(points: &[EmpiricalVariogramPoint], params: &WlsParams) -> Result<WlsFit> {
    params.initial.validate()?;
    let free = free_indices(params.nugget);
    let k = free.len();
    if points.len() < k {
        return Err(Error::InputData(format!(
            "{} variogram lags cannot determine {k} parameters",
            points.len()
        )));
    }
    if points
        .iter()
        .any(|p| !(p.distance.is_finite() && p.semivariance.is_finite()) || p.pair_count == 0)
    {
        return Err(Error::InputData("variogram lags must be finite with at least one pair".into()));
    }

    let bounds = match params.bounds {
        Some(b) => b,
        None => ParameterBounds::from_variogram(points)?,
    };
    bounds.validate()?;
    bounds.check_initial(&params.initial, params.nugget)?;

    let family = params.family;
    let max_h = points.iter().fold(0.0_f64, |m, p| m.max(p.distance));
    let max_g = points.iter().fold(0.0_f64, |m, p| m.max(p.semivariance));
    let scale_floor = (1e-9 * max_h).max(f64::MIN_POSITIVE);
    let weight_floor = (1e-12 * max_g.max(max_h)).max(f64::MIN_POSITIVE);
    let lower = [bounds.nugget.0, bounds.partial_sill.0, bounds.range.0];
    let upper = [bounds.nugget.1, bounds.partial_sill.1, bounds.range.1];

    let project = |theta: &mut [f64; 3]| {
        for &f in free {
            theta[f] = theta[f].max(lower[f]).min(upper[f]);
        }
    };

    let init = params.initial;
    let mut theta = [init.nugget, init.partial_sill, init.range];

    let mut model = to_model(family, theta);
    let mut weights = compute_weights(params.weights, points, &model, weight_floor);
    let mut sse = weighted_sse(points, &model, &weights);
    let mut best = (model, sse);
    let mut lambda = 1e-3;

    for iter in 1..=params.max_iterations {
        // (JᵀJ + λD) δ = −Jᵀr over the parameters not pinned at a bound
        let (jtj, jtr) = normal_equations(points, &weights, &model, free);
        let movable: Vec<usize> = (0..k)
            .filter(|&a| {
                let f = free[a];
                let pinned_low = theta[f] <= lower[f] && jtr[a] > 0.0;
                let pinned_high = theta[f] >= upper[f] && jtr[a] < 0.0;
                !(pinned_low || pinned_high)
            })
            .collect();
        let m = movable.len();
        let diag_max = movable.iter().fold(0.0_f64, |acc, &a| acc.max(jtj[(a, a)]));
        let damping_floor = (1e-12 * diag_max).max(f64::MIN_POSITIVE);

        let mut accepted = None;
        while m > 0 && lambda <= 1e12 {
            let mut a_mat = Array2::<f64>::zeros((m, m));
            for (r, &ar) in movable.iter().enumerate() {
                for (c, &ac) in movable.iter().enumerate() {
                    a_mat[(r, c)] = jtj[(ar, ac)];
                }
                a_mat[(r, r)] += lambda * jtj[(ar, ar)].max(damping_floor);
            }
            let rhs: Vec<f64> = movable.iter().map(|&a| -jtr[a]).collect();
            let step = match solve_dense(&a_mat, &rhs, 1e-15) {
                Ok(step) => step,
                Err(_) => {
                    lambda *= 10.0;
                    continue;
                }
            };

            let mut trial = theta;
            for (&a, s) in movable.iter().zip(&step) {
                trial[free[a]] += s;
            }
            project(&mut trial);
            let trial_model = to_model(family, trial);
            let trial_sse = weighted_sse(points, &trial_model, &weights);

            if trial_sse.is_finite() && trial_sse <= sse {
                accepted = Some((trial, trial_sse));
                lambda = (lambda / 10.0).max(1e-12);
                break;
            }
            lambda *= 10.0;
        }

        let Some((trial, trial_sse)) = accepted else {
            // No descent direction left inside the box
            tracing::debug!(iter, sse, "WLS stalled at a local minimum");
            return Ok(WlsFit {
                model,
                weighted_sse: sse,
                iterations: iter,
            });
        };

        let step_rel = free
            .iter()
            .map(|&f| (trial[f] - theta[f]).abs() / (theta[f].abs() + scale_floor))
            .fold(0.0_f64, f64::max);
        let sse_drop = sse - trial_sse;

        theta = trial;
        model = to_model(family, theta);
        weights = compute_weights(params.weights, points, &model, weight_floor);
        sse = weighted_sse(points, &model, &weights);
        if sse < best.1 {
            best = (model, sse);
        }

        tracing::trace!(iter, sse, lambda, nugget = theta[0], partial_sill = theta[1], range = theta[2]);

        if step_rel <= params.tolerance || sse_drop <= params.tolerance * trial_sse.max(f64::MIN_POSITIVE) {
            tracing::debug!(
                iter,
                sse,
                nugget = theta[0],
                partial_sill = theta[1],
                range = theta[2],
                "WLS variogram fit converged"
            );
            return Ok(WlsFit {
                model,
                weighted_sse: sse,
                iterations: iter,
            });
        }
    }

    let (best_model, best_sse) = best;
    tracing::warn!(iterations = params.max_iterations, sse = best_sse, "WLS variogram fit did not converge");
    Err(Error::ConvergenceFailure {
        iterations: params.max_iterations,
        objective: best_sse,
        best: best_model,
    })
}

/// Fit every listed family with the same settings and return the fit with
/// the lowest weighted SSE.
pub fn fit_best_wls(
    points: &[EmpiricalVariogramPoint],
    families: &[VariogramFamily],
    params: &WlsParams,
) -> Result<WlsFit> {
    let mut best: Option<WlsFit> = None;
    let mut last_err = None;
    for &family in families {
        match fit_wls(points, &params.clone().with_family(family)) {
            Ok(fitted) => {
                if best.as_ref().is_none_or(|b| fitted.weighted_sse < b.weighted_sse) {
                    best = Some(fitted);
                }
            }
            Err(e) => {
                tracing::debug!(%family, error = %e, "family skipped");
                last_err = Some(e);
            }
        }
    }

    best.ok_or_else(|| {
        last_err.unwrap_or_else(|| Error::invalid_parameter("families", "[]", "no families to fit"))
    })
}
