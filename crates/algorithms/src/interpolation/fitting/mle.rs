//! Maximum likelihood variogram fit with a profiled linear trend
//!
//! For y ~ N(Xβ, Σ(θ)), Σᵢⱼ = C(‖sᵢ − sⱼ‖; θ):
//! ```text
//! −ℓ(θ) = ½ [ log|Σ| + (y − Xβ̂)ᵀ Σ⁻¹ (y − Xβ̂) + N log 2π ]
//! β̂(θ) = (XᵀΣ⁻¹X)⁻¹ XᵀΣ⁻¹y
//! ```
//! Σ = LLᵀ is factored once per trial; β̂ is the least-squares solution of
//! the whitened system (L⁻¹X) β ≈ L⁻¹y. The simplex works on
//! (nugget, ln c, ln a) within [`ParameterBounds`]; a trial whose covariance
//! is not positive definite scores +∞ and is never accepted.
//!
//! Reference:
//! Mardia, K. & Marshall, R. (1984). Maximum likelihood estimation of models
//! for residual covariance in spatial regression. Biometrika 71, 135–146.

use std::f64::consts::PI;

use geostat_core::{
    Error, Result, SpatialDataset, TrendCoefficients, TrendSpec, VariogramFamily, VariogramModel,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::nelder_mead::{minimize, SimplexOptions};
use super::{InitialGuess, NuggetTreatment, ParameterBounds};
use crate::linalg::{Cholesky, QrDecomposition};
use crate::statistics::trend::DEFAULT_RANK_TOLERANCE;

/// Parameters for maximum likelihood fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MleParams {
    pub family: VariogramFamily,
    pub initial: InitialGuess,
    pub nugget: NuggetTreatment,
    /// Trend profiled out of the likelihood; always carries an intercept
    pub trend: TrendSpec,
    /// Search box; `None` derives it with [`ParameterBounds::from_dataset`]
    pub bounds: Option<ParameterBounds>,
    /// Simplex iteration budget (default 1000)
    pub max_iterations: usize,
    /// Relative tolerance on the objective spread (default 1e-10)
    pub tolerance: f64,
}

impl MleParams {
    pub fn new(family: VariogramFamily, initial: InitialGuess, nugget: NuggetTreatment, trend: TrendSpec) -> Self {
        Self {
            family,
            initial,
            nugget,
            trend,
            bounds: None,
            max_iterations: 1000,
            tolerance: 1e-10,
        }
    }

    pub fn with_bounds(mut self, bounds: ParameterBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Result of a maximum likelihood fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MleFit {
    pub model: VariogramModel,
    /// GLS trend coefficients at the optimum, with standard errors
    pub trend: TrendCoefficients,
    pub log_likelihood: f64,
    /// 2k − 2ℓ, k = free variogram parameters + trend coefficients
    pub aic: f64,
    pub iterations: usize,
}

/// Profile likelihood evaluated at one variogram model
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileLikelihood {
    pub log_likelihood: f64,
    pub beta: Vec<f64>,
    pub standard_errors: Vec<f64>,
}

/// Covariance matrix Σᵢⱼ = C(‖sᵢ − sⱼ‖).
pub(crate) fn covariance_matrix(dataset: &SpatialDataset, model: &VariogramModel) -> Array2<f64> {
    let coords = dataset.coordinates();
    let n = coords.len();
    let mut sigma = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        sigma[(i, i)] = model.covariance(0.0);
        for j in 0..i {
            let c = model.covariance(coords[i].distance(&coords[j]));
            sigma[(i, j)] = c;
            sigma[(j, i)] = c;
        }
    }
    sigma
}

fn profile(values: &[f64], design: &Array2<f64>, sigma: &Array2<f64>) -> Result<ProfileLikelihood> {
    let n = values.len();
    let chol = Cholesky::factor(sigma)?;
    let xw = chol.whiten(design);
    let yw = chol.solve_lower(values);

    let qr = QrDecomposition::factor(&xw);
    if let Some(col) = qr.dependent_column(DEFAULT_RANK_TOLERANCE) {
        return Err(Error::SingularDesign {
            column: format!("#{col}"),
            reason: "whitened design lost rank".into(),
        });
    }
    let beta = qr.solve_least_squares(&yw)?;
    let quad: f64 = (0..n)
        .map(|i| {
            let fitted: f64 = xw.row(i).iter().zip(&beta).map(|(x, b)| x * b).sum();
            let r = yw[i] - fitted;
            r * r
        })
        .sum();

    let nll = 0.5 * (chol.log_det() + quad + n as f64 * (2.0 * PI).ln());
    let cov_beta = qr.xtx_inverse()?;
    let standard_errors = (0..beta.len()).map(|j| cov_beta[(j, j)].max(0.0).sqrt()).collect();

    Ok(ProfileLikelihood {
        log_likelihood: -nll,
        beta,
        standard_errors,
    })
}

/// Gaussian log-likelihood of `dataset` under `model`, with the trend
/// coefficients at their GLS estimate.
pub fn profile_log_likelihood(
    dataset: &SpatialDataset,
    model: &VariogramModel,
    trend: &TrendSpec,
) -> Result<ProfileLikelihood> {
    model.validate()?;
    let design = dataset.design_matrix(trend)?;
    profile(dataset.values(), &design, &covariance_matrix(dataset, model))
}

/// Search-space layout: (nugget?, ln partial_sill, ln range).
struct Layout {
    family: VariogramFamily,
    fixed_nugget: Option<f64>,
}

impl Layout {
    fn model(&self, u: &[f64]) -> VariogramModel {
        let (nugget, rest) = match self.fixed_nugget {
            Some(c0) => (c0, u),
            None => (u[0], &u[1..]),
        };
        VariogramModel {
            family: self.family,
            nugget,
            partial_sill: rest[0].exp(),
            range: rest[1].exp(),
        }
    }

    fn free_count(&self) -> usize {
        if self.fixed_nugget.is_some() { 2 } else { 3 }
    }
}

/// Fit a variogram model to the raw observations by maximum likelihood.
///
/// # Errors
/// - [`Error::InvalidParameter`] when the initial guess lies outside the
///   search bounds
/// - [`Error::SingularDesign`] when the trend design is rank deficient
/// - [`Error::InputData`] when the nugget is held at zero but two
///   observations share a location (Σ singular for every θ)
/// - [`Error::NonPositiveDefinite`] when no trial the search visited had a
///   positive definite covariance
/// - [`Error::ConvergenceFailure`] when the simplex budget runs out
pub fn fit_mle(dataset: &SpatialDataset, params: &MleParams) -> Result<MleFit> {
    params.initial.validate()?;
    let bounds = match params.bounds {
        Some(b) => b,
        None => ParameterBounds::from_dataset(dataset)?,
    };
    bounds.validate()?;
    if !(bounds.partial_sill.0 > 0.0) {
        return Err(Error::invalid_parameter(
            "bounds.partial_sill",
            format!("{:?}", bounds.partial_sill),
            "the likelihood search works on ln(partial sill); need lo > 0",
        ));
    }
    bounds.check_initial(&params.initial, params.nugget)?;

    let design = dataset.design_matrix(&params.trend)?;
    let names = params.trend.term_names();
    if design.nrows() <= design.ncols() {
        return Err(Error::SingularDesign {
            column: names.last().cloned().unwrap_or_default(),
            reason: format!(
                "{} observations cannot determine {} coefficients",
                design.nrows(),
                design.ncols()
            ),
        });
    }
    // Rank of X is unaffected by whitening, so check it once up front
    if let Some(col) = QrDecomposition::factor(&design).dependent_column(DEFAULT_RANK_TOLERANCE) {
        return Err(Error::SingularDesign {
            column: names.get(col).cloned().unwrap_or_else(|| format!("#{col}")),
            reason: "column is collinear with preceding columns".into(),
        });
    }

    let fixed_nugget = (!params.nugget.is_free()).then_some(params.initial.nugget);
    if fixed_nugget == Some(0.0) && !dataset.coincident_pairs(0.0).is_empty() {
        return Err(Error::InputData(
            "coincident observations make the covariance singular with a zero nugget".into(),
        ));
    }

    let layout = Layout {
        family: params.family,
        fixed_nugget,
    };
    let (mut lower, mut upper, mut x0, mut steps) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    if fixed_nugget.is_none() {
        lower.push(bounds.nugget.0);
        upper.push(bounds.nugget.1);
        x0.push(params.initial.nugget);
        steps.push((0.1 * params.initial.nugget).max(0.05 * params.initial.partial_sill));
    }
    lower.extend([bounds.partial_sill.0.ln(), bounds.range.0.ln()]);
    upper.extend([bounds.partial_sill.1.ln(), bounds.range.1.ln()]);
    x0.extend([params.initial.partial_sill.ln(), params.initial.range.ln()]);
    steps.extend([0.5, 0.5]);

    let values = dataset.values();
    let mut last_rejection = None;
    let objective = |u: &[f64]| -> f64 {
        let model = layout.model(u);
        match profile(values, &design, &covariance_matrix(dataset, &model)) {
            Ok(p) => -p.log_likelihood,
            Err(e) => {
                tracing::trace!(nugget = model.nugget, partial_sill = model.partial_sill, range = model.range, error = %e, "trial rejected");
                last_rejection = Some(e);
                f64::INFINITY
            }
        }
    };

    let outcome = minimize(
        objective,
        &x0,
        &steps,
        &lower,
        &upper,
        SimplexOptions {
            max_iterations: params.max_iterations,
            f_tolerance: params.tolerance,
            x_tolerance: params.tolerance.sqrt(),
        },
    );

    let model = layout.model(&outcome.x);
    if !outcome.fx.is_finite() {
        return Err(last_rejection.unwrap_or(Error::NonPositiveDefinite { pivot: f64::NAN }));
    }
    if !outcome.converged {
        tracing::warn!(iterations = outcome.iterations, nll = outcome.fx, "MLE variogram fit did not converge");
        return Err(Error::ConvergenceFailure {
            iterations: outcome.iterations,
            objective: outcome.fx,
            best: model,
        });
    }

    let at_optimum = profile(values, &design, &covariance_matrix(dataset, &model))?;
    let k = (layout.free_count() + at_optimum.beta.len()) as f64;
    let aic = 2.0 * k - 2.0 * at_optimum.log_likelihood;

    tracing::debug!(
        iterations = outcome.iterations,
        log_likelihood = at_optimum.log_likelihood,
        nugget = model.nugget,
        partial_sill = model.partial_sill,
        range = model.range,
        "MLE variogram fit converged"
    );

    Ok(MleFit {
        model,
        trend: TrendCoefficients {
            names,
            values: at_optimum.beta,
            standard_errors: Some(at_optimum.standard_errors),
        },
        log_likelihood: at_optimum.log_likelihood,
        aic,
        iterations: outcome.iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::trend::fit_trend;
    use geostat_core::{Coordinate, DriftOrder};

    /// Deterministic LCG in [0, 1)
    fn lcg(seed: &mut u64) -> f64 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((*seed >> 11) as f64) / ((1u64 << 53) as f64)
    }

    fn scattered(n: usize, seed: u64) -> SpatialDataset {
        let mut s = seed;
        let coords: Vec<Coordinate> = (0..n)
            .map(|_| Coordinate::new(100.0 * lcg(&mut s), 100.0 * lcg(&mut s)))
            .collect();
        let values = coords
            .iter()
            .map(|c| 5.0 + 0.05 * c.x + (c.y / 15.0).sin() + 0.3 * (lcg(&mut s) - 0.5))
            .collect();
        SpatialDataset::new(coords, values).unwrap()
    }

    #[test]
    fn test_profile_beta_matches_ols_for_pure_nugget() {
        // Σ = c₀I makes GLS collapse to OLS
        let ds = scattered(30, 7);
        let model = VariogramModel::new(VariogramFamily::Exponential, 2.0, 0.0, 10.0).unwrap();
        let trend = TrendSpec::Coordinates(DriftOrder::Linear);
        let p = profile_log_likelihood(&ds, &model, &trend).unwrap();
        let ols = fit_trend(&ds, &trend).unwrap();
        for (g, o) in p.beta.iter().zip(&ols.coefficients.values) {
            assert!((g - o).abs() < 1e-9, "GLS {g} vs OLS {o}");
        }

        // Closed form for iid errors
        let n = ds.len() as f64;
        let rss: f64 = ols.residuals.iter().map(|e| e * e).sum();
        let expected = -0.5 * (n * 2.0_f64.ln() + rss / 2.0 + n * (2.0 * PI).ln());
        assert!((p.log_likelihood - expected).abs() < 1e-9);
    }

    #[test]
    fn test_mle_improves_on_initial_guess() {
        let ds = scattered(40, 11);
        let initial = InitialGuess::new(0.05, 0.5, 20.0).unwrap();
        let params = MleParams::new(
            VariogramFamily::Exponential,
            initial,
            NuggetTreatment::Estimate,
            TrendSpec::Constant,
        );
        let fit = fit_mle(&ds, &params).unwrap();
        let start = VariogramModel::new(VariogramFamily::Exponential, 0.05, 0.5, 20.0).unwrap();
        let ll0 = profile_log_likelihood(&ds, &start, &TrendSpec::Constant).unwrap().log_likelihood;
        assert!(fit.log_likelihood >= ll0 - 1e-9);
        assert!(fit.model.validate().is_ok());
        assert_eq!(fit.trend.len(), 1);
        assert!((fit.aic - (2.0 * 4.0 - 2.0 * fit.log_likelihood)).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_nugget_not_moved() {
        let ds = scattered(25, 3);
        let params = MleParams::new(
            VariogramFamily::Spherical,
            InitialGuess::new(0.02, 0.8, 30.0).unwrap(),
            NuggetTreatment::Fixed,
            TrendSpec::Coordinates(DriftOrder::Linear),
        );
        let fit = fit_mle(&ds, &params).unwrap();
        assert_eq!(fit.model.nugget, 0.02);
        assert_eq!(fit.trend.len(), 3);
    }

    #[test]
    fn test_zero_nugget_with_duplicates_rejected() {
        let coords = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(2.0, 1.0),
        ];
        let ds = SpatialDataset::new(coords, vec![1.0, 2.0, 2.5, 3.0]).unwrap();
        let params = MleParams::new(
            VariogramFamily::Exponential,
            InitialGuess::new(0.0, 1.0, 1.0).unwrap(),
            NuggetTreatment::Fixed,
            TrendSpec::Constant,
        );
        assert!(matches!(fit_mle(&ds, &params), Err(Error::InputData(_))));
    }

    #[test]
    fn test_gaussian_near_twins_never_positive_definite() {
        // A 1e-9 twin makes every Gaussian covariance in the box numerically singular
        let base = scattered(8, 13);
        let mut coords = base.coordinates().to_vec();
        let mut values = base.values().to_vec();
        coords.push(Coordinate::new(coords[0].x + 1e-9, coords[0].y));
        values.push(values[0] + 0.1);
        let ds = SpatialDataset::new(coords, values).unwrap();
        assert!(ds.coincident_pairs(0.0).is_empty());

        let params = MleParams::new(
            VariogramFamily::Gaussian,
            InitialGuess::new(0.0, 1.0, 20.0).unwrap(),
            NuggetTreatment::Fixed,
            TrendSpec::Constant,
        )
        .with_max_iterations(50);
        match fit_mle(&ds, &params) {
            Err(Error::NonPositiveDefinite { .. }) => {}
            other => panic!("expected NonPositiveDefinite, got {other:?}"),
        }
    }

    #[test]
    fn test_iteration_budget_exhausted() {
        let ds = scattered(30, 11);
        let params = MleParams::new(
            VariogramFamily::Exponential,
            InitialGuess::new(0.05, 0.5, 20.0).unwrap(),
            NuggetTreatment::Estimate,
            TrendSpec::Constant,
        )
        .with_max_iterations(1);
        match fit_mle(&ds, &params) {
            Err(Error::ConvergenceFailure { iterations, objective, best }) => {
                assert_eq!(iterations, 1);
                assert!(objective.is_finite(), "objective {objective}");
                assert!(best.validate().is_ok(), "best {best:?}");
                let start = VariogramModel::new(VariogramFamily::Exponential, 0.05, 0.5, 20.0).unwrap();
                let nll0 = -profile_log_likelihood(&ds, &start, &TrendSpec::Constant).unwrap().log_likelihood;
                assert!(objective <= nll0 + 1e-9, "best vertex {objective} worse than start {nll0}");
            }
            other => panic!("expected ConvergenceFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_collinear_trend_rejected() {
        let ds = scattered(10, 5);
        let x: Vec<f64> = ds.coordinates().iter().map(|c| c.x).collect();
        let mut cov = Array2::zeros((10, 2));
        for (i, v) in x.iter().enumerate() {
            cov[(i, 0)] = *v;
            cov[(i, 1)] = 3.0 * v;
        }
        let ds = ds.with_covariates(vec!["a".into(), "b".into()], cov).unwrap();
        let params = MleParams::new(
            VariogramFamily::Exponential,
            InitialGuess::new(0.1, 1.0, 10.0).unwrap(),
            NuggetTreatment::Estimate,
            TrendSpec::Covariates(vec!["a".into(), "b".into()]),
        );
        match fit_mle(&ds, &params) {
            Err(Error::SingularDesign { column, .. }) => assert_eq!(column, "b"),
            other => panic!("expected SingularDesign, got {other:?}"),
        }
    }

    #[test]
    fn test_bounds_from_dataset() {
        let ds = scattered(20, 9);
        let b = ParameterBounds::from_dataset(&ds).unwrap();
        assert!(b.validate().is_ok());
        assert_eq!(b.nugget.0, 0.0);
        assert!((b.range.1 - 10.0 * ds.max_distance()).abs() < 1e-9);
    }
}
