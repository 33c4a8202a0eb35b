//! End-to-end tests: dataset → empirical variogram → model fit → kriging.
//!
//! Fields are generated with a deterministic LCG so every run sees the same
//! data.

use geostat_algorithms::interpolation::{
    empirical_variogram, fit_best_wls, fit_mle, fit_wls, leave_one_out, InitialGuess, KrigingParams,
    KrigingPredictor, MleParams, NuggetTreatment, RegressionKriging, RegressionKrigingParams,
    ResidualVariogram, SearchNeighborhood, VariogramParams, WeightScheme, WlsParams,
};
use geostat_algorithms::statistics::{morans_i, SpatialWeights};
use geostat_core::{
    Coordinate, DriftOrder, Error, SpatialDataset, TrendSpec, VariogramFamily, VariogramModel,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) as f64 / (1u64 << 31) as f64
    }
}

/// Smooth field with short-range noise on [0, 100]².
fn field(n: usize, seed: u64) -> SpatialDataset {
    let mut rng = Lcg(seed);
    let mut coords = Vec::with_capacity(n);
    let mut values = Vec::with_capacity(n);
    for _ in 0..n {
        let x = rng.next() * 100.0;
        let y = rng.next() * 100.0;
        let noise = rng.next() - 0.5;
        coords.push(Coordinate::new(x, y));
        values.push(10.0 * ((x / 20.0).sin() + (y / 25.0).cos()) + noise);
    }
    SpatialDataset::new(coords, values).unwrap()
}

fn wls_params(family: VariogramFamily) -> WlsParams {
    WlsParams::new(
        family,
        InitialGuess::new(1.0, 40.0, 40.0).unwrap(),
        NuggetTreatment::Estimate,
        WeightScheme::Cressie,
    )
}

#[test]
fn test_variogram_fit_krige() {
    init_tracing();
    let ds = field(120, 42);

    let emp = empirical_variogram(&ds, &VariogramParams::default()).unwrap();
    assert!(emp.len() >= 10, "expected most lags populated, got {}", emp.len());
    // Short lags are more similar than long ones for a smooth field
    assert!(emp.points[0].semivariance < emp.points[emp.len() - 1].semivariance);

    let fit = fit_wls(&emp.points, &wls_params(VariogramFamily::Spherical)).unwrap();
    assert!(fit.model.validate().is_ok());
    assert!(fit.model.range > 0.0);

    let predictor = KrigingPredictor::new(&ds, fit.model, &KrigingParams::default()).unwrap();
    let mut targets = Vec::new();
    for i in 0..10 {
        for j in 0..10 {
            targets.push(Coordinate::new(5.0 + 10.0 * i as f64, 5.0 + 10.0 * j as f64));
        }
    }
    let results = predictor.predict(&targets, None).unwrap();
    assert_eq!(results.len(), targets.len());

    let mut sq_err = 0.0;
    for (t, r) in targets.iter().zip(&results) {
        let r = r.as_ref().unwrap();
        assert!(r.variance >= 0.0, "negative variance at {t:?}");
        let truth = 10.0 * ((t.x / 20.0).sin() + (t.y / 25.0).cos());
        sq_err += (r.value - truth).powi(2);
    }
    let rmse = (sq_err / targets.len() as f64).sqrt();
    assert!(rmse < 2.0, "kriging RMSE against the noiseless field: {rmse}");

    // Batch results follow target order
    for (t, r) in targets.iter().zip(&results).step_by(17) {
        let single = predictor.predict_at(*t, &[]).unwrap();
        assert_eq!(single, *r.as_ref().unwrap());
    }
}

#[test]
fn test_exact_interpolation_zero_nugget() {
    let ds = field(50, 7);
    let model = VariogramModel::new(VariogramFamily::Exponential, 0.0, 50.0, 40.0).unwrap();
    let predictor = KrigingPredictor::new(&ds, model, &KrigingParams::default()).unwrap();
    let results = predictor.predict(ds.coordinates(), None).unwrap();
    for (r, v) in results.iter().zip(ds.values()) {
        let r = r.as_ref().unwrap();
        assert!((r.value - v).abs() < 1e-6, "expected {v}, got {}", r.value);
        assert!(r.variance < 1e-6);
    }
}

#[test]
fn test_ordinary_weights_and_universal_constant() {
    let ds = field(60, 3);
    let model = VariogramModel::new(VariogramFamily::Gaussian, 0.5, 40.0, 50.0).unwrap();
    let ok = KrigingPredictor::new(&ds, model, &KrigingParams::default()).unwrap();
    let uk = KrigingPredictor::new(&ds, model, &KrigingParams::universal(TrendSpec::Constant)).unwrap();

    let mut rng = Lcg(99);
    for _ in 0..20 {
        let t = Coordinate::new(rng.next() * 120.0 - 10.0, rng.next() * 120.0 - 10.0);
        let w = ok.weights(t, &[]).unwrap();
        assert!((w.weight_sum() - 1.0).abs() < 1e-9, "Σλ = {}", w.weight_sum());

        let a = ok.predict_at(t, &[]).unwrap();
        let b = uk.predict_at(t, &[]).unwrap();
        assert!((a.value - b.value).abs() < 1e-9);
        assert!((a.variance - b.variance).abs() < 1e-9);
    }
}

#[test]
fn test_universal_kriging_linear_drift() {
    let mut rng = Lcg(5);
    let coords: Vec<Coordinate> = (0..60).map(|_| Coordinate::new(rng.next() * 100.0, rng.next() * 100.0)).collect();
    let values = coords
        .iter()
        .map(|c| 50.0 + 0.8 * c.x - 0.4 * c.y + 3.0 * (c.x / 12.0).sin())
        .collect();
    let ds = SpatialDataset::new(coords, values).unwrap();

    let params = KrigingParams::universal(TrendSpec::Coordinates(DriftOrder::Linear)).with_neighborhood(
        SearchNeighborhood::Local {
            max_points: 25,
            max_radius: None,
        },
    );
    let model = VariogramModel::new(VariogramFamily::Gaussian, 0.01, 5.0, 30.0).unwrap();
    let uk = KrigingPredictor::new(&ds, model, &params).unwrap();
    let t = Coordinate::new(48.0, 52.0);
    let w = uk.weights(t, &[]).unwrap();
    assert_eq!(w.lambda.len(), 25);
    assert_eq!(w.mu.len(), 3);

    // Unbiasedness constraints: Σλ = 1, Σλx = x₀, Σλy = y₀
    let c = ds.coordinates();
    let sx: f64 = w.indices.iter().zip(&w.lambda).map(|(&i, l)| l * c[i].x).sum();
    let sy: f64 = w.indices.iter().zip(&w.lambda).map(|(&i, l)| l * c[i].y).sum();
    assert!((w.weight_sum() - 1.0).abs() < 1e-8);
    assert!((sx - t.x).abs() < 1e-6);
    assert!((sy - t.y).abs() < 1e-6);

    let r = uk.predict_at(t, &[]).unwrap();
    let truth = 50.0 + 0.8 * t.x - 0.4 * t.y + 3.0 * (t.x / 12.0).sin();
    assert!((r.value - truth).abs() < 2.0, "UK {} vs truth {truth}", r.value);
}

#[test]
fn test_duplicate_locations_fail_per_target() {
    let mut coords: Vec<Coordinate> = (0..10).map(|i| Coordinate::new(i as f64 * 3.0, (i % 3) as f64)).collect();
    coords.push(coords[4]);
    let values = (0..11).map(|i| i as f64).collect();
    let ds = SpatialDataset::new(coords, values).unwrap();
    assert_eq!(ds.coincident_pairs(0.0), vec![(4, 10)]);

    let model = VariogramModel::new(VariogramFamily::Exponential, 0.0, 10.0, 15.0).unwrap();
    let predictor = KrigingPredictor::new(&ds, model, &KrigingParams::default()).unwrap();
    let results = predictor
        .predict(&[Coordinate::new(1.0, 1.0), Coordinate::new(20.0, 0.5)], None)
        .unwrap();
    for r in &results {
        assert!(matches!(r, Err(Error::SingularKrigingSystem { .. })), "{r:?}");
    }

    // A local neighbourhood that excludes the duplicate still works
    let local = KrigingPredictor::new(
        &ds,
        model,
        &KrigingParams::default().with_neighborhood(SearchNeighborhood::Local {
            max_points: 3,
            max_radius: None,
        }),
    )
    .unwrap();
    assert!(local.predict_at(Coordinate::new(27.0, 0.0), &[]).is_ok());
}

#[test]
fn test_fit_best_family_and_cross_validate() {
    init_tracing();
    let ds = field(100, 11);
    let emp = empirical_variogram(&ds, &VariogramParams::default()).unwrap();
    let best = fit_best_wls(&emp.points, &VariogramFamily::ALL, &wls_params(VariogramFamily::Exponential)).unwrap();

    let cv = leave_one_out(&ds, best.model, &KrigingParams::default()).unwrap();
    assert_eq!(cv.points.len(), ds.len());
    let spread = ds.value_variance().sqrt();
    assert!(cv.rmse < 0.5 * spread, "LOO RMSE {} vs data sd {spread}", cv.rmse);
    assert!(cv.mean_error.abs() < 1.0);
}

#[test]
fn test_mle_on_field() {
    init_tracing();
    let ds = field(60, 21);
    let params = MleParams::new(
        VariogramFamily::Exponential,
        InitialGuess::new(0.5, 30.0, 30.0).unwrap(),
        NuggetTreatment::Estimate,
        TrendSpec::Constant,
    )
    .with_max_iterations(3000);
    let fit = fit_mle(&ds, &params).unwrap();
    assert!(fit.model.validate().is_ok());
    assert!(fit.log_likelihood.is_finite());
    assert_eq!(fit.trend.names, vec!["(Intercept)".to_string()]);

    // The fitted model feeds straight into prediction
    let predictor = KrigingPredictor::new(&ds, fit.model, &KrigingParams::default()).unwrap();
    let r = predictor.predict_at(Coordinate::new(50.0, 50.0), &[]).unwrap();
    assert!(r.value.is_finite() && r.variance >= 0.0);
}

#[test]
fn test_regression_kriging_pipeline() {
    let mut rng = Lcg(77);
    let n = 80;
    let mut coords = Vec::with_capacity(n);
    let mut elevation = Vec::with_capacity(n);
    let mut values = Vec::with_capacity(n);
    for _ in 0..n {
        let x = rng.next() * 100.0;
        let y = rng.next() * 100.0;
        let elev = 200.0 + 3.0 * x + 10.0 * rng.next();
        coords.push(Coordinate::new(x, y));
        elevation.push(elev);
        values.push(25.0 - 0.05 * elev + 2.0 * (y / 15.0).sin());
    }
    let ds = SpatialDataset::new(coords, values)
        .unwrap()
        .with_covariates(vec!["elevation".into()], ndarray::Array2::from_shape_vec((n, 1), elevation).unwrap())
        .unwrap();

    let params = RegressionKrigingParams::new(
        TrendSpec::Covariates(vec!["elevation".into()]),
        ResidualVariogram::Model(VariogramModel::new(VariogramFamily::Gaussian, 0.01, 2.0, 40.0).unwrap()),
    );
    let rk = RegressionKriging::fit(&ds, &params).unwrap();
    let slope = rk.trend.coefficients.get("elevation").unwrap();
    assert!((slope + 0.05).abs() < 0.01, "elevation slope {slope}");

    let predictor = rk.predictor().unwrap();
    let targets = [Coordinate::new(30.0, 30.0), Coordinate::new(70.0, 10.0)];
    let cov = ndarray::array![[300.0], [420.0]];
    let out = predictor.predict(&targets, Some(cov.view())).unwrap();
    for (t, (r, e)) in targets.iter().zip(out.iter().zip([300.0, 420.0])) {
        let r = r.as_ref().unwrap();
        let truth = 25.0 - 0.05 * e + 2.0 * (t.y / 15.0).sin();
        assert!((r.value - truth).abs() < 1.5, "RK {} vs {truth}", r.value);
    }
    assert!(matches!(predictor.predict(&targets, None), Err(Error::InputData(_))));
}

#[test]
fn test_morans_i_on_field() {
    let ds = field(150, 8);
    let result = morans_i(
        &ds,
        SpatialWeights::InverseDistance {
            power: 1.0,
            max_distance: Some(15.0),
        },
    )
    .unwrap();
    assert!(result.i > result.expected, "smooth field should be autocorrelated: {result:?}");
    assert!(result.p_value < 0.01);
}

#[test]
fn test_params_serde() {
    let params = KrigingParams::universal(TrendSpec::Covariates(vec!["elev".into()])).with_neighborhood(
        SearchNeighborhood::Local {
            max_points: 16,
            max_radius: Some(250.0),
        },
    );
    let json = serde_json::to_string(&params).unwrap();
    let back: KrigingParams = serde_json::from_str(&json).unwrap();
    assert_eq!(params, back);

    let wls = wls_params(VariogramFamily::Gaussian);
    let back: WlsParams = serde_json::from_str(&serde_json::to_string(&wls).unwrap()).unwrap();
    assert_eq!(wls, back);
}
