//! Global spatial autocorrelation of point observations
//!
//! Moran's I with distance-based weights:
//! ```text
//! I = (n / S₀) · Σᵢ Σⱼ wᵢⱼ (zᵢ − z̄)(zⱼ − z̄) / Σᵢ (zᵢ − z̄)²
//! ```
//! Inference uses the normality assumption:
//! ```text
//! E[I] = −1/(n − 1)
//! Var[I] = (n²S₁ − nS₂ + 3S₀²) / ((n² − 1) S₀²) − E[I]²
//! ```
//!
//! Reference:
//! Cliff, A. & Ord, J. (1981). Spatial Processes: Models and Applications.

use geostat_core::{Error, Result, SpatialDataset};
use serde::{Deserialize, Serialize};

/// Spatial weight definition wᵢⱼ for i ≠ j
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialWeights {
    /// wᵢⱼ = d⁻ᵖ, zero beyond `max_distance` when given
    InverseDistance { power: f64, max_distance: Option<f64> },
    /// wᵢⱼ = 1 when d ≤ band, else 0
    DistanceBand(f64),
}

impl SpatialWeights {
    fn validate(&self) -> Result<()> {
        match *self {
            SpatialWeights::InverseDistance { power, max_distance } => {
                if !(power.is_finite() && power > 0.0) {
                    return Err(Error::invalid_parameter("power", power, "must be > 0"));
                }
                if let Some(d) = max_distance
                    && !(d > 0.0)
                {
                    return Err(Error::invalid_parameter("max_distance", d, "must be > 0"));
                }
            }
            SpatialWeights::DistanceBand(d) => {
                if !(d.is_finite() && d > 0.0) {
                    return Err(Error::invalid_parameter("distance_band", d, "must be > 0"));
                }
            }
        }
        Ok(())
    }

    fn weight(&self, d: f64) -> f64 {
        match *self {
            SpatialWeights::InverseDistance { power, max_distance } => {
                if d <= 0.0 || max_distance.is_some_and(|m| d > m) {
                    0.0
                } else {
                    d.powf(-power)
                }
            }
            SpatialWeights::DistanceBand(band) => {
                if d <= band { 1.0 } else { 0.0 }
            }
        }
    }
}

/// Result of Global Moran's I computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoransIResult {
    /// Moran's I statistic
    pub i: f64,
    /// Expected I under no autocorrelation
    pub expected: f64,
    /// Variance of I under normality
    pub variance: f64,
    /// Z-score
    pub z_score: f64,
    /// P-value (two-tailed)
    pub p_value: f64,
}

/// Compute Global Moran's I of the dataset values.
///
/// # Errors
/// - [`Error::InvalidParameter`] for invalid weight settings
/// - [`Error::InputData`] when no pair of observations has a non-zero weight
pub fn morans_i(dataset: &SpatialDataset, weights: SpatialWeights) -> Result<MoransIResult> {
    weights.validate()?;
    let coords = dataset.coordinates();
    let values = dataset.values();
    let n = values.len();
    let nf = n as f64;

    let mean = values.iter().sum::<f64>() / nf;
    let deviations: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let sum_sq = deviations.iter().map(|d| d * d).sum::<f64>();
    let expected = -1.0 / (nf - 1.0);

    let mut numerator = 0.0;
    let mut s0 = 0.0;
    let mut s1 = 0.0;
    let mut row_sums = vec![0.0_f64; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let w = weights.weight(coords[i].distance(&coords[j]));
            if w == 0.0 {
                continue;
            }
            // Symmetric weights: each unordered pair counts twice
            numerator += 2.0 * w * deviations[i] * deviations[j];
            s0 += 2.0 * w;
            s1 += 4.0 * w * w;
            row_sums[i] += w;
            row_sums[j] += w;
        }
    }

    if s0 == 0.0 {
        return Err(Error::InputData("no observation pairs receive a non-zero weight".into()));
    }

    if sum_sq.abs() < f64::EPSILON {
        tracing::warn!("constant values; Moran's I is undefined, reporting 0");
        return Ok(MoransIResult {
            i: 0.0,
            expected,
            variance: 0.0,
            z_score: 0.0,
            p_value: 1.0,
        });
    }

    let s2: f64 = row_sums.iter().map(|r| (2.0 * r) * (2.0 * r)).sum();
    let i = (nf / s0) * (numerator / sum_sq);
    let variance =
        (nf * nf * s1 - nf * s2 + 3.0 * s0 * s0) / ((nf * nf - 1.0) * s0 * s0) - expected * expected;

    let z_score = if variance > 0.0 { (i - expected) / variance.sqrt() } else { 0.0 };
    let p_value = 2.0 * normal_cdf(-z_score.abs());

    tracing::debug!(n, i, z_score, p_value, "Moran's I computed");

    Ok(MoransIResult {
        i,
        expected,
        variance,
        z_score,
        p_value,
    })
}

/// Standard normal CDF approximation (Abramowitz & Stegun, 26.2.17)
pub(crate) fn normal_cdf(x: f64) -> f64 {
    if x < -8.0 { return 0.0; }
    if x > 8.0 { return 1.0; }

    let t = 1.0 / (1.0 + 0.2316419 * x.abs());
    let d = 0.3989422804014327; // 1/sqrt(2*pi)
    let p = d * (-x * x / 2.0).exp()
        * (t * (0.3193815
            + t * (-0.3565638
                + t * (1.781478
                    + t * (-1.821256
                        + t * 1.330274)))));

    if x > 0.0 { 1.0 - p } else { p }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geostat_core::Coordinate;

    fn grid(values: impl Fn(usize, usize) -> f64) -> SpatialDataset {
        let mut coords = Vec::new();
        let mut vals = Vec::new();
        for row in 0..10 {
            for col in 0..10 {
                coords.push(Coordinate::new(col as f64, row as f64));
                vals.push(values(row, col));
            }
        }
        SpatialDataset::new(coords, vals).unwrap()
    }

    #[test]
    fn test_morans_i_uniform() {
        let ds = grid(|_, _| 5.0);
        let result = morans_i(&ds, SpatialWeights::DistanceBand(1.5)).unwrap();
        assert!((result.i).abs() < 1e-10, "Uniform should have I≈0");
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_morans_i_clustered() {
        // Left half = 0, right half = 100 → strong spatial clustering
        let ds = grid(|_, col| if col < 5 { 0.0 } else { 100.0 });
        let result = morans_i(&ds, SpatialWeights::DistanceBand(1.5)).unwrap();
        assert!(result.i > 0.5, "Clustered data should have high positive I, got {}", result.i);
        assert!(result.z_score > 1.96);
        assert!(result.p_value < 0.05);
    }

    #[test]
    fn test_morans_i_checkerboard_negative() {
        let ds = grid(|row, col| ((row + col) % 2) as f64);
        let result = morans_i(
            &ds,
            SpatialWeights::InverseDistance {
                power: 2.0,
                max_distance: Some(1.0),
            },
        )
        .unwrap();
        // Rook neighbours always differ
        assert!((result.i + 1.0).abs() < 1e-12, "got {}", result.i);
        assert!(result.z_score < -1.96);
    }

    #[test]
    fn test_no_neighbours_rejected() {
        let ds = grid(|row, _| row as f64);
        assert!(matches!(
            morans_i(&ds, SpatialWeights::DistanceBand(0.5)),
            Err(Error::InputData(_))
        ));
        assert!(morans_i(&ds, SpatialWeights::DistanceBand(-1.0)).is_err());
    }

    #[test]
    fn test_normal_cdf() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-6);
        assert!((normal_cdf(1.96) - 0.975).abs() < 0.002);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 0.002);
    }
}
