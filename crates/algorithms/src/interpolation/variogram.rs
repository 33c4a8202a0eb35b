//! Empirical (experimental) variogram
//!
//! The semivariance γ(h) measures spatial dissimilarity as a function of
//! separation distance h:
//! ```text
//! γ(h) = (1/2N(h)) Σ [z(xᵢ) - z(xⱼ)]²   for all pairs with |xᵢ-xⱼ| in bin h
//! ```
//! Bins are half-open `[lower, upper)` intervals partitioning `[0, cutoff)`;
//! the last bin also takes pairs separated by exactly the cutoff.
//!
//! The computation only looks at coordinates and values, so the same code
//! serves raw observations and trend residuals.
//!
//! Reference:
//! Matheron, G. (1963). Principles of geostatistics. Economic Geology.
//! Cressie, N. (1993). Statistics for Spatial Data. Wiley.

use geostat_core::{Algorithm, Coordinate, Error, Result, SpatialDataset};
use serde::{Deserialize, Serialize};

/// Half-open interval of separation distances `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceBin {
    pub lower: f64,
    pub upper: f64,
}

impl DistanceBin {
    /// Bin center
    #[inline]
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }

    #[inline]
    pub fn contains(&self, h: f64) -> bool {
        h >= self.lower && h < self.upper
    }
}

/// One lag of the empirical variogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmpiricalVariogramPoint {
    /// Bin midpoint distance
    pub distance: f64,
    /// Mean of (zᵢ − zⱼ)²/2 over the pairs in the bin
    pub semivariance: f64,
    /// Number of point pairs in the bin
    pub pair_count: usize,
    /// Mean observed separation of those pairs
    pub mean_distance: f64,
    /// Distance interval covered
    pub bin: DistanceBin,
}

/// Empirical variogram: non-empty lag bins in increasing distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmpiricalVariogram {
    pub points: Vec<EmpiricalVariogramPoint>,
    /// Largest separation considered
    pub cutoff: f64,
    /// Width of every bin
    pub bin_width: f64,
}

impl EmpiricalVariogram {
    /// Total number of pairs over all bins
    pub fn total_pairs(&self) -> usize {
        self.points.iter().map(|p| p.pair_count).sum()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn distances(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.distance).collect()
    }

    pub fn semivariances(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.semivariance).collect()
    }
}

/// Parameters for empirical variogram computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariogramParams {
    /// Number of lag bins (default 15)
    pub n_lags: usize,
    /// Maximum separation. If None, half the maximum pairwise distance.
    pub cutoff: Option<f64>,
}

impl Default for VariogramParams {
    fn default() -> Self {
        Self {
            n_lags: 15,
            cutoff: None,
        }
    }
}

impl VariogramParams {
    pub fn new(n_lags: usize, cutoff: Option<f64>) -> Self {
        Self { n_lags, cutoff }
    }
}

/// Empirical variogram algorithm
#[derive(Debug, Clone, Default)]
pub struct Semivariogram;

impl Algorithm for Semivariogram {
    type Input = SpatialDataset;
    type Output = EmpiricalVariogram;
    type Params = VariogramParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Semivariogram"
    }

    fn description(&self) -> &'static str {
        "Bin pairwise squared differences by separation distance into an empirical semivariogram"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        empirical_variogram(&input, &params)
    }
}

/// Compute the empirical variogram of a dataset.
///
/// # Arguments
/// * `dataset` — Observations (only coordinates and values are used)
/// * `params` — Number of lags and cutoff distance
///
/// # Returns
/// [`EmpiricalVariogram`] holding only the bins that received pairs.
pub fn empirical_variogram(dataset: &SpatialDataset, params: &VariogramParams) -> Result<EmpiricalVariogram> {
    empirical_variogram_of(dataset.coordinates(), dataset.values(), params)
}

/// Compute the empirical variogram from raw coordinate/value slices.
pub fn empirical_variogram_of(
    coordinates: &[Coordinate],
    values: &[f64],
    params: &VariogramParams,
) -> Result<EmpiricalVariogram> {
    let n = coordinates.len();
    if n != values.len() {
        return Err(Error::InputData(format!(
            "{n} coordinates but {} values",
            values.len()
        )));
    }
    if n < 2 {
        return Err(Error::InputData("Need at least 2 points for variogram".into()));
    }
    if params.n_lags == 0 {
        return Err(Error::invalid_parameter("n_lags", 0, "must be at least 1"));
    }

    let cutoff = match params.cutoff {
        Some(c) => {
            if !(c.is_finite() && c > 0.0) {
                return Err(Error::invalid_parameter("cutoff", c, "must be finite and positive"));
            }
            c
        }
        None => {
            let mut max_d2 = 0.0_f64;
            for i in 0..n {
                for j in (i + 1)..n {
                    max_d2 = max_d2.max(coordinates[i].distance_sq(&coordinates[j]));
                }
            }
            if max_d2 <= 0.0 {
                return Err(Error::InputData("All observations share one location".into()));
            }
            max_d2.sqrt() / 2.0 // Convention: cutoff = half of max distance
        }
    };

    let n_lags = params.n_lags;
    let bin_width = cutoff / n_lags as f64;

    let mut sum_sq = vec![0.0_f64; n_lags];
    let mut sum_dist = vec![0.0_f64; n_lags];
    let mut counts = vec![0_usize; n_lags];

    for i in 0..n {
        for j in (i + 1)..n {
            let d = coordinates[i].distance(&coordinates[j]);
            if d > cutoff {
                continue;
            }
            // The final bin is closed on the right so d == cutoff is kept
            let bin = ((d / bin_width) as usize).min(n_lags - 1);
            let dz = values[i] - values[j];
            sum_sq[bin] += dz * dz;
            sum_dist[bin] += d;
            counts[bin] += 1;
        }
    }

    let points: Vec<EmpiricalVariogramPoint> = (0..n_lags)
        .filter(|&k| counts[k] > 0)
        .map(|k| {
            let bin = DistanceBin {
                lower: k as f64 * bin_width,
                upper: (k + 1) as f64 * bin_width,
            };
            let cnt = counts[k] as f64;
            EmpiricalVariogramPoint {
                distance: bin.midpoint(),
                semivariance: sum_sq[k] / (2.0 * cnt),
                pair_count: counts[k],
                mean_distance: sum_dist[k] / cnt,
                bin,
            }
        })
        .collect();

    let empty = n_lags - points.len();
    tracing::debug!(
        n,
        cutoff,
        bins = points.len(),
        empty_bins = empty,
        "computed empirical variogram"
    );
    if points.is_empty() {
        tracing::warn!(cutoff, "no point pairs within the variogram cutoff");
    }

    Ok(EmpiricalVariogram {
        points,
        cutoff,
        bin_width,
    })
}
