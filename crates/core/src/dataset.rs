//! Point observations
//!
//! [`SpatialDataset`] is an immutable, validated collection of observations:
//! planar coordinates, observed values and an optional covariate matrix with
//! named columns. Observation order is stable and defines the indices used by
//! every pairwise-distance matrix downstream.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::trend::TrendSpec;

/// Minimum number of observations for any variogram or kriging computation.
pub const MIN_OBSERVATIONS: usize = 3;

/// A 2D point in a planar reference frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point
    #[inline]
    pub fn distance_sq(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance to another point
    #[inline]
    pub fn distance(&self, other: &Coordinate) -> f64 {
        self.distance_sq(other).sqrt()
    }

    #[inline]
    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A single observation: location, value and covariate values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub location: Coordinate,
    pub value: f64,
    /// Covariate values, in the order of the dataset's covariate names.
    #[serde(default)]
    pub covariates: Vec<f64>,
}

impl Observation {
    pub fn new(x: f64, y: f64, value: f64) -> Self {
        Self {
            location: Coordinate::new(x, y),
            value,
            covariates: Vec::new(),
        }
    }

    pub fn with_covariates(mut self, covariates: Vec<f64>) -> Self {
        self.covariates = covariates;
        self
    }
}

/// Immutable collection of point observations.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialDataset {
    coordinates: Vec<Coordinate>,
    values: Vec<f64>,
    covariates: Option<Array2<f64>>,
    covariate_names: Vec<String>,
}

impl SpatialDataset {
    /// Build a dataset without covariates.
    ///
    /// # Errors
    /// [`Error::InputData`] for fewer than [`MIN_OBSERVATIONS`] points,
    /// mismatched lengths, or non-finite coordinates/values.
    pub fn new(coordinates: Vec<Coordinate>, values: Vec<f64>) -> Result<Self> {
        if coordinates.len() != values.len() {
            return Err(Error::InputData(format!(
                "{} coordinates but {} values",
                coordinates.len(),
                values.len()
            )));
        }
        if coordinates.len() < MIN_OBSERVATIONS {
            return Err(Error::InputData(format!(
                "need at least {MIN_OBSERVATIONS} observations, got {}",
                coordinates.len()
            )));
        }
        if let Some(i) = coordinates.iter().position(|c| !c.is_finite()) {
            return Err(Error::InputData(format!("non-finite coordinate at observation {i}")));
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::InputData(format!("non-finite value at observation {i}")));
        }
        Ok(Self {
            coordinates,
            values,
            covariates: None,
            covariate_names: Vec::new(),
        })
    }

    /// Attach a named `N × k` covariate matrix.
    pub fn with_covariates(mut self, names: Vec<String>, covariates: Array2<f64>) -> Result<Self> {
        let (rows, cols) = covariates.dim();
        if rows != self.len() {
            return Err(Error::InputData(format!(
                "covariate matrix has {rows} rows for {} observations",
                self.len()
            )));
        }
        if cols != names.len() {
            return Err(Error::InputData(format!(
                "{} covariate names for {cols} covariate columns",
                names.len()
            )));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(Error::InputData(format!("duplicate covariate name '{name}'")));
            }
        }
        if let Some(((row, col), _)) = covariates.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::InputData(format!(
                "non-finite covariate '{}' at observation {row}",
                names[col]
            )));
        }
        self.covariates = if cols == 0 { None } else { Some(covariates) };
        self.covariate_names = names;
        Ok(self)
    }

    /// Build a dataset from observation records.
    pub fn from_observations(names: Vec<String>, observations: Vec<Observation>) -> Result<Self> {
        let k = names.len();
        let n = observations.len();
        let mut coordinates = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        let mut cov = Array2::zeros((n, k));
        for (i, obs) in observations.into_iter().enumerate() {
            if obs.covariates.len() != k {
                return Err(Error::InputData(format!(
                    "observation {i} has {} covariates, expected {k}",
                    obs.covariates.len()
                )));
            }
            for (j, v) in obs.covariates.into_iter().enumerate() {
                cov[(i, j)] = v;
            }
            coordinates.push(obs.location);
            values.push(obs.value);
        }
        Self::new(coordinates, values)?.with_covariates(names, cov)
    }

    /// Same locations and covariates with different values, e.g. trend
    /// residuals.
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self> {
        let base = Self::new(self.coordinates.clone(), values)?;
        Ok(Self {
            covariates: self.covariates.clone(),
            covariate_names: self.covariate_names.clone(),
            ..base
        })
    }

    /// Drop observation `index` (used by leave-one-out validation).
    ///
    /// The result may hold fewer than [`MIN_OBSERVATIONS`] points, so a
    /// three-point dataset still yields two-point folds.
    pub fn without(&self, index: usize) -> Result<Self> {
        if index >= self.len() {
            return Err(Error::invalid_parameter("index", index, "out of bounds"));
        }
        let rows: Vec<usize> = (0..self.len()).filter(|&i| i != index).collect();
        Ok(Self {
            coordinates: rows.iter().map(|&i| self.coordinates[i]).collect(),
            values: rows.iter().map(|&i| self.values[i]).collect(),
            covariates: self.covariates.as_ref().map(|cov| cov.select(ndarray::Axis(0), &rows)),
            covariate_names: self.covariate_names.clone(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn covariates(&self) -> Option<&Array2<f64>> {
        self.covariates.as_ref()
    }

    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    pub fn covariate_index(&self, name: &str) -> Option<usize> {
        self.covariate_names.iter().position(|n| n == name)
    }

    /// Observation `i` as a record.
    pub fn observation(&self, i: usize) -> Option<Observation> {
        let location = *self.coordinates.get(i)?;
        let covariates = self
            .covariates
            .as_ref()
            .map(|c| c.row(i).to_vec())
            .unwrap_or_default();
        Some(Observation {
            location,
            value: self.values[i],
            covariates,
        })
    }

    /// Maximum pairwise separation.
    pub fn max_distance(&self) -> f64 {
        let n = self.len();
        let mut max_d2 = 0.0_f64;
        for i in 0..n {
            for j in (i + 1)..n {
                max_d2 = max_d2.max(self.coordinates[i].distance_sq(&self.coordinates[j]));
            }
        }
        max_d2.sqrt()
    }

    /// Index pairs `(i, j)`, `i < j`, of observations closer than `tolerance`.
    pub fn coincident_pairs(&self, tolerance: f64) -> Vec<(usize, usize)> {
        let n = self.len();
        let tol_sq = tolerance * tolerance;
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if self.coordinates[i].distance_sq(&self.coordinates[j]) <= tol_sq {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    /// Sample variance of the values (denominator N - 1).
    pub fn value_variance(&self) -> f64 {
        let n = self.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        self.values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0)
    }

    /// Covariate values at observation `i` selected for `trend`, in the
    /// order the trend lists them.
    pub fn trend_covariates(&self, trend: &TrendSpec, i: usize) -> Result<Vec<f64>> {
        match trend {
            TrendSpec::Covariates(names) => {
                let cov = self.covariates.as_ref();
                names
                    .iter()
                    .map(|name| {
                        let col = self.covariate_index(name).ok_or_else(|| {
                            Error::invalid_parameter("trend", name, "unknown covariate")
                        })?;
                        // covariate_index only succeeds when the matrix exists
                        Ok(cov.map(|c| c[(i, col)]).unwrap_or(f64::NAN))
                    })
                    .collect()
            }
            TrendSpec::Constant | TrendSpec::Coordinates(_) => Ok(Vec::new()),
        }
    }

    /// `N × p` trend design matrix; the first column is the intercept.
    pub fn design_matrix(&self, trend: &TrendSpec) -> Result<Array2<f64>> {
        let n = self.len();
        let p = trend.len();
        let mut x = Array2::zeros((n, p));
        for i in 0..n {
            let cov = self.trend_covariates(trend, i)?;
            let row = trend.basis(self.coordinates[i], &cov)?;
            for (j, v) in row.into_iter().enumerate() {
                x[(i, j)] = v;
            }
        }
        Ok(x)
    }
}
