//! Per-target kriging output

use serde::{Deserialize, Serialize};

/// Prediction and kriging variance at one target location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KrigingResult {
    /// Best linear unbiased prediction
    pub value: f64,
    /// Prediction variance, never negative
    pub variance: f64,
}

impl KrigingResult {
    /// Prediction standard error √σ².
    #[inline]
    pub fn std_error(&self) -> f64 {
        self.variance.sqrt()
    }
}
