//! # geostat Core
//!
//! Core types, traits and errors for the geostat variogram and kriging library.
//!
//! This crate provides:
//! - `SpatialDataset`: validated point observations with optional covariates
//! - `VariogramModel`: parametric isotropic variogram (nugget, partial sill, range)
//! - `TrendSpec` / `TrendCoefficients`: linear large-scale trend
//! - `KrigingResult`: prediction and variance at one target
//! - `Error` / `Result`: the error taxonomy shared by all algorithms
//! - Algorithm trait for consistent API

pub mod dataset;
pub mod error;
pub mod prediction;
pub mod trend;
pub mod variogram;

pub use dataset::{Coordinate, MIN_OBSERVATIONS, Observation, SpatialDataset};
pub use error::{Error, Result};
pub use prediction::KrigingResult;
pub use trend::{DriftOrder, INTERCEPT, TrendCoefficients, TrendSpec};
pub use variogram::{VariogramFamily, VariogramModel};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::dataset::{Coordinate, Observation, SpatialDataset};
    pub use crate::error::{Error, Result};
    pub use crate::prediction::KrigingResult;
    pub use crate::trend::{DriftOrder, TrendCoefficients, TrendSpec};
    pub use crate::variogram::{VariogramFamily, VariogramModel};
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in geostat.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
