//! The model represents the static input data provided by the user.
use crate::region::RegionMap;
use crate::site::SiteMap;
use crate::time_series::TimeSeriesStore;
use std::path::PathBuf;

mod parameters;
pub use parameters::{
    CriticalityParameters, DeploymentEntry, DeploymentUnit, ModelParameters, TimeSliceParameters,
};

/// Model definition
#[derive(Debug)]
pub struct Model {
    /// Path to model folder
    pub model_path: PathBuf,
    /// Parameters from the model TOML file
    pub parameters: ModelParameters,
    /// Candidate sites
    pub sites: SiteMap,
    /// Configured regions and the sites they contain
    pub regions: RegionMap,
    /// Capacity-factor and reference load series for the configured time slice
    pub time_series: TimeSeriesStore,
}
