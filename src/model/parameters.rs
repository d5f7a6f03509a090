//! Defines the `ModelParameters` struct, which represents the contents of `model.toml`.
use crate::criticality::{AlphaPolicy, NormType, SmoothMeasure, Windowing};
use crate::formulation::Formulation;
use crate::input::{deserialise_timestamp, input_err_msg, read_toml};
use crate::region::RegionID;
use crate::site::TechnologyID;
use crate::solver::SolutionMethod;
use crate::solver::exact::ExactOptions;
use crate::solver::heuristic::HeuristicOptions;
use crate::units::Capacity;
use anyhow::{Context, Result, ensure};
use chrono::NaiveDateTime;
use indexmap::IndexSet;
use itertools::Itertools;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::collections::HashSet;
use std::path::Path;

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

macro_rules! define_unit_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            <$type>::new($value)
        }
    };
}

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_unit_param_default!(default_capacity_quantum, Capacity, 1.0);
define_param_default!(default_resolution, u32, 1);
define_param_default!(default_delta, usize, 1);

/// Represents the contents of the entire model file.
#[derive(Debug, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// Size of a grid cell in degrees
    pub spatial_resolution: f64,
    /// Regions in which sites may be selected
    pub regions: Vec<RegionID>,
    /// Technologies which may be deployed
    pub technologies: Vec<TechnologyID>,
    /// Whether sites with existing capacity must be kept
    #[serde(default)]
    pub use_existing_capacity: bool,
    /// The unit in which deployment targets are expressed
    #[serde(default)]
    pub deployment_unit: DeploymentUnit,
    /// The capacity corresponding to one deployment unit, if targets are expressed in capacity
    #[serde(default = "default_capacity_quantum")]
    pub capacity_quantum: Capacity,
    /// The time window and resolution for the time series
    pub timeslice: TimeSliceParameters,
    /// Deployment targets for each region and technology
    pub deployment: Vec<DeploymentEntry>,
    /// The objective and constraints used to select sites
    pub formulation: Formulation,
    /// How criticality is calculated
    #[serde(default)]
    pub criticality: CriticalityParameters,
    /// Which solver is used and its settings
    pub solution_method: SolutionMethod,
}

/// The unit in which deployment targets are expressed
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Default)]
pub enum DeploymentUnit {
    /// Targets are numbers of sites
    #[default]
    #[string = "sites"]
    Sites,
    /// Targets are capacities, counted in multiples of `capacity_quantum`
    #[string = "capacity"]
    Capacity,
}

/// The time window considered and the resolution of the time series
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct TimeSliceParameters {
    /// The first timestamp (inclusive)
    #[serde(deserialize_with = "deserialise_timestamp")]
    pub start: NaiveDateTime,
    /// The last timestamp (inclusive)
    #[serde(deserialize_with = "deserialise_timestamp")]
    pub end: NaiveDateTime,
    /// Resolution in hours
    #[serde(default = "default_resolution")]
    pub resolution: u32,
}

/// The deployment target for one region and technology
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct DeploymentEntry {
    /// The region
    pub region: RegionID,
    /// The technology
    pub technology: TechnologyID,
    /// The target, in the model's deployment unit
    pub target: f64,
}

/// Parameters for calculating the criticality index
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CriticalityParameters {
    /// Window length in timestamps
    #[serde(default = "default_delta")]
    pub delta: usize,
    /// How values in a window are combined
    #[serde(default = "default_smooth_measure")]
    pub smooth_measure: SmoothMeasure,
    /// How smoothed values are normalised
    #[serde(default = "default_norm_type")]
    pub norm_type: NormType,
    /// How the reference is calculated for each window
    #[serde(default = "default_alpha")]
    pub alpha: AlphaPolicy,
    /// How windows are laid over the time axis
    #[serde(default)]
    pub windowing: Windowing,
}

define_param_default!(default_smooth_measure, SmoothMeasure, SmoothMeasure::Mean);
define_param_default!(default_norm_type, NormType, NormType::Max);
define_param_default!(default_alpha, AlphaPolicy, AlphaPolicy::LoadCentral);

impl Default for CriticalityParameters {
    fn default() -> Self {
        Self {
            delta: default_delta(),
            smooth_measure: default_smooth_measure(),
            norm_type: default_norm_type(),
            alpha: default_alpha(),
            windowing: Windowing::default(),
        }
    }
}

/// Check that a list of IDs is non-empty and has no duplicates
fn check_id_list<T: std::hash::Hash + Eq>(ids: &[T], name: &str) -> Result<()> {
    ensure!(!ids.is_empty(), "`{name}` is empty");
    ensure!(ids.iter().all_unique(), "`{name}` contains duplicate values");

    Ok(())
}

/// Check that the `spatial_resolution` parameter is valid
fn check_spatial_resolution(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value > 0.0,
        "spatial_resolution must be a finite number greater than zero"
    );

    Ok(())
}

/// Check that the `capacity_quantum` parameter is valid
fn check_capacity_quantum(value: Capacity) -> Result<()> {
    ensure!(
        value.is_finite() && value > Capacity(0.0),
        "capacity_quantum must be a finite number greater than zero"
    );

    Ok(())
}

/// Check that the `[timeslice]` section is valid
fn check_time_slice(slice: &TimeSliceParameters) -> Result<()> {
    ensure!(
        slice.start < slice.end,
        "timeslice start ({}) must be before end ({})",
        slice.start,
        slice.end
    );
    ensure!(slice.resolution > 0, "timeslice resolution cannot be zero");

    Ok(())
}

/// Check that the deployment vector refers to configured regions and technologies
fn check_deployment(
    deployment: &[DeploymentEntry],
    regions: &[RegionID],
    technologies: &[TechnologyID],
    unit: DeploymentUnit,
) -> Result<()> {
    ensure!(!deployment.is_empty(), "`deployment` is empty");

    let mut seen = HashSet::new();
    for entry in deployment {
        let DeploymentEntry {
            region,
            technology,
            target,
        } = entry;
        ensure!(
            regions.contains(region),
            "Deployment refers to unknown region {region}"
        );
        ensure!(
            technologies.contains(technology),
            "Deployment refers to unknown technology {technology}"
        );
        ensure!(
            seen.insert((region, technology)),
            "Duplicate deployment entry for region {region} and technology {technology}"
        );
        ensure!(
            target.is_finite() && *target >= 0.0,
            "Deployment target for {region}/{technology} must be a finite non-negative number"
        );
        if unit == DeploymentUnit::Sites {
            ensure!(
                target.fract() == 0.0,
                "Deployment target for {region}/{technology} must be a whole number of sites"
            );
        }
    }

    Ok(())
}

/// Check that a value is between 0 and 1 inclusive
fn check_proportion(value: f64, name: &str) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&value),
        "{name} must be between 0 and 1"
    );

    Ok(())
}

/// Check that the parameters of the `[formulation]` section are valid
fn check_formulation(formulation: &Formulation) -> Result<()> {
    match *formulation {
        Formulation::AggregateTarget => {}
        Formulation::HourlyTarget { coverage } => check_proportion(coverage, "coverage")?,
        Formulation::DemandCoverage { threshold } => check_proportion(threshold, "threshold")?,
        Formulation::Complementarity { c } => ensure!(
            c.is_finite() && c > 0.0,
            "c must be a finite number greater than zero"
        ),
    }

    Ok(())
}

/// Check that the `[criticality]` section is valid
fn check_criticality(params: &CriticalityParameters) -> Result<()> {
    ensure!(params.delta > 0, "criticality delta cannot be zero");

    Ok(())
}

/// Check the options for the branch-and-bound solver
fn check_exact_options(options: &ExactOptions) -> Result<()> {
    ensure!(
        options.mip_gap.is_finite() && options.mip_gap >= 0.0,
        "mip_gap must be a finite non-negative number"
    );
    ensure!(
        options.time_limit.is_finite() && options.time_limit > 0.0,
        "time_limit must be a finite number greater than zero"
    );
    ensure!(options.threads > 0, "threads cannot be zero");

    Ok(())
}

/// Check the options for the heuristic solver
fn check_heuristic_options(options: &HeuristicOptions) -> Result<()> {
    ensure!(
        options.neighborhood.is_finite() && options.neighborhood >= 0.0,
        "neighborhood must be a finite non-negative number"
    );
    ensure!(options.no_iterations > 0, "no_iterations cannot be zero");
    ensure!(options.no_epochs > 0, "no_epochs cannot be zero");
    ensure!(options.no_runs > 0, "no_runs cannot be zero");
    ensure!(
        options.initial_temp.is_finite() && options.initial_temp >= 0.0,
        "initial_temp must be a finite non-negative number"
    );
    ensure!(
        options.cooling_rate > 0.0 && options.cooling_rate <= 1.0,
        "cooling_rate must be greater than zero and at most one"
    );
    if let Some(time_limit) = options.time_limit {
        ensure!(
            time_limit.is_finite() && time_limit > 0.0,
            "time_limit must be a finite number greater than zero"
        );
    }
    ensure!(options.threads != Some(0), "threads cannot be zero");

    Ok(())
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// The configured regions, in order
    pub fn region_ids(&self) -> IndexSet<RegionID> {
        self.regions.iter().cloned().collect()
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        check_spatial_resolution(self.spatial_resolution)?;
        check_id_list(&self.regions, "regions")?;
        check_id_list(&self.technologies, "technologies")?;
        check_capacity_quantum(self.capacity_quantum)?;
        check_time_slice(&self.timeslice)?;
        check_deployment(
            &self.deployment,
            &self.regions,
            &self.technologies,
            self.deployment_unit,
        )?;
        check_formulation(&self.formulation)?;
        check_criticality(&self.criticality)?;
        match &self.solution_method {
            SolutionMethod::Exact(options) => check_exact_options(options),
            SolutionMethod::Heuristic(options) => check_heuristic_options(options),
        }
    }
}
