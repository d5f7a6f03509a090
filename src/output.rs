//! The module responsible for writing output data to disk.
use crate::criticality::CriticalityIndex;
use crate::problem::{Problem, Solution, WindowRequirement};
use crate::region::RegionID;
use crate::result::SitingResult;
use crate::site::{SiteID, TechnologyID};
use anyhow::{Context, Result, ensure};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "resite_results";

/// The output file name for selected sites
const SELECTED_SITES_FILE_NAME: &str = "selected_sites.csv";

/// The output file name for the number of selected sites per region
const REGION_COUNTS_FILE_NAME: &str = "region_counts.csv";

/// The output file name for the aggregate generation profile
const AGGREGATE_PROFILE_FILE_NAME: &str = "aggregate_profile.csv";

/// The output file name for solver diagnostics
const DIAGNOSTICS_FILE_NAME: &str = "diagnostics.toml";

/// The output file name for criticality scores
const CRITICALITY_FILE_NAME: &str = "debug_criticality.csv";

/// The output file name for the candidates of the site-selection problem
const PROBLEM_CANDIDATES_FILE_NAME: &str = "debug_candidates.csv";

/// The output file name for the window requirements of the site-selection problem
const PROBLEM_WINDOWS_FILE_NAME: &str = "debug_windows.csv";

/// Format used for timestamps in output files
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Get the model name from the specified directory path
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Get the model name from the dir path. This ends up being convoluted because we need to check
    // for all possible errors. Ugh.
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    // Construct path
    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory for the model specified at `model_dir`.
///
/// # Arguments
///
/// * `output_dir` - The folder to create
/// * `allow_overwrite` - Whether to delete the contents of an existing, non-empty folder
///
/// # Returns
///
/// Whether an existing folder is being overwritten.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    // If the folder already exists, then delete it
    let overwrite = if let Ok(mut it) = fs::read_dir(output_dir) {
        if it.next().is_none() {
            // Folder exists and is empty: nothing to do
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Rerun with --overwrite to replace it."
        );
        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Represents a row in the selected sites CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct SelectedSiteRow {
    site_id: SiteID,
    region_id: RegionID,
    technology: TechnologyID,
    lon: f64,
    lat: f64,
    capacity: f64,
}

/// Represents a row in the region counts CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct RegionCountRow {
    region_id: RegionID,
    selected_sites: usize,
}

/// Represents a row in the aggregate profile CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ProfileRow {
    timestamp: String,
    generation: f64,
}

/// Represents a row in the criticality debug CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct CriticalityRow {
    site_id: SiteID,
    window: usize,
    window_start: String,
    alpha: f64,
    score: f64,
}

/// Represents a row in the problem candidates debug CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ProblemCandidateRow {
    site_id: SiteID,
    group: String,
    group_target: u32,
    weight: u32,
    fixed: bool,
    cost: f64,
}

/// Represents a row in the problem windows debug CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ProblemWindowRow {
    window: usize,
    requirement: f64,
    enforced: bool,
}

/// The contents of the diagnostics file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DiagnosticsOutput {
    objective: f64,
    method: String,
    optimality_certified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    gap_bound: Option<f64>,
    wall_time_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_index: Option<usize>,
}

impl DiagnosticsOutput {
    fn new(solution: &Solution) -> Self {
        let diagnostics = &solution.diagnostics;
        Self {
            objective: solution.objective,
            method: diagnostics.method.clone(),
            optimality_certified: diagnostics.optimality_certified,
            gap_bound: diagnostics.gap_bound,
            wall_time_secs: diagnostics.wall_time.as_secs_f64(),
            run_index: diagnostics.run_index,
        }
    }
}

/// Write solver diagnostics to a TOML file in the output folder
pub fn write_diagnostics(output_path: &Path, solution: &Solution) -> Result<()> {
    let file_path = output_path.join(DIAGNOSTICS_FILE_NAME);
    let diagnostics = DiagnosticsOutput::new(solution);
    fs::write(&file_path, toml::to_string(&diagnostics)?)
        .with_context(|| format!("Could not write {}", file_path.display()))?;

    Ok(())
}

/// For writing extra debug information about the model
struct DebugDataWriter {
    criticality_writer: csv::Writer<File>,
    candidates_writer: csv::Writer<File>,
    windows_writer: csv::Writer<File>,
}

impl DebugDataWriter {
    /// Open CSV files to write debug info to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    fn create(output_path: &Path) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(file_path)
        };

        Ok(Self {
            criticality_writer: new_writer(CRITICALITY_FILE_NAME)?,
            candidates_writer: new_writer(PROBLEM_CANDIDATES_FILE_NAME)?,
            windows_writer: new_writer(PROBLEM_WINDOWS_FILE_NAME)?,
        })
    }

    /// Write the criticality score of every site in every window
    fn write_criticality(&mut self, index: &CriticalityIndex) -> Result<()> {
        let windows = index.window_starts().iter().zip(index.alpha());
        for (site_id, scores) in index.iter_scores() {
            for (window, ((start, alpha), score)) in windows.clone().zip(scores).enumerate() {
                let row = CriticalityRow {
                    site_id: site_id.clone(),
                    window,
                    window_start: format_timestamp(start),
                    alpha: *alpha,
                    score: *score,
                };
                self.criticality_writer.serialize(row)?;
            }
        }

        Ok(())
    }

    /// Write the candidates and window requirements of the problem passed to the solver
    fn write_problem(&mut self, problem: &Problem) -> Result<()> {
        for candidate in &problem.candidates {
            let group = &problem.groups[candidate.group];
            let row = ProblemCandidateRow {
                site_id: candidate.site_id.clone(),
                group: group.label(),
                group_target: group.target,
                weight: candidate.weight,
                fixed: candidate.fixed,
                cost: candidate.cost,
            };
            self.candidates_writer.serialize(row)?;
        }

        if problem.window_requirement != WindowRequirement::Ignored {
            let enforced = problem.window_requirement == WindowRequirement::Enforced;
            for (window, requirement) in problem.requirements.iter().enumerate() {
                let row = ProblemWindowRow {
                    window,
                    requirement: *requirement,
                    enforced,
                };
                self.windows_writer.serialize(row)?;
            }
        }

        Ok(())
    }

    /// Flush the underlying streams
    fn flush(&mut self) -> Result<()> {
        self.criticality_writer.flush()?;
        self.candidates_writer.flush()?;
        self.windows_writer.flush()?;

        Ok(())
    }
}

/// An object for writing siting results to file
pub struct DataWriter {
    selected_sites_writer: csv::Writer<File>,
    region_counts_writer: csv::Writer<File>,
    profile_writer: csv::Writer<File>,
    debug_writer: Option<DebugDataWriter>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `save_debug_info` - Whether to include extra CSV files for debugging model
    pub fn create(output_path: &Path, save_debug_info: bool) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(file_path)
        };

        let debug_writer = if save_debug_info {
            // Create debug CSV files
            Some(DebugDataWriter::create(output_path)?)
        } else {
            None
        };

        Ok(Self {
            selected_sites_writer: new_writer(SELECTED_SITES_FILE_NAME)?,
            region_counts_writer: new_writer(REGION_COUNTS_FILE_NAME)?,
            profile_writer: new_writer(AGGREGATE_PROFILE_FILE_NAME)?,
            debug_writer,
        })
    }

    /// Write the selected sites, region counts and aggregate profile to CSV files
    pub fn write_result(&mut self, result: &SitingResult) -> Result<()> {
        for site in &result.selected_sites {
            let row = SelectedSiteRow {
                site_id: site.site_id.clone(),
                region_id: site.region_id.clone(),
                technology: site.technology.clone(),
                lon: site.lon,
                lat: site.lat,
                capacity: site.capacity.value(),
            };
            self.selected_sites_writer.serialize(row)?;
        }

        for (region_id, count) in &result.per_region_counts {
            let row = RegionCountRow {
                region_id: region_id.clone(),
                selected_sites: *count,
            };
            self.region_counts_writer.serialize(row)?;
        }

        for (timestamp, generation) in &result.aggregate_profile {
            let row = ProfileRow {
                timestamp: format_timestamp(timestamp),
                generation: generation.value(),
            };
            self.profile_writer.serialize(row)?;
        }

        Ok(())
    }

    /// Write debug information to CSV files
    pub fn write_debug_info(&mut self, index: &CriticalityIndex, problem: &Problem) -> Result<()> {
        if let Some(wtr) = &mut self.debug_writer {
            wtr.write_criticality(index)?;
            wtr.write_problem(problem)?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.selected_sites_writer.flush()?;
        self.region_counts_writer.flush()?;
        self.profile_writer.flush()?;
        if let Some(wtr) = &mut self.debug_writer {
            wtr.flush()?;
        }

        Ok(())
    }
}
