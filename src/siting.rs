//! Functionality for running a site-selection model from start to finish.
use crate::criticality::CriticalityIndex;
use crate::formulation::{build_problem, candidate_sites};
use crate::model::Model;
use crate::output::metadata::write_metadata;
use crate::output::{DataWriter, write_diagnostics};
use crate::problem::{Problem, Solution};
use crate::result::{SitingResult, assemble};
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

/// Everything produced by a siting run
#[derive(Debug)]
pub struct SitingRun {
    /// Criticality scores of the candidate sites
    pub index: CriticalityIndex,
    /// The problem passed to the solver
    pub problem: Problem,
    /// The solver's output
    pub solution: Solution,
    /// The assembled result
    pub result: SitingResult,
}

/// Calculate the criticality index and build the problem for a model, without solving it.
///
/// This is where data gaps, degenerate normalisation and obviously infeasible targets are
/// detected.
pub fn prepare(model: &Model) -> Result<(CriticalityIndex, Problem)> {
    let params = &model.parameters;
    let candidates = candidate_sites(&model.sites, params);
    info!(
        "{} candidate sites for formulation {}",
        candidates.len(),
        params.formulation
    );

    let index = CriticalityIndex::build(
        &model.time_series,
        candidates.iter().map(|site| &site.id),
        &params.criticality,
    )
    .context("Failed to calculate criticality index")?;
    let problem = build_problem(&model.sites, params, &index)?;

    Ok((index, problem))
}

/// Select sites for a model.
pub fn select_sites(model: &Model) -> Result<SitingRun> {
    let (index, problem) = prepare(model)?;

    let solver = model.parameters.solution_method.solver();
    info!("Solving with method {}", solver.name());
    let solution = solver.solve(&problem)?;

    let result = assemble(
        &solution,
        &model.regions,
        &model.sites,
        &model.time_series,
    )?;

    Ok(SitingRun {
        index,
        problem,
        solution,
        result,
    })
}

/// Run the model and write the results.
///
/// # Arguments:
///
/// * `model` - The model to run
/// * `output_path` - The folder to which output files will be written
/// * `debug_model` - Whether to write additional information (e.g. criticality scores and the
///   problem passed to the solver) to file
pub fn run(model: &Model, output_path: &Path, debug_model: bool) -> Result<()> {
    let run = select_sites(model)?;

    let mut writer = DataWriter::create(output_path, debug_model)?;
    writer.write_result(&run.result)?;
    writer.write_debug_info(&run.index, &run.problem)?;
    writer.flush()?;
    write_diagnostics(output_path, &run.solution)?;
    write_metadata(
        output_path,
        &model.model_path,
        &run.solution.diagnostics.method,
    )
    .context("Failed to save metadata")?;

    Ok(())
}
