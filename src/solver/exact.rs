//! Exact site selection by branch and bound, using the HiGHS MILP solver.
//!
//! Each candidate has a binary selection column. Formulations which count covered windows add a
//! binary column per window, whose objective coefficient is `-1 / n_windows`; the constant offset
//! which turns this into a fraction of uncovered windows is not part of the MILP.
use super::Solver;
use crate::error::ResiteError;
use crate::problem::{Problem, Solution, SolverDiagnostics, WindowRequirement};
use anyhow::{Context, Result, anyhow, bail};
use highs::{HighsModelStatus, RowProblem, Sense};
use log::{Level, debug, info, log_enabled, warn};
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::time::Instant;

mod constraints;
use constraints::add_constraints;

/// The name of this solution method
const METHOD_NAME: &str = "BB";

/// A decision variable in the optimisation
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
pub type Variable = highs::Col;

/// The columns of the MILP
pub struct VariableMap {
    /// One per candidate, in candidate order
    pub selection: Vec<Variable>,
    /// One per window, if windows are counted in the objective
    pub window: Vec<Variable>,
}

/// The MILP backend to use
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Default)]
pub enum MilpBackend {
    /// The HiGHS solver
    #[default]
    #[string = "highs"]
    Highs,
}

fn default_mip_gap() -> f64 {
    0.01
}

fn default_time_limit() -> f64 {
    3600.0
}

fn default_threads() -> u32 {
    1
}

/// Options for the exact solver
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExactOptions {
    /// The MILP backend
    #[serde(default)]
    pub solver: MilpBackend,
    /// Relative optimality gap at which branch and bound stops
    #[serde(default = "default_mip_gap")]
    pub mip_gap: f64,
    /// Time limit in seconds
    #[serde(default = "default_time_limit")]
    pub time_limit: f64,
    /// Number of threads the backend may use
    #[serde(default = "default_threads")]
    pub threads: u32,
}

/// Solves problems exactly with branch and bound
pub struct ExactSolver {
    options: ExactOptions,
}

impl ExactSolver {
    /// Create a new [`ExactSolver`]
    pub fn new(options: ExactOptions) -> Self {
        Self { options }
    }

    /// Apply the solver options to the model
    fn configure(&self, model: &mut highs::Model) {
        // Only forward solver output when debugging
        let verbose = log_enabled!(Level::Debug);
        model.set_option("output_flag", verbose);
        model.set_option("log_to_console", verbose);

        model.set_option("mip_rel_gap", self.options.mip_gap);
        model.set_option("time_limit", self.options.time_limit);
        model.set_option(
            "threads",
            i32::try_from(self.options.threads).unwrap_or(i32::MAX),
        );
    }

    fn diagnostics(&self, certified: bool, start: Instant) -> SolverDiagnostics {
        SolverDiagnostics {
            method: METHOD_NAME.into(),
            optimality_certified: certified,
            gap_bound: certified.then_some(self.options.mip_gap),
            wall_time: start.elapsed(),
            run_index: None,
        }
    }
}

impl Solver for ExactSolver {
    fn name(&self) -> &'static str {
        METHOD_NAME
    }

    fn solve(&self, problem: &Problem) -> Result<Solution> {
        let start = Instant::now();

        // Set up problem
        let mut milp = RowProblem::default();
        let variables = add_variables(&mut milp, problem);
        add_constraints(&mut milp, &variables, problem);

        // Solve model
        let mut model = milp.optimise(Sense::Minimise);
        self.configure(&mut model);
        let solved = model
            .try_solve()
            .map_err(|status| anyhow!("Could not solve: {status:?}"))?;
        let status = solved.status();
        debug!("HiGHS finished with status {status:?}");

        let solution = solved.get_solution();
        let selected = round_selection(&solution.columns()[..problem.candidates.len()]);
        let certified = certify(
            status,
            problem.check_selection(&selected),
            self.options.time_limit,
        )?;

        let solution = problem.to_solution(&selected, self.diagnostics(certified, start));
        info!(
            "Exact solver finished in {:.2}s with objective {}",
            solution.diagnostics.wall_time.as_secs_f64(),
            solution.objective
        );

        Ok(solution)
    }
}

/// Decide whether the solver's selection can be used and whether it is proven optimal.
///
/// # Arguments
///
/// * `status` - The status HiGHS finished with
/// * `feasible` - The result of checking the rounded selection against the problem
/// * `time_limit` - The configured time limit, for error messages
///
/// # Returns
///
/// Whether the selection is certified optimal, or an error if there is no usable selection.
fn certify(status: HighsModelStatus, feasible: Result<()>, time_limit: f64) -> Result<bool> {
    match status {
        HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => {
            Err(ResiteError::InfeasibleTarget {
                target: "deployment".into(),
                reason: "no selection of sites meets every target".into(),
            }
            .into())
        }
        HighsModelStatus::Optimal | HighsModelStatus::ModelEmpty => {
            feasible.context("Solver returned an invalid selection")?;
            Ok(true)
        }
        HighsModelStatus::ReachedTimeLimit => {
            if feasible.is_err() {
                Err(ResiteError::SolverTimeout { time_limit })?;
            }
            warn!("Solver reached its time limit; the selection is not proven optimal");
            Ok(false)
        }
        status => {
            if feasible.is_err() {
                bail!("Could not solve: {status:?}");
            }
            warn!("Solver stopped with status {status:?}; the selection is not proven optimal");
            Ok(false)
        }
    }
}

/// Add columns for the candidates and, if needed, the windows
fn add_variables(milp: &mut RowProblem, problem: &Problem) -> VariableMap {
    let selection = problem
        .candidates
        .iter()
        .map(|candidate| {
            let lower = if candidate.fixed { 1.0 } else { 0.0 };
            milp.add_integer_column(candidate.cost, lower..=1.0)
        })
        .collect();

    let window = match problem.window_requirement {
        WindowRequirement::Counted => {
            let coeff = -1.0 / problem.n_windows() as f64;
            (0..problem.n_windows())
                .map(|_| milp.add_integer_column(coeff, 0.0..=1.0))
                .collect()
        }
        WindowRequirement::Ignored | WindowRequirement::Enforced => Vec::new(),
    };

    VariableMap { selection, window }
}

/// Convert relaxed column values into binary decisions
fn round_selection(values: &[f64]) -> Vec<bool> {
    values.iter().map(|value| *value > 0.5).collect()
}
