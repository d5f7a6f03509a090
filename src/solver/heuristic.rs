//! Site selection by simulated-annealing local search.
//!
//! Several independent runs are performed in parallel, each with its own seed, and one of their
//! results is chosen at the end.
use super::Solver;
use crate::problem::{Problem, Solution, SolverDiagnostics};
use anyhow::{Result, anyhow};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::time::Instant;

mod annealing;
use annealing::{AnnealingRun, Neighbours, RunOutcome};
mod evaluator;

/// The name of this solution method
const METHOD_NAME: &str = "HEU";

/// Where the other sites in a move are drawn from
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq)]
pub enum SearchAlgorithm {
    /// Simulated-annealing local search: sites within the neighbourhood radius
    #[string = "SALS"]
    SALS,
    /// Global local search: any site in the same deployment group
    #[string = "GLS"]
    GLS,
}

/// How the result is chosen from the successful runs
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq)]
pub enum SolutionChoice {
    /// The run with the best objective
    #[string = "max"]
    Best,
    /// A random run
    #[string = "rand"]
    Random,
}

fn default_cooling_rate() -> f64 {
    0.95
}

/// Options for the heuristic solver
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeuristicOptions {
    /// Radius (in coordinate units) within which [`SearchAlgorithm::SALS`] looks for moves
    pub neighborhood: f64,
    /// Moves proposed per epoch
    pub no_iterations: u32,
    /// Maximum number of epochs per run
    pub no_epochs: u32,
    /// Temperature for the first epoch
    pub initial_temp: f64,
    /// Number of independent runs
    pub no_runs: u32,
    /// Where the other sites in a move are drawn from
    pub algorithm: SearchAlgorithm,
    /// How the result is chosen from the runs
    pub which_sol: SolutionChoice,
    /// Seed for the first run; run `i` uses `seed + i`
    #[serde(default)]
    pub seed: u64,
    /// Factor applied to the temperature after each epoch
    #[serde(default = "default_cooling_rate")]
    pub cooling_rate: f64,
    /// Time limit per run in seconds, checked between epochs
    #[serde(default)]
    pub time_limit: Option<f64>,
    /// Number of worker threads (default: one per core)
    #[serde(default)]
    pub threads: Option<usize>,
}

/// Solves problems approximately with simulated annealing
pub struct HeuristicSolver {
    options: HeuristicOptions,
}

impl HeuristicSolver {
    /// Create a new [`HeuristicSolver`]
    pub fn new(options: HeuristicOptions) -> Self {
        Self { options }
    }

    /// Perform all runs, in parallel.
    ///
    /// # Returns
    ///
    /// The result of each run, in run order.
    fn run_all(&self, problem: &Problem) -> Result<Vec<Result<RunOutcome>>> {
        let neighbours =
            Neighbours::new(problem, self.options.algorithm, self.options.neighborhood);
        let run_all = || {
            (0..self.options.no_runs)
                .into_par_iter()
                .map(|i| -> Result<RunOutcome> {
                    let seed = self.options.seed.wrapping_add(i.into());
                    let outcome =
                        AnnealingRun::new(problem, &self.options, &neighbours, seed).run()?;
                    problem.check_selection(&outcome.selected)?;
                    Ok(outcome)
                })
                .collect()
        };

        Ok(match self.options.threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()?
                .install(run_all),
            None => run_all(),
        })
    }
}

impl Solver for HeuristicSolver {
    fn name(&self) -> &'static str {
        METHOD_NAME
    }

    fn solve(&self, problem: &Problem) -> Result<Solution> {
        let start = Instant::now();
        let outcomes = self.run_all(problem)?;
        let (run_index, outcome) =
            choose_run(outcomes, self.options.which_sol, self.options.seed)?;

        let diagnostics = SolverDiagnostics {
            method: METHOD_NAME.into(),
            optimality_certified: false,
            gap_bound: None,
            wall_time: start.elapsed(),
            run_index: Some(run_index),
        };
        let solution = problem.to_solution(&outcome.selected, diagnostics);
        info!(
            "Heuristic solver finished in {:.2}s with objective {} (run {run_index})",
            solution.diagnostics.wall_time.as_secs_f64(),
            solution.objective
        );

        Ok(solution)
    }
}

/// Choose one run's outcome.
///
/// Failed runs are logged and ignored. If every run failed, the error from the last run is
/// returned.
fn choose_run(
    outcomes: Vec<Result<RunOutcome>>,
    which_sol: SolutionChoice,
    seed: u64,
) -> Result<(usize, RunOutcome)> {
    let mut last_error = None;
    let mut successes = Vec::new();
    for (run_index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(outcome) => successes.push((run_index, outcome)),
            Err(err) => {
                warn!("Heuristic run {run_index} failed: {err:#}");
                last_error = Some(err);
            }
        }
    }

    if successes.is_empty() {
        return Err(last_error.unwrap_or_else(|| anyhow!("No heuristic runs were performed")));
    }

    let idx = match which_sol {
        SolutionChoice::Best => successes
            .iter()
            .enumerate()
            .min_by(|(_, (i, a)), (_, (j, b))| a.score.total_cmp(&b.score).then(i.cmp(j)))
            .map(|(idx, _)| idx)
            .unwrap_or_default(),
        SolutionChoice::Random => StdRng::seed_from_u64(seed).random_range(0..successes.len()),
    };

    Ok(successes.swap_remove(idx))
}
