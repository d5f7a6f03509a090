//! A single simulated-annealing run.
use super::evaluator::{Evaluator, Move};
use super::{HeuristicOptions, SearchAlgorithm};
use crate::error::ResiteError;
use crate::formulation::subset_sum;
use crate::problem::{Problem, weight_sum};
use anyhow::{Result, ensure};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::time::{Duration, Instant};

/// The stage a run has reached
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunState {
    /// Building the initial selection
    Init,
    /// Searching, in the given epoch
    Annealing {
        /// The current epoch (zero-based)
        epoch: u32,
    },
    /// An epoch passed with no accepted move
    Converged,
    /// The epoch budget or time limit ran out
    Exhausted,
}

/// The result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// The best selection seen
    pub selected: Vec<bool>,
    /// Score of the best selection
    pub score: f64,
    /// Score of the initial selection
    pub initial_score: f64,
    /// The state the run finished in
    pub state: RunState,
}

/// The candidates which may take part in a move alongside each candidate.
///
/// Neighbours belong to the same group and are not fixed. For [`SearchAlgorithm::SALS`] they must
/// also lie within the search radius.
pub struct Neighbours(Vec<Vec<usize>>);

impl Neighbours {
    /// Find the neighbours of every candidate
    pub fn new(problem: &Problem, algorithm: SearchAlgorithm, radius: f64) -> Self {
        let neighbours = problem
            .candidates
            .iter()
            .enumerate()
            .map(|(idx, candidate)| {
                if candidate.fixed {
                    return Vec::new();
                }

                problem.groups[candidate.group]
                    .candidates
                    .iter()
                    .copied()
                    .filter(|other_idx| {
                        let other = &problem.candidates[*other_idx];
                        *other_idx != idx
                            && !other.fixed
                            && (algorithm == SearchAlgorithm::GLS
                                || candidate.distance_to(other) <= radius)
                    })
                    .collect()
            })
            .collect();

        Self(neighbours)
    }

    fn get(&self, idx: usize) -> &[usize] {
        &self.0[idx]
    }
}

/// One annealing run with its own random number generator
pub struct AnnealingRun<'a> {
    problem: &'a Problem,
    options: &'a HeuristicOptions,
    neighbours: &'a Neighbours,
    rng: StdRng,
    state: RunState,
}

impl<'a> AnnealingRun<'a> {
    /// Create a new run
    pub fn new(
        problem: &'a Problem,
        options: &'a HeuristicOptions,
        neighbours: &'a Neighbours,
        seed: u64,
    ) -> Self {
        Self {
            problem,
            options,
            neighbours,
            rng: StdRng::seed_from_u64(seed),
            state: RunState::Init,
        }
    }

    /// The current state of the run
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Build a random initial selection which meets every group target exactly.
    ///
    /// Fixed candidates are always selected; the rest of each group's target is filled by a
    /// subset-sum construction over the remaining candidates in random order.
    pub fn initial_selection(&mut self) -> Result<Vec<bool>> {
        let problem = self.problem;
        let mut selected: Vec<bool> = problem.candidates.iter().map(|c| c.fixed).collect();

        for group in &problem.groups {
            let (fixed, free): (Vec<usize>, Vec<usize>) = group
                .candidates
                .iter()
                .partition(|idx| problem.candidates[**idx].fixed);
            let fixed_weight = weight_sum(fixed.iter().map(|idx| &problem.candidates[*idx]));

            let weights = free
                .iter()
                .map(|idx| problem.candidates[*idx].weight)
                .collect::<Vec<_>>();
            let mut order = (0..free.len()).collect::<Vec<_>>();
            order.shuffle(&mut self.rng);

            let chosen = u32::try_from(fixed_weight)
                .ok()
                .and_then(|fixed_weight| group.target.checked_sub(fixed_weight))
                .and_then(|remaining| subset_sum(&weights, &order, remaining))
                .ok_or_else(|| ResiteError::InfeasibleTarget {
                    target: group.label(),
                    reason: "no initial selection matches the target".into(),
                })?;
            for item in chosen {
                selected[free[item]] = true;
            }
        }

        Ok(selected)
    }

    /// Run the search to completion.
    ///
    /// # Returns
    ///
    /// The best selection seen, or an error if the objective could not be evaluated.
    pub fn run(mut self) -> Result<RunOutcome> {
        let start = Instant::now();
        let time_limit = self.options.time_limit.map(Duration::from_secs_f64);

        let mut evaluator = Evaluator::new(self.problem, self.initial_selection()?);
        let initial_score = evaluator.score();
        ensure!(initial_score.is_finite(), "Initial selection has a non-finite objective");
        let mut best = (evaluator.selected().to_vec(), initial_score);

        let mut temperature = self.options.initial_temp;
        self.state = RunState::Annealing { epoch: 0 };
        while let RunState::Annealing { epoch } = self.state {
            let mut accepted = 0;
            for _ in 0..self.options.no_iterations {
                if self.try_move(&mut evaluator, temperature)? {
                    accepted += 1;
                    if evaluator.score() < best.1 {
                        best = (evaluator.selected().to_vec(), evaluator.score());
                    }
                }
            }

            temperature *= self.options.cooling_rate;
            let out_of_time = time_limit.is_some_and(|limit| start.elapsed() >= limit);
            self.state = if accepted == 0 {
                RunState::Converged
            } else if epoch + 1 >= self.options.no_epochs || out_of_time {
                RunState::Exhausted
            } else {
                RunState::Annealing { epoch: epoch + 1 }
            };
        }
        debug!(
            "Run finished in state {:?} with score {} (initial {initial_score})",
            self.state, best.1
        );

        Ok(RunOutcome {
            selected: best.0,
            score: best.1,
            initial_score,
            state: self.state,
        })
    }

    /// Propose a random move and apply it if accepted.
    ///
    /// # Returns
    ///
    /// Whether the move was accepted.
    fn try_move(&mut self, evaluator: &mut Evaluator<'_>, temperature: f64) -> Result<bool> {
        let Some(mv) = self.propose(evaluator.selected()) else {
            return Ok(false);
        };

        let delta = evaluator.move_delta(&mv);
        ensure!(
            delta.is_finite(),
            "Non-finite change in objective when deselecting candidates {:?} and selecting {:?}",
            mv.out,
            mv.into
        );

        let accept = delta <= 0.0
            || (temperature > 0.0 && self.rng.random::<f64>() < (-delta / temperature).exp());
        if accept {
            evaluator.apply_move(&mv);
        }

        Ok(accept)
    }

    /// Propose a random move which keeps every group's weighted total unchanged.
    ///
    /// A selected candidate is replaced by an unselected neighbour. If their weights differ, the
    /// difference is made up by also selecting further unselected neighbours of the outgoing
    /// candidate, or by also deselecting further selected ones.
    ///
    /// # Returns
    ///
    /// The move, or `None` if no move could be built this time.
    fn propose(&mut self, selected: &[bool]) -> Option<Move> {
        let (problem, neighbours) = (self.problem, self.neighbours);
        let outgoing = selected
            .iter()
            .enumerate()
            .filter(|(idx, s)| **s && !problem.candidates[*idx].fixed)
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        let out = *outgoing.choose(&mut self.rng)?;

        let (selected_nearby, unselected_nearby): (Vec<usize>, Vec<usize>) = neighbours
            .get(out)
            .iter()
            .partition(|idx| selected[**idx]);
        let into = *unselected_nearby.choose(&mut self.rng)?;

        let mut mv = Move::swap(out, into);
        let (out_weight, into_weight) =
            (problem.candidates[out].weight, problem.candidates[into].weight);
        match out_weight.cmp(&into_weight) {
            Ordering::Equal => {}
            Ordering::Greater => {
                let pool = unselected_nearby
                    .into_iter()
                    .filter(|idx| *idx != into)
                    .collect::<Vec<_>>();
                mv.into.extend(self.random_subset(&pool, out_weight - into_weight)?);
            }
            Ordering::Less => {
                mv.out.extend(self.random_subset(&selected_nearby, into_weight - out_weight)?);
            }
        }

        Some(mv)
    }

    /// Choose a random subset of `pool` whose weights sum to `weight`
    fn random_subset(&mut self, pool: &[usize], weight: u32) -> Option<Vec<usize>> {
        let weights = pool
            .iter()
            .map(|idx| self.problem.candidates[*idx].weight)
            .collect::<Vec<_>>();
        let mut order = (0..pool.len()).collect::<Vec<_>>();
        order.shuffle(&mut self.rng);

        subset_sum(&weights, &order, weight)
            .map(|items| items.into_iter().map(|item| pool[item]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{flat_problem, heuristic_options, problem};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_neighbours(mut problem: Problem) {
        // Positions are (0, 0), (1, 0) and (3, 0)
        problem.candidates[2].position = (3.0, 0.0);
        problem.candidates[1].position = (1.0, 0.0);

        let neighbours = Neighbours::new(&problem, SearchAlgorithm::GLS, 0.0);
        assert_eq!(neighbours.get(0), [1, 2]);

        let neighbours = Neighbours::new(&problem, SearchAlgorithm::SALS, 1.5);
        assert_eq!(neighbours.get(0), [1]);
        assert_eq!(neighbours.get(2), [] as [usize; 0]);

        problem.candidates[1].fixed = true;
        let neighbours = Neighbours::new(&problem, SearchAlgorithm::GLS, 0.0);
        assert_eq!(neighbours.get(0), [2]);
        assert!(neighbours.get(1).is_empty());
    }

    #[rstest]
    fn test_initial_selection(mut problem: Problem) {
        problem.candidates[2].fixed = true;
        let options = heuristic_options();
        let neighbours = Neighbours::new(&problem, options.algorithm, options.neighborhood);
        for seed in 0..10 {
            let mut run = AnnealingRun::new(&problem, &options, &neighbours, seed);
            let selected = run.initial_selection().unwrap();
            assert!(selected[2]);
            assert!(problem.check_selection(&selected).is_ok());
        }
    }

    #[rstest]
    fn test_run_improves_on_init(problem: Problem) {
        let options = heuristic_options();
        let neighbours = Neighbours::new(&problem, options.algorithm, options.neighborhood);
        for seed in 0..10 {
            let run = AnnealingRun::new(&problem, &options, &neighbours, seed);
            assert_eq!(run.state(), RunState::Init);
            let outcome = run.run().unwrap();
            assert!(outcome.score <= outcome.initial_score);
            assert!(matches!(
                outcome.state,
                RunState::Converged | RunState::Exhausted
            ));
            assert!(problem.check_selection(&outcome.selected).is_ok());
        }
    }

    #[rstest]
    fn test_run_deterministic(problem: Problem) {
        let options = heuristic_options();
        let neighbours = Neighbours::new(&problem, options.algorithm, options.neighborhood);
        let outcome1 = AnnealingRun::new(&problem, &options, &neighbours, 42).run().unwrap();
        let outcome2 = AnnealingRun::new(&problem, &options, &neighbours, 42).run().unwrap();
        assert_eq!(outcome1, outcome2);
    }

    #[rstest]
    fn test_run_zero_temperature_converges(problem: Problem) {
        let options = HeuristicOptions {
            initial_temp: 0.0,
            no_epochs: 1000,
            ..heuristic_options()
        };
        let neighbours = Neighbours::new(&problem, options.algorithm, options.neighborhood);
        let outcome = AnnealingRun::new(&problem, &options, &neighbours, 0).run().unwrap();
        assert_eq!(outcome.state, RunState::Converged);
    }

    #[rstest]
    fn test_run_non_finite_delta(mut problem: Problem) {
        problem.candidates[2].cost = f64::INFINITY;
        let options = heuristic_options();
        let neighbours = Neighbours::new(&problem, options.algorithm, options.neighborhood);

        // s3 is either in the initial selection or the only site which can be swapped in
        for seed in 0..10 {
            let run = AnnealingRun::new(&problem, &options, &neighbours, seed);
            assert!(run.run().is_err());
        }
    }

    #[rstest]
    fn test_neighbours_any_weight(flat_problem: Problem) {
        let neighbours = Neighbours::new(&flat_problem, SearchAlgorithm::GLS, 0.0);
        assert_eq!(neighbours.get(1), [0, 2]);
    }

    #[rstest]
    fn test_propose_compound(flat_problem: Problem) {
        let options = heuristic_options();
        let neighbours = Neighbours::new(&flat_problem, options.algorithm, options.neighborhood);
        for seed in 0..10 {
            let mut run = AnnealingRun::new(&flat_problem, &options, &neighbours, seed);

            // s2 weighs as much as s1 and s3 together
            let mut mv = run.propose(&[false, true, false]).unwrap();
            mv.into.sort();
            assert_eq!(mv.out, [1]);
            assert_eq!(mv.into, [0, 2]);

            let mut mv = run.propose(&[true, false, true]).unwrap();
            mv.out.sort();
            assert_eq!(mv.out, [0, 2]);
            assert_eq!(mv.into, [1]);
        }
    }

    #[rstest]
    fn test_propose_unmatched_weight(mut flat_problem: Problem) {
        // Nothing can make up the weight of s2 once s3 is fixed
        flat_problem.candidates[2].fixed = true;
        let options = heuristic_options();
        let neighbours = Neighbours::new(&flat_problem, options.algorithm, options.neighborhood);
        let mut run = AnnealingRun::new(&flat_problem, &options, &neighbours, 0);
        assert!(run.propose(&[true, false, true]).is_none());
    }

    #[rstest]
    fn test_run_unequal_weights(mut flat_problem: Problem) {
        // Selecting s1 and s3 is optimal, but s2 has a different weight from either
        for (candidate, cost) in flat_problem.candidates.iter_mut().zip([0.1, 1.5, 0.1]) {
            candidate.cost = cost;
        }
        let options = heuristic_options();
        let neighbours = Neighbours::new(&flat_problem, options.algorithm, options.neighborhood);
        for seed in 0..20 {
            let outcome = AnnealingRun::new(&flat_problem, &options, &neighbours, seed)
                .run()
                .unwrap();
            assert_eq!(outcome.selected, [true, false, true]);
            assert_approx_eq!(f64, outcome.score, 0.2);
        }
    }

    #[rstest]
    fn test_run_epoch_budget(flat_problem: Problem) {
        // Every move leaves the score unchanged, so is always accepted
        let options = HeuristicOptions {
            no_epochs: 3,
            ..heuristic_options()
        };
        let neighbours = Neighbours::new(&flat_problem, options.algorithm, options.neighborhood);
        let outcome = AnnealingRun::new(&flat_problem, &options, &neighbours, 0).run().unwrap();
        assert_eq!(outcome.state, RunState::Exhausted);
    }

    #[rstest]
    fn test_run_time_limit(flat_problem: Problem) {
        let options = HeuristicOptions {
            no_epochs: 1000,
            time_limit: Some(1e-9),
            ..heuristic_options()
        };
        let neighbours = Neighbours::new(&flat_problem, options.algorithm, options.neighborhood);
        let run = AnnealingRun::new(&flat_problem, &options, &neighbours, 0);
        let outcome = run.run().unwrap();
        assert_eq!(outcome.state, RunState::Exhausted);
        assert!(flat_problem.check_selection(&outcome.selected).is_ok());
    }
}
