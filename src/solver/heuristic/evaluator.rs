//! Incremental evaluation of a selection during local search.
use crate::problem::{Problem, WindowRequirement, is_window_covered};

/// A change to the selection which leaves every group's weighted total unchanged
#[derive(Debug, Clone, PartialEq)]
pub struct Move {
    /// Candidates to deselect
    pub out: Vec<usize>,
    /// Candidates to select
    pub into: Vec<usize>,
}

impl Move {
    /// Replace one candidate with another
    pub fn swap(out: usize, into: usize) -> Self {
        Self {
            out: vec![out],
            into: vec![into],
        }
    }
}

/// Tracks a selection and the quantities needed to score moves without a full re-evaluation.
///
/// The score equals the problem's objective, except that for an enforced window requirement each
/// window which is not covered adds a penalty large enough to outweigh any difference in cost.
pub struct Evaluator<'a> {
    problem: &'a Problem,
    selected: Vec<bool>,
    /// Supply in each window
    supply: Vec<f64>,
    cost: f64,
    window_term: f64,
    penalty_weight: f64,
    /// Used to scale shortfalls for the penalty
    requirement_scale: f64,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator for the given selection
    pub fn new(problem: &'a Problem, selected: Vec<bool>) -> Self {
        let supply = problem.window_supply(&selected);
        let cost = problem
            .candidates
            .iter()
            .zip(&selected)
            .filter(|(_, s)| **s)
            .map(|(c, _)| c.cost)
            .sum();
        let penalty_weight = 1.0 + problem.candidates.iter().map(|c| c.cost.abs()).sum::<f64>();
        let requirement_scale = problem
            .requirements
            .iter()
            .copied()
            .fold(0.0, f64::max)
            .max(f64::MIN_POSITIVE);

        let mut evaluator = Self {
            problem,
            selected,
            supply,
            cost,
            window_term: 0.0,
            penalty_weight,
            requirement_scale,
        };
        evaluator.window_term = evaluator.window_total(|w| evaluator.supply[w]);
        evaluator
    }

    /// The current selection
    pub fn selected(&self) -> &[bool] {
        &self.selected
    }

    /// The score of the current selection (lower is better)
    pub fn score(&self) -> f64 {
        self.cost + self.window_term
    }

    /// Whether every enforced window requirement is met
    pub fn windows_covered(&self) -> bool {
        self.problem.window_requirement != WindowRequirement::Enforced
            || self
                .supply
                .iter()
                .zip(&self.problem.requirements)
                .all(|(s, r)| is_window_covered(*s, *r))
    }

    /// The change in score from applying `mv`
    pub fn move_delta(&self, mv: &Move) -> f64 {
        let change = self.supply_change(mv);
        let window_term = self.window_total(|w| self.supply[w] + change[w]);

        self.cost_change(mv) + window_term - self.window_term
    }

    /// Deselect the outgoing candidates of `mv` and select the incoming ones
    pub fn apply_move(&mut self, mv: &Move) {
        debug_assert!(mv.out.iter().all(|idx| self.selected[*idx]));
        debug_assert!(mv.into.iter().all(|idx| !self.selected[*idx]));

        self.cost += self.cost_change(mv);
        let supply_change = self.supply_change(mv);
        for (supply, change) in self.supply.iter_mut().zip(supply_change) {
            *supply += change;
        }
        for idx in &mv.out {
            self.selected[*idx] = false;
        }
        for idx in &mv.into {
            self.selected[*idx] = true;
        }
        self.window_term = self.window_total(|w| self.supply[w]);
    }

    fn cost_change(&self, mv: &Move) -> f64 {
        let cost = |indexes: &[usize]| -> f64 {
            indexes.iter().map(|idx| self.problem.candidates[*idx].cost).sum()
        };
        cost(&mv.into) - cost(&mv.out)
    }

    /// The change in supply in each window
    fn supply_change(&self, mv: &Move) -> Vec<f64> {
        let mut change = vec![0.0; self.supply.len()];
        let signed = mv.into.iter().map(|idx| (*idx, 1.0));
        for (idx, sign) in signed.chain(mv.out.iter().map(|idx| (*idx, -1.0))) {
            for (total, supply) in change.iter_mut().zip(&self.problem.candidates[idx].supply) {
                *total += sign * supply;
            }
        }
        change
    }

    /// Sum the window terms of the score, given the supply in each window
    fn window_total<F>(&self, supply: F) -> f64
    where
        F: Fn(usize) -> f64,
    {
        let requirements = &self.problem.requirements;
        match self.problem.window_requirement {
            WindowRequirement::Ignored => 0.0,
            WindowRequirement::Counted => {
                let uncovered = (0..requirements.len())
                    .filter(|w| !is_window_covered(supply(*w), requirements[*w]))
                    .count();
                uncovered as f64 / requirements.len() as f64
            }
            WindowRequirement::Enforced => (0..requirements.len())
                .map(|w| {
                    let (supply, requirement) = (supply(w), requirements[w]);
                    if is_window_covered(supply, requirement) {
                        0.0
                    } else {
                        self.penalty_weight
                            * (1.0 + (requirement - supply) / self.requirement_scale)
                    }
                })
                .sum(),
        }
    }
}
