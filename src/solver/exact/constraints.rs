//! Code for adding constraints to the site-selection MILP.
use super::VariableMap;
use crate::problem::{Problem, WindowRequirement};
use highs::RowProblem;

/// Add all constraints for the problem.
///
/// Rows are added in this order: one per deployment group, then (if the problem has a window
/// requirement) one per window.
pub fn add_constraints(milp: &mut RowProblem, variables: &VariableMap, problem: &Problem) {
    add_group_target_constraints(milp, variables, problem);

    match problem.window_requirement {
        WindowRequirement::Ignored => {}
        WindowRequirement::Enforced => add_window_supply_constraints(milp, variables, problem),
        WindowRequirement::Counted => add_window_coverage_constraints(milp, variables, problem),
    }
}

/// Each group's weighted selection must equal its target exactly
fn add_group_target_constraints(
    milp: &mut RowProblem,
    variables: &VariableMap,
    problem: &Problem,
) {
    for group in &problem.groups {
        let terms = group
            .candidates
            .iter()
            .map(|idx| (variables.selection[*idx], problem.candidates[*idx].weight as f64));
        let target = group.target as f64;
        milp.add_row(target..=target, terms);
    }
}

/// Supply in each window must meet its requirement:
///
/// sum(supply[s][w] * x[s]) >= requirement[w]
fn add_window_supply_constraints(
    milp: &mut RowProblem,
    variables: &VariableMap,
    problem: &Problem,
) {
    for (window, requirement) in problem.requirements.iter().enumerate() {
        milp.add_row(*requirement.., window_terms(variables, problem, window, 1.0));
    }
}

/// A window can only be counted as covered if its supply meets the requirement:
///
/// requirement[w] * y[w] - sum(supply[s][w] * x[s]) <= 0
fn add_window_coverage_constraints(
    milp: &mut RowProblem,
    variables: &VariableMap,
    problem: &Problem,
) {
    for (window, requirement) in problem.requirements.iter().enumerate() {
        let mut terms = window_terms(variables, problem, window, -1.0);
        terms.push((variables.window[window], *requirement));
        milp.add_row(..=0.0, terms);
    }
}

/// The supply terms for a window, with coefficients multiplied by `factor`
fn window_terms(
    variables: &VariableMap,
    problem: &Problem,
    window: usize,
    factor: f64,
) -> Vec<(highs::Col, f64)> {
    problem
        .candidates
        .iter()
        .zip(&variables.selection)
        .map(|(candidate, var)| (*var, factor * candidate.supply[window]))
        .collect()
}
