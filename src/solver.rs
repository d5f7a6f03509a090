//! Solvers for site-selection problems.
use crate::problem::{Problem, Solution};
use anyhow::Result;
use serde::Deserialize;

pub mod exact;
use exact::{ExactOptions, ExactSolver};
pub mod heuristic;
use heuristic::{HeuristicOptions, HeuristicSolver};

/// Something which can select sites for a [`Problem`]
pub trait Solver {
    /// A short name for the method, used in logs and output
    fn name(&self) -> &'static str;

    /// Solve the problem.
    ///
    /// A successful result always meets every group target exactly.
    fn solve(&self, problem: &Problem) -> Result<Solution>;
}

/// The solution method and its options, as given in the model file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method")]
pub enum SolutionMethod {
    /// Branch and bound on a mixed-integer linear program
    #[serde(rename = "BB")]
    Exact(ExactOptions),
    /// Simulated-annealing local search
    #[serde(rename = "HEU")]
    Heuristic(HeuristicOptions),
}

impl SolutionMethod {
    /// Create the solver for this method
    pub fn solver(&self) -> Box<dyn Solver> {
        match self {
            Self::Exact(options) => Box::new(ExactSolver::new(options.clone())),
            Self::Heuristic(options) => Box::new(HeuristicSolver::new(options.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        solution_method: SolutionMethod,
    }

    #[rstest]
    #[case("method = \"BB\"\nmip_gap = 0.05", "BB")]
    #[case(
        "method = \"HEU\"\nneighborhood = 1.0\nno_iterations = 10\nno_epochs = 5\n\
         initial_temp = 10.0\nno_runs = 2\nalgorithm = \"GLS\"\nwhich_sol = \"rand\"",
        "HEU"
    )]
    fn test_solution_method_deserialise(#[case] section: &str, #[case] name: &str) {
        let toml = format!("[solution_method]\n{section}");
        let wrapper: Wrapper = toml::from_str(&toml).unwrap();
        assert_eq!(wrapper.solution_method.solver().name(), name);
    }

    #[test]
    fn test_solution_method_unknown() {
        let toml = "[solution_method]\nmethod = \"GA\"";
        assert!(toml::from_str::<Wrapper>(toml).is_err());
    }
}
