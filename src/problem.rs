//! The abstract site-selection problem shared by the exact and heuristic solvers.
//!
//! Every formulation reduces to the same shape: one binary decision per candidate, an exact
//! weighted target per deployment group, a linear criticality cost and (optionally) a requirement
//! on the supply in each window. The window requirement is either enforced as a constraint or
//! counted in the objective.
use crate::error::ResiteError;
use crate::region::RegionID;
use crate::site::{SiteID, TechnologyID};
use crate::units::Capacity;
use anyhow::Result;
use indexmap::IndexMap;
use serde::Serialize;
use std::time::Duration;

/// Relative tolerance used when comparing window supply with its requirement
pub const WINDOW_TOLERANCE: f64 = 1e-6;

/// A site which may be selected
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// The site this candidate represents
    pub site_id: SiteID,
    /// Index of the candidate's deployment group
    pub group: usize,
    /// Contribution towards the group target when selected
    pub weight: u32,
    /// Capacity installed when selected
    pub capacity: Capacity,
    /// Coordinates of the site (longitude, latitude)
    pub position: (f64, f64),
    /// Whether the candidate must be selected
    pub fixed: bool,
    /// Objective cost incurred when selected
    pub cost: f64,
    /// Contribution to the supply of each window when selected
    pub supply: Vec<f64>,
}

impl Candidate {
    /// Euclidean distance between two candidates, in coordinate units
    pub fn distance_to(&self, other: &Candidate) -> f64 {
        (self.position.0 - other.position.0).hypot(self.position.1 - other.position.1)
    }
}

/// The candidates for one region and technology, with their target
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentGroup {
    /// The region
    pub region_id: RegionID,
    /// The technology
    pub technology: TechnologyID,
    /// The weighted number of candidates which must be selected
    pub target: u32,
    /// Indexes of the candidates belonging to this group
    pub candidates: Vec<usize>,
}

impl DeploymentGroup {
    /// A label for the group used in messages
    pub fn label(&self) -> String {
        format!("{}/{}", self.region_id, self.technology)
    }
}

/// How the per-window supply requirement affects the problem
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowRequirement {
    /// There is no requirement
    Ignored,
    /// Every window must meet its requirement
    Enforced,
    /// The fraction of windows which miss their requirement is added to the objective
    Counted,
}

/// A site-selection problem
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    /// All candidates, grouped contiguously by deployment group
    pub candidates: Vec<Candidate>,
    /// Deployment groups
    pub groups: Vec<DeploymentGroup>,
    /// How the window requirement is used
    pub window_requirement: WindowRequirement,
    /// The supply required in each window
    pub requirements: Vec<f64>,
}

/// The deployment decision for one site
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SiteDeployment {
    /// Whether the site is selected
    pub selected: bool,
    /// Installed capacity (zero unless selected)
    pub capacity: Capacity,
}

/// The deployment decision for every candidate, in candidate order
pub type CandidateSelection = IndexMap<SiteID, SiteDeployment>;

/// Information about how a solution was obtained
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverDiagnostics {
    /// The solution method used
    pub method: String,
    /// Whether the solution is certified optimal (within `gap_bound`)
    pub optimality_certified: bool,
    /// The relative optimality gap guaranteed by the solver, if any
    pub gap_bound: Option<f64>,
    /// Wall-clock time spent solving
    #[serde(serialize_with = "serialise_duration")]
    pub wall_time: Duration,
    /// For the heuristic solver, which run the solution came from
    pub run_index: Option<usize>,
}

fn serialise_duration<S: serde::Serializer>(
    duration: &Duration,
    serialiser: S,
) -> Result<S::Ok, S::Error> {
    serialiser.serialize_f64(duration.as_secs_f64())
}

/// The output of a solver
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// The deployment decision for every candidate
    pub selection: CandidateSelection,
    /// The objective value of the selection (lower is better)
    pub objective: f64,
    /// How the solution was obtained
    pub diagnostics: SolverDiagnostics,
}

/// The total weight of some candidates
pub fn weight_sum<'a>(candidates: impl IntoIterator<Item = &'a Candidate>) -> u64 {
    candidates.into_iter().map(|c| u64::from(c.weight)).sum()
}

/// Whether the supply for a window meets its requirement
pub fn is_window_covered(supply: f64, requirement: f64) -> bool {
    supply >= requirement - WINDOW_TOLERANCE * requirement.abs().max(1.0)
}

impl Problem {
    /// The number of windows
    pub fn n_windows(&self) -> usize {
        self.requirements.len()
    }

    /// Calculate the supply in each window for a selection
    pub fn window_supply(&self, selected: &[bool]) -> Vec<f64> {
        let mut supply = vec![0.0; self.n_windows()];
        for candidate in self.iter_selected(selected) {
            for (total, value) in supply.iter_mut().zip(&candidate.supply) {
                *total += value;
            }
        }

        supply
    }

    /// The fraction of windows whose supply misses the requirement
    pub fn uncovered_fraction(&self, supply: &[f64]) -> f64 {
        if supply.is_empty() {
            return 0.0;
        }

        let uncovered = supply
            .iter()
            .zip(&self.requirements)
            .filter(|(s, r)| !is_window_covered(**s, **r))
            .count();
        uncovered as f64 / supply.len() as f64
    }

    /// Calculate the objective value of a selection
    pub fn objective_value(&self, selected: &[bool]) -> f64 {
        let cost: f64 = self.iter_selected(selected).map(|c| c.cost).sum();
        match self.window_requirement {
            WindowRequirement::Counted => {
                cost + self.uncovered_fraction(&self.window_supply(selected))
            }
            WindowRequirement::Ignored | WindowRequirement::Enforced => cost,
        }
    }

    /// Check that a selection meets every group target and, if enforced, every window requirement.
    ///
    /// Fails with [`ResiteError::InfeasibleTarget`] naming the first target missed.
    pub fn check_selection(&self, selected: &[bool]) -> Result<()> {
        assert_eq!(selected.len(), self.candidates.len(), "Bad selection length");

        for group in &self.groups {
            let total = weight_sum(
                group
                    .candidates
                    .iter()
                    .filter(|idx| selected[**idx])
                    .map(|idx| &self.candidates[*idx]),
            );
            if total != u64::from(group.target) {
                Err(ResiteError::InfeasibleTarget {
                    target: group.label(),
                    reason: format!("selection totals {total} but the target is {}", group.target),
                })?;
            }
        }

        if let Some((candidate, _)) = self
            .candidates
            .iter()
            .zip(selected)
            .find(|(c, s)| c.fixed && !**s)
        {
            Err(ResiteError::InfeasibleTarget {
                target: self.groups[candidate.group].label(),
                reason: format!("fixed site {} is not selected", candidate.site_id),
            })?;
        }

        if self.window_requirement == WindowRequirement::Enforced {
            let supply = self.window_supply(selected);
            if let Some(window) = supply
                .iter()
                .zip(&self.requirements)
                .position(|(s, r)| !is_window_covered(*s, *r))
            {
                Err(ResiteError::InfeasibleTarget {
                    target: format!("window {window}"),
                    reason: format!(
                        "supply of {} is below the requirement of {}",
                        supply[window], self.requirements[window]
                    ),
                })?;
            }
        }

        Ok(())
    }

    /// Convert a vector of decisions into a [`Solution`]
    pub fn to_solution(&self, selected: &[bool], diagnostics: SolverDiagnostics) -> Solution {
        let selection = self
            .candidates
            .iter()
            .zip(selected)
            .map(|(candidate, selected)| {
                let deployment = SiteDeployment {
                    selected: *selected,
                    capacity: if *selected {
                        candidate.capacity
                    } else {
                        Capacity(0.0)
                    },
                };
                (candidate.site_id.clone(), deployment)
            })
            .collect();

        Solution {
            selection,
            objective: self.objective_value(selected),
            diagnostics,
        }
    }

    fn iter_selected<'a>(&'a self, selected: &'a [bool]) -> impl Iterator<Item = &'a Candidate> {
        self.candidates
            .iter()
            .zip(selected)
            .filter_map(|(candidate, selected)| selected.then_some(candidate))
    }
}
