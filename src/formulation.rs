//! Code for building a site-selection [`Problem`] from the model configuration.
use crate::criticality::CriticalityIndex;
use crate::error::ResiteError;
use crate::model::{DeploymentUnit, ModelParameters};
use crate::problem::{
    Candidate, DeploymentGroup, Problem, WindowRequirement, is_window_covered, weight_sum,
};
use crate::site::{Site, SiteMap};
use crate::units::Capacity;
use anyhow::{Context, Result, bail, ensure};
use log::{debug, warn};
use serde::Deserialize;

/// The choice of objective and constraints for selecting sites
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, strum::Display)]
#[serde(tag = "name", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Formulation {
    /// Minimise the criticality of the selected sites, subject to deployment targets
    AggregateTarget,
    /// As [`Formulation::AggregateTarget`], but the selection must also supply `coverage` times
    /// the load in every window
    HourlyTarget {
        /// The fraction of load which must be covered in each window
        coverage: f64,
    },
    /// Minimise the fraction of windows in which supply is below `threshold` times the load
    DemandCoverage {
        /// The fraction of load above which a window is covered
        threshold: f64,
    },
    /// Minimise the fraction of windows in which the summed non-criticality of the selected sites
    /// is below `c`
    Complementarity {
        /// The non-criticality a window needs not to be critical
        c: f64,
    },
}

/// Get the sites which can be deployed under the model's deployment vector, in input order.
///
/// A site is a candidate if there is a deployment entry for its region and technology.
pub fn candidate_sites<'a>(sites: &'a SiteMap, params: &ModelParameters) -> Vec<&'a Site> {
    sites
        .values()
        .filter(|site| {
            params
                .deployment
                .iter()
                .any(|d| d.region == site.region_id && d.technology == site.technology)
        })
        .collect()
}

/// The largest target or site weight, in deployment units, that a problem may have
pub const MAX_DEPLOYMENT_UNITS: u32 = 100_000;

/// Convert a capacity into a whole number of deployment units
fn to_units(value: f64, unit: DeploymentUnit, quantum: Capacity) -> u32 {
    match unit {
        DeploymentUnit::Sites => value as u32,
        DeploymentUnit::Capacity => (Capacity(value) / quantum).value().round() as u32,
    }
}

/// Build a [`Problem`] for the candidate sites.
///
/// # Arguments
///
/// * `sites` - All sites in the model
/// * `params` - Model parameters (deployment vector, formulation and deployment options)
/// * `index` - Criticality index covering every candidate site
///
/// # Returns
///
/// The problem, or [`ResiteError::InfeasibleTarget`] if a target obviously cannot be met.
pub fn build_problem(
    sites: &SiteMap,
    params: &ModelParameters,
    index: &CriticalityIndex,
) -> Result<Problem> {
    let mut groups = Vec::with_capacity(params.deployment.len());
    let mut candidates = Vec::new();
    for (group_idx, entry) in params.deployment.iter().enumerate() {
        let mut group = DeploymentGroup {
            region_id: entry.region.clone(),
            technology: entry.technology.clone(),
            target: to_units(entry.target, params.deployment_unit, params.capacity_quantum),
            candidates: Vec::new(),
        };

        for site in sites
            .values()
            .filter(|s| s.region_id == entry.region && s.technology == entry.technology)
        {
            let weight = match params.deployment_unit {
                DeploymentUnit::Sites => 1,
                DeploymentUnit::Capacity => to_units(
                    site.capacity.value(),
                    DeploymentUnit::Capacity,
                    params.capacity_quantum,
                ),
            };
            if weight == 0 {
                warn!(
                    "Site {} has less than one capacity quantum available; ignoring",
                    site.id
                );
                continue;
            }

            group.candidates.push(candidates.len());
            candidates.push(make_candidate(site, group_idx, weight, params, index)?);
        }

        debug!(
            "Deployment group {} has {} candidates and a target of {}",
            group.label(),
            group.candidates.len(),
            group.target
        );
        groups.push(group);
    }

    let (window_requirement, requirements) = window_requirements(params, index);
    let problem = Problem {
        candidates,
        groups,
        window_requirement,
        requirements,
    };
    check_feasibility(&problem)?;

    Ok(problem)
}

/// Create the candidate for a site
fn make_candidate(
    site: &Site,
    group: usize,
    weight: u32,
    params: &ModelParameters,
    index: &CriticalityIndex,
) -> Result<Candidate> {
    let scores = index
        .scores(&site.id)
        .with_context(|| format!("No criticality scores for site {}", site.id))?;
    let values = index
        .window_values(&site.id)
        .with_context(|| format!("No capacity factors for site {}", site.id))?;

    let mean_criticality = scores.iter().sum::<f64>() / scores.len() as f64;
    let supply = || -> Vec<f64> { values.iter().map(|r| site.capacity.value() * r).collect() };
    let (cost, supply) = match params.formulation {
        Formulation::AggregateTarget => (weight as f64 * mean_criticality, Vec::new()),
        Formulation::HourlyTarget { .. } => (weight as f64 * mean_criticality, supply()),
        Formulation::DemandCoverage { .. } => (0.0, supply()),
        Formulation::Complementarity { .. } => (0.0, scores.iter().map(|s| 1.0 - s).collect()),
    };

    Ok(Candidate {
        site_id: site.id.clone(),
        group,
        weight,
        capacity: site.capacity,
        position: (site.lon, site.lat),
        fixed: params.use_existing_capacity && site.has_existing_capacity(),
        cost,
        supply,
    })
}

/// Get the window requirement for the formulation
fn window_requirements(
    params: &ModelParameters,
    index: &CriticalityIndex,
) -> (WindowRequirement, Vec<f64>) {
    let load = index.reference();
    match params.formulation {
        Formulation::AggregateTarget => (WindowRequirement::Ignored, Vec::new()),
        Formulation::HourlyTarget { coverage } => (
            WindowRequirement::Enforced,
            load.iter().map(|l| coverage * l).collect(),
        ),
        Formulation::DemandCoverage { threshold } => (
            WindowRequirement::Counted,
            load.iter().map(|l| threshold * l).collect(),
        ),
        Formulation::Complementarity { c } => (WindowRequirement::Counted, vec![c; load.len()]),
    }
}

/// Find a subset of items whose weights sum exactly to `target`.
///
/// Items are considered in the given order; among several solutions, those using earlier items
/// are preferred.
///
/// # Returns
///
/// Indexes into `weights` of the chosen items, or `None` if the target is unreachable.
pub fn subset_sum(weights: &[u32], order: &[usize], target: u32) -> Option<Vec<usize>> {
    let target = target as usize;

    // The item which first reached each total
    let mut reached_by: Vec<Option<usize>> = vec![None; target + 1];
    let mut reachable = vec![false; target + 1];
    reachable[0] = true;
    for &item in order {
        let weight = weights[item] as usize;
        if weight == 0 || weight > target {
            continue;
        }
        for total in (weight..=target).rev() {
            if reachable[total - weight] && !reachable[total] {
                reachable[total] = true;
                reached_by[total] = Some(item);
            }
        }
    }

    if !reachable[target] {
        return None;
    }

    let mut chosen = Vec::new();
    let mut total = target;
    while total > 0 {
        let item = reached_by[total]?;
        chosen.push(item);
        total -= weights[item] as usize;
    }

    Some(chosen)
}

/// Check for targets which cannot be met by any selection
fn check_feasibility(problem: &Problem) -> Result<()> {
    for group in &problem.groups {
        let infeasible = |reason: String| ResiteError::InfeasibleTarget {
            target: group.label(),
            reason,
        };

        let members = group
            .candidates
            .iter()
            .map(|idx| &problem.candidates[*idx])
            .collect::<Vec<_>>();
        ensure!(
            group.target <= MAX_DEPLOYMENT_UNITS,
            "Target for {} is {} deployment units, more than the maximum of \
            {MAX_DEPLOYMENT_UNITS}. Use a larger capacity_quantum.",
            group.label(),
            group.target
        );
        if let Some(site) = members.iter().find(|c| c.weight > MAX_DEPLOYMENT_UNITS) {
            bail!(
                "Site {} is {} deployment units, more than the maximum of \
                {MAX_DEPLOYMENT_UNITS}. Use a larger capacity_quantum.",
                site.site_id,
                site.weight
            );
        }

        let available = weight_sum(members.iter().copied());
        if u64::from(group.target) > available {
            Err(infeasible(format!(
                "target of {} exceeds the {available} available",
                group.target
            )))?;
        }

        let fixed = weight_sum(members.iter().copied().filter(|c| c.fixed));
        let Some(remaining) = u32::try_from(fixed)
            .ok()
            .and_then(|fixed| group.target.checked_sub(fixed))
        else {
            return Err(infeasible(format!(
                "existing capacity of {fixed} exceeds the target of {}",
                group.target
            ))
            .into());
        };

        let free = members.iter().filter(|c| !c.fixed).map(|c| c.weight).collect::<Vec<_>>();
        let order = (0..free.len()).collect::<Vec<_>>();
        if subset_sum(&free, &order, remaining).is_none() {
            Err(infeasible(
                "no combination of candidate sites matches the target exactly".into(),
            ))?;
        }
    }

    if problem.window_requirement == WindowRequirement::Enforced {
        let supply = problem.window_supply(&vec![true; problem.candidates.len()]);
        if let Some(window) = supply
            .iter()
            .zip(&problem.requirements)
            .position(|(s, r)| !is_window_covered(*s, *r))
        {
            Err(ResiteError::InfeasibleTarget {
                target: format!("window {window}"),
                reason: "requirement exceeds the supply of all candidate sites".into(),
            })?;
        }
    }

    Ok(())
}
