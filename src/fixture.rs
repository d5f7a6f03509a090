//! Fixtures for tests
use crate::formulation::Formulation;
use crate::model::{
    CriticalityParameters, DeploymentEntry, DeploymentUnit, ModelParameters, TimeSliceParameters,
};
use crate::problem::{Candidate, DeploymentGroup, Problem, WindowRequirement};
use crate::site::{Site, SiteMap};
use crate::solver::SolutionMethod;
use crate::solver::exact::{ExactOptions, MilpBackend};
use crate::solver::heuristic::{HeuristicOptions, SearchAlgorithm, SolutionChoice};
use crate::time_series::{RawTimeSeries, TimeSeriesStore};
use crate::units::Capacity;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Create an offshore wind site
pub fn site(id: &str, region: &str, capacity: f64, lon: f64, lat: f64) -> Site {
    Site {
        id: id.into(),
        region_id: region.into(),
        technology: "wind_offshore".into(),
        lon,
        lat,
        capacity: Capacity(capacity),
        existing_capacity: Capacity(0.0),
    }
}

#[fixture]
pub fn sites() -> SiteMap {
    [
        site("s1", "BE", 1.0, 2.5, 51.5),
        site("s2", "BE", 2.0, 3.0, 51.5),
        site("s3", "BE", 1.0, 3.0, 52.0),
    ]
    .into_iter()
    .map(|site| (site.id.clone(), site))
    .collect()
}

/// Hourly timestamps starting at midnight on 1 January 2018
pub fn hourly_timestamps(n: usize) -> Vec<NaiveDateTime> {
    let start = NaiveDate::from_ymd_opt(2018, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..n)
        .map(|i| start + TimeDelta::hours(i as i64))
        .collect()
}

/// Create time slice parameters
pub fn time_slice(
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    resolution: u32,
) -> TimeSliceParameters {
    TimeSliceParameters {
        start: *start,
        end: *end,
        resolution,
    }
}

/// Create a store with hourly series covering the whole time axis
pub fn store_from_series(sites: &[(&str, &[f64])], load: &[f64]) -> TimeSeriesStore {
    let timestamps = hourly_timestamps(load.len());
    let slice = time_slice(&timestamps[0], &timestamps[load.len() - 1], 1);
    let raw = RawTimeSeries {
        timestamps,
        sites: sites
            .iter()
            .map(|(id, values)| ((*id).into(), values.to_vec()))
            .collect(),
        load: load.to_vec(),
    };

    TimeSeriesStore::new(raw, &slice).unwrap()
}

#[fixture]
pub fn criticality_parameters() -> CriticalityParameters {
    CriticalityParameters::default()
}

#[fixture]
pub fn exact_options() -> ExactOptions {
    ExactOptions {
        solver: MilpBackend::Highs,
        mip_gap: 0.01,
        time_limit: 60.0,
        threads: 1,
    }
}

#[fixture]
pub fn heuristic_options() -> HeuristicOptions {
    HeuristicOptions {
        neighborhood: 1.0,
        no_iterations: 50,
        no_epochs: 20,
        initial_temp: 1.0,
        no_runs: 4,
        algorithm: SearchAlgorithm::GLS,
        which_sol: SolutionChoice::Best,
        seed: 0,
        cooling_rate: 0.95,
        time_limit: None,
        threads: None,
    }
}

#[fixture]
pub fn model_parameters() -> ModelParameters {
    let timestamps = hourly_timestamps(3);
    ModelParameters {
        spatial_resolution: 0.5,
        regions: vec!["BE".into()],
        technologies: vec!["wind_offshore".into()],
        use_existing_capacity: false,
        deployment_unit: DeploymentUnit::Sites,
        capacity_quantum: Capacity(1.0),
        timeslice: time_slice(&timestamps[0], &timestamps[2], 1),
        deployment: vec![DeploymentEntry {
            region: "BE".into(),
            technology: "wind_offshore".into(),
            target: 2.0,
        }],
        formulation: Formulation::AggregateTarget,
        criticality: criticality_parameters(),
        solution_method: SolutionMethod::Exact(exact_options()),
    }
}

fn candidate(id: &str, weight: u32, capacity: f64, position: (f64, f64), cost: f64) -> Candidate {
    Candidate {
        site_id: id.into(),
        group: 0,
        weight,
        capacity: Capacity(capacity),
        position,
        fixed: false,
        cost,
        supply: Vec::new(),
    }
}

/// Three sites with a target of two, where s1 and s2 are cheapest
#[fixture]
pub fn problem() -> Problem {
    Problem {
        candidates: vec![
            candidate("s1", 1, 1.0, (0.0, 0.0), 0.5),
            candidate("s2", 1, 2.0, (0.0, 0.5), 0.25),
            candidate("s3", 1, 1.0, (0.5, 0.5), 0.75),
        ],
        groups: vec![DeploymentGroup {
            region_id: "BE".into(),
            technology: "wind_offshore".into(),
            target: 2,
            candidates: vec![0, 1, 2],
        }],
        window_requirement: WindowRequirement::Ignored,
        requirements: Vec::new(),
    }
}

/// Sites weighted by capacity, all with the same criticality, with a target of 2
#[fixture]
pub fn flat_problem() -> Problem {
    let mut problem = problem();
    for (candidate, weight) in problem.candidates.iter_mut().zip([1, 2, 1]) {
        candidate.weight = weight;
        candidate.capacity = Capacity(weight as f64);
        candidate.cost = 0.5 * weight as f64;
    }
    problem
}
