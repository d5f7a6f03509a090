//! Assembly of a solver's output into the result reported to the user.
use crate::error::ResiteError;
use crate::problem::Solution;
use crate::region::{RegionID, RegionMap};
use crate::site::{SiteID, SiteMap, TechnologyID};
use crate::time_series::TimeSeriesStore;
use crate::units::{Capacity, Dimensionless, Power};
use anyhow::Result;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use log::info;

/// A site chosen for deployment
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedSite {
    /// The site
    pub site_id: SiteID,
    /// The region containing the site
    pub region_id: RegionID,
    /// The technology deployed
    pub technology: TechnologyID,
    /// The capacity installed
    pub capacity: Capacity,
    /// Longitude of the site
    pub lon: f64,
    /// Latitude of the site
    pub lat: f64,
}

/// The outcome of a siting run
#[derive(Debug, Clone, PartialEq)]
pub struct SitingResult {
    /// Selected sites, in candidate order
    pub selected_sites: Vec<SelectedSite>,
    /// Number of selected sites in each configured region
    pub per_region_counts: IndexMap<RegionID, usize>,
    /// Total generation of the selected sites at each timestamp
    pub aggregate_profile: Vec<(NaiveDateTime, Power)>,
}

/// Find the region which contains a site
fn find_region<'a>(regions: &'a RegionMap, site_id: &SiteID) -> Option<&'a RegionID> {
    regions
        .values()
        .find(|region| region.sites.contains(site_id))
        .map(|region| &region.id)
}

/// Turn a [`Solution`] into a [`SitingResult`].
///
/// Fails with [`ResiteError::Integrity`] if a selected site is not part of any region.
pub fn assemble(
    solution: &Solution,
    regions: &RegionMap,
    sites: &SiteMap,
    store: &TimeSeriesStore,
) -> Result<SitingResult> {
    let mut per_region_counts: IndexMap<RegionID, usize> =
        regions.keys().map(|id| (id.clone(), 0)).collect();
    let mut profile = vec![Power(0.0); store.len()];
    let mut selected_sites = Vec::new();

    for (site_id, deployment) in &solution.selection {
        if !deployment.selected {
            continue;
        }

        let (Some(region_id), Some(site)) = (find_region(regions, site_id), sites.get(site_id))
        else {
            return Err(ResiteError::Integrity(site_id.clone()).into());
        };
        *per_region_counts.entry(region_id.clone()).or_default() += 1;

        for (total, cf) in profile.iter_mut().zip(store.values(site_id)?) {
            *total = *total + deployment.capacity * Dimensionless(*cf);
        }

        selected_sites.push(SelectedSite {
            site_id: site_id.clone(),
            region_id: region_id.clone(),
            technology: site.technology.clone(),
            capacity: deployment.capacity,
            lon: site.lon,
            lat: site.lat,
        });
    }
    info!(
        "Selected {} sites with a total capacity of {}",
        selected_sites.len(),
        selected_sites.iter().map(|s| s.capacity).sum::<Capacity>()
    );

    let aggregate_profile = store.timestamps().iter().copied().zip(profile).collect();

    Ok(SitingResult {
        selected_sites,
        per_region_counts,
        aggregate_profile,
    })
}
