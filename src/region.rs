//! Regions represent the administrative areas in which candidate sites are grouped.
use crate::id::define_id_type;
use crate::site::{SiteID, SiteMap};
use indexmap::{IndexMap, IndexSet};

define_id_type! {RegionID}

/// A map of [`Region`]s, keyed by region ID
pub type RegionMap = IndexMap<RegionID, Region>;

/// A region and the candidate sites it contains
#[derive(Debug, PartialEq)]
pub struct Region {
    /// A unique identifier for a region (e.g. "BE").
    pub id: RegionID,
    /// The sites located in this region, in input order
    pub sites: IndexSet<SiteID>,
}

/// Group sites into the given regions.
///
/// Every region in `region_ids` gets an entry, even if it contains no sites. Sites in other
/// regions are ignored.
pub fn group_sites_by_region(sites: &SiteMap, region_ids: &IndexSet<RegionID>) -> RegionMap {
    let mut regions: RegionMap = region_ids
        .iter()
        .map(|id| {
            let region = Region {
                id: id.clone(),
                sites: IndexSet::new(),
            };
            (id.clone(), region)
        })
        .collect();

    for site in sites.values() {
        if let Some(region) = regions.get_mut(&site.region_id) {
            region.sites.insert(site.id.clone());
        }
    }

    regions
}
