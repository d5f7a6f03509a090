//! Candidate sites: grid cells eligible for deployment of a given technology.
use crate::id::define_id_type;
use crate::region::RegionID;
use crate::units::Capacity;
use indexmap::IndexMap;

define_id_type! {SiteID}
define_id_type! {TechnologyID}

/// A map of [`Site`]s, keyed by site ID
pub type SiteMap = IndexMap<SiteID, Site>;

/// A candidate grid cell/technology pair.
///
/// Sites are immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// A unique identifier for the site
    pub id: SiteID,
    /// The region containing the site
    pub region_id: RegionID,
    /// The technology which could be deployed here
    pub technology: TechnologyID,
    /// Longitude of the grid cell centre
    pub lon: f64,
    /// Latitude of the grid cell centre
    pub lat: f64,
    /// Maximum installable capacity
    pub capacity: Capacity,
    /// Capacity already installed at the site
    pub existing_capacity: Capacity,
}

impl Site {
    /// Whether any capacity is already installed at this site
    pub fn has_existing_capacity(&self) -> bool {
        self.existing_capacity > Capacity(0.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::fixture::site;

    #[test]
    fn test_has_existing_capacity() {
        let mut s = site("a", "BE", 1.0, 0.0, 0.0);
        assert!(!s.has_existing_capacity());
        s.existing_capacity = crate::units::Capacity(0.5);
        assert!(s.has_existing_capacity());
    }
}
