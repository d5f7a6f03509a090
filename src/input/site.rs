//! Code for reading candidate sites from a CSV file.
use super::*;
use crate::region::RegionID;
use crate::site::{Site, SiteID, SiteMap, TechnologyID};
use crate::units::Capacity;
use anyhow::ensure;
use serde::Deserialize;

const SITES_FILE_NAME: &str = "sites.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct SiteRaw {
    id: SiteID,
    region: RegionID,
    technology: TechnologyID,
    lon: f64,
    lat: f64,
    capacity: Capacity,
    #[serde(default)]
    existing_capacity: Option<Capacity>,
}

impl SiteRaw {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.lon.is_finite() && self.lat.is_finite(),
            "Invalid coordinates for site {}",
            self.id
        );
        ensure!(
            self.capacity.is_finite() && self.capacity >= Capacity(0.0),
            "Invalid capacity for site {} ({}). Must be >=0.",
            self.id,
            self.capacity
        );
        if let Some(existing) = self.existing_capacity {
            ensure!(
                existing.is_finite() && existing >= Capacity(0.0),
                "Invalid existing capacity for site {} ({existing}). Must be >=0.",
                self.id
            );
        }

        Ok(())
    }
}

/// Read candidate sites from the model directory.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// A map of sites, in input order.
pub fn read_sites(model_dir: &Path) -> Result<SiteMap> {
    let file_path = model_dir.join(SITES_FILE_NAME);
    let sites_csv = read_csv(&file_path)?;
    read_sites_from_iter(sites_csv).with_context(|| input_err_msg(&file_path))
}

fn read_sites_from_iter<I>(iter: I) -> Result<SiteMap>
where
    I: Iterator<Item = SiteRaw>,
{
    let mut sites = SiteMap::new();
    for record in iter {
        record.validate()?;

        let site = Site {
            id: record.id.clone(),
            region_id: record.region,
            technology: record.technology,
            lon: record.lon,
            lat: record.lat,
            capacity: record.capacity,
            existing_capacity: record.existing_capacity.unwrap_or_default(),
        };
        ensure!(
            sites.insert(record.id.clone(), site).is_none(),
            "Duplicate site ID {}",
            record.id
        );
    }

    Ok(sites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, site};
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn site_raw(id: &str, capacity: f64) -> SiteRaw {
        SiteRaw {
            id: id.into(),
            region: "BE".into(),
            technology: "wind_offshore".into(),
            lon: 2.5,
            lat: 51.5,
            capacity: Capacity(capacity),
            existing_capacity: None,
        }
    }

    #[test]
    fn test_read_sites() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(SITES_FILE_NAME)).unwrap();
            writeln!(
                file,
                "id,region,technology,lon,lat,capacity,existing_capacity
s1,BE,wind_offshore,2.5,51.5,1.0,
s2,NL,wind_offshore,4.0,52.0,2.0,0.5"
            )
            .unwrap();
        }

        let sites = read_sites(dir.path()).unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites["s1"], site("s1", "BE", 1.0, 2.5, 51.5));
        assert_eq!(sites["s2"].region_id, "NL".into());
        assert_eq!(sites["s2"].existing_capacity, Capacity(0.5));
    }

    #[test]
    fn test_read_sites_from_iter_duplicate() {
        let iter = [site_raw("s1", 1.0), site_raw("s1", 2.0)].into_iter();
        assert_error!(read_sites_from_iter(iter), "Duplicate site ID s1");
    }

    #[test]
    fn test_read_sites_from_iter_invalid_capacity() {
        let iter = [site_raw("s1", -1.0)].into_iter();
        assert_error!(
            read_sites_from_iter(iter),
            "Invalid capacity for site s1 (-1). Must be >=0."
        );

        let mut raw = site_raw("s1", 1.0);
        raw.existing_capacity = Some(Capacity(f64::NAN));
        assert!(read_sites_from_iter([raw].into_iter()).is_err());

        let mut raw = site_raw("s1", 1.0);
        raw.lat = f64::INFINITY;
        assert!(read_sites_from_iter([raw].into_iter()).is_err());
    }
}
