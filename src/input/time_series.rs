//! Code for reading capacity factor and load time series.
use super::*;
use crate::site::{SiteID, SiteMap};
use crate::time_series::RawTimeSeries;
use anyhow::ensure;
use indexmap::IndexMap;
use serde::Deserialize;

const CAPACITY_FACTORS_FILE_NAME: &str = "capacity_factors.csv";
const LOAD_FILE_NAME: &str = "load.csv";
const TIMESTAMP_COLUMN: &str = "timestamp";

#[derive(PartialEq, Debug, Deserialize)]
struct LoadRaw {
    #[serde(deserialize_with = "deserialise_timestamp")]
    timestamp: NaiveDateTime,
    load: Option<f64>,
}

/// Capacity factors in wide format: one column per site
#[derive(Debug)]
struct CapacityFactors {
    timestamps: Vec<NaiveDateTime>,
    sites: IndexMap<SiteID, Vec<f64>>,
}

/// Read the capacity factor and load series from the model directory.
///
/// Both files must share the same time axis. Missing values are stored as NaN.
pub fn read_time_series(model_dir: &Path, sites: &SiteMap) -> Result<RawTimeSeries> {
    let file_path = model_dir.join(CAPACITY_FACTORS_FILE_NAME);
    let capacity_factors = read_capacity_factors(&file_path, sites)
        .with_context(|| input_err_msg(&file_path))?;

    let file_path = model_dir.join(LOAD_FILE_NAME);
    let load_csv = read_csv(&file_path)?;
    let load = read_load_from_iter(load_csv, &capacity_factors.timestamps)
        .with_context(|| input_err_msg(&file_path))?;

    Ok(RawTimeSeries {
        timestamps: capacity_factors.timestamps,
        sites: capacity_factors.sites,
        load,
    })
}

/// Read a wide-format capacity factors file
fn read_capacity_factors(file_path: &Path, sites: &SiteMap) -> Result<CapacityFactors> {
    let mut reader = csv::Reader::from_path(file_path)?;
    read_capacity_factors_from_reader(&mut reader, sites)
}

fn read_capacity_factors_from_reader<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    sites: &SiteMap,
) -> Result<CapacityFactors> {
    let headers = reader.headers()?.clone();
    ensure!(
        headers.get(0).map(str::trim) == Some(TIMESTAMP_COLUMN),
        "First column must be '{TIMESTAMP_COLUMN}'"
    );

    let mut site_columns: IndexMap<SiteID, Vec<f64>> = IndexMap::new();
    for header in headers.iter().skip(1) {
        let (id, _) = sites
            .get_key_value(header.trim())
            .with_context(|| format!("Unknown site {header} in header"))?;
        ensure!(
            site_columns.insert(id.clone(), Vec::new()).is_none(),
            "Duplicate column for site {id}"
        );
    }

    let mut timestamps = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        ensure!(
            record.len() == headers.len(),
            "Row {} has {} fields, expected {}",
            row + 1,
            record.len(),
            headers.len()
        );
        timestamps.push(parse_timestamp(&record[0])?);
        for (values, field) in site_columns.values_mut().zip(record.iter().skip(1)) {
            values.push(parse_capacity_factor(field)?);
        }
    }
    ensure!(!timestamps.is_empty(), "CSV file cannot be empty");

    Ok(CapacityFactors {
        timestamps,
        sites: site_columns,
    })
}

/// Parse one capacity factor. An empty field is a missing value.
fn parse_capacity_factor(field: &str) -> Result<f64> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(f64::NAN);
    }

    let value: f64 = field
        .parse()
        .with_context(|| format!("Invalid capacity factor '{field}'"))?;
    ensure!(
        (0.0..=1.0).contains(&value),
        "Capacity factor {value} is not between 0 and 1"
    );

    Ok(value)
}

fn read_load_from_iter<I>(iter: I, timestamps: &[NaiveDateTime]) -> Result<Vec<f64>>
where
    I: Iterator<Item = LoadRaw>,
{
    let load = iter.collect_vec();
    ensure!(
        load.len() == timestamps.len()
            && load.iter().zip(timestamps).all(|(l, t)| l.timestamp == *t),
        "Timestamps must match those in {CAPACITY_FACTORS_FILE_NAME}"
    );

    load.into_iter()
        .map(|LoadRaw { timestamp, load }| {
            let Some(load) = load else {
                return Ok(f64::NAN);
            };
            ensure!(
                load.is_finite() && load >= 0.0,
                "Invalid load at {timestamp} ({load}). Must be >=0."
            );
            Ok(load)
        })
        .collect()
}
