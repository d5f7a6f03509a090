//! Storage for the capacity-factor and reference load time series used in a run.
//!
//! All series share one time axis. The store clips them to the configured time slice and resamples
//! them to the configured resolution when it is constructed, after which it is read-only.
use crate::error::ResiteError;
use crate::model::TimeSliceParameters;
use crate::site::SiteID;
use anyhow::{Context, Result, ensure};
use chrono::{NaiveDateTime, TimeDelta};
use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;

/// Name used for the reference load in error messages
const REFERENCE_SERIES_NAME: &str = "reference load";

/// Time series as read from input files, before clipping and resampling
#[derive(Debug, Clone, PartialEq)]
pub struct RawTimeSeries {
    /// The shared time axis
    pub timestamps: Vec<NaiveDateTime>,
    /// Capacity factors for each site, aligned with `timestamps`. Missing values are NaN.
    pub sites: IndexMap<SiteID, Vec<f64>>,
    /// The reference demand, aligned with `timestamps`
    pub load: Vec<f64>,
}

/// Read-only, aligned time series for the configured time slice and resolution
#[derive(Debug, PartialEq)]
pub struct TimeSeriesStore {
    timestamps: Vec<NaiveDateTime>,
    sites: IndexMap<SiteID, Vec<f64>>,
    reference: Vec<f64>,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

/// Check that a time axis is strictly increasing with a constant step.
///
/// # Returns
///
/// The step between consecutive timestamps, or `None` if there are fewer than two timestamps.
pub fn validate_time_axis(timestamps: &[NaiveDateTime]) -> Result<Option<TimeDelta>> {
    ensure!(!timestamps.is_empty(), "Time axis is empty");

    let mut steps = timestamps.iter().tuple_windows().map(|(a, b)| *b - *a);
    let Some(step) = steps.next() else {
        return Ok(None);
    };
    ensure!(step > TimeDelta::zero(), "Time axis must be strictly increasing");
    for (i, other) in steps.enumerate() {
        ensure!(
            other > TimeDelta::zero(),
            "Time axis must be strictly increasing (at {})",
            timestamps[i + 2]
        );
        ensure!(
            other == step,
            "Time axis must have a constant step (at {})",
            timestamps[i + 2]
        );
    }

    Ok(Some(step))
}

impl TimeSeriesStore {
    /// Create a store by clipping and resampling raw series.
    ///
    /// # Arguments
    ///
    /// * `raw` - The series as read from file
    /// * `slice` - The time slice and resolution to use
    pub fn new(raw: RawTimeSeries, slice: &TimeSliceParameters) -> Result<Self> {
        let step = validate_time_axis(&raw.timestamps)?;
        let n = raw.timestamps.len();
        ensure!(
            raw.load.len() == n,
            "Reference load has {} values but the time axis has {n}",
            raw.load.len()
        );
        for (id, values) in &raw.sites {
            ensure!(
                values.len() == n,
                "Series for site {id} has {} values but the time axis has {n}",
                values.len()
            );
        }

        let block = resampling_block_size(step, slice.resolution)?;
        let range = clip_range(&raw.timestamps, slice.start, slice.end).ok_or_else(|| {
            ResiteError::DataGap {
                series: REFERENCE_SERIES_NAME.into(),
                start: slice.start.to_string(),
                end: slice.end.to_string(),
            }
        })?;
        debug!(
            "Clipping time series to {} timestamps and resampling in blocks of {block}",
            range.len()
        );

        let timestamps = raw.timestamps[range.clone()]
            .iter()
            .step_by(block)
            .take(range.len() / block)
            .copied()
            .collect_vec();
        let sites = raw
            .sites
            .into_iter()
            .map(|(id, values)| (id, resample(&values[range.clone()], block)))
            .collect();
        let reference = resample(&raw.load[range], block);

        Ok(Self {
            timestamps,
            sites,
            reference,
            start: slice.start,
            end: slice.end,
        })
    }

    /// The shared (clipped and resampled) time axis
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// The number of timestamps on the axis
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the axis has no timestamps
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Iterate over the IDs of the sites with series in the store
    pub fn site_ids(&self) -> impl Iterator<Item = &SiteID> {
        self.sites.keys()
    }

    /// Get the values of the capacity-factor series for a site.
    ///
    /// Fails with [`ResiteError::DataGap`] if the site has no series or its series has missing
    /// values within the time slice.
    pub fn values(&self, site_id: &SiteID) -> Result<&[f64]> {
        let values = self
            .sites
            .get(site_id)
            .filter(|values| values.iter().all(|v| v.is_finite()))
            .ok_or_else(|| self.data_gap(site_id.to_string()))?;

        Ok(values)
    }

    /// Get the capacity-factor series for a site as `(timestamp, value)` pairs
    pub fn series(&self, site_id: &SiteID) -> Result<Vec<(NaiveDateTime, f64)>> {
        let values = self.values(site_id)?;
        Ok(self
            .timestamps
            .iter()
            .copied()
            .zip(values.iter().copied())
            .collect())
    }

    /// Get the reference load series
    pub fn reference(&self) -> Result<&[f64]> {
        ensure_complete(&self.reference)
            .then_some(self.reference.as_slice())
            .ok_or_else(|| self.data_gap(REFERENCE_SERIES_NAME.into()).into())
    }

    fn data_gap(&self, series: String) -> ResiteError {
        ResiteError::DataGap {
            series,
            start: self.start.to_string(),
            end: self.end.to_string(),
        }
    }
}

/// Whether every value in the series is present
fn ensure_complete(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Get the number of raw steps which make up one step at the given resolution (in hours)
fn resampling_block_size(step: Option<TimeDelta>, resolution: u32) -> Result<usize> {
    ensure!(resolution > 0, "Resolution must be at least one hour");
    let resolution = TimeDelta::hours(resolution.into());
    let Some(step) = step else {
        return Ok(1);
    };

    let (step, resolution) = (step.num_seconds(), resolution.num_seconds());
    ensure!(
        resolution >= step && resolution % step == 0,
        "Resolution must be a multiple of the input time step ({step}s)"
    );

    usize::try_from(resolution / step).context("Invalid resolution")
}

/// Get the range of indices of `timestamps` within `[start, end]`.
///
/// Returns `None` if the axis does not cover the whole slice.
fn clip_range(
    timestamps: &[NaiveDateTime],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Option<std::ops::Range<usize>> {
    let (first, last) = (timestamps.first()?, timestamps.last()?);
    if *first > start || *last < end {
        return None;
    }

    let lo = timestamps.partition_point(|t| *t < start);
    let hi = timestamps.partition_point(|t| *t <= end);
    (lo < hi).then_some(lo..hi)
}

/// Average consecutive blocks of values, dropping an incomplete trailing block
fn resample(values: &[f64], block: usize) -> Vec<f64> {
    values
        .chunks_exact(block)
        .map(|chunk| chunk.iter().sum::<f64>() / block as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, hourly_timestamps, time_slice};
    use rstest::rstest;

    fn raw_series(n: usize) -> RawTimeSeries {
        let timestamps = hourly_timestamps(n);
        let sites = IndexMap::from([
            ("s1".into(), (0..n).map(|i| i as f64 / 10.0).collect()),
            ("s2".into(), vec![0.5; n]),
        ]);
        RawTimeSeries {
            timestamps,
            sites,
            load: vec![1.0; n],
        }
    }

    #[test]
    fn test_validate_time_axis() {
        let timestamps = hourly_timestamps(3);
        assert_eq!(
            validate_time_axis(&timestamps).unwrap(),
            Some(TimeDelta::hours(1))
        );
        assert_eq!(validate_time_axis(&timestamps[..1]).unwrap(), None);

        let reversed = timestamps.iter().rev().copied().collect_vec();
        assert_error!(
            validate_time_axis(&reversed),
            "Time axis must be strictly increasing"
        );

        let uneven = vec![timestamps[0], timestamps[1], timestamps[1] + TimeDelta::hours(2)];
        assert!(validate_time_axis(&uneven).is_err());
        assert!(validate_time_axis(&[]).is_err());
    }

    #[test]
    fn test_store_clips_to_slice() {
        let raw = raw_series(10);
        let slice = time_slice(&raw.timestamps[2], &raw.timestamps[5], 1);
        let store = TimeSeriesStore::new(raw.clone(), &slice).unwrap();

        assert_eq!(store.timestamps(), &raw.timestamps[2..=5]);
        assert_eq!(store.values(&"s1".into()).unwrap(), &[0.2, 0.3, 0.4, 0.5]);
        assert_eq!(
            store.series(&"s2".into()).unwrap(),
            raw.timestamps[2..=5]
                .iter()
                .map(|t| (*t, 0.5))
                .collect_vec()
        );
    }

    #[test]
    fn test_store_resamples() {
        let raw = raw_series(7);
        let slice = time_slice(&raw.timestamps[0], &raw.timestamps[6], 2);
        let store = TimeSeriesStore::new(raw.clone(), &slice).unwrap();

        // Trailing incomplete block is dropped
        assert_eq!(
            store.timestamps(),
            &[raw.timestamps[0], raw.timestamps[2], raw.timestamps[4]]
        );
        let values = store.values(&"s1".into()).unwrap();
        assert_eq!(values.len(), 3);
        float_cmp::assert_approx_eq!(f64, values[1], 0.25);
    }

    #[rstest]
    #[case(-1, 3)] // slice starts before the data
    #[case(2, 30)] // slice ends after the data
    fn test_store_slice_not_covered(#[case] start_offset: i64, #[case] end_offset: i64) {
        let raw = raw_series(10);
        let slice = TimeSliceParameters {
            start: raw.timestamps[0] + TimeDelta::hours(start_offset),
            end: raw.timestamps[0] + TimeDelta::hours(end_offset),
            resolution: 1,
        };
        let err = TimeSeriesStore::new(raw, &slice).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResiteError>(),
            Some(ResiteError::DataGap { .. })
        ));
    }

    #[test]
    fn test_values_data_gap() {
        let mut raw = raw_series(5);
        raw.sites.get_mut("s2").unwrap()[3] = f64::NAN;
        let slice = time_slice(&raw.timestamps[0], &raw.timestamps[4], 1);
        let store = TimeSeriesStore::new(raw.clone(), &slice).unwrap();

        for site_id in ["s2", "missing"] {
            let err = store.values(&site_id.into()).unwrap_err();
            assert_eq!(
                err.downcast_ref::<ResiteError>(),
                Some(&ResiteError::DataGap {
                    series: site_id.into(),
                    start: raw.timestamps[0].to_string(),
                    end: raw.timestamps[4].to_string(),
                })
            );
        }

        // The gap is outside this slice
        let slice = time_slice(&raw.timestamps[0], &raw.timestamps[2], 1);
        let store = TimeSeriesStore::new(raw, &slice).unwrap();
        assert!(store.values(&"s2".into()).is_ok());
    }

    #[test]
    fn test_mismatched_lengths() {
        let mut raw = raw_series(5);
        raw.load.pop();
        let slice = time_slice(&raw.timestamps[0], &raw.timestamps[3], 1);
        assert_error!(
            TimeSeriesStore::new(raw, &slice),
            "Reference load has 4 values but the time axis has 5"
        );
    }

    #[test]
    fn test_resampling_block_size() {
        let hour = Some(TimeDelta::hours(1));
        assert_eq!(resampling_block_size(hour, 1).unwrap(), 1);
        assert_eq!(resampling_block_size(hour, 3).unwrap(), 3);
        assert_eq!(resampling_block_size(None, 3).unwrap(), 1);
        assert!(resampling_block_size(Some(TimeDelta::hours(2)), 3).is_err());
        assert!(resampling_block_size(hour, 0).is_err());
    }
}
