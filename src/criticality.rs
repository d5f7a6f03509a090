//! Code for calculating the criticality index of candidate sites.
//!
//! A site's capacity-factor series is smoothed over windows of `delta` consecutive timestamps,
//! normalised, and compared against a reference derived from the demand series (alpha). The
//! reference is rescaled against its own maximum or (min, max) range, depending on the norm type.
//! The resulting score for each (site, window) pair is in [0, 1]: zero when the site covers the
//! reference in that window and one when it produces nothing.
use crate::error::ResiteError;
use crate::model::CriticalityParameters;
use crate::site::SiteID;
use crate::time_series::TimeSeriesStore;
use anyhow::{Context, Result, ensure};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use serde::de::Error;
use serde::{Deserialize, Deserializer};
use serde_string_enum::DeserializeLabeledStringEnum;
use std::fmt::Display;
use std::str::FromStr;

/// How the values within a window are collapsed into one score
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmoothMeasure {
    /// Arithmetic mean
    Mean,
    /// Median (the mean of the two middle values for windows of even length)
    Median,
    /// The given percentile (0-100), linearly interpolated between closest ranks
    Percentile(f64),
}

impl SmoothMeasure {
    /// Collapse the values of one window into a single value
    fn apply(self, window: &[f64]) -> f64 {
        match self {
            Self::Mean => window.iter().sum::<f64>() / window.len() as f64,
            Self::Median => percentile(window, 50.0),
            Self::Percentile(p) => percentile(window, p),
        }
    }
}

impl FromStr for SmoothMeasure {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            "mean" => return Ok(Self::Mean),
            "median" => return Ok(Self::Median),
            _ => {}
        }

        let p = s
            .strip_prefix("percentile(")
            .and_then(|rest| rest.strip_suffix(')'))
            .with_context(|| {
                format!(
                    "Invalid smoothing measure '{s}': should be mean, median or percentile(p)"
                )
            })?;
        let p: f64 = p
            .trim()
            .parse()
            .with_context(|| format!("Invalid percentile in '{s}'"))?;
        ensure!(
            (0.0..=100.0).contains(&p),
            "Percentile must be between 0 and 100"
        );

        Ok(Self::Percentile(p))
    }
}

impl Display for SmoothMeasure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mean => write!(f, "mean"),
            Self::Median => write!(f, "median"),
            Self::Percentile(p) => write!(f, "percentile({p})"),
        }
    }
}

impl<'de> Deserialize<'de> for SmoothMeasure {
    fn deserialize<D>(deserialiser: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserialiser)?;
        s.parse().map_err(|err: anyhow::Error| D::Error::custom(err))
    }
}

/// How smoothed site values are rescaled into [0, 1]
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq)]
pub enum NormType {
    /// Divide by the maximum
    #[string = "max"]
    Max,
    /// Map the (min, max) range onto [0, 1]
    #[string = "minmax"]
    MinMax,
}

/// Which reference value is used as the denominator for each window
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq)]
pub enum AlphaPolicy {
    /// A single central estimate of the load, shared by all windows
    #[string = "load_central"]
    LoadCentral,
    /// The load in each window
    #[string = "load_partition"]
    LoadPartition,
}

/// How windows are laid over the time axis
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Default)]
pub enum Windowing {
    /// Windows start at every timestamp
    #[default]
    #[string = "sliding"]
    Sliding,
    /// Consecutive windows do not share timestamps
    #[string = "non_overlapping"]
    NonOverlapping,
}

/// Criticality scores for a set of sites over a common set of windows
#[derive(Debug, PartialEq)]
pub struct CriticalityIndex {
    window_starts: Vec<NaiveDateTime>,
    /// Smoothed capacity factors for each site, before normalisation
    window_values: IndexMap<SiteID, Vec<f64>>,
    scores: IndexMap<SiteID, Vec<f64>>,
    /// Smoothed reference load
    reference: Vec<f64>,
    alpha: Vec<f64>,
}

impl CriticalityIndex {
    /// Calculate the criticality index for the given sites.
    ///
    /// # Arguments
    ///
    /// * `store` - Time series for sites and the reference load
    /// * `site_ids` - The sites to include
    /// * `params` - Windowing, smoothing and normalisation parameters
    pub fn build<'a, I>(
        store: &TimeSeriesStore,
        site_ids: I,
        params: &CriticalityParameters,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = &'a SiteID>,
    {
        let window = |values: &[f64]| {
            compute_window_values(values, params.delta, params.smooth_measure, params.windowing)
        };

        let reference = window(store.reference()?)?;
        let alpha = alpha_values(
            &normalise_reference(&reference, params.norm_type)?,
            params.alpha,
        );

        let mut window_values = IndexMap::new();
        let mut scores = IndexMap::new();
        for site_id in site_ids {
            let values = window(store.values(site_id)?)?;
            let normalised = normalise(&values, params.norm_type);
            scores.insert(site_id.clone(), criticality_scores(&normalised, &alpha)?);
            window_values.insert(site_id.clone(), values);
        }

        let step = window_step(params.delta, params.windowing);
        let window_starts = store
            .timestamps()
            .iter()
            .step_by(step)
            .take(reference.len())
            .copied()
            .collect();

        debug!(
            "Calculated criticality for {} sites over {} windows",
            scores.len(),
            reference.len()
        );

        Ok(Self {
            window_starts,
            window_values,
            scores,
            reference,
            alpha,
        })
    }

    /// The number of windows
    pub fn n_windows(&self) -> usize {
        self.reference.len()
    }

    /// The timestamp at which each window starts
    pub fn window_starts(&self) -> &[NaiveDateTime] {
        &self.window_starts
    }

    /// The criticality scores for a site, one per window
    pub fn scores(&self, site_id: &SiteID) -> Option<&[f64]> {
        self.scores.get(site_id).map(Vec::as_slice)
    }

    /// Iterate over the scores for all sites
    pub fn iter_scores(&self) -> impl Iterator<Item = (&SiteID, &[f64])> {
        self.scores.iter().map(|(id, s)| (id, s.as_slice()))
    }

    /// The smoothed (unnormalised) capacity factors for a site, one per window
    pub fn window_values(&self, site_id: &SiteID) -> Option<&[f64]> {
        self.window_values.get(site_id).map(Vec::as_slice)
    }

    /// The smoothed reference load, one value per window
    pub fn reference(&self) -> &[f64] {
        &self.reference
    }

    /// The alpha value used for each window
    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }
}

/// The offset between the starts of consecutive windows
fn window_step(delta: usize, windowing: Windowing) -> usize {
    match windowing {
        Windowing::Sliding => 1,
        Windowing::NonOverlapping => delta,
    }
}

/// Smooth a series over windows of `delta` consecutive values.
///
/// # Returns
///
/// One value per window, in time order.
pub fn compute_window_values(
    values: &[f64],
    delta: usize,
    measure: SmoothMeasure,
    windowing: Windowing,
) -> Result<Vec<f64>> {
    ensure!(delta > 0, "Window length must be at least one");
    ensure!(
        delta <= values.len(),
        "Window length ({delta}) exceeds the number of timestamps ({})",
        values.len()
    );

    let step = window_step(delta, windowing);
    Ok((0..=values.len() - delta)
        .step_by(step)
        .map(|start| measure.apply(&values[start..start + delta]))
        .collect())
}

/// Percentile of a set of values using linear interpolation between closest ranks
fn percentile(values: &[f64], p: f64) -> f64 {
    let sorted = values.iter().copied().sorted_by(f64::total_cmp).collect_vec();
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let (lo, hi) = (rank.floor() as usize, rank.ceil() as usize);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// The smallest and largest of a set of values
fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .copied()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

/// Rescale smoothed site values into [0, 1].
///
/// A series of zeros stays at zero. A constant non-zero series has no range, so under
/// [`NormType::MinMax`] it is scaled by its maximum instead.
pub fn normalise(values: &[f64], norm_type: NormType) -> Vec<f64> {
    let (min, max) = min_max(values);
    if values.is_empty() || max <= 0.0 {
        return vec![0.0; values.len()];
    }

    match norm_type {
        NormType::MinMax if max > min => values.iter().map(|v| (v - min) / (max - min)).collect(),
        _ => values.iter().map(|v| (v / max).max(0.0)).collect(),
    }
}

/// Rescale the smoothed reference load into [0, 1] against its maximum ([`NormType::Max`]) or
/// its (min, max) range ([`NormType::MinMax`]).
///
/// Fails with [`ResiteError::DegenerateNormalization`] if the maximum or the range is zero.
pub fn normalise_reference(reference: &[f64], norm_type: NormType) -> Result<Vec<f64>> {
    let (min, max) = min_max(reference);
    let (offset, range) = match norm_type {
        NormType::Max => (0.0, max),
        NormType::MinMax => (min, max - min),
    };
    if reference.is_empty() || range.is_nan() || range <= 0.0 {
        Err(ResiteError::DegenerateNormalization { window: 0 })?;
    }

    Ok(reference
        .iter()
        .map(|l| ((l - offset) / range).max(0.0))
        .collect())
}

/// Calculate the alpha value for each window from the normalised reference load
pub fn alpha_values(reference: &[f64], policy: AlphaPolicy) -> Vec<f64> {
    match policy {
        AlphaPolicy::LoadPartition => reference.to_vec(),
        AlphaPolicy::LoadCentral => {
            let central = reference.iter().sum::<f64>() / reference.len() as f64;
            vec![central; reference.len()]
        }
    }
}

/// Calculate criticality scores from normalised window values and alpha.
///
/// Fails with [`ResiteError::DegenerateNormalization`] if alpha is zero for any window.
pub fn criticality_scores(normalised: &[f64], alpha: &[f64]) -> Result<Vec<f64>> {
    assert_eq!(normalised.len(), alpha.len(), "Misaligned windows");

    normalised
        .iter()
        .zip(alpha)
        .enumerate()
        .map(|(window, (value, alpha))| {
            if *alpha <= 0.0 {
                Err(ResiteError::DegenerateNormalization { window })?;
            }

            Ok(1.0 - (value / alpha).min(1.0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, criticality_parameters, store_from_series};
    use float_cmp::assert_approx_eq;
    use itertools::assert_equal;
    use rstest::rstest;

    fn assert_all_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert_approx_eq!(f64, *a, *e, epsilon = 1e-12);
        }
    }

    #[rstest]
    #[case("mean", SmoothMeasure::Mean)]
    #[case(" median ", SmoothMeasure::Median)]
    #[case("percentile(90)", SmoothMeasure::Percentile(90.0))]
    #[case("percentile( 2.5 )", SmoothMeasure::Percentile(2.5))]
    fn test_smooth_measure_from_str(#[case] s: &str, #[case] expected: SmoothMeasure) {
        assert_eq!(s.parse::<SmoothMeasure>().unwrap(), expected);
    }

    #[rstest]
    #[case("mode")]
    #[case("percentile(101)")]
    #[case("percentile(x)")]
    #[case("percentile(50")]
    fn test_smooth_measure_from_str_invalid(#[case] s: &str) {
        assert!(s.parse::<SmoothMeasure>().is_err());
    }

    #[rstest]
    #[case(SmoothMeasure::Mean, 2.5)]
    #[case(SmoothMeasure::Median, 2.5)]
    #[case(SmoothMeasure::Percentile(0.0), 1.0)]
    #[case(SmoothMeasure::Percentile(100.0), 4.0)]
    #[case(SmoothMeasure::Percentile(25.0), 1.75)]
    fn test_smooth_measure_apply(#[case] measure: SmoothMeasure, #[case] expected: f64) {
        assert_approx_eq!(f64, measure.apply(&[4.0, 1.0, 3.0, 2.0]), expected);
    }

    #[test]
    fn test_compute_window_values_sliding() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let windows =
            compute_window_values(&values, 2, SmoothMeasure::Mean, Windowing::Sliding).unwrap();
        assert_all_close(&windows, &[1.5, 2.5, 3.5, 4.5]);

        let windows =
            compute_window_values(&values, 1, SmoothMeasure::Mean, Windowing::Sliding).unwrap();
        assert_all_close(&windows, &values);
    }

    #[test]
    fn test_compute_window_values_non_overlapping() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let windows =
            compute_window_values(&values, 2, SmoothMeasure::Median, Windowing::NonOverlapping)
                .unwrap();
        assert_all_close(&windows, &[1.5, 3.5]);
    }

    #[test]
    fn test_compute_window_values_invalid_delta() {
        let values = [1.0, 2.0];
        assert_error!(
            compute_window_values(&values, 0, SmoothMeasure::Mean, Windowing::Sliding),
            "Window length must be at least one"
        );
        assert_error!(
            compute_window_values(&values, 3, SmoothMeasure::Mean, Windowing::Sliding),
            "Window length (3) exceeds the number of timestamps (2)"
        );
    }

    #[rstest]
    #[case(NormType::Max, &[0.0, 0.25, 0.5, 1.0])]
    #[case(NormType::MinMax, &[0.0, 0.25, 0.5, 1.0])]
    fn test_normalise_from_zero(#[case] norm_type: NormType, #[case] expected: &[f64]) {
        assert_all_close(&normalise(&[0.0, 0.1, 0.2, 0.4], norm_type), expected);
    }

    #[test]
    fn test_normalise_offset() {
        let values = [0.2, 0.3, 0.4];
        assert_all_close(&normalise(&values, NormType::Max), &[0.5, 0.75, 1.0]);
        assert_all_close(&normalise(&values, NormType::MinMax), &[0.0, 0.5, 1.0]);
    }

    #[rstest]
    #[case(NormType::Max)]
    #[case(NormType::MinMax)]
    fn test_normalise_degenerate_series(#[case] norm_type: NormType) {
        assert_all_close(&normalise(&[0.0, 0.0], norm_type), &[0.0, 0.0]);
        assert_all_close(&normalise(&[0.5, 0.5], norm_type), &[1.0, 1.0]);
        assert!(normalise(&[], norm_type).is_empty());
    }

    #[test]
    fn test_normalise_reference() {
        let reference = [2.0, 4.0, 1.0, 1.0];
        assert_all_close(
            &normalise_reference(&reference, NormType::Max).unwrap(),
            &[0.5, 1.0, 0.25, 0.25],
        );
        assert_all_close(
            &normalise_reference(&reference, NormType::MinMax).unwrap(),
            &[1.0 / 3.0, 1.0, 0.0, 0.0],
        );
    }

    #[rstest]
    #[case(NormType::Max, &[0.0, 0.0])]
    #[case(NormType::MinMax, &[0.0, 0.0])]
    #[case(NormType::MinMax, &[2.0, 2.0])]
    #[case(NormType::Max, &[])]
    fn test_normalise_reference_degenerate(#[case] norm_type: NormType, #[case] reference: &[f64]) {
        let err = normalise_reference(reference, norm_type).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ResiteError>(),
            Some(&ResiteError::DegenerateNormalization { window: 0 })
        );
    }

    #[test]
    fn test_alpha_values() {
        let reference = [0.5, 1.0, 0.25, 0.25];
        assert_all_close(
            &alpha_values(&reference, AlphaPolicy::LoadPartition),
            &reference,
        );
        assert_all_close(&alpha_values(&reference, AlphaPolicy::LoadCentral), &[0.5; 4]);
    }

    #[test]
    fn test_criticality_scores() {
        let scores = criticality_scores(&[0.0, 0.25, 0.5, 1.0], &[0.5; 4]).unwrap();
        assert_all_close(&scores, &[1.0, 0.5, 0.0, 0.0]);

        let err = criticality_scores(&[0.5, 0.5], &[0.5, 0.0]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ResiteError>(),
            Some(&ResiteError::DegenerateNormalization { window: 1 })
        );
    }

    #[rstest]
    #[case(NormType::Max, AlphaPolicy::LoadCentral, 1)]
    #[case(NormType::Max, AlphaPolicy::LoadPartition, 3)]
    #[case(NormType::MinMax, AlphaPolicy::LoadCentral, 1)]
    #[case(NormType::MinMax, AlphaPolicy::LoadCentral, 2)]
    fn test_index_scores_in_unit_interval(
        #[case] norm_type: NormType,
        #[case] alpha: AlphaPolicy,
        #[case] delta: usize,
    ) {
        let store = store_from_series(
            &[
                ("s1", &[0.1, 0.9, 0.4, 0.0, 0.7, 0.3]),
                ("s2", &[0.8, 0.2, 0.6, 0.5, 0.1, 0.9]),
            ],
            &[3.0, 5.0, 2.0, 4.0, 6.0, 1.0],
        );
        let mut params = criticality_parameters();
        params.norm_type = norm_type;
        params.alpha = alpha;
        params.delta = delta;

        let index = CriticalityIndex::build(&store, store.site_ids(), &params).unwrap();
        assert_eq!(index.n_windows(), 7 - delta);
        assert_eq!(index.window_starts().len(), index.n_windows());
        for (_, scores) in index.iter_scores() {
            assert_eq!(scores.len(), index.n_windows());
            assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
        }
    }

    #[test]
    fn test_index_zero_reference_minmax() {
        let store = store_from_series(&[("s1", &[0.5, 0.4, 0.3, 0.2])], &[2.0, 3.0, 0.0, 1.0]);
        let mut params = criticality_parameters();
        params.norm_type = NormType::MinMax;
        params.alpha = AlphaPolicy::LoadPartition;

        let err = CriticalityIndex::build(&store, store.site_ids(), &params).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ResiteError>(),
            Some(&ResiteError::DegenerateNormalization { window: 2 })
        );

        // A central estimate does not use the zero as a denominator
        params.alpha = AlphaPolicy::LoadCentral;
        assert!(CriticalityIndex::build(&store, store.site_ids(), &params).is_ok());
    }

    #[test]
    fn test_index_minmax_positive_reference() {
        // The reference never reaches zero, but its smallest window maps to zero under minmax
        let store = store_from_series(&[("s1", &[0.5, 0.4, 0.3, 0.2])], &[3.0, 5.0, 2.0, 4.0]);
        let mut params = criticality_parameters();
        params.norm_type = NormType::MinMax;
        params.alpha = AlphaPolicy::LoadPartition;

        let err = CriticalityIndex::build(&store, store.site_ids(), &params).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ResiteError>(),
            Some(&ResiteError::DegenerateNormalization { window: 2 })
        );

        // Per-unit reference is [1/3, 1, 0, 2/3], so the central estimate is 0.5
        params.alpha = AlphaPolicy::LoadCentral;
        let index = CriticalityIndex::build(&store, store.site_ids(), &params).unwrap();
        assert_all_close(index.alpha(), &[0.5; 4]);
        // Site values normalise to [1, 2/3, 1/3, 0]
        assert_all_close(
            index.scores(&"s1".into()).unwrap(),
            &[0.0, 0.0, 1.0 / 3.0, 1.0],
        );

        // Under max, the same reference gives a different central estimate
        params.norm_type = NormType::Max;
        let index = CriticalityIndex::build(&store, store.site_ids(), &params).unwrap();
        assert_all_close(index.alpha(), &[0.7; 4]);
    }

    #[test]
    fn test_index_flat_sites_equal_scores() {
        let store = store_from_series(
            &[("s1", &[0.5; 4]), ("s2", &[0.5; 4]), ("s3", &[0.5; 4])],
            &[1.0, 2.0, 3.0, 4.0],
        );
        let index =
            CriticalityIndex::build(&store, store.site_ids(), &criticality_parameters()).unwrap();
        let first = index.scores(&"s1".into()).unwrap().to_vec();
        assert_equal(
            index.iter_scores().map(|(_, s)| s.to_vec()),
            [first.clone(), first.clone(), first],
        );
        assert_all_close(index.window_values(&"s2".into()).unwrap(), &[0.5; 4]);
        assert_all_close(index.reference(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_index_missing_site() {
        let store = store_from_series(&[("s1", &[0.5; 4])], &[1.0; 4]);
        let err = CriticalityIndex::build(&store, [&"s9".into()], &criticality_parameters())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResiteError>(),
            Some(ResiteError::DataGap { .. })
        ));
    }
}
