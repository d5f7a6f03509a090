//! The error taxonomy for the site-selection engine.
//!
//! Functions in this crate return [`anyhow::Result`]. Where a failure belongs to one of the
//! categories below, the underlying error is a [`ResiteError`], which callers can recover with
//! [`anyhow::Error::downcast_ref`].
use crate::site::SiteID;
use thiserror::Error;

/// Failures of the site-selection pipeline
#[derive(Debug, Error, PartialEq)]
pub enum ResiteError {
    /// A time series has no data, or missing values, within the configured time slice
    #[error("No complete data for {series} between {start} and {end}")]
    DataGap {
        /// The series concerned (a site ID or the reference load)
        series: String,
        /// Start of the configured time slice
        start: String,
        /// End of the configured time slice
        end: String,
    },
    /// The reference used to normalise criticality is zero
    #[error("Reference value for window {window} is zero; change the alpha policy or norm type")]
    DegenerateNormalization {
        /// The offending window index
        window: usize,
    },
    /// A deployment target cannot be met by the candidate sites
    #[error("Target for {target} cannot be met: {reason}")]
    InfeasibleTarget {
        /// The target concerned (a deployment group or a time window)
        target: String,
        /// Why the target is unreachable
        reason: String,
    },
    /// The exact solver found no feasible selection before its time limit
    #[error("No feasible selection found within the time limit of {time_limit}s")]
    SolverTimeout {
        /// The time limit in seconds
        time_limit: f64,
    },
    /// A solution refers to a site which is not part of any region
    #[error("Solution refers to unknown site {0}")]
    Integrity(SiteID),
}
