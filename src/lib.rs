//! Common functionality for resite, a tool for selecting renewable generation sites which minimise
//! resource criticality.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod criticality;
pub mod error;
pub mod formulation;
pub mod id;
pub mod input;
pub mod log;
pub mod model;
pub mod output;
pub mod problem;
pub mod region;
pub mod result;
pub mod settings;
pub mod site;
pub mod siting;
pub mod solver;
pub mod time_series;
pub mod units;

#[cfg(test)]
mod fixture;

/// Get config dir for program.
///
/// On Linux this is `$HOME/.config/resite`.
pub fn get_resite_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        panic!("Couldn't get user's config directory")
    };
    config_dir.push("resite");

    config_dir
}
