//! Provides the main entry point to the program.
use human_panic::{metadata, setup_panic};
use log::error;
use resite::cli::run_cli;
use resite::log::is_logger_initialised;

fn main() {
    setup_panic!(metadata!());

    if let Err(err) = run_cli() {
        if is_logger_initialised() {
            error!("{err:?}");
        } else {
            eprintln!("Error: {err:?}");
        }

        // Terminate program, signalling an error
        std::process::exit(1);
    }
}
