use crate::cli::LongevityCli;
use clap::Parser;

/// Initialise the CLI and logging for the longevity runner.
pub fn init() -> LongevityCli {
    env_logger::init();

    LongevityCli::parse()
}
