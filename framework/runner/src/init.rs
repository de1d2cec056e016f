use clap::Parser;

use crate::cli::ScenarioCli;

/// Initialise logging and parse the CLI for a Gust scenario binary.
pub fn init() -> ScenarioCli {
    env_logger::init();

    ScenarioCli::parse()
}
