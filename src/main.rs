//! dupesweep entry point.

use clap::Parser;
use dupesweep::cli::Cli;
use dupesweep::config::RunConfig;
use dupesweep::error::ExitCode;
use dupesweep::runner::RunController;
use dupesweep::{logging, signal};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let mut config = match RunConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(ExitCode::ConfigError.as_i32());
        }
    };

    if let Err(e) = config.validate() {
        log::error!("{e}");
        std::process::exit(ExitCode::ConfigError.as_i32());
    }

    let cancel = match signal::install() {
        Ok(token) => token,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(ExitCode::ConfigError.as_i32());
        }
    };

    let controller = RunController::new(config, cancel);
    match controller.run() {
        Ok(outcome) => std::process::exit(outcome.exit.as_i32()),
        Err(e) => {
            log::error!("{e}");
            std::process::exit(e.exit_code().as_i32());
        }
    }
}
