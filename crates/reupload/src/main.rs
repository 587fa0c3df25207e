use std::process::ExitCode;

use log::{error, info};

use reupload::config::load_config;
use reupload::worker::{CancellationToken, ShutdownCoordinator};
use reupload::{logging, runner};

/// Exit code for bad arguments, bad configuration or failed startup.
const STARTUP_FAILURE: u8 = 2;

fn main() -> ExitCode {
    if let Err(e) = logging::init() {
        eprintln!("{e}");
        return ExitCode::from(STARTUP_FAILURE);
    }

    let Some(config_path) = std::env::args().nth(1) else {
        eprintln!("Usage: reupload <run-config.json>");
        return ExitCode::from(STARTUP_FAILURE);
    };

    info!("Starting reupload v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(STARTUP_FAILURE);
        }
    };

    let coordinator = ShutdownCoordinator::new(CancellationToken::new());
    if let Err(e) = coordinator.install() {
        error!("{}", e);
        return ExitCode::from(STARTUP_FAILURE);
    }

    match runner::run(&config, coordinator.token().clone()) {
        Ok(outcome) => {
            println!("{}", outcome.summary);
            if let Some(validation) = &outcome.validation {
                println!("{validation}");
            }
            if outcome.interrupted {
                info!("Run interrupted; rerun with \"resume\": true to continue");
            }
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            error!("Run aborted: {}", e);
            ExitCode::from(STARTUP_FAILURE)
        }
    }
}
