//! The exchange server binary.

use std::process::ExitCode;

use tickmatch::config::USAGE;
use tickmatch::{Config, ExchangeServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    let server = match ExchangeServer::bind(&config) {
        Ok(server) => server,
        Err(err) => {
            error!(%err, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = server.shutdown_handle();
    if let Err(err) = ctrlc::set_handler(move || {
        info!("shutdown signal received");
        shutdown.shutdown();
    }) {
        error!(%err, "failed to install signal handler");
        return ExitCode::FAILURE;
    }

    server.run();
    ExitCode::SUCCESS
}
