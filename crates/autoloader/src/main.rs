//! Autoloader CLI.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use autoloader::cli::{Cli, execute};
use autoloader::init_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Autoloader failed");
            eprintln!("Autoloader failed: {e}");
            ExitCode::FAILURE
        }
    }
}
