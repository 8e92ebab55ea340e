use pagesweep_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    // Fall back to stderr when the state dir is unavailable.
    if let Err(e) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable: {:#}", e);
    }

    if let Err(err) = Cli::run_from_args().await {
        eprintln!("pagesweep error: {:#}", err);
        std::process::exit(1);
    }
}
