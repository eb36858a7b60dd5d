use stallwatch_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // Initialize logging as early as possible; fall back to stderr.
    if cli.log_stderr || logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = cli.run().await {
        tracing::error!("{:#}", err);
        eprintln!("stallwatch error: {:#}", err);
        std::process::exit(1);
    }
}
