//! CLI command handlers. Each command is in its own file.

mod completions;
mod queue;
mod run;
mod status;

use anyhow::{Context, Result};
use stallwatch_core::config::ClientConfig;
use stallwatch_core::transfer_client::QbitClient;

pub use completions::{run_completions, run_man};
pub use queue::run_queue;
pub use run::run_watchdog;
pub use status::run_status;

/// Log in to the download client, retrying while it starts up.
/// Exhausting the retries is fatal to the caller.
pub(crate) async fn connect_client(cfg: &ClientConfig) -> Result<QbitClient> {
    let cfg = cfg.clone();
    tokio::task::spawn_blocking(move || -> Result<QbitClient> {
        let mut client = QbitClient::new(&cfg).context("invalid download client URL")?;
        client
            .connect()
            .with_context(|| format!("authenticating with download client at {}", cfg.url))?;
        Ok(client)
    })
    .await?
}
