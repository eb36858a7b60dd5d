//! CLI for the stallwatch download watchdog.

mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use stallwatch_core::config::{self, StallwatchConfig};

use commands::{run_completions, run_man, run_queue, run_status, run_watchdog};

/// Top-level CLI for the stallwatch watchdog.
#[derive(Debug, Parser)]
#[command(name = "stallwatch")]
#[command(about = "Re-queue stalled torrent downloads in Radarr/Sonarr", long_about = None)]
pub struct Cli {
    /// Log to stderr instead of the state-dir log file (useful in containers).
    #[arg(long, global = true)]
    pub log_stderr: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the watchdog until interrupted.
    Run {
        /// Run a single monitor cycle and exit.
        #[arg(long)]
        once: bool,
    },

    /// Show downloading transfers against the current slow-speed threshold.
    Status,

    /// List the queue of every configured Radarr/Sonarr instance.
    Queue,

    /// Print the path of the configuration file.
    ConfigPath,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },

    /// Render the man page to stdout.
    Man,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            CliCommand::ConfigPath => println!("{}", config::config_path()?.display()),
            CliCommand::Completions { shell } => run_completions(shell, &mut Cli::command()),
            CliCommand::Man => run_man(Cli::command())?,
            CliCommand::Run { once } => run_watchdog(load_config()?, once).await?,
            CliCommand::Status => run_status(&load_config()?).await?,
            CliCommand::Queue => run_queue(load_config()?).await?,
        }
        Ok(())
    }
}

/// Config file plus environment overrides, validated.
fn load_config() -> Result<StallwatchConfig> {
    let mut cfg = config::load_or_init()?;
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg.apply_owner_env(std::env::vars());
    cfg.validate()?;
    tracing::debug!(
        monitor = ?cfg.monitor,
        client = %cfg.client.url,
        owners = cfg.owners.len(),
        "loaded config"
    );
    Ok(cfg)
}

#[cfg(test)]
mod tests;
