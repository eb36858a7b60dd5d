//! `stallwatch queue` – dump each owner's queue.

use anyhow::Result;
use stallwatch_core::config::StallwatchConfig;
use stallwatch_core::queue_owner::owners_from_config;

pub async fn run_queue(cfg: StallwatchConfig) -> Result<()> {
    let owners = owners_from_config(&cfg.owners)?;
    if owners.is_empty() {
        println!("No owners configured.");
        return Ok(());
    }
    let queues = tokio::task::spawn_blocking(move || {
        owners
            .into_iter()
            .map(|owner| {
                let queue = owner.fetch_queue();
                (owner.kind(), owner.name().to_string(), queue)
            })
            .collect::<Vec<_>>()
    })
    .await?;

    for (kind, name, queue) in queues {
        println!("{} {}", kind, name);
        match queue {
            Ok(entries) if entries.is_empty() => println!("  (empty)"),
            Ok(entries) => {
                for e in entries {
                    let id = e.id.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string());
                    println!("  {:<8} {}", id, e.download_id.as_deref().unwrap_or("-"));
                }
            }
            Err(e) => println!("  error: {}", e),
        }
    }
    Ok(())
}
