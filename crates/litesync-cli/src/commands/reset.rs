use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::Confirm;
use litesync_config::SyncConfig;
use litesync_pg::{connect_postgres, drop_shard};
use litesync_replica::remove_replica_files;

pub async fn cmd_reset(config: SyncConfig, upstream: bool, yes: bool) -> Result<()> {
    let path = config.replica_path()?;

    let removed = remove_replica_files(&path)
        .with_context(|| format!("Failed to remove {}", path.display()))?;
    if removed.is_empty() {
        println!("No replica files at {}", path.display());
    }
    for file in removed {
        println!("  ✓ Removed {}", file.display());
    }

    if !upstream {
        return Ok(());
    }

    let shard = config.to_shard_config();
    println!();
    println!("{}", "WARNING: Dangerous Operation".red().bold());
    println!("This drops upstream:");
    println!("  • schema {} and its replica registrations", shard.schema());
    println!(
        "  • publications {} and {}",
        shard.metadata_publication(),
        shard.default_publication()
    );
    println!("  • every replication slot named {}<millis>", shard.slot_prefix());
    println!();

    let confirmed = yes
        || Confirm::new()
            .with_prompt("Drop the shard upstream?")
            .default(false)
            .interact()?;
    if !confirmed {
        println!("Aborting.");
        return Ok(());
    }

    let conn = connect_postgres(&config.connection_string()?)
        .await
        .context("Failed to connect to Postgres")?;
    let slots = drop_shard(&conn, &shard)
        .await
        .context("Failed to drop shard")?;

    println!("  ✓ Dropped schema {}", shard.schema());
    for slot in slots {
        println!("  ✓ Dropped slot {}", slot);
    }
    println!("\n{}", "Shard reset.".green());
    Ok(())
}
