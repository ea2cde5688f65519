use std::fs;

use anyhow::{Context, Result};
use colored::Colorize;
use litesync_config::SyncConfig;
use litesync_pg::{initial_sync, InitialSyncOptions, SyncError};
use litesync_replica::{remove_replica_files, Replica};
use tracing::info;

pub fn sync_options(config: &SyncConfig) -> InitialSyncOptions {
    InitialSyncOptions {
        table_copy_workers: config.copy.table_copy_workers,
        buffer_limits: config.buffer_limits(),
        ..InitialSyncOptions::default()
    }
}

pub async fn cmd_sync(config: SyncConfig, reset: bool) -> Result<()> {
    let upstream = config.connection_string()?;
    let path = config.replica_path()?;
    let shard = config.to_shard_config();

    if reset {
        for removed in remove_replica_files(&path)? {
            info!(path = %removed.display(), "Removed replica file");
        }
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let replica = Replica::open(&path)
        .with_context(|| format!("Failed to open replica {}", path.display()))?;

    println!(
        "Syncing shard {} into {}...\n",
        shard.schema().as_str().bold(),
        path.display()
    );

    let stats = match initial_sync(&shard, &replica, &upstream, &sync_options(&config)).await {
        Ok(stats) => stats,
        Err(SyncError::AlreadyInitialized(p)) => anyhow::bail!(
            "{} already holds a synced replica. Run 'litesync sync --reset' to start over.",
            p
        ),
        Err(e) => return Err(e).context("Initial sync failed"),
    };

    println!("{:<40} {:>12} {:>10}", "Table", "Rows", "Time");
    println!("{:-<64}", "");
    for table in &stats.table_stats {
        println!(
            "{:<40} {:>12} {:>9}ms",
            table.table,
            table.rows,
            table.elapsed.as_millis()
        );
    }
    println!();
    println!("{} {}", "Slot:".bold(), stats.slot);
    println!("{} {}", "Version:".bold(), stats.version);
    let summary = format!(
        "Synced {} rows across {} tables ({} indexes) in {:.1}s",
        stats.rows,
        stats.tables,
        stats.indexes,
        stats.total_elapsed.as_secs_f64()
    );
    println!("\n{}", summary.as_str().green().bold());

    Ok(())
}
