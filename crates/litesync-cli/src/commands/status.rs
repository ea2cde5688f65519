use anyhow::{Context, Result};
use colored::Colorize;
use litesync_config::SyncConfig;
use litesync_pg::{connect_postgres, registered_replicas};
use litesync_replica::Replica;

pub async fn cmd_status(config: SyncConfig, upstream: bool) -> Result<()> {
    let path = config.replica_path()?;

    if !path.exists() {
        println!(
            "No replica at {}. Run 'litesync sync' to create one.",
            path.display()
        );
    } else {
        let replica = Replica::open(&path)
            .with_context(|| format!("Failed to open replica {}", path.display()))?;
        print_replica(&replica, &path.display().to_string())?;
    }

    if upstream {
        let shard = config.to_shard_config();
        let conn = connect_postgres(&config.connection_string()?)
            .await
            .context("Failed to connect to Postgres")?;
        let replicas = registered_replicas(&conn, &shard).await?;

        println!("\nRegistered replicas for {}:", shard.schema().as_str().bold());
        if replicas.is_empty() {
            println!("  (none)");
        }
        for record in replicas {
            println!("  {:<40} {}", record.slot, record.version);
        }
    }

    println!();
    Ok(())
}

fn print_replica(replica: &Replica, name: &str) -> Result<()> {
    let Some(config) = replica.replication_config()? else {
        println!("{} is {}", name, "not initialized".yellow());
        return Ok(());
    };

    println!("\nReplica: {}", name.bold());
    println!("  Version:      {}", config.replica_version);
    if let Some(state) = replica.replication_state()? {
        println!("  State:        {}", state);
    }
    println!("  Publications: {}", config.publications.join(", "));

    println!("\n{:<40} {:>12}", "Table", "Rows");
    println!("{:-<53}", "");
    for table in replica.table_names()? {
        println!("{:<40} {:>12}", table, replica.row_count(&table)?);
    }
    Ok(())
}
