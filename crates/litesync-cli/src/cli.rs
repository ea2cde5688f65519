use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "litesync")]
#[command(about = "Seed a local SQLite replica from Postgres")]
#[command(version)]
pub struct Cli {
    /// Environment to load (loads .env.{ENV} instead of .env)
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    /// Path to the litesync.toml config file
    #[arg(short, long, global = true, default_value = "litesync.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create litesync.toml and .env.example in the current directory
    Init,

    /// Run the initial sync into the configured replica
    Sync {
        /// Delete an existing replica before syncing
        #[arg(long)]
        reset: bool,
    },

    /// Show the replica's version, publications and row counts
    Status {
        /// Also list replicas registered upstream
        #[arg(long)]
        upstream: bool,
    },

    /// Delete the replica and, optionally, the shard's upstream state
    Reset {
        /// Also drop the shard schema, publications and slots upstream
        #[arg(long)]
        upstream: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync_reset() {
        let cli = Cli::try_parse_from(["litesync", "sync", "--reset"]).unwrap();
        assert!(matches!(cli.command, Commands::Sync { reset: true }));
        assert_eq!(cli.config, PathBuf::from("litesync.toml"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["litesync", "status", "--env", "staging", "-c", "alt.toml"])
                .unwrap();
        assert_eq!(cli.env.as_deref(), Some("staging"));
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert!(matches!(cli.command, Commands::Status { upstream: false }));
    }
}
