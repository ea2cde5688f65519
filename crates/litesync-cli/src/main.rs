use anyhow::Result;
use clap::Parser;
use tracing::info;

mod cli;
mod commands;
mod env;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Loaded before the subscriber so RUST_LOG may come from .env.
    let env_file = env::load_dotenv_from_ancestors(cli.env.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("litesync=info".parse()?),
        )
        .init();

    if let Some(path) = env_file {
        info!("Loaded {}", path.display());
    }

    match cli.command {
        Commands::Init => commands::cmd_init(),
        Commands::Sync { reset } => {
            let config = commands::load_config(&cli.config)?;
            commands::cmd_sync(config, reset).await
        }
        Commands::Status { upstream } => {
            let config = commands::load_config(&cli.config)?;
            commands::cmd_status(config, upstream).await
        }
        Commands::Reset { upstream, yes } => {
            let config = commands::load_config(&cli.config)?;
            commands::cmd_reset(config, upstream, yes).await
        }
    }
}
