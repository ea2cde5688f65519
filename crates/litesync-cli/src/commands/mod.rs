mod init;
mod reset;
mod status;
mod sync;

use std::path::Path;

use anyhow::{Context, Result};
use litesync_config::SyncConfig;

pub use init::cmd_init;
pub use reset::cmd_reset;
pub use status::cmd_status;
pub use sync::cmd_sync;

pub fn load_config(path: &Path) -> Result<SyncConfig> {
    if !path.exists() {
        anyhow::bail!(
            "{} not found. Run 'litesync init' to create one.",
            path.display()
        );
    }
    SyncConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
}
