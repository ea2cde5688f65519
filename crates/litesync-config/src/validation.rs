use litesync_core::shard::is_valid_app_id;

use crate::config::SyncConfig;
use crate::error::{ConfigError, ConfigResult};

/// Validate a sync configuration.
pub fn validate_config(config: &SyncConfig) -> ConfigResult<()> {
    validate_upstream(config)?;
    validate_shard(config)?;
    validate_replica(config)?;
    validate_copy(config)?;
    Ok(())
}

fn validate_upstream(config: &SyncConfig) -> ConfigResult<()> {
    if config.upstream.connection_string.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: "upstream.connection_string".to_string(),
        });
    }
    Ok(())
}

fn validate_shard(config: &SyncConfig) -> ConfigResult<()> {
    if !is_valid_app_id(&config.shard.app_id) {
        return Err(ConfigError::InvalidAppId {
            value: config.shard.app_id.clone(),
        });
    }
    for name in &config.shard.publications {
        if name.is_empty() {
            return Err(ConfigError::InvalidPublication {
                value: name.clone(),
                reason: "name is empty".to_string(),
            });
        }
        // Leading underscores are reserved for internal publications.
        if name.starts_with('_') {
            return Err(ConfigError::InvalidPublication {
                value: name.clone(),
                reason: "names starting with '_' are reserved".to_string(),
            });
        }
    }
    Ok(())
}

fn validate_replica(config: &SyncConfig) -> ConfigResult<()> {
    if config.replica.path.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: "replica.path".to_string(),
        });
    }
    Ok(())
}

fn validate_copy(config: &SyncConfig) -> ConfigResult<()> {
    let positive = [
        ("copy.table_copy_workers", config.copy.table_copy_workers),
        ("copy.max_buffered_rows", config.copy.max_buffered_rows),
        ("copy.max_buffered_bytes", config.copy.max_buffered_bytes),
    ];
    for (field, value) in positive {
        if value == 0 {
            return Err(ConfigError::NotPositive {
                field: field.to_string(),
            });
        }
    }
    Ok(())
}
