mod config;
mod error;
mod validation;

pub use config::{
    resolve_env, CopyConfig, ReplicaConfig, ShardSection, SyncConfig, UpstreamConfig,
    CONFIG_FILE_NAME, CONFIG_TEMPLATE,
};
pub use error::{ConfigError, ConfigResult};
pub use validation::validate_config;
