use std::path::{Path, PathBuf};

use litesync_core::{BufferLimits, ShardConfig, BUFFERED_SIZE_THRESHOLD, MAX_BUFFERED_ROWS};
use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::validation::validate_config;

pub const CONFIG_FILE_NAME: &str = "litesync.toml";

/// Written by `litesync init`.
pub const CONFIG_TEMPLATE: &str = r#"# litesync configuration

[upstream]
# Postgres 15+ with wal_level = logical. ${VAR} references are read from
# the environment (and .env).
connection_string = "${DATABASE_URL}"

[shard]
app_id = "zero"
shard_num = 0
# Publications to replicate. Leave empty to publish every table in `public`.
publications = []

[replica]
path = "replica.db"

[copy]
table_copy_workers = 5
max_buffered_rows = 10000
max_buffered_bytes = 8388608
"#;

/// Project configuration from litesync.toml.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub upstream: UpstreamConfig,
    pub shard: ShardSection,
    pub replica: ReplicaConfig,
    #[serde(default)]
    pub copy: CopyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub connection_string: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShardSection {
    pub app_id: String,
    #[serde(default)]
    pub shard_num: u32,
    #[serde(default)]
    pub publications: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Upper bound on tables copied at once.
    pub table_copy_workers: usize,
    pub max_buffered_rows: usize,
    pub max_buffered_bytes: usize,
}

impl Default for CopyConfig {
    fn default() -> Self {
        CopyConfig {
            table_copy_workers: 5,
            max_buffered_rows: MAX_BUFFERED_ROWS,
            max_buffered_bytes: BUFFERED_SIZE_THRESHOLD,
        }
    }
}

impl SyncConfig {
    /// Parse and validate a config from a TOML string.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let config: SyncConfig = toml::from_str(toml_str)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// The upstream URI with environment references resolved.
    pub fn connection_string(&self) -> ConfigResult<String> {
        let resolved = resolve_env(&self.upstream.connection_string, "upstream.connection_string")?;
        if resolved.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "upstream.connection_string".to_string(),
            });
        }
        Ok(resolved)
    }

    /// The replica file path with environment references resolved.
    pub fn replica_path(&self) -> ConfigResult<PathBuf> {
        resolve_env(&self.replica.path, "replica.path").map(PathBuf::from)
    }

    pub fn to_shard_config(&self) -> ShardConfig {
        ShardConfig::new(
            self.shard.app_id.clone(),
            self.shard.shard_num,
            self.shard.publications.clone(),
        )
    }

    pub fn buffer_limits(&self) -> BufferLimits {
        BufferLimits {
            max_rows: self.copy.max_buffered_rows,
            max_bytes: self.copy.max_buffered_bytes,
        }
    }
}

/// Replace every `${VAR}` in `s` with the variable's value. `field` names
/// the setting in errors.
pub fn resolve_env(s: &str, field: &str) -> ConfigResult<String> {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::UnterminatedReference {
                field: field.to_string(),
            })?;
        let name = &after[..end];
        let value = std::env::var(name).map_err(|_| ConfigError::MissingEnvVar {
            name: name.to_string(),
            field: field.to_string(),
        })?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_template_parses() {
        let config = SyncConfig::parse(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.shard.app_id, "zero");
        assert_eq!(config.shard.shard_num, 0);
        assert!(config.shard.publications.is_empty());
        assert_eq!(config.replica.path, "replica.db");
        assert_eq!(config.copy.table_copy_workers, 5);
        assert_eq!(config.buffer_limits(), BufferLimits::default());
    }

    #[test]
    fn test_copy_section_defaults() {
        let config = SyncConfig::parse(
            r#"
[upstream]
connection_string = "postgres://localhost/app"

[shard]
app_id = "app"
publications = ["issues", "users"]

[replica]
path = "/tmp/app.db"
"#,
        )
        .unwrap();
        assert_eq!(config.copy.max_buffered_rows, MAX_BUFFERED_ROWS);
        assert_eq!(config.copy.max_buffered_bytes, BUFFERED_SIZE_THRESHOLD);

        let shard = config.to_shard_config();
        assert_eq!(shard.app_id, "app");
        assert_eq!(shard.publications, vec!["issues", "users"]);
    }

    #[test]
    #[serial]
    fn test_resolve_env() {
        std::env::set_var("LITESYNC_TEST_VAR", "hello");

        assert_eq!(resolve_env("${LITESYNC_TEST_VAR}", "f").unwrap(), "hello");
        assert_eq!(
            resolve_env("prefix_${LITESYNC_TEST_VAR}_suffix", "f").unwrap(),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env("no_vars", "f").unwrap(), "no_vars");
        assert_eq!(
            resolve_env("${LITESYNC_TEST_VAR}${LITESYNC_TEST_VAR}", "f").unwrap(),
            "hellohello"
        );

        std::env::remove_var("LITESYNC_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_resolve_env_errors() {
        std::env::remove_var("LITESYNC_TEST_UNSET");
        assert!(matches!(
            resolve_env("postgres://${LITESYNC_TEST_UNSET}", "upstream.connection_string"),
            Err(ConfigError::MissingEnvVar { ref name, .. }) if name == "LITESYNC_TEST_UNSET"
        ));
        assert!(matches!(
            resolve_env("${OPEN", "f"),
            Err(ConfigError::UnterminatedReference { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_connection_string_from_env() {
        std::env::set_var("LITESYNC_TEST_DATABASE_URL", "postgres://u@h/db");
        let config = SyncConfig::parse(
            r#"
[upstream]
connection_string = "${LITESYNC_TEST_DATABASE_URL}"

[shard]
app_id = "zero"

[replica]
path = "replica.db"
"#,
        )
        .unwrap();
        assert_eq!(config.connection_string().unwrap(), "postgres://u@h/db");

        std::env::set_var("LITESYNC_TEST_DATABASE_URL", "  ");
        assert!(matches!(
            config.connection_string(),
            Err(ConfigError::MissingField { .. })
        ));
        std::env::remove_var("LITESYNC_TEST_DATABASE_URL");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = SyncConfig::load(dir.path().join(CONFIG_FILE_NAME));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, CONFIG_TEMPLATE).unwrap();
        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.replica_path().unwrap(), PathBuf::from("replica.db"));
    }
}
