use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("environment variable {name} referenced by {field} is not set")]
    MissingEnvVar { name: String, field: String },

    #[error("unterminated ${{...}} reference in {field}")]
    UnterminatedReference { field: String },

    #[error("invalid app_id '{value}': must match ^[a-z0-9_]+$")]
    InvalidAppId { value: String },

    #[error("invalid publication '{value}': {reason}")]
    InvalidPublication { value: String, reason: String },

    #[error("{field} must be greater than zero")]
    NotPositive { field: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
