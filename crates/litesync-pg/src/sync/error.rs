use litesync_replica::ReplicaError;
use thiserror::Error;
use tokio_postgres::error::SqlState;

use crate::error::PgError;

/// Why an initial sync failed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("publications missing upstream: {}", .0.join(", "))]
    MissingPublications(Vec<String>),

    #[error("unsupported table {table}: {reason}")]
    UnsupportedTable { table: String, reason: String },

    #[error("copy of {table} failed: {source}")]
    Copy {
        table: String,
        #[source]
        source: litesync_core::Error,
    },

    #[error("replica {0} is already initialized")]
    AlreadyInitialized(String),

    #[error(transparent)]
    Core(litesync_core::Error),

    #[error(transparent)]
    Pg(#[from] PgError),

    #[error(transparent)]
    Replica(#[from] ReplicaError),
}

impl SyncError {
    /// SQLSTATE of the underlying server error, if any.
    pub fn sql_state(&self) -> Option<&SqlState> {
        match self {
            SyncError::Pg(e) => e.code(),
            _ => None,
        }
    }
}

impl From<litesync_core::Error> for SyncError {
    fn from(e: litesync_core::Error) -> Self {
        match e {
            litesync_core::Error::InvalidAppId(_) | litesync_core::Error::InvalidPublication(_) => {
                SyncError::Config(e.to_string())
            }
            litesync_core::Error::UnsupportedTable { table, reason } => {
                SyncError::UnsupportedTable { table, reason }
            }
            other => SyncError::Core(other),
        }
    }
}

impl From<tokio_postgres::Error> for SyncError {
    fn from(e: tokio_postgres::Error) -> Self {
        SyncError::Pg(e.into())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
