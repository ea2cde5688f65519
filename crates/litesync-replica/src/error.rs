use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("replica connection lock poisoned")]
    Poisoned,

    #[error("table {table}: buffer has {got} columns, expected {expected}")]
    ColumnMismatch {
        table: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid replication state: {0}")]
    InvalidState(#[from] litesync_core::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ReplicaResult<T> = Result<T, ReplicaError>;
