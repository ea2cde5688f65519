use thiserror::Error;
use tokio_postgres::error::SqlState;

#[derive(Debug, Error)]
pub enum PgError {
    #[error("postgres error: {message}")]
    Postgres {
        code: Option<SqlState>,
        message: String,
    },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("failed to create replication slot: {0}")]
    SlotCreationFailed(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid LSN format: {0}")]
    InvalidLsn(String),

    #[error("pool worker failed: {0}")]
    Pool(String),

    #[error("pool is closed")]
    PoolClosed,
}

impl PgError {
    /// SQLSTATE reported by the server, if any.
    pub fn code(&self) -> Option<&SqlState> {
        match self {
            PgError::Postgres { code, .. } => code.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn database(code: &str, message: impl Into<String>) -> Self {
        let code = (!code.is_empty()).then(|| SqlState::from_code(code));
        PgError::Postgres {
            code,
            message: message.into(),
        }
    }
}

impl From<tokio_postgres::Error> for PgError {
    fn from(e: tokio_postgres::Error) -> Self {
        // Extract database error details if available
        if let Some(db_err) = e.as_db_error() {
            let message = format!(
                "{}: {} (code: {})",
                db_err.severity(),
                db_err.message(),
                db_err.code().code()
            );
            PgError::Postgres {
                code: Some(db_err.code().clone()),
                message,
            }
        } else {
            PgError::Postgres {
                code: e.code().cloned(),
                message: e.to_string(),
            }
        }
    }
}

pub type PgResult<T> = Result<T, PgError>;
