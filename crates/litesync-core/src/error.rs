use thiserror::Error;

/// Errors that can occur in litesync-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown escape sequence: \\{}", char::from(*.0))]
    UnknownEscape(u8),

    #[error("unexpected data after \\N null marker")]
    DataAfterNullMarker,

    #[error("copy stream ended inside a field")]
    TruncatedField,

    #[error("copy stream ended mid-row: got {got} of {expected} columns")]
    TruncatedRow { got: usize, expected: usize },

    #[error("invalid {type_name} value {value:?}: {reason}")]
    InvalidValue {
        type_name: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid lexi version {0:?}")]
    InvalidLexiVersion(String),

    #[error("invalid app id {0:?}: must match ^[a-z0-9_]+$")]
    InvalidAppId(String),

    #[error("invalid publication name {0:?}")]
    InvalidPublication(String),

    #[error("unsupported table {table}: {reason}")]
    UnsupportedTable { table: String, reason: String },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid_value(
        type_name: &'static str,
        value: &[u8],
        reason: impl ToString,
    ) -> Self {
        Error::InvalidValue {
            type_name,
            value: String::from_utf8_lossy(value).into_owned(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
