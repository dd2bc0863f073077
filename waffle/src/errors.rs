use thiserror::Error;

use crate::store::RecordKind;

/// A stored record that breaks one of its invariants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidDefinition {
    #[error("name must not be empty")]
    EmptyName,
    #[error("percent {0} is outside of [0, 100]")]
    PercentOutOfRange(f64),
    #[error("duplicate value {value:?} in {field}")]
    DuplicateEntry { field: &'static str, value: String },
    #[error("stored record could not be decoded: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("timed out while fetching from the record store")]
    Timeout,
    #[error("failed to parse stored record: {0}")]
    DataParsingError(String),
    #[error("record {0} was created concurrently and could not be read back")]
    CreateConflict(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::DataParsingError(err.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum WaffleError {
    #[error("invalid {kind} definition {name:?}: {source}")]
    InvalidFlagDefinition {
        kind: RecordKind,
        name: String,
        source: InvalidDefinition,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WaffleError {
    pub fn invalid(kind: RecordKind, name: &str, source: InvalidDefinition) -> Self {
        WaffleError::InvalidFlagDefinition {
            kind,
            name: name.to_string(),
            source,
        }
    }

    /// Short error code used as a metrics label.
    pub fn error_code(&self) -> &'static str {
        match self {
            WaffleError::InvalidFlagDefinition { .. } => "invalid_definition",
            WaffleError::Store(StoreError::Unavailable(_)) => "store_unavailable",
            WaffleError::Store(StoreError::Timeout) => "store_timeout",
            WaffleError::Store(StoreError::DataParsingError(_)) => "data_parsing_error",
            WaffleError::Store(StoreError::CreateConflict(_)) => "create_conflict",
        }
    }
}
