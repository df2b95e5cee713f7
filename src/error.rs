use thiserror::Error;

use crate::kv::KvError;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous prefix '{prefix}' matches {} tasks", candidates.len())]
    Ambiguous {
        prefix: String,
        candidates: Vec<String>,
    },

    #[error("write to '{key}' kept conflicting; gave up after {attempts} attempts")]
    ConflictRetryExhausted { key: String, attempts: u32 },

    #[error("substrate unavailable: {0}")]
    SubstrateUnavailable(#[source] KvError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("stored value for '{key}' is corrupt")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Process exit code for the CLI: 2 for bad usage, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_) => 2,
            _ => 1,
        }
    }
}

impl From<KvError> for StoreError {
    fn from(e: KvError) -> Self {
        match e {
            KvError::KeyNotFound(key) => Self::NotFound(key),
            other => Self::SubstrateUnavailable(other),
        }
    }
}
