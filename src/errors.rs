use thiserror::Error;

/// Error taxonomy for the collaboration core.
///
/// Read-path access failures are reported as `NotFound` so callers cannot
/// probe for the existence of resources they cannot see; mutation-path
/// failures are reported as `AccessDenied`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,

    #[error("access denied")]
    AccessDenied,

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("table not syncable: {0}")]
    NotSyncable(String),

    #[error("invalid team signature on operation {0}")]
    InvalidSignature(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::PeerUnreachable(e.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Config(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
