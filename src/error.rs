/// Synchronization-core errors surfaced to views
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("authentication required (from {origin})")]
    AuthRequired { origin: String },

    #[error("session expired or not established")]
    Unauthorized,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("conflict: entity already exists")]
    Conflict,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("collection service error: {0}")]
    Service(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether the failure is transient and worth retrying with the same input.
    ///
    /// Any optimistic cache change has already been rolled back by the time a
    /// transient error reaches the caller, so a retry starts from clean state.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Service(_))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
