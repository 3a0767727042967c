use thiserror::Error;

/// Failures of the remote transaction history index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("history index is unreachable")]
    NoConnection,
    #[error("history index protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to derive key {account}/{index} (external: {external}): {reason}")]
pub struct KeyDerivationError {
    pub account: u32,
    pub index: u32,
    pub external: bool,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum InitialSyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
    #[error("gap limit must be at least 1")]
    InvalidGapLimit,
}
