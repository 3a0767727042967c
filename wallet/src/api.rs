use async_trait::async_trait;
use containers::Address;
use serde::Deserialize;

use crate::error::ApiError;

/// One block that holds a transaction touching the queried address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockResponse {
    /// Header hash in reversed (display) hex.
    pub hash: String,
    pub height: u32,
}

impl BlockResponse {
    pub fn new(hash: impl Into<String>, height: u32) -> Self {
        Self {
            hash: hash.into(),
            height,
        }
    }
}

/// Remote transaction history index.
#[async_trait]
pub trait InitialSyncApi: Send + Sync {
    async fn get_block_hashes(&self, address: &Address) -> Result<Vec<BlockResponse>, ApiError>;
}
