use thiserror::Error;

/// Reasons a merkle block is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("merkle block has no transactions")]
    NoTransactions,
    #[error("merkle block claims more transactions than fit in a block")]
    TooManyTransactions,
    #[error("more hashes than transactions")]
    MoreHashesThanTransactions,
    #[error("not enough flag bits")]
    NotEnoughBits,
    #[error("not enough hashes")]
    NotEnoughHashes,
    #[error("flag bits left unconsumed")]
    UnnecessaryBits,
    #[error("hashes left unconsumed")]
    UnnecessaryHashes,
    #[error("identical left and right branches")]
    DuplicatedLeftOrRightBranches,
    #[error("merkle root does not match header")]
    WrongMerkleRoot,
    #[error("previous block is unknown")]
    NoPreviousBlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection closed by peer")]
    ConnectionClosedByPeer,
    #[error("peer did not answer in time")]
    Timeout,
    #[error("i/o error: {0}")]
    Io(String),
}

/// Why a peer was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerGroupError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

impl PeerGroupError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            PeerGroupError::Validation(_) => "validation",
            PeerGroupError::Transport(TransportError::Timeout) => "timeout",
            PeerGroupError::Transport(_) => "transport",
        }
    }
}
