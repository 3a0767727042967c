use crate::Bytes32;
use serde::{Deserialize, Serialize};

/// A trusted point in the chain's history.
///
/// The client never verifies history below the checkpoint on its own. Block
/// hashes reported above it by a remote index are ignored during bootstrap, and
/// every block locator ends with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Header hash of the checkpoint block.
    pub header_hash: Bytes32,
    /// Height of the checkpoint block.
    pub height: u32,
}

impl Checkpoint {
    pub fn new(header_hash: Bytes32, height: u32) -> Self {
        Self {
            header_hash,
            height,
        }
    }

    /// Whether a block at `height` is at or below the checkpoint.
    pub fn covers(&self, height: u32) -> bool {
        height <= self.height
    }
}
