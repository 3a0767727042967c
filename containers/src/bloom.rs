use serde::{Deserialize, Serialize};

/// Contents of a `filterload` message.
///
/// Building the filter from wallet keys happens outside the sync core; peers
/// only need the finished bit field and its parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloomFilter {
    pub filter: Vec<u8>,
    pub hash_functions: u32,
    pub tweak: u32,
    pub flags: u8,
}

impl BloomFilter {
    pub fn new(filter: Vec<u8>, hash_functions: u32, tweak: u32, flags: u8) -> Self {
        Self {
            filter,
            hash_functions,
            tweak,
            flags,
        }
    }
}
