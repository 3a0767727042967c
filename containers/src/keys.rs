use serde::{Deserialize, Serialize};
use std::fmt;

/// A derived wallet key, identified by its position in the HD hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub account: u32,
    pub index: u32,
    pub external: bool,
    pub key_hash: Vec<u8>,
}

impl PublicKey {
    pub fn new(account: u32, index: u32, external: bool, key_hash: Vec<u8>) -> Self {
        Self {
            account,
            index,
            external,
            key_hash,
        }
    }
}

/// One string encoding of a public key (legacy, segwit, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address(value.to_string())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Address(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
