use hex::FromHex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A 32-byte hash in internal (wire) byte order.
///
/// Block and transaction hashes are conventionally shown byte-reversed, so
/// `Display` and `FromStr` use the reversed hex form that block explorers and
/// history indexes return.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Bytes32(pub [u8; 32]);

impl Bytes32 {
    pub const fn zero() -> Self {
        Bytes32([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parse a hash written in internal byte order.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Ok(Bytes32(<[u8; 32]>::from_hex(s)?))
    }

    /// Parse a hash written in display (reversed) byte order.
    pub fn from_reversed_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = <[u8; 32]>::from_hex(s)?;
        bytes.reverse();
        Ok(Bytes32(bytes))
    }

    /// Const-context variant of [`Bytes32::from_reversed_hex`] for hash literals.
    pub const fn parse_reversed(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 64 {
            return None;
        }

        let mut out = [0u8; 32];
        let mut i = 0;
        while i < 32 {
            let hi = match hex_digit(bytes[2 * i]) {
                Some(v) => v,
                None => return None,
            };
            let lo = match hex_digit(bytes[2 * i + 1]) {
                Some(v) => v,
                None => return None,
            };
            out[31 - i] = (hi << 4) | lo;
            i += 1;
        }
        Some(Bytes32(out))
    }

    pub fn to_reversed_hex(&self) -> String {
        let mut bytes = self.0;
        bytes.reverse();
        hex::encode(bytes)
    }
}

impl From<[u8; 32]> for Bytes32 {
    fn from(bytes: [u8; 32]) -> Self {
        Bytes32(bytes)
    }
}

impl FromStr for Bytes32 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bytes32::from_reversed_hex(s)
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_reversed_hex())
    }
}

const fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// SHA-256 applied twice, the hash used for headers, txids and merkle nodes.
pub fn double_sha256(data: &[u8]) -> Bytes32 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    Bytes32(out)
}
