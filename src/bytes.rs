//! 32-byte identifiers (puzzle hashes, coin ids, header hashes)
//!
//! The node reports these as `0x`-prefixed hex; locally computed values have
//! no prefix. Everything is normalised to lower-case hex without a marker
//! before comparison.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ListenerError;

/// Strip an optional `0x`/`0X` marker and lower-case the rest
pub fn normalize_hex(value: &str) -> String {
    let trimmed = value.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    stripped.to_ascii_lowercase()
}

/// Decode hex with or without a leading marker
pub fn decode_hex(value: &str) -> Result<Vec<u8>, ListenerError> {
    hex::decode(normalize_hex(value)).map_err(|e| ListenerError::InvalidHex(e.to_string()))
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Bytes32([u8; 32]);

impl Bytes32 {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ListenerError> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            ListenerError::InvalidHex(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }
}

impl From<[u8; 32]> for Bytes32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Bytes32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Bytes32 {
    type Err = ListenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&decode_hex(s)?)
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes32({})", self.to_hex())
    }
}

impl Serialize for Bytes32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Bytes32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hex_strips_marker_and_case() {
        assert_eq!(normalize_hex("0xABcd"), "abcd");
        assert_eq!(normalize_hex("0XFF"), "ff");
        assert_eq!(normalize_hex("beef"), "beef");
    }

    #[test]
    fn test_prefixed_and_bare_hex_compare_equal() {
        let bare: Bytes32 = "11".repeat(32).parse().unwrap();
        let marked: Bytes32 = format!("0x{}", "11".repeat(32).to_uppercase()).parse().unwrap();
        assert_eq!(bare, marked);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!("abcd".parse::<Bytes32>().is_err());
        assert!("zz".repeat(32).parse::<Bytes32>().is_err());
    }

    #[test]
    fn test_serde_accepts_node_format() {
        let json = format!("\"0x{}\"", "ab".repeat(32));
        let value: Bytes32 = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_string(&value).unwrap(), format!("\"{}\"", "ab".repeat(32)));
    }
}
