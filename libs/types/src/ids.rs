//! Identity types for protocol entities
//!
//! `Address` identifies accounts and contracts, `H256` carries order hashes,
//! Merkle roots and other 32-byte digests. Both render as `0x`-prefixed hex
//! and serialize as hex strings. `TxId` tags every log entry with the
//! transaction that produced it (UUID v7, time-sortable).

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ParseError;

/// 20-byte account or contract identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);
    pub const LEN: usize = 20;

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive an address from a domain tag and seed material.
    ///
    /// Takes the last 20 bytes of `SHA-256(domain || 0x00 || seed)`.
    pub fn derive(domain: &str, seed: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain.as_bytes());
        hasher.update([0u8]);
        hasher.update(seed);
        let digest: [u8; 32] = hasher.finalize().into();
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Left-padded 32-byte word form.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }

    /// Parse from a 32-byte word; the upper 12 bytes must be zero.
    pub fn from_word(word: &[u8; 32]) -> Option<Self> {
        if word[..12].iter().any(|b| *b != 0) {
            return None;
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&word[12..]);
        Some(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|_| ParseError::InvalidHex(s.to_string()))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| ParseError::InvalidLength {
                expected: 20,
                actual: v.len(),
            })?;
        Ok(Self(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// 32-byte digest (order hashes, Merkle nodes, roots, metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct H256([u8; 32]);

impl H256 {
    pub const ZERO: H256 = H256([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Copy with a single bit flipped (used to probe tamper detection).
    pub fn with_bit_flipped(&self, bit: usize) -> Self {
        let mut bytes = self.0;
        bytes[(bit / 8) % 32] ^= 1 << (bit % 8);
        Self(bytes)
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for H256 {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|_| ParseError::InvalidHex(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| ParseError::InvalidLength {
                expected: 32,
                actual: v.len(),
            })?;
        Ok(Self(arr))
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Unique identifier for an executed transaction
///
/// Uses UUID v7 so log entries sort chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(Uuid);

impl TxId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_derive_is_deterministic() {
        let a = Address::derive("user", b"alice");
        let b = Address::derive("user", b"alice");
        let c = Address::derive("user", b"bob");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_zero());
    }

    #[test]
    fn test_address_domain_separation() {
        assert_ne!(
            Address::derive("user", b"x"),
            Address::derive("contract", b"x")
        );
    }

    #[test]
    fn test_address_display_and_parse() {
        let addr = Address::derive("user", b"alice");
        let s = addr.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(s.len(), 42);
        assert_eq!(s.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_address_parse_rejects_wrong_length() {
        let err = "0xdeadbeef".parse::<Address>().unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidLength {
                expected: 20,
                actual: 4
            }
        );
    }

    #[test]
    fn test_address_word_form() {
        let addr = Address::derive("user", b"carol");
        let word = addr.to_word();
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(Address::from_word(&word), Some(addr));

        let mut dirty = word;
        dirty[0] = 1;
        assert_eq!(Address::from_word(&dirty), None);
    }

    #[test]
    fn test_h256_serialization() {
        let h = H256::new([7u8; 32]);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "07".repeat(32)));
        let back: H256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn test_h256_bit_flip() {
        let h = H256::ZERO;
        let flipped = h.with_bit_flipped(9);
        assert_ne!(h, flipped);
        assert_eq!(flipped.as_bytes()[1], 0b10);
    }

    #[test]
    fn test_tx_id_unique() {
        assert_ne!(TxId::new(), TxId::new());
    }
}
