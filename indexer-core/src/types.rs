//! Core types for the indexer
//!
//! All types are designed for:
//! - Stable string ids (lowercase `0x` hex, as the event source renders them)
//! - Serialization through both JSON (event input) and bincode (storage)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

fn parse_fixed<const N: usize>(raw: &str) -> Option<[u8; N]> {
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    let mut bytes = [0u8; N];
    hex::decode_to_slice(digits, &mut bytes).ok()?;
    Some(bytes)
}

/// 20-byte contract or account address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase `0x` hex form, used for entity ids
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Check for the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        parse_fixed::<20>(s.trim())
            .map(Address)
            .ok_or_else(|| crate::Error::Decode(format!("invalid address: {}", s)))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// 32-byte transaction hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash([u8; 32]);

impl TxHash {
    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        parse_fixed::<32>(s.trim())
            .map(TxHash)
            .ok_or_else(|| crate::Error::Decode(format!("invalid transaction hash: {}", s)))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Where an event sits in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// Contract that emitted the log
    pub address: Address,

    /// Block number
    pub block_number: u64,

    /// Block timestamp (seconds since Unix epoch)
    pub block_timestamp: i64,

    /// Transaction hash
    pub transaction_hash: TxHash,

    /// Log index within the block
    pub log_index: u64,
}

impl EventMeta {
    /// Id of the per-event audit record: `txHash-logIndex`
    pub fn record_id(&self) -> String {
        format!("{}-{}", self.transaction_hash, self.log_index)
    }

    /// Ordering key of the event source
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    /// Block time as a UTC timestamp
    pub fn block_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.block_timestamp, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip_lowercase() {
        let address: Address = "0xAbCdEf0000000000000000000000000000000001".parse().unwrap();
        assert_eq!(address.to_hex(), "0xabcdef0000000000000000000000000000000001");
        assert_eq!(address.to_string(), address.to_hex());
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!("abcdef".parse::<Address>().is_err());
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz00000000000000000000000000000000000000".parse::<Address>().is_err());
    }

    #[test]
    fn test_record_id() {
        let meta = EventMeta {
            address: Address::ZERO,
            block_number: 10,
            block_timestamp: 1_600_000_000,
            transaction_hash: TxHash::from_bytes([0xab; 32]),
            log_index: 7,
        };
        assert_eq!(meta.record_id(), format!("0x{}-7", "ab".repeat(32)));
        assert_eq!(meta.position(), (10, 7));
        assert_eq!(
            meta.block_time().unwrap().to_rfc3339(),
            "2020-09-13T12:26:40+00:00"
        );
    }
}
