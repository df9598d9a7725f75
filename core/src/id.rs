//! Opaque identifiers for items and versions.
//!
//! 12 bytes: 4-byte seconds-since-epoch, 5-byte process-random value fixed
//! at process start, 3-byte per-process monotonic counter. Hex-encoded to a
//! 24-character string. Sortable by creation time without a storage
//! round-trip to allocate a sequence number.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::{Deserialize, Serialize};

fn process_random() -> &'static [u8; 5] {
    static RANDOM: OnceLock<[u8; 5]> = OnceLock::new();
    RANDOM.get_or_init(|| {
        let mut bytes = [0u8; 5];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    })
}

fn next_counter() -> u32 {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A 12-byte opaque identifier, hex-encoded for transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct OpaqueId([u8; 12]);

impl OpaqueId {
    /// Generate a new identifier using the current time, a process-fixed
    /// random component, and a monotonic counter.
    pub fn generate() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        let random = process_random();
        let counter = next_counter().to_be_bytes();

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(random);
        bytes[9..12].copy_from_slice(&counter[1..4]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(24);
        for byte in self.0 {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }

    pub fn from_hex(hex: &str) -> Result<Self, InvalidOpaqueId> {
        if hex.len() != 24 {
            return Err(InvalidOpaqueId(hex.to_string()));
        }
        let mut bytes = [0u8; 12];
        for i in 0..12 {
            bytes[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| InvalidOpaqueId(hex.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for OpaqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<OpaqueId> for String {
    fn from(id: OpaqueId) -> Self {
        id.to_hex()
    }
}

impl TryFrom<String> for OpaqueId {
    type Error = InvalidOpaqueId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidOpaqueId(String);

impl fmt::Display for InvalidOpaqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid opaque id: {}", self.0)
    }
}

impl std::error::Error for InvalidOpaqueId {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_hex() {
        let id = OpaqueId::generate();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        let parsed = OpaqueId::from_hex(&hex).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ids_are_distinct_and_monotonic_in_counter() {
        let a = OpaqueId::generate();
        let b = OpaqueId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(OpaqueId::from_hex("not-hex").is_err());
        assert!(OpaqueId::from_hex("abcd").is_err());
    }

    #[test]
    fn serializes_as_hex_string() {
        let id = OpaqueId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
    }
}
