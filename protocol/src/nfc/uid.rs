//! ISO 14443-3 chip UIDs.
//!
//! Readers hand us raw UID bytes; people and URLs pass them around as hex.
//! The canonical text form is uppercase, colon separated (`04:A2:3B:1C:5D:6E:80`),
//! and the compact form drops the separators (`04A23B1C5D6E80`). Parsing
//! accepts either, and also `-` as a separator.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::CHIP_UID_LENGTHS;

use super::NfcError;

/// A tag UID: 4, 7 or 10 bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChipUid(Vec<u8>);

impl ChipUid {
    /// Wrap raw UID bytes as read from the reader.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NfcError> {
        if !CHIP_UID_LENGTHS.contains(&bytes.len()) {
            return Err(NfcError::InvalidUid(format!(
                "UID must be 4, 7 or 10 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Uppercase hex with no separators.
    pub fn to_compact(&self) -> String {
        hex::encode_upper(&self.0)
    }

    /// The challenge string a tag's signature covers: the canonical form.
    pub fn challenge(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChipUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChipUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChipUid({})", self)
    }
}

impl FromStr for ChipUid {
    type Err = NfcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.trim().chars().filter(|c| *c != ':' && *c != '-').collect();
        if digits.is_empty() {
            return Err(NfcError::InvalidUid("UID is empty".into()));
        }
        let bytes = hex::decode(&digits)
            .map_err(|e| NfcError::InvalidUid(format!("'{}' is not hex: {}", s, e)))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for ChipUid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChipUid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
