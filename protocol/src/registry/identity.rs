//! The identity record and how it is seeded.
//!
//! Two storage entries make up an identity:
//!
//! | key                | value                                   |
//! |--------------------|-----------------------------------------|
//! | `meld.master-seed` | 32-byte master seed, hex                |
//! | `meld.identity`    | [`IdentityRecord`] as JSON (no secrets) |
//!
//! plus one `meld.device-secret.<deviceId>` entry per device. The record
//! never contains key material, so it can be exported or logged.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::MASTER_SEED_LENGTH;
use crate::crypto::hash::derive_identity_keypair;
use crate::crypto::keys::MeldKeypair;
use crate::identity::{Device, DeviceId, Did};
use crate::nfc::{ChipUid, DeviceDirectory};

use super::RegistryError;

/// Current on-disk record version.
pub const IDENTITY_RECORD_VERSION: u32 = 1;

/// Where the master seed for a new identity comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum SeedSource {
    /// Fresh bytes from the OS RNG.
    Random,
    /// A seed supplied by the owner, e.g. restored from backup.
    Provided([u8; MASTER_SEED_LENGTH]),
}

impl SeedSource {
    /// Parse a hex seed.
    pub fn from_hex(hex_seed: &str) -> Result<Self, RegistryError> {
        let bytes = hex::decode(hex_seed.trim())
            .map_err(|e| RegistryError::InvalidSeed(e.to_string()))?;
        let seed: [u8; MASTER_SEED_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            RegistryError::InvalidSeed(format!(
                "expected {} bytes, got {}",
                MASTER_SEED_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(SeedSource::Provided(seed))
    }

    pub(crate) fn materialize(&self) -> [u8; MASTER_SEED_LENGTH] {
        match self {
            SeedSource::Random => {
                let mut seed = [0u8; MASTER_SEED_LENGTH];
                OsRng.fill_bytes(&mut seed);
                seed
            }
            SeedSource::Provided(seed) => *seed,
        }
    }
}

impl fmt::Debug for SeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedSource::Random => f.write_str("Random"),
            SeedSource::Provided(_) => f.write_str("Provided(..)"),
        }
    }
}

/// The persisted, secret-free view of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub version: u32,
    pub did: Did,
    pub created_at: DateTime<Utc>,
    pub devices: Vec<Device>,
}

impl IdentityRecord {
    pub(crate) fn new(did: Did) -> Self {
        Self {
            version: IDENTITY_RECORD_VERSION,
            did,
            created_at: Utc::now(),
            devices: Vec::new(),
        }
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn find(&self, device_id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| &d.device_id == device_id)
    }

    /// The device whose credentials are bound to `chip_uid`, if any.
    pub fn holder_of(&self, chip_uid: &ChipUid) -> Option<&Device> {
        self.devices
            .iter()
            .find(|d| d.chip_uid.as_ref() == Some(chip_uid))
    }

    /// A copy with `device` added.
    pub(crate) fn with_device(&self, device: Device) -> Self {
        let mut next = self.clone();
        next.devices.push(device);
        next
    }

    /// A copy with the device of the same id replaced by `device`.
    pub(crate) fn with_replaced(&self, device: Device) -> Self {
        let mut next = self.clone();
        for slot in next.devices.iter_mut() {
            if slot.device_id == device.device_id {
                *slot = device.clone();
            }
        }
        next
    }

    pub(crate) fn to_json(&self) -> Result<String, RegistryError> {
        serde_json::to_string(self).map_err(|e| RegistryError::Corrupt(e.to_string()))
    }

    pub(crate) fn from_json(json: &str) -> Result<Self, RegistryError> {
        let record: Self =
            serde_json::from_str(json).map_err(|e| RegistryError::Corrupt(e.to_string()))?;
        if record.version != IDENTITY_RECORD_VERSION {
            return Err(RegistryError::Corrupt(format!(
                "unsupported identity record version {}",
                record.version
            )));
        }
        Ok(record)
    }
}

impl DeviceDirectory for IdentityRecord {
    fn device(&self, device_id: &DeviceId) -> Option<&Device> {
        self.find(device_id)
    }
}

/// A record plus one device that is not committed yet. Lets a tag be
/// encoded in the reference format before its device is persisted.
pub(crate) struct StagedDirectory<'a> {
    pub record: &'a IdentityRecord,
    pub staged: &'a Device,
}

impl DeviceDirectory for StagedDirectory<'_> {
    fn device(&self, device_id: &DeviceId) -> Option<&Device> {
        if &self.staged.device_id == device_id {
            Some(self.staged)
        } else {
            self.record.find(device_id)
        }
    }
}

/// The identity as held in memory once loaded.
pub(crate) struct LoadedIdentity {
    pub keypair: MeldKeypair,
    pub record: IdentityRecord,
}

impl LoadedIdentity {
    /// Build from a seed and a record, checking they belong together.
    pub fn from_parts(
        seed: &[u8; MASTER_SEED_LENGTH],
        record: IdentityRecord,
    ) -> Result<Self, RegistryError> {
        let keypair = derive_identity_keypair(seed);
        if record.did.public_key() != &keypair.public_key() {
            return Err(RegistryError::Corrupt(
                "identity record does not match the stored master seed".into(),
            ));
        }
        Ok(Self { keypair, record })
    }
}
