//! # Device Registry
//!
//! Owns the identity: its master seed, its record of devices, and the
//! per-device secrets. All mutation funnels through [`IdentityStore`],
//! which serializes writers and commits atomically.
//!
//! ```text
//! identity.rs   IdentityRecord, SeedSource, staged views
//! store.rs      IdentityStore: lifecycle, devices, signing
//! provision.rs  provision_tag: register + write + commit
//! ```

pub mod identity;
pub mod provision;
pub mod store;

pub use identity::{IdentityRecord, SeedSource, IDENTITY_RECORD_VERSION};
pub use provision::{ProvisionRequest, ProvisionedTag};
pub use store::{validate_device_name, IdentityStore};

use thiserror::Error;

use crate::crypto::KeyError;
use crate::error::ErrorKind;
use crate::hardware::HardwareError;
use crate::identity::DeviceId;
use crate::moment::MomentError;
use crate::nfc::NfcError;
use crate::storage::StoreError;

/// Errors from registry and provisioning operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no identity has been initialized")]
    NotInitialized,

    #[error("invalid device name: {0}")]
    InvalidDeviceName(String),

    #[error("device {0} is not registered")]
    UnknownDevice(DeviceId),

    #[error("device {device_id} is already bound to chip {bound}")]
    ChipAlreadyBound { device_id: DeviceId, bound: String },

    #[error("chip {chip_uid} already carries the credentials of device {holder}")]
    ChipInUse { chip_uid: String, holder: DeviceId },

    #[error("could not draw a unique device id in {0} attempts")]
    DeviceIdExhausted(usize),

    #[error("provided seed does not match the stored identity")]
    SeedMismatch,

    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    #[error("identity storage is corrupt: {0}")]
    Corrupt(String),

    #[error("tag for device {device_id} was written but the device was not saved: {reason}")]
    CommitAfterWrite { device_id: DeviceId, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Moment(#[from] MomentError),

    #[error(transparent)]
    Nfc(#[from] NfcError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Store(e) => e.kind(),
            RegistryError::Moment(e) => e.kind(),
            RegistryError::Nfc(e) => e.kind(),
            RegistryError::Hardware(e) => e.kind(),
            RegistryError::CommitAfterWrite { .. } => ErrorKind::StorageUnavailable,
            RegistryError::DeviceIdExhausted(_) => ErrorKind::StorageUnavailable,
            _ => ErrorKind::Validation,
        }
    }

    /// What an operator can do about it.
    pub fn hint(&self) -> Option<&str> {
        match self {
            RegistryError::NotInitialized => Some("run `meld-node init` first"),
            RegistryError::SeedMismatch => {
                Some("this store already holds a different identity; use another data directory")
            }
            RegistryError::ChipAlreadyBound { .. } => {
                Some("register a new device for the replacement tag")
            }
            RegistryError::ChipInUse { .. } => {
                Some("this chip already belongs to another device; provision a blank tag instead")
            }
            RegistryError::CommitAfterWrite { .. } => {
                Some("the tag holds credentials for an unsaved device; provision it again")
            }
            RegistryError::Store(e) if e.kind() == ErrorKind::StorageUnavailable => {
                Some("check that the local data directory is reachable and writable")
            }
            RegistryError::Nfc(e) => e.hint(),
            RegistryError::Hardware(HardwareError::Timeout(_)) => {
                Some("hold the tag steady against the reader and try again")
            }
            _ => None,
        }
    }
}
