//! Tag provisioning: register a device, write its tag, commit.
//!
//! The order matters. Everything that can be computed without touching
//! storage happens first (device id, keypair, chip signature, encoding).
//! Then the NDEF bytes go to the hardware. Only after the writer reports
//! success is the device committed, using the same secret-then-record
//! protocol as [`IdentityStore::register_device`]. A timeout, a write
//! failure or a cancellation therefore leaves the identity untouched.

use tokio::sync::watch;
use tracing::{error, info};

use crate::crypto::hash::key_fingerprint;
use crate::crypto::keys::MeldKeypair;
use crate::hardware::{write_with_deadline, TagWriter};
use crate::identity::{Device, DeviceType};
use crate::nfc::{ChipClass, ChipUid, EncodedTag, NfcCodec, TagCredentials};
use crate::storage::retry_once;

use super::identity::StagedDirectory;
use super::store::{validate_device_name, IdentityStore};
use super::RegistryError;

/// What to provision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub name: String,
    pub device_type: DeviceType,
    /// UID as read from the blank tag.
    pub chip_uid: ChipUid,
    /// Target chip. Falls back to the configured default.
    pub chip: Option<ChipClass>,
}

impl ProvisionRequest {
    pub fn new(name: impl Into<String>, device_type: DeviceType, chip_uid: ChipUid) -> Self {
        Self {
            name: name.into(),
            device_type,
            chip_uid,
            chip: None,
        }
    }

    pub fn for_chip(mut self, chip: ChipClass) -> Self {
        self.chip = Some(chip);
        self
    }
}

/// A committed device and the bytes written to its tag.
#[derive(Debug, Clone)]
pub struct ProvisionedTag {
    pub device: Device,
    pub encoded: EncodedTag,
}

impl IdentityStore {
    /// Register a device and write its credentials to a tag.
    ///
    /// The identity lock is held for the whole operation, including the
    /// hardware write, so no other mutation can slip in between encoding
    /// and commit.
    pub async fn provision_tag(
        &self,
        request: ProvisionRequest,
        writer: &dyn TagWriter,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<ProvisionedTag, RegistryError> {
        validate_device_name(&request.name)?;
        let chip = request.chip.unwrap_or(self.config.default_chip);

        let mut state = self.state.lock().await;
        let loaded = self.ensure_loaded(&mut state).await?;
        if let Some(holder) = loaded.record.holder_of(&request.chip_uid) {
            return Err(RegistryError::ChipInUse {
                chip_uid: request.chip_uid.to_string(),
                holder: holder.device_id,
            });
        }

        let device_id = self.draw_device_id(&loaded.record).await?;
        let keypair = MeldKeypair::generate();
        let signature = keypair.sign(request.chip_uid.challenge().as_bytes());
        let device = Device::new(
            device_id,
            request.name.trim(),
            request.device_type,
            keypair.public_key(),
        )
        .bound_to(request.chip_uid.clone(), signature.clone());

        let credentials = TagCredentials {
            chip_uid: request.chip_uid,
            did: device.did(),
            public_key: device.public_key,
            signature,
            device_id: Some(device_id),
        };
        let encoded = {
            let directory = StagedDirectory {
                record: &loaded.record,
                staged: &device,
            };
            NfcCodec::from_config(&self.config).encode(&credentials, chip, Some(&directory))?
        };

        info!(
            device_id = %device_id,
            chip = %chip,
            tier = %encoded.tier(),
            bytes = encoded.size(),
            "writing tag"
        );
        let timeout = self.config.write_timeout;
        retry_once(
            || write_with_deadline(writer, &encoded.ndef, timeout, cancel.clone()),
            self.config.retry_backoff,
        )
        .await?;

        let next = loaded.record.with_device(device.clone());
        loaded.record = match self.commit_device(next, &keypair, &device).await {
            Ok(record) => record,
            Err(err) => {
                error!(device_id = %device_id, error = %err, "tag written but device not saved");
                return Err(RegistryError::CommitAfterWrite {
                    device_id,
                    reason: err.to_string(),
                });
            }
        };

        info!(
            device_id = %device_id,
            key = %key_fingerprint(&device.public_key),
            "tag provisioned"
        );
        Ok(ProvisionedTag { device, encoded })
    }
}
