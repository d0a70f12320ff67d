//! # Devices
//!
//! A device is anything that acts on behalf of an identity with a key of its
//! own: a passive NFC tag, a wristband, a reader node. Each one gets a fresh
//! Ed25519 keypair at registration. The secret half lives only in the local
//! secret store; the [`Device`] record keeps the public key and a reference
//! to where the secret is stored.
//!
//! Records are immutable after creation except for binding the physical
//! chip UID, which happens once the tag has actually been written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::config::STORAGE_KEY_DEVICE_SECRET_PREFIX;
use crate::crypto::keys::{MeldPublicKey, MeldSignature};
use crate::nfc::uid::ChipUid;

use super::did::Did;

/// Unique identifier of a device under an identity. A random UUIDv4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Draw a fresh random id. Collision checks are the registry's job.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for DeviceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What kind of hardware a device is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    /// A battery-less NFC tag or sticker.
    Passive,
    /// An NFC wristband or ring.
    Wearable,
    /// A printed NFC card.
    Card,
    /// A powered reader node at an installation.
    Reader,
    /// A phone acting as a device of the identity.
    Mobile,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Passive => "passive",
            DeviceType::Wearable => "wearable",
            DeviceType::Card => "card",
            DeviceType::Reader => "reader",
            DeviceType::Mobile => "mobile",
        }
    }

    /// Whether this device is carried on an NFC tag that gets provisioned.
    pub fn is_tag(&self) -> bool {
        matches!(
            self,
            DeviceType::Passive | DeviceType::Wearable | DeviceType::Card
        )
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "passive" | "tag" | "sticker" => Ok(DeviceType::Passive),
            "wearable" | "wristband" | "ring" => Ok(DeviceType::Wearable),
            "card" => Ok(DeviceType::Card),
            "reader" | "node" => Ok(DeviceType::Reader),
            "mobile" | "phone" => Ok(DeviceType::Mobile),
            other => Err(format!("unknown device type '{}'", other)),
        }
    }
}

/// A device registered under an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    /// Set once the physical tag has been written.
    pub chip_uid: Option<ChipUid>,
    /// The device key's signature over the bound chip UID. Lets reference
    /// tags resolve without carrying the signature themselves.
    pub chip_signature: Option<MeldSignature>,
    pub public_key: MeldPublicKey,
    /// Local secret-store key holding this device's private key.
    pub key_ref: String,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Build a new, unbound device record.
    pub fn new(
        device_id: DeviceId,
        name: impl Into<String>,
        device_type: DeviceType,
        public_key: MeldPublicKey,
    ) -> Self {
        Self {
            device_id,
            name: name.into(),
            device_type,
            chip_uid: None,
            chip_signature: None,
            public_key,
            key_ref: secret_storage_key(&device_id),
            created_at: Utc::now(),
        }
    }

    /// The did:key of this device's own key.
    pub fn did(&self) -> Did {
        Did::from_public_key(&self.public_key)
    }

    /// Whether `uid` may be bound: the device is unbound, or already bound
    /// to that same chip.
    pub fn can_bind(&self, uid: &ChipUid) -> bool {
        self.chip_uid.as_ref().map_or(true, |bound| bound == uid)
    }

    /// Return a copy of this record bound to `uid`, with the device key's
    /// signature over the UID challenge.
    pub(crate) fn bound_to(&self, uid: ChipUid, signature: MeldSignature) -> Self {
        Self {
            chip_uid: Some(uid),
            chip_signature: Some(signature),
            ..self.clone()
        }
    }
}

/// Storage key under which a device's secret key is kept.
pub fn secret_storage_key(device_id: &DeviceId) -> String {
    format!("{}{}", STORAGE_KEY_DEVICE_SECRET_PREFIX, device_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MeldKeypair;

    fn sample() -> Device {
        Device::new(
            DeviceId::random(),
            "tag1",
            DeviceType::Passive,
            MeldKeypair::generate().public_key(),
        )
    }

    #[test]
    fn device_id_roundtrips_through_string() {
        let id = DeviceId::random();
        let parsed: DeviceId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<DeviceId>().is_err());
    }

    #[test]
    fn device_type_parsing() {
        assert_eq!("passive".parse::<DeviceType>().unwrap(), DeviceType::Passive);
        assert_eq!("Wristband".parse::<DeviceType>().unwrap(), DeviceType::Wearable);
        assert!("toaster".parse::<DeviceType>().is_err());
        assert!(DeviceType::Card.is_tag());
        assert!(!DeviceType::Reader.is_tag());
    }

    #[test]
    fn new_device_is_unbound_with_key_ref() {
        let device = sample();
        assert!(device.chip_uid.is_none());
        assert!(device.key_ref.starts_with(STORAGE_KEY_DEVICE_SECRET_PREFIX));
        assert!(device.key_ref.ends_with(&device.device_id.to_string()));
        assert_eq!(device.did().public_key(), &device.public_key);
    }

    #[test]
    fn binding_rules() {
        let uid: ChipUid = "04:A2:3B:1C:5D:6E:80".parse().unwrap();
        let other: ChipUid = "04:A2:3B:1C:5D:6E:81".parse().unwrap();

        let device = sample();
        assert!(device.can_bind(&uid));

        let signature = MeldKeypair::generate().sign(uid.challenge().as_bytes());
        let bound = device.bound_to(uid.clone(), signature);
        assert!(bound.can_bind(&uid));
        assert!(!bound.can_bind(&other));
        // The original record is untouched.
        assert!(device.chip_uid.is_none());
    }

    #[test]
    fn json_shape_is_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("deviceId").is_some());
        assert!(json.get("publicKey").is_some());
        assert_eq!(json["deviceType"], "passive");
    }
}
