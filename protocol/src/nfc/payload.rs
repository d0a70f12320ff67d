//! Tag payloads, one variant per wire tier.
//!
//! | tier       | query parameters                     | resolves via            |
//! |------------|--------------------------------------|-------------------------|
//! | Full       | `did`, `signature`, `publicKey`, `uid` | itself                |
//! | Compact    | `c`, `s`, `p`                        | DID re-derived from key |
//! | Reference  | `d`, `c`                             | a [`DeviceDirectory`]   |
//!
//! Every variant renders its own query string and parses it back. Parsing
//! enforces that cryptographic fields arrive at full length: a signature
//! shorter than 128 hex characters or a key shorter than 64 is a
//! truncated field, never "close enough".

use std::collections::HashMap;
use std::fmt;

use url::form_urlencoded;

use crate::config::{MIN_PUBLIC_KEY_HEX_LENGTH, MIN_SIGNATURE_HEX_LENGTH};
use crate::crypto::keys::{MeldPublicKey, MeldSignature};
use crate::identity::{Device, DeviceId, Did};

use super::uid::ChipUid;
use super::NfcError;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Everything a tag carries, fully resolved.
///
/// The signature covers the chip UID challenge (see [`ChipUid::challenge`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCredentials {
    pub chip_uid: ChipUid,
    pub did: Did,
    pub public_key: MeldPublicKey,
    pub signature: MeldSignature,
    /// Present when the credentials belong to a registered device, which
    /// makes the reference tier available.
    pub device_id: Option<DeviceId>,
}

impl TagCredentials {
    /// Does the signature cover this tag's UID under its public key?
    pub fn verify(&self) -> bool {
        self.verify_challenge(&self.chip_uid.challenge())
    }

    /// Check the tag signature against an explicit challenge string.
    pub fn verify_challenge(&self, challenge: &str) -> bool {
        self.public_key.verify(challenge.as_bytes(), &self.signature)
    }

    /// Credentials for a device bound to its chip, as written to its tag.
    /// `None` until the device has been bound.
    pub fn for_device(device: &Device) -> Option<Self> {
        Some(Self {
            chip_uid: device.chip_uid.clone()?,
            did: device.did(),
            public_key: device.public_key,
            signature: device.chip_signature.clone()?,
            device_id: Some(device.device_id),
        })
    }

    /// True when `did` is exactly the did:key of `public_key`. Only then
    /// can the compact tier drop the DID.
    pub fn is_self_certifying(&self) -> bool {
        self.did.public_key() == &self.public_key
    }
}

/// Lookup of registered devices, used to resolve reference payloads.
pub trait DeviceDirectory {
    fn device(&self, device_id: &DeviceId) -> Option<&Device>;
}

impl DeviceDirectory for HashMap<DeviceId, Device> {
    fn device(&self, device_id: &DeviceId) -> Option<&Device> {
        self.get(device_id)
    }
}

// ---------------------------------------------------------------------------
// Tier payloads
// ---------------------------------------------------------------------------

/// Which wire tier a payload uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadTier {
    Full,
    Compact,
    DecentralizedReference,
}

impl PayloadTier {
    /// Tiers in the order the encoder tries them.
    pub const ORDER: [PayloadTier; 3] = [
        PayloadTier::Full,
        PayloadTier::Compact,
        PayloadTier::DecentralizedReference,
    ];
}

impl fmt::Display for PayloadTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PayloadTier::Full => "full",
            PayloadTier::Compact => "compact",
            PayloadTier::DecentralizedReference => "decentralized-reference",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullPayload {
    pub did: Did,
    pub signature: MeldSignature,
    pub public_key: MeldPublicKey,
    pub chip_uid: ChipUid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactPayload {
    pub chip_uid: ChipUid,
    pub signature: MeldSignature,
    pub public_key: MeldPublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePayload {
    pub device_id: DeviceId,
    pub chip_uid: ChipUid,
}

/// A decoded tag payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfcPayload {
    Full(FullPayload),
    Compact(CompactPayload),
    DecentralizedReference(ReferencePayload),
}

impl NfcPayload {
    /// Build the payload for `tier` from resolved credentials.
    ///
    /// Compact needs self-certifying credentials, reference needs a device
    /// id; `None` when the tier is not applicable.
    pub fn for_tier(tier: PayloadTier, credentials: &TagCredentials) -> Option<Self> {
        match tier {
            PayloadTier::Full => Some(NfcPayload::Full(FullPayload {
                did: credentials.did.clone(),
                signature: credentials.signature.clone(),
                public_key: credentials.public_key,
                chip_uid: credentials.chip_uid.clone(),
            })),
            PayloadTier::Compact => credentials.is_self_certifying().then(|| {
                NfcPayload::Compact(CompactPayload {
                    chip_uid: credentials.chip_uid.clone(),
                    signature: credentials.signature.clone(),
                    public_key: credentials.public_key,
                })
            }),
            PayloadTier::DecentralizedReference => credentials.device_id.map(|device_id| {
                NfcPayload::DecentralizedReference(ReferencePayload {
                    device_id,
                    chip_uid: credentials.chip_uid.clone(),
                })
            }),
        }
    }

    pub fn tier(&self) -> PayloadTier {
        match self {
            NfcPayload::Full(_) => PayloadTier::Full,
            NfcPayload::Compact(_) => PayloadTier::Compact,
            NfcPayload::DecentralizedReference(_) => PayloadTier::DecentralizedReference,
        }
    }

    pub fn chip_uid(&self) -> &ChipUid {
        match self {
            NfcPayload::Full(p) => &p.chip_uid,
            NfcPayload::Compact(p) => &p.chip_uid,
            NfcPayload::DecentralizedReference(p) => &p.chip_uid,
        }
    }

    /// Render the query string (without the leading `?`).
    pub fn to_query(&self) -> String {
        match self {
            NfcPayload::Full(p) => format!(
                "did={}&signature={}&publicKey={}&uid={}",
                form_urlencoded::byte_serialize(p.did.as_str().as_bytes()).collect::<String>(),
                p.signature.to_hex(),
                p.public_key.to_hex(),
                p.chip_uid,
            ),
            NfcPayload::Compact(p) => format!(
                "c={}&s={}&p={}",
                p.chip_uid.to_compact(),
                p.signature.to_hex(),
                p.public_key.to_hex(),
            ),
            NfcPayload::DecentralizedReference(p) => {
                format!("d={}&c={}", p.device_id, p.chip_uid.to_compact())
            }
        }
    }

    /// Parse already-decoded query pairs. The tier is picked from the
    /// parameter names present.
    pub fn from_query_pairs(pairs: &HashMap<String, String>) -> Result<Self, NfcError> {
        let get = |name: &'static str| {
            pairs
                .get(name)
                .map(String::as_str)
                .ok_or(NfcError::MissingParameter(name))
        };

        if pairs.contains_key("did") {
            Ok(NfcPayload::Full(FullPayload {
                did: Did::parse(get("did")?).map_err(|e| NfcError::InvalidField {
                    field: "did",
                    reason: e.to_string(),
                })?,
                signature: parse_signature("signature", get("signature")?)?,
                public_key: parse_public_key("publicKey", get("publicKey")?)?,
                chip_uid: get("uid")?.parse()?,
            }))
        } else if pairs.contains_key("s") || pairs.contains_key("p") {
            Ok(NfcPayload::Compact(CompactPayload {
                chip_uid: get("c")?.parse()?,
                signature: parse_signature("s", get("s")?)?,
                public_key: parse_public_key("p", get("p")?)?,
            }))
        } else if pairs.contains_key("d") {
            let raw = get("d")?;
            Ok(NfcPayload::DecentralizedReference(ReferencePayload {
                device_id: raw.parse().map_err(|e: uuid::Error| NfcError::InvalidField {
                    field: "d",
                    reason: e.to_string(),
                })?,
                chip_uid: get("c")?.parse()?,
            }))
        } else {
            Err(NfcError::UnknownFormat)
        }
    }

    /// Resolve to full credentials. Reference payloads need a directory
    /// holding the device, bound to this same chip.
    pub fn resolve(
        &self,
        directory: Option<&dyn DeviceDirectory>,
    ) -> Result<TagCredentials, NfcError> {
        match self {
            NfcPayload::Full(p) => Ok(TagCredentials {
                chip_uid: p.chip_uid.clone(),
                did: p.did.clone(),
                public_key: p.public_key,
                signature: p.signature.clone(),
                device_id: None,
            }),
            NfcPayload::Compact(p) => Ok(TagCredentials {
                chip_uid: p.chip_uid.clone(),
                did: Did::from_public_key(&p.public_key),
                public_key: p.public_key,
                signature: p.signature.clone(),
                device_id: None,
            }),
            NfcPayload::DecentralizedReference(p) => {
                let device = directory
                    .and_then(|d| d.device(&p.device_id))
                    .ok_or(NfcError::UnknownDevice(p.device_id))?;
                if device.chip_uid.as_ref() != Some(&p.chip_uid) {
                    return Err(NfcError::ChipMismatch {
                        device_id: p.device_id,
                        chip_uid: p.chip_uid.to_string(),
                    });
                }
                let signature = device
                    .chip_signature
                    .clone()
                    .ok_or(NfcError::UnknownDevice(p.device_id))?;
                Ok(TagCredentials {
                    chip_uid: p.chip_uid.clone(),
                    did: device.did(),
                    public_key: device.public_key,
                    signature,
                    device_id: Some(p.device_id),
                })
            }
        }
    }
}

/// Reject truncated cryptographic fields before decoding them.
pub fn check_field_length(field: &'static str, value: &str, min: usize) -> Result<(), NfcError> {
    if value.len() < min {
        return Err(NfcError::TruncatedField {
            field,
            len: value.len(),
            min,
        });
    }
    Ok(())
}

fn parse_signature(field: &'static str, value: &str) -> Result<MeldSignature, NfcError> {
    check_field_length(field, value, MIN_SIGNATURE_HEX_LENGTH)?;
    MeldSignature::from_hex(value).map_err(|e| NfcError::InvalidField {
        field,
        reason: e.to_string(),
    })
}

fn parse_public_key(field: &'static str, value: &str) -> Result<MeldPublicKey, NfcError> {
    check_field_length(field, value, MIN_PUBLIC_KEY_HEX_LENGTH)?;
    MeldPublicKey::from_hex(value).map_err(|e| NfcError::InvalidField {
        field,
        reason: e.to_string(),
    })
}
