//! # NFC Wire Codec
//!
//! Fits tag credentials into a URL that the target chip can hold:
//!
//! 1. **Full**: `{base}/nfc?did=..&signature=..&publicKey=..&uid=..`
//! 2. **Compact**: `{base}/nfc?c=..&s=..&p=..`, only for self-certifying
//!    credentials (DID derivable from the key).
//! 3. **Decentralized reference**: `{base}/nfc?d=<deviceId>&c=..`, only for
//!    devices already in the registry.
//!
//! First tier that fits wins. Size is the larger of the URL and its NDEF
//! record. Cryptographic fields are never shortened; when nothing fits the
//! encoder fails with `CapacityExceeded` and says why.
//!
//! With the default base URL and a 7-byte UID the tiers come to roughly
//! 325, 236 and 77 bytes.

use std::collections::HashMap;

use tracing::{debug, warn};
use url::Url;

use crate::config::{
    ProvisioningConfig, DEFAULT_NFC_BASE_URL, MAX_NDEF_MESSAGE_LENGTH, MIN_PUBLIC_KEY_HEX_LENGTH,
    MIN_SIGNATURE_HEX_LENGTH, NFC_PATH,
};

use super::chip::ChipClass;
use super::ndef::{decode_uri_record, encode_uri_record};
use super::payload::{check_field_length, DeviceDirectory, NfcPayload, PayloadTier, TagCredentials};
use super::NfcError;

/// An encoded tag, ready for the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTag {
    pub payload: NfcPayload,
    pub url: String,
    /// NDEF message bytes handed to the hardware writer.
    pub ndef: Vec<u8>,
    pub budget: usize,
}

impl EncodedTag {
    pub fn tier(&self) -> PayloadTier {
        self.payload.tier()
    }

    /// Bytes counted against the budget.
    pub fn size(&self) -> usize {
        self.url.len().max(self.ndef.len())
    }
}

/// Tier selection and URL rendering for one base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfcCodec {
    base_url: String,
}

impl Default for NfcCodec {
    fn default() -> Self {
        Self::new(DEFAULT_NFC_BASE_URL)
    }
}

impl NfcCodec {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn from_config(config: &ProvisioningConfig) -> Self {
        Self::new(config.base_url.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The full URL for a payload.
    pub fn url_for(&self, payload: &NfcPayload) -> String {
        format!("{}{}?{}", self.base_url, NFC_PATH, payload.to_query())
    }

    /// Encode for a chip class.
    pub fn encode(
        &self,
        credentials: &TagCredentials,
        chip: ChipClass,
        directory: Option<&dyn DeviceDirectory>,
    ) -> Result<EncodedTag, NfcError> {
        self.encode_with_budget(credentials, chip.budget(), directory)
    }

    /// Encode against an arbitrary byte budget.
    pub fn encode_with_budget(
        &self,
        credentials: &TagCredentials,
        budget: usize,
        directory: Option<&dyn DeviceDirectory>,
    ) -> Result<EncodedTag, NfcError> {
        let mut rejections = Vec::new();
        let mut smallest_size: Option<usize> = None;
        let mut reference_blocked = false;

        for tier in PayloadTier::ORDER {
            let payload = match self.candidate(tier, credentials, directory) {
                Ok(payload) => payload,
                Err(reason) => {
                    reference_blocked |= tier == PayloadTier::DecentralizedReference;
                    rejections.push(format!("{}: {}", tier, reason));
                    continue;
                }
            };

            let url = self.url_for(&payload);
            let ndef = encode_uri_record(&url);
            let encoded = EncodedTag {
                payload,
                url,
                ndef,
                budget,
            };
            if encoded.ndef.len() > MAX_NDEF_MESSAGE_LENGTH {
                rejections.push(format!(
                    "{}: NDEF message is {} bytes, readers buffer at most {}",
                    tier,
                    encoded.ndef.len(),
                    MAX_NDEF_MESSAGE_LENGTH
                ));
                continue;
            }
            let size = encoded.size();
            if size <= budget {
                debug!(%tier, size, budget, "tag payload encoded");
                return Ok(encoded);
            }
            rejections.push(format!("{}: needs {} bytes", tier, size));
            smallest_size = Some(smallest_size.map_or(size, |s| s.min(size)));
        }

        let hint = capacity_hint(smallest_size, reference_blocked);
        let constraint = format!(
            "no tier fits the {}-byte budget without shortening cryptographic fields ({})",
            budget,
            rejections.join("; ")
        );
        warn!(budget, %constraint, "tag payload does not fit");
        Err(NfcError::CapacityExceeded {
            budget,
            constraint,
            hint,
        })
    }

    /// Build a tier's payload, or say why the tier is unavailable.
    fn candidate(
        &self,
        tier: PayloadTier,
        credentials: &TagCredentials,
        directory: Option<&dyn DeviceDirectory>,
    ) -> Result<NfcPayload, String> {
        let payload = NfcPayload::for_tier(tier, credentials).ok_or_else(|| match tier {
            PayloadTier::Compact => "DID is not derivable from the public key".to_string(),
            PayloadTier::DecentralizedReference => "credentials carry no device id".to_string(),
            PayloadTier::Full => "unavailable".to_string(),
        })?;

        match &payload {
            NfcPayload::Full(_) | NfcPayload::Compact(_) => {
                check_field_length(
                    "signature",
                    &credentials.signature.to_hex(),
                    MIN_SIGNATURE_HEX_LENGTH,
                )
                .and_then(|_| {
                    check_field_length(
                        "publicKey",
                        &credentials.public_key.to_hex(),
                        MIN_PUBLIC_KEY_HEX_LENGTH,
                    )
                })
                .map_err(|e| e.to_string())?;
            }
            NfcPayload::DecentralizedReference(reference) => {
                let device = directory
                    .and_then(|d| d.device(&reference.device_id))
                    .ok_or_else(|| format!("device {} is not registered", reference.device_id))?;
                if device.chip_uid.as_ref() != Some(&reference.chip_uid) {
                    return Err(format!(
                        "device {} is not bound to chip {}",
                        reference.device_id, reference.chip_uid
                    ));
                }
            }
        }
        Ok(payload)
    }

    /// Decode a tag URL into its payload.
    pub fn decode(&self, url: &str) -> Result<NfcPayload, NfcError> {
        decode_url(url)
    }

    /// Decode raw NDEF bytes as read off a tag.
    pub fn decode_ndef(&self, bytes: &[u8]) -> Result<NfcPayload, NfcError> {
        decode_url(&decode_uri_record(bytes)?)
    }
}

/// Parse a tag URL. Any host is accepted; the path must end in `/nfc`.
pub fn decode_url(url: &str) -> Result<NfcPayload, NfcError> {
    let parsed = Url::parse(url).map_err(|e| NfcError::MalformedUrl(e.to_string()))?;
    if !parsed.path().ends_with(NFC_PATH) {
        return Err(NfcError::MalformedUrl(format!(
            "path '{}' does not end in {}",
            parsed.path(),
            NFC_PATH
        )));
    }
    let pairs: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
    NfcPayload::from_query_pairs(&pairs)
}

fn capacity_hint(smallest_size: Option<usize>, reference_blocked: bool) -> String {
    let chip = smallest_size
        .and_then(ChipClass::smallest_fitting)
        .map(|class| format!("use a chip of class {} or larger", class.as_str()))
        .unwrap_or_else(|| "use a larger-capacity chip".to_string());
    if reference_blocked {
        format!(
            "{}, or register and bind the device so the decentralized reference format can be used",
            chip
        )
    } else {
        format!("{}, or shorten the base URL", chip)
    }
}
