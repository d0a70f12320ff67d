//! # NFC Wire Format
//!
//! Getting identity material onto passive tags and back off again.
//!
//! - [`uid`]: chip UIDs and their text forms.
//! - [`chip`]: chip classes and writable budgets.
//! - [`payload`]: the three wire tiers as a sum type.
//! - [`codec`]: tier selection under a byte budget, URL decoding.
//! - [`ndef`]: the NDEF URI record the hardware actually stores.
//! - [`reader`]: debouncing and tag authentication on the reader side.

pub mod chip;
pub mod codec;
pub mod ndef;
pub mod payload;
pub mod reader;
pub mod uid;

pub use chip::ChipClass;
pub use codec::{decode_url, EncodedTag, NfcCodec};
pub use ndef::{decode_uri_record, encode_uri_record};
pub use payload::{
    CompactPayload, DeviceDirectory, FullPayload, NfcPayload, PayloadTier, ReferencePayload,
    TagCredentials,
};
pub use reader::{scan_tag, ScannedTag, TagDebouncer};
pub use uid::ChipUid;

use thiserror::Error;

use crate::error::ErrorKind;
use crate::identity::DeviceId;

/// Errors from encoding, decoding and reading tags.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NfcError {
    #[error("invalid chip UID: {0}")]
    InvalidUid(String),

    #[error("unknown chip class '{0}'")]
    UnknownChipClass(String),

    #[error("capacity exceeded: {constraint}")]
    CapacityExceeded {
        budget: usize,
        constraint: String,
        hint: String,
    },

    #[error("{field} is {len} characters, minimum is {min}")]
    TruncatedField {
        field: &'static str,
        len: usize,
        min: usize,
    },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("missing query parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("query does not match any tag format")]
    UnknownFormat,

    #[error("malformed tag URL: {0}")]
    MalformedUrl(String),

    #[error("device {0} is not registered")]
    UnknownDevice(DeviceId),

    #[error("device {device_id} is not bound to chip {chip_uid}")]
    ChipMismatch { device_id: DeviceId, chip_uid: String },

    #[error("NDEF message is {len} bytes, reader buffer is {max}")]
    NdefTooLarge { len: usize, max: usize },

    #[error("malformed NDEF record: {0}")]
    MalformedNdef(String),
}

impl NfcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NfcError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            _ => ErrorKind::Validation,
        }
    }

    /// What an operator can do about it.
    pub fn hint(&self) -> Option<&str> {
        match self {
            NfcError::CapacityExceeded { hint, .. } => Some(hint.as_str()),
            NfcError::TruncatedField { .. } => {
                Some("re-provision the tag; signatures and keys are never shortened")
            }
            NfcError::UnknownDevice(_) => {
                Some("reference tags only resolve on a registry that holds the device")
            }
            NfcError::ChipMismatch { .. } => Some("the payload was written for a different chip"),
            NfcError::UnknownChipClass(_) => Some("expected one of: ultra-small, medium, large, secure"),
            _ => None,
        }
    }
}
