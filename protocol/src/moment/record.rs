//! Moment records and their canonical byte form.
//!
//! A moment is a timestamped attestation that `issuer` met `subject`. The
//! signature covers exactly four fields, in this order:
//!
//! ```text
//! {"subject":"did:key:z...","issuer":"did:key:z...","timestamp":"2026-03-01T19:04:11.250Z","description":"..."}
//! ```
//!
//! Compact JSON, no whitespace, strings escaped by `serde_json`. Timestamps
//! are cut to millisecond precision before signing so the wire form
//! (`YYYY-MM-DDTHH:MM:SS.mmmZ`) always reproduces the signed bytes.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::MAX_DESCRIPTION_LENGTH;
use crate::crypto::keys::{MeldPublicKey, MeldSignature};
use crate::error::ErrorKind;
use crate::identity::Did;

/// Errors raised while building or decoding moments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MomentError {
    #[error("moment description is empty")]
    EmptyDescription,

    #[error("moment description is {len} bytes, limit is {max}")]
    DescriptionTooLong { len: usize, max: usize },

    #[error("issuer {issuer} does not match the signing key")]
    IssuerMismatch { issuer: String },

    #[error("malformed moment: {0}")]
    Malformed(String),
}

impl MomentError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Truncate a timestamp to whole milliseconds.
pub fn normalize_timestamp(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(timestamp.timestamp_millis())
        .single()
        .unwrap_or(timestamp)
}

/// Render a timestamp in the canonical wire form.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter for the canonical millisecond timestamp format.
pub(crate) mod millis_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let parsed = DateTime::parse_from_rfc3339(&s)
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);
        if super::format_timestamp(&parsed) != s {
            return Err(serde::de::Error::custom(format!(
                "timestamp '{}' is not in canonical YYYY-MM-DDTHH:MM:SS.mmmZ form",
                s
            )));
        }
        Ok(parsed)
    }
}

fn validate_description(description: &str) -> Result<(), MomentError> {
    if description.trim().is_empty() {
        return Err(MomentError::EmptyDescription);
    }
    if description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(MomentError::DescriptionTooLong {
            len: description.len(),
            max: MAX_DESCRIPTION_LENGTH,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unsigned moment
// ---------------------------------------------------------------------------

/// The four signed fields of a moment, before a signature exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedMoment {
    pub subject: Did,
    pub issuer: Did,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl UnsignedMoment {
    /// A moment stamped with the current wall-clock time.
    pub fn new(subject: Did, issuer: Did, description: impl Into<String>) -> Result<Self, MomentError> {
        Self::at(subject, issuer, Utc::now(), description)
    }

    /// A moment with an explicit timestamp (normalized to milliseconds).
    pub fn at(
        subject: Did,
        issuer: Did,
        timestamp: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Result<Self, MomentError> {
        let description = description.into();
        validate_description(&description)?;
        Ok(Self {
            subject,
            issuer,
            timestamp: normalize_timestamp(timestamp),
            description,
        })
    }

    /// The exact bytes a signature covers.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonicalize(&self.subject, &self.issuer, &self.timestamp, &self.description)
    }

    /// Attach a signature.
    pub fn with_signature(self, signature: MeldSignature) -> Moment {
        Moment {
            subject: self.subject,
            issuer: self.issuer,
            timestamp: self.timestamp,
            description: self.description,
            signature,
        }
    }
}

/// Canonical signed form of the four moment fields.
pub fn canonicalize(
    subject: &Did,
    issuer: &Did,
    timestamp: &DateTime<Utc>,
    description: &str,
) -> Vec<u8> {
    // serde_json::Value's Display is the compact form and escapes strings.
    format!(
        "{{\"subject\":{},\"issuer\":{},\"timestamp\":{},\"description\":{}}}",
        Value::from(subject.as_str()),
        Value::from(issuer.as_str()),
        Value::from(format_timestamp(timestamp)),
        Value::from(description),
    )
    .into_bytes()
}

// ---------------------------------------------------------------------------
// Signed moment
// ---------------------------------------------------------------------------

/// A signed moment, in its wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moment {
    pub subject: Did,
    pub issuer: Did,
    #[serde(with = "millis_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub signature: MeldSignature,
}

impl Moment {
    /// Recompute the canonical bytes from the current field values.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonicalize(&self.subject, &self.issuer, &self.timestamp, &self.description)
    }

    /// Verify the attached signature under `public_key`.
    pub fn verify(&self, public_key: &MeldPublicKey) -> bool {
        public_key.verify(&self.canonical_bytes(), &self.signature)
    }

    /// Verify under the key embedded in the issuer DID.
    pub fn verify_with_issuer(&self) -> bool {
        self.verify(self.issuer.public_key())
    }

    /// Serialize to the JSON wire shape.
    pub fn to_json(&self) -> Result<String, MomentError> {
        serde_json::to_string(self).map_err(|e| MomentError::Malformed(e.to_string()))
    }

    /// Parse the JSON wire shape. The DIDs are validated and the
    /// signature must be 128 hex characters; the signature itself is not
    /// checked here.
    pub fn from_json(json: &str) -> Result<Self, MomentError> {
        serde_json::from_str(json).map_err(|e| MomentError::Malformed(e.to_string()))
    }
}
