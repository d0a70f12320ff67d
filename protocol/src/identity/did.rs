//! # did:key Identifiers
//!
//! Every MELD identity and device is named by a `did:key` DID, which
//! embeds the Ed25519 public key directly in the identifier. That makes
//! the DID a pure function of the key and makes resolution free: anyone
//! holding the string can recover the verification key without a network
//! round trip, which is exactly what a battery-less tag reader needs.
//!
//! ## DID Format
//!
//! ```text
//! did:key:z<base58btc(0xed 0x01 ++ public_key)>
//! ```
//!
//! The `z` is the multibase code for base58btc; `0xed 0x01` is the varint
//! multicodec for an Ed25519 public key. Every DID we emit or accept must
//! match `^did:key:z[1-9A-HJ-NP-Za-km-z]+$`.
//!
//! ## Standards References
//!
//! - [DID Core v1.0](https://www.w3.org/TR/did-core/)
//! - [The did:key Method](https://w3c-ccg.github.io/did-method-key/)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{DID_KEY_PREFIX, ED25519_MULTICODEC_PREFIX, PUBLIC_KEY_LENGTH};
use crate::crypto::keys::MeldPublicKey;

/// Context URI for the W3C DID Core specification.
const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// Context URI for the Ed25519 verification key suite.
const ED25519_CONTEXT: &str = "https://w3id.org/security/suites/ed25519-2020/v1";

/// Verification method type for Ed25519 public keys.
const VERIFICATION_KEY_TYPE: &str = "Ed25519VerificationKey2020";

/// The base58btc (Bitcoin) alphabet: no `0`, `O`, `I` or `l`.
const BASE58BTC_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during DID operations. All of them are
/// validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DidError {
    /// The DID string does not match the did:key grammar.
    #[error("invalid DID format: {0}")]
    InvalidFormat(String),

    /// The DID names a method other than `key`.
    #[error("unsupported DID method: expected 'key', got '{0}'")]
    UnsupportedMethod(String),

    /// The decoded identifier does not start with the Ed25519 multicodec.
    #[error("unsupported multicodec: expected Ed25519 (0xed01)")]
    UnsupportedMulticodec,

    /// The embedded key material is empty, the wrong length, or off-curve.
    #[error("invalid public key in DID: {0}")]
    InvalidKey(String),
}

/// Check a string against the did:key grammar without decoding it.
///
/// This is the cheap syntactic check; [`Did::parse`] additionally decodes
/// the key and validates it.
pub fn is_did_key_syntax(s: &str) -> bool {
    match s.strip_prefix(DID_KEY_PREFIX) {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| BASE58BTC_ALPHABET.contains(c)),
        None => false,
    }
}

/// Derive a DID from raw public key bytes.
///
/// Fails with [`DidError::InvalidKey`] on zero-length, wrong-length or
/// off-curve input.
pub fn create_did(public_key: &[u8]) -> Result<Did, DidError> {
    if public_key.is_empty() {
        return Err(DidError::InvalidKey("public key is empty".into()));
    }
    let key = MeldPublicKey::try_from_slice(public_key)
        .map_err(|e| DidError::InvalidKey(e.to_string()))?;
    Ok(Did::from_public_key(&key))
}

// ---------------------------------------------------------------------------
// Did
// ---------------------------------------------------------------------------

/// A validated `did:key` identifier for an Ed25519 key.
///
/// Holds both the canonical string and the decoded key, so neither
/// rendering nor resolution ever needs to re-parse.
///
/// # Examples
///
/// ```
/// use meld_protocol::crypto::MeldKeypair;
/// use meld_protocol::identity::Did;
///
/// let kp = MeldKeypair::generate();
/// let did = Did::from_public_key(&kp.public_key());
/// assert!(did.as_str().starts_with("did:key:z6Mk"));
/// assert_eq!(did.public_key(), &kp.public_key());
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Did {
    value: String,
    public_key: MeldPublicKey,
}

impl Did {
    /// Create a DID directly from a public key. Infallible: a
    /// `MeldPublicKey` has already been validated.
    pub fn from_public_key(public_key: &MeldPublicKey) -> Self {
        let mut multicodec = Vec::with_capacity(ED25519_MULTICODEC_PREFIX.len() + PUBLIC_KEY_LENGTH);
        multicodec.extend_from_slice(&ED25519_MULTICODEC_PREFIX);
        multicodec.extend_from_slice(public_key.as_bytes());
        let value = format!("{}{}", DID_KEY_PREFIX, bs58::encode(&multicodec).into_string());
        Self {
            value,
            public_key: *public_key,
        }
    }

    /// Parse and fully validate a DID string.
    pub fn parse(did: &str) -> Result<Self, DidError> {
        let parts: Vec<&str> = did.splitn(3, ':').collect();
        if parts.len() != 3 || parts[0] != "did" {
            return Err(DidError::InvalidFormat(
                "DID must have format 'did:<method>:<identifier>'".into(),
            ));
        }
        if parts[1] != "key" {
            return Err(DidError::UnsupportedMethod(parts[1].to_string()));
        }
        if !is_did_key_syntax(did) {
            return Err(DidError::InvalidFormat(
                "identifier must be 'z' followed by base58btc characters".into(),
            ));
        }

        let decoded = bs58::decode(&did[DID_KEY_PREFIX.len()..])
            .into_vec()
            .map_err(|e| DidError::InvalidFormat(e.to_string()))?;
        let key_bytes = decoded
            .strip_prefix(&ED25519_MULTICODEC_PREFIX[..])
            .ok_or(DidError::UnsupportedMulticodec)?;
        let public_key = MeldPublicKey::try_from_slice(key_bytes)
            .map_err(|e| DidError::InvalidKey(e.to_string()))?;

        let canonical = Self::from_public_key(&public_key);
        if canonical.value != did {
            // Leading-zero quirks in base58 can give two spellings; only the
            // canonical one is accepted.
            return Err(DidError::InvalidFormat("non-canonical base58 encoding".into()));
        }
        Ok(canonical)
    }

    /// The DID string.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The Ed25519 key this DID resolves to.
    pub fn public_key(&self) -> &MeldPublicKey {
        &self.public_key
    }

    /// The multibase fragment after `did:key:`, reused as the key id.
    fn multibase(&self) -> &str {
        &self.value["did:key:".len()..]
    }

    /// Generate a W3C DID Document for this identifier.
    ///
    /// One `Ed25519VerificationKey2020` method, referenced from both
    /// `authentication` and `assertionMethod`, as the did:key method
    /// prescribes.
    pub fn to_did_document(&self) -> DidDocument {
        let key_id = format!("{}#{}", self.value, self.multibase());
        DidDocument {
            context: vec![DID_CONTEXT.to_string(), ED25519_CONTEXT.to_string()],
            id: self.value.clone(),
            verification_method: vec![VerificationMethod {
                id: key_id.clone(),
                type_: VERIFICATION_KEY_TYPE.to_string(),
                controller: self.value.clone(),
                public_key_multibase: self.multibase().to_string(),
            }],
            authentication: vec![key_id.clone()],
            assertion_method: vec![key_id],
            created: Utc::now(),
        }
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.value)
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// DID Document Types
// ---------------------------------------------------------------------------

/// A W3C DID Document describing a did:key identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidDocument {
    /// JSON-LD context URIs.
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// The DID string this document describes.
    pub id: String,

    /// Verification methods (cryptographic keys) associated with this DID.
    #[serde(rename = "verificationMethod")]
    pub verification_method: Vec<VerificationMethod>,

    /// References to verification methods usable for authentication.
    pub authentication: Vec<String>,

    /// References to verification methods usable for issuing assertions.
    #[serde(rename = "assertionMethod")]
    pub assertion_method: Vec<String>,

    /// When this document was generated.
    pub created: DateTime<Utc>,
}

impl DidDocument {
    /// Serialize this document to a pretty-printed JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Validate that the document has the required fields and that its
    /// id is a well-formed did:key.
    pub fn validate(&self) -> Result<(), DidError> {
        Did::parse(&self.id)?;

        if self.verification_method.is_empty() {
            return Err(DidError::InvalidFormat(
                "document must have at least one verification method".into(),
            ));
        }
        if self.authentication.is_empty() {
            return Err(DidError::InvalidFormat(
                "document must have at least one authentication method".into(),
            ));
        }
        if !self.context.iter().any(|c| c == DID_CONTEXT) {
            return Err(DidError::InvalidFormat(
                "document must include DID Core context".into(),
            ));
        }
        Ok(())
    }
}

/// A verification method entry in a DID Document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationMethod {
    /// DID URL of this method (`<did>#<multibase>`).
    pub id: String,

    /// Key type, always `Ed25519VerificationKey2020`.
    #[serde(rename = "type")]
    pub type_: String,

    /// The DID that controls this verification method.
    pub controller: String,

    /// The public key in multibase (base58btc, `z` prefix, multicodec).
    #[serde(rename = "publicKeyMultibase")]
    pub public_key_multibase: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
