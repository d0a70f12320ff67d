//! # Key Management
//!
//! Ed25519 keypair generation and serialization for MELD identities and
//! devices.
//!
//! Every identity has one signing key derived from its master seed, and
//! every registered device (a tag, a wristband, a node) has a fresh keypair
//! of its own. This module handles creation, hex encoding, and the
//! boolean-returning verification every higher layer relies on.
//!
//! ## Security considerations
//!
//! - Private keys are zeroized on drop (thanks, ed25519-dalek).
//! - Fresh keys come from the OS RNG (`OsRng`).
//! - Key bytes are never logged. `Debug` prints the public half only.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::config::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

/// Errors that can occur during key operations.
///
/// Deliberately terse about *why* parsing failed; error messages end up in
/// logs and logs end up in places.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key bytes: expected 32 bytes of hex")]
    InvalidSecretKey,

    #[error("invalid public key: expected 32 bytes encoding a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature encoding: expected 64 bytes of hex")]
    InvalidSignature,
}

/// Generate a fresh Ed25519 keypair from the OS CSPRNG.
///
/// Returns the keypair (private half) together with its public key.
pub fn generate_keypair() -> (MeldKeypair, MeldPublicKey) {
    let keypair = MeldKeypair::generate();
    let public_key = keypair.public_key();
    (keypair, public_key)
}

/// An Ed25519 keypair wrapping the dalek signing key.
///
/// `MeldKeypair` intentionally does NOT implement `Serialize`. Persisting a
/// secret is a deliberate act that goes through [`secret_key_hex`] and the
/// local secret store, never through a JSON derive.
///
/// [`secret_key_hex`]: MeldKeypair::secret_key_hex
///
/// # Examples
///
/// ```
/// use meld_protocol::crypto::keys::MeldKeypair;
///
/// let kp = MeldKeypair::generate();
/// let sig = kp.sign(b"tap");
/// assert!(kp.verify(b"tap", &sig));
/// ```
pub struct MeldKeypair {
    signing_key: SigningKey,
}

/// The public half of a keypair. Serialized as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MeldPublicKey {
    bytes: [u8; PUBLIC_KEY_LENGTH],
}

/// A 64-byte Ed25519 signature. Serialized as 128 lowercase hex characters.
#[derive(Clone, PartialEq, Eq)]
pub struct MeldSignature {
    bytes: [u8; SIGNATURE_LENGTH],
}

impl MeldKeypair {
    /// Generate a fresh keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    ///
    /// In Ed25519 the 32-byte secret key *is* the seed. Feed it CSPRNG or
    /// KDF output, never something a human typed.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Reconstruct a keypair from a hex-encoded secret key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str).map_err(|_| KeyError::InvalidSecretKey)?;
        let arr: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&arr))
    }

    /// Returns the public key associated with this keypair.
    pub fn public_key(&self) -> MeldPublicKey {
        MeldPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message. Deterministic per RFC 8032.
    pub fn sign(&self, message: &[u8]) -> MeldSignature {
        MeldSignature {
            bytes: self.signing_key.sign(message).to_bytes(),
        }
    }

    /// Verify a signature against this keypair's public key.
    pub fn verify(&self, message: &[u8], signature: &MeldSignature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Export the raw 32-byte secret. Handle with extreme care.
    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }

    /// Hex-encoded secret, the form the local secret store persists.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key_bytes())
    }
}

impl Clone for MeldKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for MeldKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Public half only. A partial secret is still a leaked secret.
        write!(f, "MeldKeypair(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// MeldPublicKey
// ---------------------------------------------------------------------------

impl MeldPublicKey {
    /// Try to create a public key from a byte slice.
    ///
    /// Rejects anything that is not exactly 32 bytes or that does not
    /// decompress to a point on the curve.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Parse a hex-encoded public key. Same validation as [`try_from_slice`].
    ///
    /// [`try_from_slice`]: MeldPublicKey::try_from_slice
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.bytes
    }

    /// Verify a signature against this public key.
    ///
    /// Returns `false` for every failure mode. Callers branch on the
    /// boolean; nobody downstream needs to know which check tripped.
    pub fn verify(&self, message: &[u8], signature: &MeldSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let dalek_sig = DalekSignature::from_bytes(&signature.bytes);
        verifying_key.verify(message, &dalek_sig).is_ok()
    }

    /// Hex-encoded representation. 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl Hash for MeldPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for MeldPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MeldPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MeldPublicKey({})", &self.to_hex()[..16])
    }
}

impl Serialize for MeldPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MeldPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// MeldSignature
// ---------------------------------------------------------------------------

impl MeldSignature {
    /// Create a signature from its raw 64-byte representation.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Try to create a signature from a byte slice of exactly 64 bytes.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; SIGNATURE_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self { bytes })
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.bytes
    }

    /// Hex-encoded signature. 128 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse a hex-encoded signature.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidSignature)?;
        Self::try_from_slice(&bytes)
    }
}

impl fmt::Display for MeldSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MeldSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        write!(f, "MeldSignature({}...{})", &hex_str[..8], &hex_str[120..])
    }
}

impl Serialize for MeldSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MeldSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
