//! # Digital Signatures
//!
//! Ed25519 signing and verification, the backbone of authentication in MELD.
//!
//! Moments, threshold proofs and tag challenges are all authenticated with
//! an Ed25519 signature produced here. Wrapping the dalek calls gives us a
//! single place to audit every signing operation, and keeps the "verify
//! returns a boolean" contract uniform across the codebase.
//!
//! ## Failure model
//!
//! Verification never errors. Tampered payloads, wrong keys and malformed
//! signature encodings all come back as `false` so calling flows (tag
//! authentication, proof rendering) can branch without unwinding.

use super::keys::{MeldKeypair, MeldPublicKey, MeldSignature};

/// Sign a message using a keypair.
///
/// # Example
///
/// ```
/// use meld_protocol::crypto::{MeldKeypair, sign, verify};
///
/// let keypair = MeldKeypair::generate();
/// let signature = sign(&keypair, b"tap at stage left");
///
/// assert!(verify(&keypair.public_key(), b"tap at stage left", &signature));
/// ```
pub fn sign(keypair: &MeldKeypair, message: &[u8]) -> MeldSignature {
    keypair.sign(message)
}

/// Verify an Ed25519 signature against a public key and message.
pub fn verify(public_key: &MeldPublicKey, message: &[u8], signature: &MeldSignature) -> bool {
    public_key.verify(message, signature)
}

/// Verify a signature that arrived as hex strings off the wire.
///
/// Malformed hex, a truncated signature or an off-curve key all yield
/// `false`, exactly like a bad signature.
pub fn verify_hex(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(public_key) = MeldPublicKey::from_hex(public_key_hex) else {
        return false;
    };
    let Ok(signature) = MeldSignature::from_hex(signature_hex) else {
        return false;
    };
    public_key.verify(message, &signature)
}

/// Verify every `(public_key, message, signature)` triple.
///
/// Returns `true` only if all of them verify. An empty batch is vacuously
/// valid. Sequential for now; callers that need to know *which* entry failed
/// should verify individually.
pub fn batch_verify(items: &[(MeldPublicKey, Vec<u8>, MeldSignature)]) -> bool {
    items
        .iter()
        .all(|(public_key, message, signature)| verify(public_key, message, signature))
}
