//! # Hashing & Key Derivation
//!
//! BLAKE3 is the only hash MELD needs. It backs two things:
//!
//! - **Key derivation**: the identity signing key is derived from the
//!   master seed with `blake3::derive_key` under a fixed context string, so
//!   the raw seed never doubles as a signing key.
//! - **Fingerprints**: short, stable identifiers for log lines.

use crate::config::{IDENTITY_KEY_CONTEXT, MASTER_SEED_LENGTH};

use super::keys::{MeldKeypair, MeldPublicKey};

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive the identity signing keypair from a master seed.
///
/// Deterministic: the same seed always yields the same keypair, which is
/// what makes `load_identity` after a restart produce the same DID.
pub fn derive_identity_keypair(master_seed: &[u8; MASTER_SEED_LENGTH]) -> MeldKeypair {
    let derived = blake3::derive_key(IDENTITY_KEY_CONTEXT, master_seed);
    MeldKeypair::from_seed(&derived)
}

/// An 8-byte hex fingerprint of a public key, for logs.
pub fn key_fingerprint(public_key: &MeldPublicKey) -> String {
    hex::encode(&blake3_hash(public_key.as_bytes())[..8])
}
