//! # Cryptographic Primitives for MELD
//!
//! Every signed moment, every threshold proof and every tag challenge flows
//! through here:
//!
//! - **Ed25519** for signatures. Deterministic, 64-byte signatures that
//!   verify quickly on a tag reader.
//! - **BLAKE3** for hashing and key derivation.
//!
//! Everything is a thin, type-safe wrapper around `ed25519-dalek` and
//! `blake3`.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, derive_identity_keypair, key_fingerprint};
pub use keys::{generate_keypair, KeyError, MeldKeypair, MeldPublicKey, MeldSignature};
pub use signatures::{batch_verify, sign, verify, verify_hex};
