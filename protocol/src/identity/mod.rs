//! # Identity Module
//!
//! Who signs things in MELD. An identity is one master seed held in the
//! local secret store; its signing key is derived from that seed, and its
//! public face is a `did:key` DID. Under an identity sit any number of
//! devices, each with its own keypair and DID.
//!
//! 1. **Keypair**: raw Ed25519 key material (re-exported from `crypto`).
//! 2. **DID**: the self-resolving `did:key:z6Mk...` identifier, plus the
//!    W3C DID document it expands to.
//! 3. **Device**: the per-device record the registry persists.

pub mod device;
pub mod did;
pub mod keypair;

pub use device::{secret_storage_key, Device, DeviceId, DeviceType};
pub use did::{create_did, is_did_key_syntax, Did, DidDocument, DidError, VerificationMethod};
pub use keypair::{MeldKeypair, MeldPublicKey, MeldSignature};
