//! Re-exports of the core key types for the identity layer.
//!
//! The implementations live in [`crate::crypto::keys`]; identity code imports
//! them from here so identity-related types share one namespace.

pub use crate::crypto::keys::{MeldKeypair, MeldPublicKey, MeldSignature};
