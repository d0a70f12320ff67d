// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # MELD Protocol, Core Library
//!
//! Identity and attestation for people who meet in the physical world. A
//! participant holds one did:key identity; the things they do together
//! become signed *moments*; enough moments add up to a threshold proof;
//! and the whole identity fits on a sticker-sized NFC tag.
//!
//! ## Architecture
//!
//! - **crypto**: Ed25519 and BLAKE3. Nothing else, and nothing homemade.
//! - **identity**: did:key encoding, DID documents, device records.
//! - **moment**: canonical bytes, signing, verification, freshness.
//! - **proof**: signed threshold-count commitments over a moment list.
//! - **nfc**: chip classes, the three wire tiers, NDEF framing, tag reads.
//! - **registry**: the identity store, device registration, provisioning.
//! - **storage**: the key/value and moment-archive collaborator traits.
//! - **hardware**: the tag-writer boundary, deadlines and cancellation.
//! - **config**: protocol constants and provisioning defaults.
//! - **error**: the shared error taxonomy.
//!
//! ## Ground rules
//!
//! 1. A bad signature is `false`, never a panic and never an error.
//! 2. Signatures and keys are never shortened to fit a tag.
//! 3. Registry operations commit fully or not at all.

pub mod config;
pub mod crypto;
pub mod error;
pub mod hardware;
pub mod identity;
pub mod moment;
pub mod nfc;
pub mod proof;
pub mod registry;
pub mod storage;

pub use config::PROTOCOL_VERSION;
pub use crypto::{MeldKeypair, MeldPublicKey, MeldSignature};
pub use error::{ErrorKind, MeldError, MeldResult};
pub use identity::{Device, DeviceId, DeviceType, Did};
pub use moment::Moment;
pub use nfc::{ChipClass, ChipUid, NfcCodec, TagCredentials};
pub use proof::{ThresholdProof, ThresholdProver};
pub use registry::{IdentityStore, ProvisionRequest, SeedSource};
