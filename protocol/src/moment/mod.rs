//! # Moments
//!
//! Signed, timestamped attestations of a physical-world interaction.
//!
//! - [`record`]: the moment types, canonical bytes and wire shape.
//! - [`signer`]: signing and boolean verification.
//! - [`freshness`]: the +/- 5 minute wall-clock policy, kept apart from
//!   cryptographic verification.

pub mod freshness;
pub mod record;
pub mod signer;

pub use freshness::{is_timestamp_fresh, is_within_tolerance};
pub use record::{
    canonicalize, format_timestamp, normalize_timestamp, Moment, MomentError, UnsignedMoment,
};
pub use signer::{issue_moment, sign, sign_moment, verify, verify_hex};
