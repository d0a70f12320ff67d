//! Signing and verifying moments.
//!
//! Verification is a pure boolean: a tampered field, the wrong key and a
//! malformed signature all return `false`. Freshness is a separate policy
//! check, see [`super::freshness`].

use tracing::debug;

use crate::crypto::hash::key_fingerprint;
use crate::crypto::keys::{MeldKeypair, MeldPublicKey, MeldSignature};
use crate::identity::Did;

use super::record::{Moment, MomentError, UnsignedMoment};

/// Sign canonical bytes with a private key.
pub fn sign(keypair: &MeldKeypair, canonical_bytes: &[u8]) -> MeldSignature {
    keypair.sign(canonical_bytes)
}

/// Sign a moment body. The keypair must be the one the issuer DID names.
pub fn sign_moment(keypair: &MeldKeypair, body: UnsignedMoment) -> Result<Moment, MomentError> {
    if body.issuer.public_key() != &keypair.public_key() {
        return Err(MomentError::IssuerMismatch {
            issuer: body.issuer.to_string(),
        });
    }
    let signature = sign(keypair, &body.canonical_bytes());
    debug!(
        issuer = %key_fingerprint(&keypair.public_key()),
        timestamp = %body.timestamp,
        "moment signed"
    );
    Ok(body.with_signature(signature))
}

/// Build and sign a moment issued by `keypair` about `subject`, stamped now.
pub fn issue_moment(
    keypair: &MeldKeypair,
    subject: Did,
    description: impl Into<String>,
) -> Result<Moment, MomentError> {
    let issuer = Did::from_public_key(&keypair.public_key());
    sign_moment(keypair, UnsignedMoment::new(subject, issuer, description)?)
}

/// Check `signature` over the moment's canonical bytes under `public_key`.
///
/// The moment's own `signature` field is ignored; callers pass the
/// signature they want checked.
pub fn verify(public_key: &MeldPublicKey, moment: &Moment, signature: &MeldSignature) -> bool {
    public_key.verify(&moment.canonical_bytes(), signature)
}

/// Same as [`verify`], taking the signature as hex off the wire.
pub fn verify_hex(public_key: &MeldPublicKey, moment: &Moment, signature_hex: &str) -> bool {
    match MeldSignature::from_hex(signature_hex) {
        Ok(signature) => verify(public_key, moment, &signature),
        Err(_) => false,
    }
}
