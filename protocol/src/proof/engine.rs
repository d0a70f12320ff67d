//! # Threshold Proofs
//!
//! A threshold proof is an identity's signed statement "I hold at least N
//! moments". The signature covers
//!
//! ```text
//! {"threshold":N,"actualCount":M,"timestamp":T}
//! ```
//!
//! with `T` in epoch milliseconds. This gives authorship and integrity.
//! It does NOT hide `actualCount`: the count travels in the clear next to
//! the signature. Whether the count clears the threshold is application
//! policy ([`ThresholdProof::passes`]), not something the signature proves.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::crypto::hash::key_fingerprint;
use crate::crypto::keys::{MeldKeypair, MeldPublicKey, MeldSignature};
use crate::error::ErrorKind;
use crate::moment::Moment;

/// Errors raised by proof generation and decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("cannot prove a threshold over an empty moment set")]
    EmptyMoments,

    #[error("threshold must be at least 1")]
    ZeroThreshold,

    #[error("none of the {0} moments carry a valid issuer signature")]
    NoVerifiedMoments(usize),

    #[error("malformed proof record: {0}")]
    Malformed(String),
}

impl ProofError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Canonical bytes signed for a proof.
pub fn proof_payload(threshold: u64, actual_count: u64, timestamp: i64) -> Vec<u8> {
    format!(
        "{{\"threshold\":{},\"actualCount\":{},\"timestamp\":{}}}",
        threshold, actual_count, timestamp
    )
    .into_bytes()
}

// ---------------------------------------------------------------------------
// ThresholdProof
// ---------------------------------------------------------------------------

/// A signed count-threshold attestation, in its wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdProof {
    pub threshold: u64,
    pub actual_count: u64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub proof: MeldSignature,
    pub signer_public_key: MeldPublicKey,
}

impl ThresholdProof {
    /// The bytes [`Self::proof`] signs.
    pub fn payload(&self) -> Vec<u8> {
        proof_payload(self.threshold, self.actual_count, self.timestamp)
    }

    /// Signature check against the declared signer key.
    pub fn verify(&self) -> bool {
        self.signer_public_key.verify(&self.payload(), &self.proof)
    }

    /// Pass/fail rendering: `actual_count >= threshold`. Policy only.
    pub fn passes(&self) -> bool {
        self.actual_count >= self.threshold
    }

    /// A proof is worth showing when it verifies and passes.
    pub fn is_accepted(&self) -> bool {
        self.verify() && self.passes()
    }

    pub fn to_json(&self) -> Result<String, ProofError> {
        serde_json::to_string(self).map_err(|e| ProofError::Malformed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ProofError> {
        serde_json::from_str(json).map_err(|e| ProofError::Malformed(e.to_string()))
    }
}

/// Verify a proof record.
pub fn verify_proof(proof: &ThresholdProof) -> bool {
    proof.verify()
}

/// Verify a proof straight off the wire. Unparseable input is `false`.
pub fn verify_proof_json(json: &str) -> bool {
    ThresholdProof::from_json(json).map_or(false, |proof| proof.verify())
}

// ---------------------------------------------------------------------------
// ThresholdProver
// ---------------------------------------------------------------------------

/// Produces threshold proofs signed by one identity key.
///
/// Holds no mutable state, so one prover can serve independent thresholds
/// from several tasks at once.
#[derive(Clone)]
pub struct ThresholdProver {
    keypair: MeldKeypair,
}

impl ThresholdProver {
    pub fn new(keypair: MeldKeypair) -> Self {
        Self { keypair }
    }

    pub fn public_key(&self) -> MeldPublicKey {
        self.keypair.public_key()
    }

    /// Prove `threshold` over `moments`, stamped now.
    pub fn generate(&self, moments: &[Moment], threshold: u64) -> Result<ThresholdProof, ProofError> {
        self.generate_at(moments, threshold, Utc::now().timestamp_millis())
    }

    /// Prove with an explicit timestamp (epoch millis).
    pub fn generate_at(
        &self,
        moments: &[Moment],
        threshold: u64,
        timestamp: i64,
    ) -> Result<ThresholdProof, ProofError> {
        if moments.is_empty() {
            return Err(ProofError::EmptyMoments);
        }
        self.sign_count(moments.len() as u64, threshold, timestamp)
    }

    /// One proof per threshold, all sharing one timestamp.
    pub fn generate_many(
        &self,
        moments: &[Moment],
        thresholds: &[u64],
    ) -> Result<Vec<ThresholdProof>, ProofError> {
        let timestamp = Utc::now().timestamp_millis();
        thresholds
            .iter()
            .map(|&t| self.generate_at(moments, t, timestamp))
            .collect()
    }

    /// Like [`Self::generate`], but only moments whose signature verifies
    /// against their issuer DID are counted.
    pub fn generate_verified(
        &self,
        moments: &[Moment],
        threshold: u64,
    ) -> Result<ThresholdProof, ProofError> {
        if moments.is_empty() {
            return Err(ProofError::EmptyMoments);
        }
        let verified = moments.iter().filter(|m| m.verify_with_issuer()).count();
        if verified == 0 {
            return Err(ProofError::NoVerifiedMoments(moments.len()));
        }
        if verified < moments.len() {
            debug!(
                dropped = moments.len() - verified,
                "moments with invalid signatures excluded from count"
            );
        }
        self.sign_count(verified as u64, threshold, Utc::now().timestamp_millis())
    }

    fn sign_count(
        &self,
        actual_count: u64,
        threshold: u64,
        timestamp: i64,
    ) -> Result<ThresholdProof, ProofError> {
        if threshold == 0 {
            return Err(ProofError::ZeroThreshold);
        }
        let proof = self
            .keypair
            .sign(&proof_payload(threshold, actual_count, timestamp));
        info!(
            signer = %key_fingerprint(&self.keypair.public_key()),
            threshold,
            actual_count,
            "threshold proof generated"
        );
        Ok(ThresholdProof {
            threshold,
            actual_count,
            timestamp,
            proof,
            signer_public_key: self.keypair.public_key(),
        })
    }
}

/// Prove `threshold` over `moments` with the identity key `keypair`.
pub fn generate_proof(
    keypair: &MeldKeypair,
    moments: &[Moment],
    threshold: u64,
) -> Result<ThresholdProof, ProofError> {
    ThresholdProver::new(keypair.clone()).generate(moments, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Did;
    use crate::moment::issue_moment;

    fn moments(n: usize) -> (MeldKeypair, Vec<Moment>) {
        let me = MeldKeypair::generate();
        let list = (0..n)
            .map(|i| {
                let other = MeldKeypair::generate();
                let subject = Did::from_public_key(&me.public_key());
                issue_moment(&other, subject, format!("moment {}", i)).unwrap()
            })
            .collect();
        (me, list)
    }

    #[test]
    fn threshold_five_over_ten_moments() {
        let (me, list) = moments(10);
        let proof = generate_proof(&me, &list, 5).unwrap();
        assert_eq!(proof.threshold, 5);
        assert_eq!(proof.actual_count, 10);
        assert_eq!(proof.signer_public_key, me.public_key());
        assert!(verify_proof(&proof));
        assert!(proof.passes());
    }

    #[test]
    fn flipping_a_proof_byte_fails_verification() {
        let (me, list) = moments(10);
        let proof = generate_proof(&me, &list, 5).unwrap();
        let json = proof.to_json().unwrap();
        assert!(verify_proof_json(&json));

        let hex = proof.proof.to_hex();
        let first = hex.as_bytes()[0];
        let flipped_char = if first == b'0' { '1' } else { '0' };
        let mut tampered = hex.clone();
        tampered.replace_range(0..1, &flipped_char.to_string());
        let json = json.replace(&hex, &tampered);
        assert!(!verify_proof_json(&json));
    }

    #[test]
    fn tampered_count_or_threshold_fails() {
        let (me, list) = moments(3);
        let proof = generate_proof(&me, &list, 3).unwrap();

        let mut p = proof.clone();
        p.actual_count = 300;
        assert!(!p.verify());

        let mut p = proof.clone();
        p.threshold = 1;
        assert!(!p.verify());

        let mut p = proof;
        p.signer_public_key = MeldKeypair::generate().public_key();
        assert!(!p.verify());
    }

    #[test]
    fn rejects_empty_and_zero() {
        let (me, list) = moments(2);
        assert_eq!(generate_proof(&me, &[], 1).unwrap_err(), ProofError::EmptyMoments);
        assert_eq!(generate_proof(&me, &list, 0).unwrap_err(), ProofError::ZeroThreshold);
    }

    #[test]
    fn below_threshold_verifies_but_does_not_pass() {
        let (me, list) = moments(2);
        let proof = generate_proof(&me, &list, 5).unwrap();
        assert!(proof.verify());
        assert!(!proof.passes());
        assert!(!proof.is_accepted());
    }

    #[test]
    fn payload_layout() {
        assert_eq!(
            proof_payload(5, 10, 1_760_000_000_000),
            br#"{"threshold":5,"actualCount":10,"timestamp":1760000000000}"#.to_vec()
        );
    }

    #[test]
    fn wire_field_names() {
        let (me, list) = moments(1);
        let value = serde_json::to_value(generate_proof(&me, &list, 1).unwrap()).unwrap();
        for field in ["threshold", "actualCount", "timestamp", "proof", "signerPublicKey"] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn generate_many_is_independent_per_threshold() {
        let (me, list) = moments(30);
        let prover = ThresholdProver::new(me);
        let proofs = prover.generate_many(&list, &[1, 10, 25, 50]).unwrap();
        assert_eq!(proofs.len(), 4);
        assert!(proofs.iter().all(ThresholdProof::verify));
        assert_eq!(
            proofs.iter().map(ThresholdProof::passes).collect::<Vec<_>>(),
            vec![true, true, true, false]
        );
    }

    #[test]
    fn generate_verified_skips_forged_moments() {
        let (me, mut list) = moments(4);
        list[0].description.push_str(" (edited)");
        let proof = ThresholdProver::new(me).generate_verified(&list, 3).unwrap();
        assert_eq!(proof.actual_count, 3);
        assert!(proof.verify());
    }

    #[test]
    fn generate_verified_with_nothing_valid() {
        let (me, mut list) = moments(2);
        for m in &mut list {
            m.description.push('x');
        }
        assert_eq!(
            ThresholdProver::new(me).generate_verified(&list, 1).unwrap_err(),
            ProofError::NoVerifiedMoments(2)
        );
    }

    #[test]
    fn prover_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ThresholdProver>();
    }
}
