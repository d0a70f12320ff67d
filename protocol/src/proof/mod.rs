//! # Threshold Proof Engine
//!
//! Turns a set of signed moments into signed "count >= N" attestations,
//! and suggests which N are worth revealing.

pub mod engine;
pub mod thresholds;

pub use engine::{
    generate_proof, proof_payload, verify_proof, verify_proof_json, ProofError, ThresholdProof,
    ThresholdProver,
};
pub use thresholds::{milestones, next_milestone, recommended_thresholds};
