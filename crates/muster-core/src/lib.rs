//! muster-core — Face match engine.
//!
//! Compares a stored reference face against a live capture and produces a
//! calibrated match decision with two confidence tiers. Detection and
//! encoding are delegated to a pluggable biometric backend; this crate owns
//! the decision procedure only.

pub mod biometric;
pub mod types;
pub mod verifier;

pub use biometric::{BiometricError, FaceBiometrics};
pub use types::{
    FaceEncoding, FaceRect, FaceSelector, FirstFaceSelector, MatchPolicy, VerificationResult,
};
pub use verifier::FaceVerifier;
