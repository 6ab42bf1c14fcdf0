//! The face verification decision procedure.
//!
//! Decode both images, detect a face in each (reference first — its absence
//! is terminal), encode the selected faces, and turn the Euclidean distance
//! into a two-tier match decision. The public entry point is total: any
//! internal failure is folded into an error-message [`VerificationResult`],
//! never raised past this boundary.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;

use crate::biometric::{BiometricError, FaceBiometrics};
use crate::types::{
    FaceEncoding, FaceSelector, FirstFaceSelector, MatchPolicy, VerificationResult,
};

/// Internal failure during a verification attempt. Never leaves this module —
/// [`FaceVerifier::verify`] converts it into a result message.
#[derive(Error, Debug)]
enum VerifyError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Image(#[from] image::ImageError),
    #[error("{0}")]
    Biometric(#[from] BiometricError),
    #[error("backend returned no encoding for the selected face")]
    MissingEncoding,
}

/// Pairwise face verifier over a pluggable biometric backend.
pub struct FaceVerifier {
    biometrics: Arc<dyn FaceBiometrics>,
    selector: Box<dyn FaceSelector>,
    policy: MatchPolicy,
}

impl FaceVerifier {
    /// Verifier with the first-found-wins face selection policy.
    pub fn new(biometrics: Arc<dyn FaceBiometrics>, policy: MatchPolicy) -> Self {
        Self {
            biometrics,
            selector: Box::new(FirstFaceSelector),
            policy,
        }
    }

    /// Verifier with a substitute face selection policy.
    pub fn with_selector(
        biometrics: Arc<dyn FaceBiometrics>,
        policy: MatchPolicy,
        selector: Box<dyn FaceSelector>,
    ) -> Self {
        Self {
            biometrics,
            selector,
            policy,
        }
    }

    /// Verify the face in `captured_path` against the one in `reference_path`.
    ///
    /// Total over all failure modes: unreadable files, decode errors, and
    /// backend failures all come back as a `VerificationResult` whose
    /// message starts with `"Error in face verification:"`. Callers tell
    /// "no match" from "could not verify" by the message text.
    pub fn verify(&self, reference_path: &Path, captured_path: &Path) -> VerificationResult {
        match self.try_verify(reference_path, captured_path) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "face verification error");
                VerificationResult::error(err)
            }
        }
    }

    fn try_verify(
        &self,
        reference_path: &Path,
        captured_path: &Path,
    ) -> Result<VerificationResult, VerifyError> {
        tracing::debug!(path = %reference_path.display(), "loading reference image");
        let reference = load_rgb(reference_path)?;

        tracing::debug!("detecting faces in reference image");
        let reference_faces = self.biometrics.detect(&reference)?;
        let Some(&reference_face) = self.selector.select(&reference_faces) else {
            tracing::warn!("no face detected in reference image");
            return Ok(VerificationResult::no_face_in_reference());
        };

        // The captured image is only decoded once the reference has a usable
        // face; a faceless reference is terminal.
        tracing::debug!(path = %captured_path.display(), "loading captured image");
        let captured = load_rgb(captured_path)?;

        tracing::debug!("detecting faces in captured image");
        let captured_faces = self.biometrics.detect(&captured)?;
        let Some(&captured_face) = self.selector.select(&captured_faces) else {
            tracing::warn!("no face detected in captured image");
            return Ok(VerificationResult::no_face_in_captured());
        };

        let reference_encoding = self.encode_one(&reference, reference_face)?;
        let captured_encoding = self.encode_one(&captured, captured_face)?;

        let distance = reference_encoding.euclidean_distance(&captured_encoding);
        let confidence = 1.0 - distance;
        tracing::info!(distance, confidence, "face encodings compared");

        Ok(self.policy.decide(confidence))
    }

    fn encode_one(
        &self,
        image: &RgbImage,
        face: crate::types::FaceRect,
    ) -> Result<FaceEncoding, VerifyError> {
        self.biometrics
            .encode(image, std::slice::from_ref(&face))?
            .into_iter()
            .next()
            .ok_or(VerifyError::MissingEncoding)
    }
}

/// Decode an image file into the RGB buffer the backend expects.
///
/// Sniffs the format from file content rather than trusting the extension —
/// captured uploads routinely arrive as PNG bytes in a `.jpg`-named file.
fn load_rgb(path: &Path) -> Result<RgbImage, VerifyError> {
    let decoded = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    Ok(decoded.to_rgb8())
}
