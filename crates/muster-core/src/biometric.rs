//! Seam to the external biometric library.
//!
//! The engine consumes detection rectangles and fixed-length encodings; how
//! they are produced (dlib, an ONNX runtime, a sidecar service) is the
//! backend's business.

use crate::types::{FaceEncoding, FaceRect};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BiometricError {
    #[error("biometric backend unavailable: {0}")]
    Unavailable(String),
    #[error("face detection failed: {0}")]
    DetectionFailed(String),
    #[error("face encoding failed: {0}")]
    EncodingFailed(String),
}

/// External face-analysis primitives.
///
/// Implementations must be safe to call from multiple request threads at
/// once. Both methods operate on the decoded RGB pixel buffer — the engine
/// does the file I/O and decoding.
pub trait FaceBiometrics: Send + Sync {
    /// Detect faces, returning locations in whatever order the backend
    /// produces them. An image with no faces is `Ok(vec![])`, not an error.
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceRect>, BiometricError>;

    /// Compute one encoding per given face location, in the same order.
    fn encode(
        &self,
        image: &RgbImage,
        faces: &[FaceRect],
    ) -> Result<Vec<FaceEncoding>, BiometricError>;
}
