use serde::{Deserialize, Serialize};

/// Rectangular face location within an image, in the detector's native
/// (top, right, bottom, left) pixel order.
///
/// The match engine only cares whether a face exists; the geometry is
/// carried through to the encoding step untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

/// Fixed-length face descriptor produced by the biometric backend for one
/// detected face. Never persisted — recomputed from image bytes on every
/// verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEncoding {
    pub values: Vec<f32>,
}

impl FaceEncoding {
    /// Compute Euclidean distance between two encodings.
    pub fn euclidean_distance(&self, other: &FaceEncoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Outcome of one verification call.
///
/// Always a valid value — the engine folds every internal failure into an
/// error-message result, so callers distinguish "no match" from "could not
/// verify" by inspecting `message`, never by a separate error channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub confidence: f32,
    pub message: String,
}

impl VerificationResult {
    /// Terminal result when the reference image yields no detectable face.
    pub fn no_face_in_reference() -> Self {
        Self {
            verified: false,
            confidence: 0.0,
            message: "No face detected in reference image".to_string(),
        }
    }

    /// Terminal result when the captured image yields no detectable face.
    pub fn no_face_in_captured() -> Self {
        Self {
            verified: false,
            confidence: 0.0,
            message: "No face detected in captured image".to_string(),
        }
    }

    /// Fold an internal failure into a structured result.
    pub fn error(cause: impl std::fmt::Display) -> Self {
        Self {
            verified: false,
            confidence: 0.0,
            message: format!("Error in face verification: {cause}"),
        }
    }
}

/// Default minimum confidence for any positive match.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.45;
/// Default confidence for the high-confidence tier.
pub const DEFAULT_HIGH_CONFIDENCE: f32 = 0.55;

/// Immutable two-threshold decision policy.
///
/// Injected into the verifier rather than read from process-wide constants,
/// so boundary conditions are testable without global state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    pub min_confidence: f32,
    pub high_confidence: f32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            high_confidence: DEFAULT_HIGH_CONFIDENCE,
        }
    }
}

impl MatchPolicy {
    /// Map a confidence value onto the two-tier decision.
    ///
    /// `confidence` is `1 - distance` and is deliberately NOT clamped to
    /// [0, 1]: a distance above 1 or below 0 passes through as-is and is
    /// decided against the same thresholds. The low tier is half-open:
    /// exactly `min_confidence` is a (low-confidence) match.
    pub fn decide(&self, confidence: f32) -> VerificationResult {
        if confidence < self.min_confidence {
            VerificationResult {
                verified: false,
                confidence,
                message: "Face verification failed".to_string(),
            }
        } else if confidence < self.high_confidence {
            VerificationResult {
                verified: true,
                confidence,
                message: "Low confidence match".to_string(),
            }
        } else {
            VerificationResult {
                verified: true,
                confidence,
                message: "High confidence match".to_string(),
            }
        }
    }
}

/// Strategy for choosing one face when the detector reports several.
pub trait FaceSelector: Send + Sync {
    fn select<'a>(&self, faces: &'a [FaceRect]) -> Option<&'a FaceRect>;
}

/// First-found-wins: takes the detector's first result, in whatever order
/// the backend returns. Multi-face images are not disambiguated further;
/// substitute a largest-face or center-most selector to change that.
pub struct FirstFaceSelector;

impl FaceSelector for FirstFaceSelector {
    fn select<'a>(&self, faces: &'a [FaceRect]) -> Option<&'a FaceRect> {
        faces.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding(values: &[f32]) -> FaceEncoding {
        FaceEncoding {
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = encoding(&[0.1, 0.2, 0.3]);
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_unit_apart() {
        let a = encoding(&[0.0, 0.0]);
        let b = encoding(&[1.0, 0.0]);
        assert!((a.euclidean_distance(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_pythagorean() {
        let a = encoding(&[0.0, 0.0]);
        let b = encoding(&[3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_is_one_minus_distance() {
        // A mocked distance of 0.2 must yield a confidence of 0.8 exactly
        // (up to float representation), with no clamping applied.
        let confidence = 1.0 - 0.2f32;
        let result = MatchPolicy::default().decide(confidence);
        assert!((result.confidence - 0.8).abs() < 1e-6);
        assert!(result.verified);
    }

    #[test]
    fn test_decide_below_minimum_fails() {
        let result = MatchPolicy::default().decide(0.4499);
        assert!(!result.verified);
        assert_eq!(result.message, "Face verification failed");
    }

    #[test]
    fn test_decide_minimum_boundary_is_low_match() {
        // Half-open low tier: exactly 0.45 is a match.
        let result = MatchPolicy::default().decide(0.45);
        assert!(result.verified);
        assert_eq!(result.message, "Low confidence match");
    }

    #[test]
    fn test_decide_high_boundary_is_high_match() {
        let result = MatchPolicy::default().decide(0.55);
        assert!(result.verified);
        assert_eq!(result.message, "High confidence match");
    }

    #[test]
    fn test_decide_between_tiers_is_low_match() {
        let result = MatchPolicy::default().decide(0.50);
        assert!(result.verified);
        assert_eq!(result.message, "Low confidence match");
    }

    #[test]
    fn test_decide_unclamped_negative_confidence() {
        // distance 1.2 → confidence -0.2: passes through unclamped.
        let result = MatchPolicy::default().decide(1.0 - 1.2);
        assert!(!result.verified);
        assert!((result.confidence + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_decide_unclamped_above_one() {
        // distance -0.1 → confidence 1.1: still a high-confidence match.
        let result = MatchPolicy::default().decide(1.0 - (-0.1));
        assert!(result.verified);
        assert_eq!(result.message, "High confidence match");
        assert!((result.confidence - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_custom_policy_thresholds() {
        let policy = MatchPolicy {
            min_confidence: 0.2,
            high_confidence: 0.9,
        };
        assert!(policy.decide(0.25).verified);
        assert_eq!(policy.decide(0.25).message, "Low confidence match");
        assert_eq!(policy.decide(0.95).message, "High confidence match");
    }

    #[test]
    fn test_first_face_selector() {
        let faces = vec![
            FaceRect { top: 0, right: 10, bottom: 10, left: 0 },
            FaceRect { top: 5, right: 50, bottom: 40, left: 20 },
        ];
        let selected = FirstFaceSelector.select(&faces).unwrap();
        assert_eq!(*selected, faces[0]);
    }

    #[test]
    fn test_first_face_selector_empty() {
        assert!(FirstFaceSelector.select(&[]).is_none());
    }

    #[test]
    fn test_error_result_carries_cause() {
        let result = VerificationResult::error("backend unreachable");
        assert!(!result.verified);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.message, "Error in face verification: backend unreachable");
    }
}
