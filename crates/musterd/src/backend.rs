//! HTTP adapter for the external face-analysis service.
//!
//! The daemon never runs detection or encoding models itself; it ships the
//! pixel buffer to a sidecar service and consumes rectangles and encoding
//! vectors. Any transport or decode failure surfaces as a
//! [`BiometricError`] and therefore folds into the match engine's
//! error-message result.

use std::io::Cursor;
use std::sync::OnceLock;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::RgbImage;
use muster_core::{BiometricError, FaceBiometrics, FaceEncoding, FaceRect};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

/// Timeout for one sidecar round trip; encoding large images is slow on
/// CPU-only deployments.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpBiometrics {
    base_url: String,
    /// Built lazily: the blocking client may only be created and used on
    /// non-async threads, and every caller is on a `spawn_blocking` thread.
    client: OnceLock<Client>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectRequest<'a> {
    image_base64: &'a str,
}

#[derive(Deserialize)]
struct DetectResponse {
    faces: Vec<FaceRect>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncodeRequest<'a> {
    image_base64: &'a str,
    faces: &'a [FaceRect],
}

#[derive(Deserialize)]
struct EncodeResponse {
    encodings: Vec<Vec<f32>>,
}

impl HttpBiometrics {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client, BiometricError> {
        if self.client.get().is_none() {
            let built = Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .map_err(|e| BiometricError::Unavailable(e.to_string()))?;
            let _ = self.client.set(built);
        }
        Ok(self.client.get().expect("client initialized above"))
    }

    /// Re-encode the pixel buffer as PNG and base64 it for the wire.
    fn image_payload(image: &RgbImage) -> Result<String, BiometricError> {
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| BiometricError::EncodingFailed(format!("image re-encode: {e}")))?;
        Ok(BASE64.encode(png.into_inner()))
    }
}

impl FaceBiometrics for HttpBiometrics {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceRect>, BiometricError> {
        let payload = Self::image_payload(image)?;
        let response = self
            .client()?
            .post(format!("{}/detect", self.base_url))
            .json(&DetectRequest {
                image_base64: &payload,
            })
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| BiometricError::Unavailable(e.to_string()))?;
        let body: DetectResponse = response
            .json()
            .map_err(|e| BiometricError::DetectionFailed(e.to_string()))?;
        tracing::debug!(faces = body.faces.len(), "sidecar detection complete");
        Ok(body.faces)
    }

    fn encode(
        &self,
        image: &RgbImage,
        faces: &[FaceRect],
    ) -> Result<Vec<FaceEncoding>, BiometricError> {
        let payload = Self::image_payload(image)?;
        let response = self
            .client()?
            .post(format!("{}/encode", self.base_url))
            .json(&EncodeRequest {
                image_base64: &payload,
                faces,
            })
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| BiometricError::Unavailable(e.to_string()))?;
        let body: EncodeResponse = response
            .json()
            .map_err(|e| BiometricError::EncodingFailed(e.to_string()))?;
        Ok(body
            .encodings
            .into_iter()
            .map(|values| FaceEncoding { values })
            .collect())
    }
}
