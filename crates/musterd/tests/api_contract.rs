//! HTTP contract tests: drive the router end to end with in-memory stores
//! and a deterministic biometric backend, and pin the wire field names.

use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http_body_util::BodyExt;
use image::{Rgb, RgbImage};
use muster_core::{
    BiometricError, FaceBiometrics, FaceEncoding, FaceRect, FaceVerifier, MatchPolicy,
};
use musterd::http::{create_app, AppState};
use musterd::session::SessionManager;
use muster_store::{FsObjectStore, SqliteDirectory, SqliteLedger};
use serde_json::{json, Value};
use tower::util::ServiceExt;

const ADMIN_TOKEN: &str = "test-admin-token";

/// One face per image; the encoding is the mean pixel value, so identical
/// images match with distance zero.
struct MeanPixelBiometrics;

impl FaceBiometrics for MeanPixelBiometrics {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceRect>, BiometricError> {
        Ok(vec![FaceRect {
            top: 0,
            right: image.width(),
            bottom: image.height(),
            left: 0,
        }])
    }

    fn encode(
        &self,
        image: &RgbImage,
        faces: &[FaceRect],
    ) -> Result<Vec<FaceEncoding>, BiometricError> {
        let total: f64 = image
            .pixels()
            .map(|p| (p.0[0] as f64 + p.0[1] as f64 + p.0[2] as f64) / 3.0)
            .sum();
        let mean = total / (image.width() as f64 * image.height() as f64) / 255.0;
        Ok(faces
            .iter()
            .map(|_| FaceEncoding {
                values: vec![mean as f32],
            })
            .collect())
    }
}

struct TestApp {
    app: Router,
    _blob_dir: tempfile::TempDir,
    _temp_dir: tempfile::TempDir,
}

fn test_app() -> TestApp {
    let directory = Arc::new(SqliteDirectory::open_in_memory().unwrap());
    let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
    let blob_dir = tempfile::tempdir().unwrap();
    let objects = Arc::new(
        FsObjectStore::new(blob_dir.path().join("blobs"), "http://blobs.test").unwrap(),
    );
    let temp_dir = tempfile::tempdir().unwrap();
    let verifier = FaceVerifier::new(Arc::new(MeanPixelBiometrics), MatchPolicy::default());
    let sessions = Arc::new(SessionManager::new(
        objects,
        directory,
        ledger,
        verifier,
        temp_dir.path().to_path_buf(),
    ));
    let state = Arc::new(AppState {
        sessions,
        admin_token: Some(ADMIN_TOKEN.to_string()),
    });
    TestApp {
        app: create_app(state),
        _blob_dir: blob_dir,
        _temp_dir: temp_dir,
    }
}

fn image_base64(shade: u8) -> String {
    let img = RgbImage::from_pixel(16, 16, Rgb([shade, shade, shade]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    BASE64.encode(buf.into_inner())
}

fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn enroll(app: &Router, identifier: &str) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/admin/users",
            json!({
                "uid": format!("uid-{identifier}"),
                "identifier": identifier,
                "firstName": "Asha",
                "lastName": "Rao",
                "email": format!("{identifier}@example.com"),
            }),
            Some(ADMIN_TOKEN),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn health_reports_ok() {
    let fixture = test_app();
    let response = fixture.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn verify_without_reference_is_404() {
    let fixture = test_app();
    enroll(&fixture.app, "U123").await;

    let response = fixture
        .app
        .clone()
        .oneshot(post_json(
            "/api/verify-face",
            json!({ "identifier": "U123", "imageBase64": image_base64(80) }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["message"], "No reference image found for this user");
}

#[tokio::test]
async fn register_then_verify_round_trip() {
    let fixture = test_app();
    enroll(&fixture.app, "U123").await;

    let response = fixture
        .app
        .clone()
        .oneshot(post_json(
            "/api/register-face",
            json!({ "identifier": "U123", "imageBase64": image_base64(80) }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body["imageUrl"],
        "http://blobs.test/reference_images/face_U123.jpg"
    );

    let response = fixture
        .app
        .clone()
        .oneshot(post_json(
            "/api/verify-face",
            json!({ "identifier": "U123", "imageBase64": image_base64(80) }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["verified"], true);
    assert_eq!(body["message"], "High confidence match");
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((confidence - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn register_for_unknown_user_is_404() {
    let fixture = test_app();
    let response = fixture
        .app
        .clone()
        .oneshot(post_json(
            "/api/register-face",
            json!({ "identifier": "ghost", "imageBase64": image_base64(80) }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn register_rejects_invalid_base64() {
    let fixture = test_app();
    enroll(&fixture.app, "U123").await;

    let response = fixture
        .app
        .clone()
        .oneshot(post_json(
            "/api/register-face",
            json!({ "identifier": "U123", "imageBase64": "!!garbage!!" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mark_attendance_and_history_contract() {
    let fixture = test_app();
    enroll(&fixture.app, "U123").await;

    let response = fixture
        .app
        .clone()
        .oneshot(post_json(
            "/api/mark-attendance",
            json!({ "identifier": "U123", "type": "check_in", "confidence": 0.8 }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(!body["recordId"].as_str().unwrap().is_empty());
    assert!(body["date"].is_string());
    assert!(body["time"].is_string());

    let response = fixture
        .app
        .clone()
        .oneshot(get("/api/attendance-history?identifier=U123"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
    let record = &body["records"][0];
    assert_eq!(record["userId"], "U123");
    assert_eq!(record["userName"], "Asha Rao");
    assert_eq!(record["type"], "check_in");
    assert_eq!(record["status"], "Present");
    assert!(record["verificationConfidence"].is_number());
}

#[tokio::test]
async fn mark_attendance_unknown_user_is_404() {
    let fixture = test_app();
    let response = fixture
        .app
        .clone()
        .oneshot(post_json(
            "/api/mark-attendance",
            json!({ "identifier": "ghost", "type": "check_out" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["message"], "User not found");
}

#[tokio::test]
async fn mark_attendance_rejects_unknown_type() {
    let fixture = test_app();
    enroll(&fixture.app, "U123").await;

    let response = fixture
        .app
        .clone()
        .oneshot(post_json(
            "/api/mark-attendance",
            json!({ "identifier": "U123", "type": "lunch" }),
            None,
        ))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn admin_routes_require_bearer_token() {
    let fixture = test_app();

    let response = fixture
        .app
        .clone()
        .oneshot(post_json(
            "/admin/users",
            json!({
                "uid": "uid-x",
                "identifier": "U123",
                "firstName": "Asha",
                "lastName": "Rao",
                "email": "x@example.com",
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = fixture
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/admin/users/U123")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn remove_user_cleans_up_reference() {
    let fixture = test_app();
    enroll(&fixture.app, "U123").await;

    fixture
        .app
        .clone()
        .oneshot(post_json(
            "/api/register-face",
            json!({ "identifier": "U123", "imageBase64": image_base64(80) }),
            None,
        ))
        .await
        .unwrap();

    let response = fixture
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/admin/users/U123")
                .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Both the document and the reference blob are gone.
    let response = fixture
        .app
        .clone()
        .oneshot(post_json(
            "/api/verify-face",
            json!({ "identifier": "U123", "imageBase64": image_base64(80) }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
