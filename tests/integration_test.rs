use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Cursor;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

// Use atomic counter to give each test a unique port
static PORT_COUNTER: AtomicU16 = AtomicU16::new(9400);

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct InfoResponse {
    version: String,
    default_provider: String,
    available_providers: Vec<Value>,
    evaluation_available: bool,
    max_file_size_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: String,
}

struct TestServer {
    child: Child,
    port: u16,
    // Removed when the server is dropped
    _settings_dir: tempfile::TempDir,
}

impl TestServer {
    /// Start the server with every remote provider switched off
    async fn start() -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let settings_dir = tempfile::tempdir().expect("Failed to create settings dir");
        let settings_path = settings_dir.path().join("settings.json");

        let child = Command::new(env!("CARGO_BIN_EXE_essay-ocr-server"))
            .args(["--host", "127.0.0.1", "--port", &port.to_string()])
            .args(["--vision-api-key", "", "--openai-api-key", ""])
            .arg("--settings-path")
            .arg(&settings_path)
            .spawn()
            .expect("Failed to start server");

        let server = Self {
            child,
            port,
            _settings_dir: settings_dir,
        };
        server.wait_until_ready().await;
        server
    }

    async fn wait_until_ready(&self) {
        let client = reqwest::Client::new();
        for _ in 0..100 {
            if let Ok(response) = client
                .get(format!("{}/health", self.base_url()))
                .send()
                .await
            {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("Server on port {} did not become ready", self.port);
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

/// A photographed page: tinted paper, uneven light, dark ink lines
fn essay_photo() -> Vec<u8> {
    let img = RgbImage::from_fn(64, 48, |x, y| {
        let ink = y % 12 == 5 && x > 4 && x < 60;
        if ink {
            Rgb([25, 30, 70])
        } else {
            let shade = (x / 4) as u8;
            Rgb([215 + shade / 2, 205 + shade / 2, 180])
        }
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Jpeg)
        .expect("Failed to encode fixture");
    out.into_inner()
}

fn upload(bytes: Vec<u8>, mime_type: &str) -> Form {
    let part = Part::bytes(bytes)
        .file_name("redacao.jpg")
        .mime_str(mime_type)
        .unwrap();
    Form::new().part("file", part)
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response: HealthResponse = client
        .get(format!("{}/health", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(response.status, "ok");
}

#[tokio::test]
async fn test_info_without_providers() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let info: InfoResponse = client
        .get(format!("{}/info", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(info.default_provider, "vision");
    assert!(info.available_providers.is_empty());
    assert!(!info.evaluation_available);
    assert_eq!(info.max_file_size_bytes, 52_428_800);
}

#[tokio::test]
async fn test_enhance_defaults_produce_binary_grayscale_png() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/enhance", server.base_url()))
        .multipart(upload(essay_photo(), "image/jpeg"))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.headers()["x-output-channels"], "1");

    let bytes = response.bytes().await.expect("Failed to read body");
    let decoded = image::load_from_memory(&bytes).expect("Output is not an image");
    assert_eq!(decoded.color(), image::ColorType::L8);
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
    assert!(decoded
        .to_luma8()
        .pixels()
        .all(|p| p.0[0] == 0 || p.0[0] == 255));
}

#[tokio::test]
async fn test_enhance_with_all_flags_off_keeps_color() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let form = upload(essay_photo(), "image/jpeg")
        .text("grayscale", "false")
        .text("threshold", "false")
        .text("denoise", "false");

    let response = client
        .post(format!("{}/enhance", server.base_url()))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 200);
    let bytes = response.bytes().await.expect("Failed to read body");
    let decoded = image::load_from_memory(&bytes).expect("Output is not an image");
    assert_eq!(decoded.color(), image::ColorType::Rgb8);
}

#[tokio::test]
async fn test_enhance_rejects_malformed_image() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/enhance", server.base_url()))
        .multipart(upload(b"definitely not a jpeg".to_vec(), "image/jpeg"))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 400);
    let error: ErrorResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(error.code, "DECODE_ERROR");
}

#[tokio::test]
async fn test_ocr_without_credentials_is_unavailable() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/ocr", server.base_url()))
        .multipart(upload(essay_photo(), "image/jpeg"))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 503);
    let error: ErrorResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(error.code, "PROVIDER_NOT_CONFIGURED");
}

#[tokio::test]
async fn test_settings_persist_per_user() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let url = format!("{}/settings/aluno-42", server.base_url());

    let initial: Value = client
        .get(&url)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(initial, json!({ "text_extraction_api": "Vision API" }));

    let saved: Value = client
        .put(&url)
        .json(&json!({ "text_extraction_api": "OpenAI API" }))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(saved, json!({ "success": true }));

    let reloaded: Value = client
        .get(&url)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(reloaded, json!({ "text_extraction_api": "OpenAI API" }));
}
