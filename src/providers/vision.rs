//! Google Cloud Vision provider
//!
//! Sends the image to `images:annotate` with document text detection and a
//! Brazilian Portuguese language hint, then rebuilds the text paragraph by
//! paragraph from the returned layout.

use crate::config::VisionConfig;
use crate::error::AppError;
use crate::provider::TextExtractor;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const NAME: &str = "vision";

/// Returned when the service finds no paragraphs
pub const NO_TEXT_PLACEHOLDER: &str = "No handwritten text detected in the image.";

const FEATURE: &str = "DOCUMENT_TEXT_DETECTION";
const LANGUAGE_HINT: &str = "pt-BR";

pub struct VisionProvider {
    client: Client,
    api_key: String,
    endpoint: String,
    confidence_filter: Option<f32>,
    cleaner: TextCleaner,
}

impl VisionProvider {
    pub fn new(config: &VisionConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            confidence_filter: config.confidence_filter,
            cleaner: TextCleaner::new()?,
        })
    }

    fn paragraphs(&self, annotation: &TextAnnotation) -> Vec<String> {
        let mut paragraphs = Vec::new();
        for page in &annotation.pages {
            for block in &page.blocks {
                // Printed text tends to come back with higher confidence than handwriting
                if let Some(limit) = self.confidence_filter {
                    if block.confidence >= limit {
                        continue;
                    }
                }
                for paragraph in &block.paragraphs {
                    let words: Vec<String> = paragraph
                        .words
                        .iter()
                        .map(|word| word.symbols.iter().map(|s| s.text.as_str()).collect())
                        .collect();
                    if !words.is_empty() {
                        paragraphs.push(self.cleaner.clean(&words.join(" ")));
                    }
                }
            }
        }
        paragraphs
    }
}

#[async_trait]
impl TextExtractor for VisionProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Google Cloud Vision document text detection"
    }

    async fn extract_text(&self, image: &[u8]) -> Result<String, AppError> {
        let body = AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: ImageContent {
                    content: STANDARD.encode(image),
                },
                features: vec![Feature { kind: FEATURE }],
                image_context: ImageContext {
                    language_hints: vec![LANGUAGE_HINT],
                },
            }],
        };

        tracing::debug!(bytes = image.len(), "Sending image to Google Cloud Vision");

        let response = self
            .client
            .post(format!("{}/v1/images:annotate", self.endpoint))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::provider(NAME, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(AppError::provider(
                NAME,
                format!("service returned {}: {}", status, error_body),
            ));
        }

        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| AppError::provider(NAME, format!("invalid response: {}", e)))?;

        let result = parsed.responses.into_iter().next().unwrap_or_default();
        if let Some(error) = result.error.filter(|e| !e.message.is_empty()) {
            return Err(AppError::provider(
                NAME,
                format!(
                    "{}\nFor more info on error messages, check: https://cloud.google.com/apis/design/errors",
                    error.message
                ),
            ));
        }

        let paragraphs = result
            .full_text_annotation
            .map(|annotation| self.paragraphs(&annotation))
            .unwrap_or_default();

        if paragraphs.is_empty() {
            return Ok(NO_TEXT_PLACEHOLDER.to_string());
        }
        Ok(paragraphs.join("\n"))
    }
}

/// Tidies the spacing the word-by-word reconstruction leaves behind
struct TextCleaner {
    space_before_punctuation: Regex,
    around_quote: Regex,
    around_hyphen: Regex,
}

impl TextCleaner {
    fn new() -> Result<Self, AppError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| AppError::Internal(format!("bad pattern: {}", e)))
        };
        Ok(Self {
            space_before_punctuation: compile(r"\s+([.,!?;:])")?,
            around_quote: compile(r#"\s*"\s*"#)?,
            around_hyphen: compile(r"\s*-\s*")?,
        })
    }

    fn clean(&self, text: &str) -> String {
        let text = self.space_before_punctuation.replace_all(text, "$1");
        let text = self.around_quote.replace_all(&text, "\"");
        let text = self.around_hyphen.replace_all(&text, "-");
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
    image_context: ImageContext,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext {
    language_hints: Vec<&'static str>,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct AnnotateImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<Status>,
}

#[derive(Deserialize)]
struct Status {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Deserialize)]
struct Block {
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    paragraphs: Vec<Paragraph>,
}

#[derive(Deserialize)]
struct Paragraph {
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Deserialize)]
struct Word {
    #[serde(default)]
    symbols: Vec<Symbol>,
}

#[derive(Deserialize)]
struct Symbol {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_mock;
    use axum::{extract::Query, Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn word(text: &str) -> Value {
        json!({ "symbols": text.chars().map(|c| json!({ "text": c.to_string() })).collect::<Vec<_>>() })
    }

    fn annotation() -> Value {
        json!({
            "responses": [{
                "fullTextAnnotation": {
                    "pages": [{
                        "blocks": [
                            {
                                "confidence": 0.99,
                                "paragraphs": [{ "words": [word("REDAÇÃO"), word("NOTA"), word(":")] }]
                            },
                            {
                                "confidence": 0.62,
                                "paragraphs": [
                                    { "words": [word("Era"), word("uma"), word("vez"), word(",")] },
                                    { "words": [word("bem"), word("-"), word("vindo"), word("!")] }
                                ]
                            }
                        ]
                    }]
                }
            }]
        })
    }

    async fn provider_for(body: Value, confidence_filter: Option<f32>) -> VisionProvider {
        let app = Router::new().fallback(
            move |Query(params): Query<HashMap<String, String>>, Json(request): Json<Value>| {
                let body = body.clone();
                async move {
                    assert_eq!(params.get("key").map(String::as_str), Some("test-key"));
                    let req = &request["requests"][0];
                    assert_eq!(req["features"][0]["type"], FEATURE);
                    assert_eq!(req["imageContext"]["languageHints"][0], LANGUAGE_HINT);
                    assert!(req["image"]["content"].as_str().is_some());
                    Json(body)
                }
            },
        );
        let endpoint = spawn_mock(app).await;
        VisionProvider::new(&VisionConfig {
            api_key: "test-key".to_string(),
            endpoint,
            confidence_filter,
        })
        .unwrap()
    }

    #[test]
    fn test_clean_text_formatting() {
        let cleaner = TextCleaner::new().unwrap();
        assert_eq!(cleaner.clean("Olá , mundo !"), "Olá, mundo!");
        assert_eq!(cleaner.clean("bem - vindo"), "bem-vindo");
        assert_eq!(cleaner.clean("ele  disse \" oi \""), "ele disse\"oi\"");
        assert_eq!(cleaner.clean("  muitos   espaços  "), "muitos espaços");
    }

    #[tokio::test]
    async fn test_extracts_paragraphs_in_order() {
        let provider = provider_for(annotation(), None).await;
        let text = provider.extract_text(b"fake image").await.unwrap();
        assert_eq!(text, "REDAÇÃO NOTA:\nEra uma vez,\nbem-vindo!");
    }

    #[tokio::test]
    async fn test_confidence_filter_drops_printed_blocks() {
        let provider = provider_for(annotation(), Some(0.9)).await;
        let text = provider.extract_text(b"fake image").await.unwrap();
        assert_eq!(text, "Era uma vez,\nbem-vindo!");
    }

    #[tokio::test]
    async fn test_empty_annotation_returns_placeholder() {
        let provider = provider_for(json!({ "responses": [{}] }), None).await;
        let text = provider.extract_text(b"blank page").await.unwrap();
        assert_eq!(text, NO_TEXT_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_service_error_message_is_provider_error() {
        let body = json!({ "responses": [{ "error": { "code": 3, "message": "Bad image data." } }] });
        let provider = provider_for(body, None).await;
        let err = provider.extract_text(b"x").await.unwrap_err();
        assert!(matches!(err, AppError::Provider { provider: NAME, .. }));
        assert!(err.to_string().contains("Bad image data."));
    }
}
