//! OpenAI multimodal provider
//!
//! Embeds the image as a base64 data URL in a chat completion and asks the
//! model for a verbatim transcription of the handwriting.

use crate::config::OpenAiConfig;
use crate::error::AppError;
use crate::provider::TextExtractor;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const NAME: &str = "openai";

/// Returned when the model answers with nothing
pub const NO_TEXT_PLACEHOLDER: &str = "Nenhum texto manuscrito detectado na imagem.";

const MAX_TOKENS: u32 = 1000;

const TRANSCRIPTION_PROMPT: &str = "This is an image of a handwritten essay in Brazilian Portuguese. \
Note that there are some digital characters in the image, but extract only the handwritten text from this image, trying to be as accurate as possible. \
Do not alter the text by making any interpretations. \
Just extract the handwritten text. \
The answer should be only the extracted text in a clear and legible format.";

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl TextExtractor for OpenAiProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "OpenAI multimodal model transcription"
    }

    async fn extract_text(&self, image: &[u8]) -> Result<String, AppError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: TRANSCRIPTION_PROMPT.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/jpeg;base64,{}", STANDARD.encode(image)),
                        },
                    },
                ],
            }],
            max_tokens: MAX_TOKENS,
        };

        tracing::debug!(model = %self.model, bytes = image.len(), "Sending image to OpenAI");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::provider(NAME, format!("invalid response: {}", e)))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Ok(NO_TEXT_PLACEHOLDER.to_string());
        }
        Ok(text)
    }
}
