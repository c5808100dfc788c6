//! Essay evaluation through an OpenAI assistant
//!
//! The assistant API is job-based: create a thread, post the essay, start a
//! run and poll it until it settles, then read back the newest message.

use crate::config::EvaluationConfig;
use crate::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROVIDER: &str = "openai-assistant";
const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

#[async_trait]
pub trait EssayEvaluator: Send + Sync {
    async fn evaluate(&self, text: &str) -> Result<String, AppError>;
}

pub struct AssistantEvaluator {
    client: Client,
    api_key: String,
    base_url: String,
    assistant_id: String,
    poll_interval: Duration,
    max_polls: u32,
}

/// Lifecycle state of an assistant run
#[derive(Debug, Clone, PartialEq, Eq)]
enum RunStatus {
    Completed,
    Failed(String),
    Pending(String),
}

impl RunStatus {
    fn parse(status: &str) -> Self {
        match status {
            "completed" => Self::Completed,
            "failed" | "cancelled" | "expired" | "incomplete" => Self::Failed(status.to_string()),
            other => Self::Pending(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct NewMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct NewRun<'a> {
    assistant_id: &'a str,
}

#[derive(Deserialize)]
struct Thread {
    id: String,
}

#[derive(Deserialize)]
struct Run {
    id: String,
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Deserialize)]
struct RunError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<Message>,
}

#[derive(Deserialize)]
struct Message {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Deserialize)]
struct MessageText {
    value: String,
}

impl AssistantEvaluator {
    pub fn new(config: &EvaluationConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            assistant_id: config.assistant_id.clone(),
            poll_interval: config.poll_interval,
            max_polls: config.max_polls,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, AppError> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::provider(PROVIDER, format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(AppError::provider(
                PROVIDER,
                format!("{} returned {}: {}", what, status, error_body),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::provider(PROVIDER, format!("invalid {} response: {}", what, e)))
    }

    async fn wait_for_run(&self, thread_id: &str, mut run: Run) -> Result<(), AppError> {
        let mut polls = 0;
        loop {
            match RunStatus::parse(&run.status) {
                RunStatus::Completed => return Ok(()),
                RunStatus::Failed(status) => {
                    let detail = run
                        .last_error
                        .map(|e| e.message)
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| format!("run ended with status '{}'", status));
                    return Err(AppError::EvaluationFailed(detail));
                }
                RunStatus::Pending(status) => {
                    if polls >= self.max_polls {
                        return Err(AppError::EvaluationFailed(format!(
                            "run still '{}' after {} status checks",
                            status, polls
                        )));
                    }
                    tracing::debug!(run_id = %run.id, %status, "Waiting for evaluation run");
                    tokio::time::sleep(self.poll_interval).await;
                    polls += 1;
                    run = self
                        .send(
                            self.get(&format!("/threads/{}/runs/{}", thread_id, run.id)),
                            "run status",
                        )
                        .await?;
                }
            }
        }
    }
}

#[async_trait]
impl EssayEvaluator for AssistantEvaluator {
    async fn evaluate(&self, text: &str) -> Result<String, AppError> {
        let thread: Thread = self
            .send(self.post("/threads").json(&serde_json::json!({})), "thread")
            .await?;

        let _: serde_json::Value = self
            .send(
                self.post(&format!("/threads/{}/messages", thread.id))
                    .json(&NewMessage {
                        role: "user",
                        content: text,
                    }),
                "message",
            )
            .await?;

        let run: Run = self
            .send(
                self.post(&format!("/threads/{}/runs", thread.id))
                    .json(&NewRun {
                        assistant_id: &self.assistant_id,
                    }),
                "run",
            )
            .await?;

        tracing::info!(thread_id = %thread.id, run_id = %run.id, "Essay evaluation started");
        self.wait_for_run(&thread.id, run).await?;

        // Messages are listed newest first
        let messages: MessageList = self
            .send(
                self.get(&format!("/threads/{}/messages", thread.id)),
                "messages",
            )
            .await?;

        messages
            .data
            .into_iter()
            .find(|m| m.role == "assistant")
            .and_then(|m| m.content.into_iter().find_map(|c| c.text))
            .map(|t| t.value)
            .ok_or_else(|| AppError::EvaluationFailed("assistant returned no text".to_string()))
    }
}
