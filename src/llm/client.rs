//! OpenAI-compatible chat completions client (LiteLLM proxy)
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use super::retry::{FailureKind, RetryPolicy};
use super::{LanguageModel, EXHAUSTED_MESSAGE};
use crate::config::LlmSettings;
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, warn};

pub struct ChatCompletionsClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    retry: RetryPolicy,
}

impl ChatCompletionsClient {
    pub fn new(settings: &LlmSettings, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        if settings.api_key.is_empty() {
            warn!("LITELLM_API_KEY not configured; gateway calls will likely be rejected");
        }

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            retry,
        })
    }

    /// One round trip; the error side carries how the failure should be treated
    async fn send(
        &self,
        system_prompt: &str,
        user_text: &str,
        json_mode: bool,
    ) -> std::result::Result<String, (FailureKind, String)> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_text,
                },
            ],
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| (FailureKind::from_transport(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err((
                FailureKind::from_status(status),
                format!("Error code: {} - {}", status.as_u16(), error_text),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| (FailureKind::Fatal, format!("Malformed completion response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| (FailureKind::Fatal, "Empty completion response".to_string()))
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsClient {
    async fn structured_completion(&self, system_prompt: &str, user_text: &str) -> Value {
        for attempt in 0..self.retry.max_attempts {
            match self.send(system_prompt, user_text, true).await {
                Ok(content) => {
                    return parse_json_object(&content).unwrap_or_else(|e| {
                        error!("Model reply is not a JSON object: {}", e);
                        json!({ "error": e.to_string() })
                    });
                }
                Err((kind, message)) if kind.is_retryable() => {
                    warn!(
                        "Gateway {:?} (attempt {}/{}): {}",
                        kind,
                        attempt + 1,
                        self.retry.max_attempts,
                        message
                    );
                    if self.retry.should_retry(attempt) {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                }
                Err((_, message)) => {
                    error!("Gateway API error: {}", message);
                    return json!({ "error": format!("API Error: {}", message) });
                }
            }
        }

        json!({ "error": EXHAUSTED_MESSAGE })
    }

    async fn summarize(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        info!("Requesting summary from {}", self.model);
        self.send(system_prompt, user_text, false)
            .await
            .map_err(|(_, message)| {
                error!("Summary request failed: {}", message);
                OrchestrationError::LlmError(message)
            })
    }
}

/// Decode a model reply into a JSON object, tolerating ```json fences
pub fn parse_json_object(content: &str) -> Result<Value> {
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value: Value = serde_json::from_str(cleaned).map_err(|e| {
        OrchestrationError::LlmError(format!("Failed to parse model reply: {} | raw={}", e, content))
    })?;

    if !value.is_object() {
        return Err(OrchestrationError::LlmError(format!(
            "Expected a JSON object, got: {}",
            cleaned
        )));
    }
    Ok(value)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
