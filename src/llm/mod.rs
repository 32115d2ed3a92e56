//! Language model gateway
//!
//! Two call shapes: a JSON-constrained completion used for routing, filter
//! generation and reporting plans, and a free-text completion used for the
//! final summary. Only the structured path retries.

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

pub mod client;
pub mod mock;
pub mod retry;

pub use client::ChatCompletionsClient;
pub use mock::ScriptedModel;
pub use retry::{FailureKind, RetryPolicy};

/// Returned as `{"error": ...}` once every retry has failed
pub const EXHAUSTED_MESSAGE: &str =
    "Failed to reach the LLM proxy after multiple attempts. Please check your internet or proxy status.";

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Always yields a JSON object. Failures are reported in-band as
    /// `{"error": "..."}` instead of an `Err`.
    async fn structured_completion(&self, system_prompt: &str, user_text: &str) -> Value;

    /// Single free-text completion; transport and API errors propagate
    async fn summarize(&self, system_prompt: &str, user_text: &str) -> Result<String>;
}

/// The `error` field of a structured reply, if present
pub fn error_message(reply: &Value) -> Option<&str> {
    reply.get("error").and_then(Value::as_str)
}
