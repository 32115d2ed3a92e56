//! Scripted language model for development & testing
//! Keeps the orchestrator runnable without a gateway

use super::LanguageModel;
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCall {
    pub structured: bool,
    pub system_prompt: String,
    pub user_text: String,
}

/// Answers structured calls by matching a marker against the system prompt.
/// Summaries echo the user text unless a fixed summary or failure is set.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Vec<(String, Value)>,
    summary: Option<String>,
    summary_error: Option<String>,
    calls: Mutex<Vec<ModelCall>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `reply` when the system prompt contains `marker`
    pub fn reply_when(mut self, marker: &str, reply: Value) -> Self {
        self.replies.push((marker.to_string(), reply));
        self
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }

    pub fn failing_summary(mut self, message: &str) -> Self {
        self.summary_error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, structured: bool, system_prompt: &str, user_text: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ModelCall {
                structured,
                system_prompt: system_prompt.to_string(),
                user_text: user_text.to_string(),
            });
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn structured_completion(&self, system_prompt: &str, user_text: &str) -> Value {
        self.record(true, system_prompt, user_text);
        self.replies
            .iter()
            .find(|(marker, _)| system_prompt.contains(marker.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| json!({ "error": "no scripted reply" }))
    }

    async fn summarize(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        self.record(false, system_prompt, user_text);
        if let Some(message) = &self.summary_error {
            return Err(OrchestrationError::LlmError(message.clone()));
        }
        Ok(self.summary.clone().unwrap_or_else(|| user_text.to_string()))
    }
}
