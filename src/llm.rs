//! Client for OpenAI-compatible `/chat/completions` endpoints.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A single chat-completion round trip.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat_completion(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
    ) -> Result<String>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (Mistral included).
pub struct LLMClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl LLMClient {
    pub fn new(api_base: String, api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .with_context(|| format!("Failed to build HTTP client for {}", api_base))?;

        Ok(Self {
            client,
            api_base,
            api_key,
        })
    }
}

#[async_trait]
impl ChatModel for LLMClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));

        let request_body = json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "stream": false,
        });

        tracing::debug!("Calling LLM API: {} with model: {}", url, model);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!(
                "LLM API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let v: serde_json::Value = response.json().await?;
        extract_completion_text(&v).ok_or_else(|| match detect_provider_error(&v) {
            Some(err_msg) => anyhow!(
                "LLM provider {} (model {}) returned error: {}",
                self.api_base,
                model,
                err_msg
            ),
            None => anyhow!("LLM response missing content field: {}", v),
        })
    }
}

/// Pulls the first choice's text out of a completion body. Providers differ
/// in whether `content` is a string or a list of parts.
fn extract_completion_text(v: &serde_json::Value) -> Option<String> {
    let first = v.get("choices").and_then(|c| c.get(0))?;

    if let Some(content) = first.get("message").and_then(|m| m.get("content")) {
        if let Some(s) = content.as_str() {
            return Some(s.to_string());
        }
        if let Some(parts) = content.as_array() {
            let mut out = String::new();
            for p in parts {
                if let Some(s) = p.as_str() {
                    out.push_str(s);
                } else if let Some(t) = p.get("text").and_then(|t| t.as_str()) {
                    out.push_str(t);
                }
            }
            if !out.is_empty() {
                return Some(out);
            }
        }
    }

    first
        .get("text")
        .and_then(|t| t.as_str())
        .map(str::to_string)
}

fn detect_provider_error(value: &serde_json::Value) -> Option<String> {
    if let Some(error_val) = value.get("error") {
        if let Some(obj) = error_val.as_object() {
            let message = ["message", "msg", "detail"]
                .iter()
                .filter_map(|key| obj.get(*key))
                .filter_map(json_value_to_string)
                .map(|s| s.trim().to_string())
                .find(|s| !s.is_empty());
            let code = ["code", "status", "type"]
                .iter()
                .filter_map(|key| obj.get(*key))
                .filter_map(json_value_to_string)
                .map(|s| s.trim().to_string())
                .find(|s| !s.is_empty());
            return Some(match (code, message) {
                (Some(code), Some(msg)) => format!("{}: {}", code, msg),
                (None, Some(msg)) => msg,
                _ => error_val.to_string(),
            });
        }
        if let Some(text) = json_value_to_string(error_val) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    // Mistral reports validation failures as {"object": "error", "message": ...}
    if value.get("object").and_then(|o| o.as_str()) == Some("error") {
        return Some(
            value
                .get("message")
                .and_then(json_value_to_string)
                .unwrap_or_else(|| value.to_string()),
        );
    }

    None
}

fn json_value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(json_value_to_string)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        serde_json::Value::Object(_) => Some(value.to_string()),
    }
}
