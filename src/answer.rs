//! One grounded answer per question: a system prompt plus the question and
//! context, sent to the chat model once, with a fixed fallback text on failure.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::llm::{ChatMessage, ChatModel};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("model call failed: {0:#}")]
    Provider(anyhow::Error),

    #[error("model call exceeded {0}s")]
    Timeout(u64),

    #[error("model returned an empty answer")]
    EmptyChoice,
}

/// Asks the model one question against the gathered context.
pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
    model_name: String,
    system_prompt: String,
    temperature: f32,
    timeout_secs: u64,
    fallback: String,
}

impl AnswerGenerator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        model_name: impl Into<String>,
        system_prompt: impl Into<String>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            system_prompt: system_prompt.into(),
            temperature: 0.0,
            timeout_secs: 60,
            fallback: fallback.into(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build_messages(&self, question: &str, context: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(format!("Вопрос: {}. Контекст: {}", question, context)),
        ]
    }

    /// Returns the model's answer, or the fallback text when the call fails.
    /// Exactly one model call is made.
    pub async fn generate(&self, question: &str, context: &str) -> String {
        match self.try_generate(question, context).await {
            Ok(answer) => {
                tracing::info!(model = %self.model_name, "Generated answer: {}", answer);
                answer
            }
            Err(err) => {
                tracing::error!(model = %self.model_name, error = %err, "Answer generation failed");
                self.fallback.clone()
            }
        }
    }

    pub async fn try_generate(&self, question: &str, context: &str) -> Result<String, GenerationError> {
        let messages = self.build_messages(question, context);
        let call = self
            .model
            .chat_completion(&self.model_name, messages, Some(self.temperature));

        let answer = timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout_secs))?
            .map_err(GenerationError::Provider)?;

        if answer.trim().is_empty() {
            return Err(GenerationError::EmptyChoice);
        }
        Ok(answer)
    }
}
