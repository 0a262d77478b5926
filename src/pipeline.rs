//! Per-message handling: command routing and the question-answering cycle.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::Instrument;
use uuid::Uuid;

use crate::answer::AnswerGenerator;
use crate::config::{Config, MessagesConfig};
use crate::context::ContextGatherer;
use crate::extractor::TextExtractor;
use crate::fetcher::HttpPageFetcher;
use crate::llm::LLMClient;

/// One text message from a user, as delivered by a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub user_id: i64,
    pub text: String,
}

/// Where replies for the current message go.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn reply(&self, text: &str) -> Result<()>;
}

/// Keeps replies in memory, in the order they were sent.
#[derive(Debug, Default)]
pub struct CollectingSink {
    replies: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn into_replies(self) -> Vec<String> {
        self.replies.into_inner().unwrap_or_default()
    }
}

#[async_trait]
impl ReplySink for CollectingSink {
    async fn reply(&self, text: &str) -> Result<()> {
        self.replies
            .lock()
            .map_err(|_| anyhow::anyhow!("reply buffer poisoned"))?
            .push(text.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Question(String),
}

impl Command {
    /// `/start` and `/help` (optionally addressed as `/help@botname`) are
    /// commands; anything else is a question.
    pub fn parse(text: &str) -> Self {
        let head = text.split_whitespace().next().unwrap_or("");
        let name = head.split('@').next().unwrap_or("");
        match name {
            "/start" => Command::Start,
            "/help" => Command::Help,
            _ => Command::Question(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Welcomed,
    Helped,
    NoContext,
    Answered(String),
}

pub struct RequestHandler {
    gatherer: ContextGatherer,
    generator: AnswerGenerator,
    messages: MessagesConfig,
}

impl RequestHandler {
    pub fn new(gatherer: ContextGatherer, generator: AnswerGenerator, messages: MessagesConfig) -> Self {
        Self {
            gatherer,
            generator,
            messages,
        }
    }

    /// Wires the HTTP fetcher, extractor and model client described by the
    /// config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = Arc::new(HttpPageFetcher::new(config.sources.fetch_timeout_secs)?);
        let mut gatherer = ContextGatherer::new(
            config.source_urls()?,
            fetcher,
            TextExtractor::new(config.sources.extraction),
            config.sources.max_context_chars,
        );
        if !config.sources.concurrent {
            gatherer = gatherer.sequential();
        }

        let llm = Arc::new(LLMClient::new(
            config.llm.api_base.clone(),
            config.llm.api_key.clone(),
            config.llm.timeout_secs,
        )?);
        let generator = AnswerGenerator::new(
            llm,
            config.llm.model.clone(),
            config.messages.system_prompt.clone(),
            config.messages.generation_failed.clone(),
        )
        .with_temperature(config.llm.temperature)
        .with_timeout_secs(config.llm.timeout_secs);

        Ok(Self::new(gatherer, generator, config.messages.clone()))
    }

    pub fn gatherer(&self) -> &ContextGatherer {
        &self.gatherer
    }

    pub async fn handle(&self, message: &InboundMessage, sink: &dyn ReplySink) -> Outcome {
        let span = tracing::info_span!(
            "message",
            request_id = %Uuid::new_v4(),
            user_id = message.user_id
        );
        self.dispatch(message, sink).instrument(span).await
    }

    async fn dispatch(&self, message: &InboundMessage, sink: &dyn ReplySink) -> Outcome {
        match Command::parse(&message.text) {
            Command::Start => {
                send(sink, &self.messages.welcome).await;
                tracing::info!("Sent welcome to user {}", message.user_id);
                Outcome::Welcomed
            }
            Command::Help => {
                send(sink, &self.messages.help).await;
                tracing::info!("Sent help to user {}", message.user_id);
                Outcome::Helped
            }
            Command::Question(question) => self.answer(message.user_id, &question, sink).await,
        }
    }

    /// Gathers context, then either reports that nothing could be gathered
    /// or acknowledges and relays the generated answer.
    pub async fn answer(&self, user_id: i64, question: &str, sink: &dyn ReplySink) -> Outcome {
        tracing::info!("Question from user {}: {}", user_id, question);

        let context = self.gatherer.gather().await;
        if context.is_empty() {
            send(sink, &self.messages.no_context).await;
            tracing::warn!("No context gathered for question: {}", question);
            return Outcome::NoContext;
        }

        send(sink, &self.messages.processing).await;
        let answer = self.generator.generate(question, &context).await;
        send(sink, &answer).await;
        Outcome::Answered(answer)
    }
}

async fn send(sink: &dyn ReplySink, text: &str) {
    if let Err(err) = sink.reply(text).await {
        tracing::error!(error = %err, "Failed to deliver reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(Command::parse("/help@ge74_bot"), Command::Help);
        assert_eq!(Command::parse("  /help  "), Command::Help);
        assert_eq!(
            Command::parse("/unknown thing"),
            Command::Question("/unknown thing".to_string())
        );
        assert_eq!(
            Command::parse("Когда вы работаете?"),
            Command::Question("Когда вы работаете?".to_string())
        );
        assert_eq!(Command::parse(""), Command::Question(String::new()));
    }

    #[tokio::test]
    async fn collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        sink.reply("one").await.unwrap();
        sink.reply("two").await.unwrap();
        assert_eq!(sink.replies(), vec!["one", "two"]);
        assert_eq!(sink.into_replies(), vec!["one", "two"]);
    }
}
