pub mod answer;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod llm;
pub mod pipeline;
pub mod server;
pub mod telegram;
pub mod telemetry;

pub use answer::AnswerGenerator;
pub use config::Config;
pub use context::{ContextGatherer, PageOutcome};
pub use extractor::{ExtractionPolicy, TextExtractor};
pub use fetcher::{HttpPageFetcher, PageFetcher};
pub use llm::{ChatMessage, ChatModel, LLMClient};
pub use pipeline::{InboundMessage, Outcome, ReplySink, RequestHandler};
