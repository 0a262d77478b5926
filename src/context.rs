//! Builds the grounding context from the configured source pages.

use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::extractor::{ExtractError, TextExtractor};
use crate::fetcher::{FetchError, PageFetcher};

#[derive(Debug, Error)]
pub enum PageFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{url}: {source}")]
    Extract {
        url: String,
        #[source]
        source: ExtractError,
    },
}

/// What a single source contributed to one request.
#[derive(Debug)]
pub enum PageOutcome {
    Extracted(String),
    Failed(PageFailure),
}

impl PageOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            PageOutcome::Extracted(text) => Some(text),
            PageOutcome::Failed(_) => None,
        }
    }
}

pub struct ContextGatherer {
    urls: Arc<[Url]>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: TextExtractor,
    max_chars: usize,
    concurrent: bool,
}

impl ContextGatherer {
    pub fn new(
        urls: Vec<Url>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: TextExtractor,
        max_chars: usize,
    ) -> Self {
        Self {
            urls: urls.into(),
            fetcher,
            extractor,
            max_chars,
            concurrent: true,
        }
    }

    /// Fetch one page at a time instead of all at once.
    pub fn sequential(mut self) -> Self {
        self.concurrent = false;
        self
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    /// Joins the text of every source that succeeded, in configured order.
    /// An empty string means no source produced usable text.
    pub async fn gather(&self) -> String {
        let outcomes = self.gather_pages().await;
        let total = outcomes.len();

        let parts: Vec<&str> = outcomes.iter().filter_map(PageOutcome::text).collect();
        tracing::info!("Gathered text from {} of {} sources", parts.len(), total);

        let joined = parts.join(" ");
        truncate_context(joined, self.max_chars)
    }

    /// Per-source outcomes, in the same order as the configured URLs.
    pub async fn gather_pages(&self) -> Vec<PageOutcome> {
        if self.concurrent {
            join_all(self.urls.iter().map(|url| self.process(url))).await
        } else {
            let mut outcomes = Vec::with_capacity(self.urls.len());
            for url in self.urls.iter() {
                outcomes.push(self.process(url).await);
            }
            outcomes
        }
    }

    async fn process(&self, url: &Url) -> PageOutcome {
        let html = match self.fetcher.fetch(url).await {
            Ok(html) => html,
            Err(err) => {
                tracing::error!(url = %url, error = %err, "Failed to fetch source page");
                return PageOutcome::Failed(err.into());
            }
        };

        match self.extractor.extract(&html) {
            Ok(text) => {
                tracing::debug!(url = %url, chars = text.chars().count(), "Extracted page text");
                PageOutcome::Extracted(text)
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "No usable text on source page");
                PageOutcome::Failed(PageFailure::Extract {
                    url: url.to_string(),
                    source: err,
                })
            }
        }
    }
}

/// Caps the context at `max_chars` characters, cutting at the last word
/// boundary when there is one.
fn truncate_context(text: String, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }

    let byte_end = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let head = &text[..byte_end];
    let cut = match head.rfind(' ') {
        Some(space) if space > 0 => &head[..space],
        _ => head,
    };

    tracing::warn!(
        "Context of {} chars exceeds the {} char limit, truncating",
        total,
        max_chars
    );
    cut.to_string()
}
