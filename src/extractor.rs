//! HTML to plain text.
//!
//! Two policies are supported: paragraph-only, which keeps the text of every
//! `<p>` element, and whole-document, which keeps every visible text node.
//! Both collapse whitespace and join pieces with single spaces.

use scraper::{Html, Node, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Elements whose text is never shown to a reader.
const INVISIBLE: &[&str] = &["head", "script", "style", "noscript", "template"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionPolicy {
    #[default]
    Paragraphs,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no usable text found in the {0:?} extraction")]
    NoText(ExtractionPolicy),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor {
    policy: ExtractionPolicy,
}

impl TextExtractor {
    pub fn new(policy: ExtractionPolicy) -> Self {
        Self { policy }
    }

    /// Extracts plain text. The parser is lenient, so malformed markup still
    /// yields whatever text it contains; whitespace-only output is an error.
    pub fn extract(&self, html: &str) -> Result<String, ExtractError> {
        let document = Html::parse_document(html);
        let text = match self.policy {
            ExtractionPolicy::Paragraphs => paragraph_text(&document),
            ExtractionPolicy::Document => document_text(&document),
        };

        if text.trim().is_empty() {
            return Err(ExtractError::NoText(self.policy));
        }
        Ok(text)
    }
}

fn paragraph_text(document: &Html) -> String {
    let selector = match Selector::parse("p") {
        Ok(selector) => selector,
        Err(_) => return String::new(),
    };

    document
        .select(&selector)
        .map(|p| clean_text(&p.text().collect::<String>()))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn document_text(document: &Html) -> String {
    let mut pieces = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| INVISIBLE.contains(&el.name()))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }
        let cleaned = clean_text(text);
        if !cleaned.is_empty() {
            pieces.push(cleaned);
        }
    }

    pieces.join(" ")
}

/// Normalize whitespace runs to single spaces.
fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <!DOCTYPE html>
        <html>
        <head>
            <title>Title text</title>
            <style>p { color: red; }</style>
        </head>
        <body>
            <nav>Menu</nav>
            <p>  First
               paragraph </p>
            <div>Loose <b>bold</b>text</div>
            <p></p>
            <p>Second <a href="/x">link</a> paragraph</p>
            <script>var hidden = "secret";</script>
        </body>
        </html>
    "#;

    #[test]
    fn paragraphs_policy_keeps_only_paragraph_text() {
        let text = TextExtractor::new(ExtractionPolicy::Paragraphs)
            .extract(PAGE)
            .unwrap();
        assert_eq!(text, "First paragraph Second link paragraph");
    }

    #[test]
    fn paragraphs_policy_joins_adjacent_paragraphs() {
        let text = TextExtractor::default()
            .extract("<p>Hello</p><p>World</p>")
            .unwrap();
        assert_eq!(text, "Hello World");
    }

    #[test]
    fn document_policy_keeps_visible_text_in_order() {
        let text = TextExtractor::new(ExtractionPolicy::Document)
            .extract(PAGE)
            .unwrap();
        assert_eq!(
            text,
            "Menu First paragraph Loose bold text Second link paragraph"
        );
        assert!(!text.contains("secret"));
        assert!(!text.contains("color"));
        assert!(!text.contains("Title text"));
    }

    #[test]
    fn page_without_paragraphs_is_an_error() {
        let err = TextExtractor::new(ExtractionPolicy::Paragraphs)
            .extract("<html><body><div>only a div</div></body></html>")
            .unwrap_err();
        assert_eq!(err, ExtractError::NoText(ExtractionPolicy::Paragraphs));
    }

    #[test]
    fn whitespace_only_document_is_an_error() {
        let result = TextExtractor::new(ExtractionPolicy::Document)
            .extract("<html><body>  \n\t <p>   </p><script>x()</script></body></html>");
        assert_eq!(result, Err(ExtractError::NoText(ExtractionPolicy::Document)));
    }

    #[test]
    fn malformed_markup_still_yields_text() {
        let text = TextExtractor::default()
            .extract("<p>unclosed <b>tags<p>next")
            .unwrap();
        assert_eq!(text, "unclosed tags next");
    }

    #[test]
    fn policy_parses_from_lowercase_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            extraction: ExtractionPolicy,
        }
        let w: Wrapper = toml::from_str(r#"extraction = "document""#).unwrap();
        assert_eq!(w.extraction, ExtractionPolicy::Document);
    }
}
