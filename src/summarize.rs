// src/summarize.rs
//! Summaries for newly confirmed cross-source stories.
//!
//! Summarizing is enrichment only: any failure degrades to the first title,
//! and the match is persisted regardless.

use anyhow::{bail, Result};
use async_trait::async_trait;
use metrics::counter;

use crate::ai::{sanitize_text, DynChatClient};

const SUMMARY_MAX_CHARS: usize = 400;

const SUMMARY_SYSTEM_PROMPT: &str = "You are an expert at writing concise, informative summaries of tech news stories. Given two headlines about the same story from different sources, write a single unified summary that captures the key facts and significance, is 2-3 sentences maximum, is neutral and factual, and focuses on what matters to tech professionals. Return ONLY the summary text, no preamble.";

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, title_a: &str, title_b: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Never produces a summary; callers fall back to the first title.
#[derive(Debug, Default, Clone, Copy)]
pub struct TitleOnlySummarizer;

#[async_trait]
impl Summarizer for TitleOnlySummarizer {
    async fn summarize(&self, _title_a: &str, _title_b: &str) -> Result<String> {
        bail!("summaries disabled")
    }
    fn name(&self) -> &'static str {
        "title-only"
    }
}

/// Summaries from a chat model.
pub struct ChatSummarizer {
    client: DynChatClient,
}

impl ChatSummarizer {
    pub fn new(client: DynChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, title_a: &str, title_b: &str) -> Result<String> {
        let user = format!(
            "Generate a summary for this tech story that appeared on two sites:\n\n\
             First headline: \"{}\"\nSecond headline: \"{}\"\n\nSummary:",
            sanitize_text(title_a, 300),
            sanitize_text(title_b, 300)
        );
        let text = self.client.complete(SUMMARY_SYSTEM_PROMPT, &user).await?;
        Ok(sanitize_text(&text, SUMMARY_MAX_CHARS))
    }
    fn name(&self) -> &'static str {
        "chat"
    }
}

/// Summary for a confirmed pair, or `title_a` when summarizing fails or
/// comes back empty.
pub async fn summarize_or_fallback(summarizer: &dyn Summarizer, title_a: &str, title_b: &str) -> String {
    match summarizer.summarize(title_a, title_b).await {
        Ok(s) if !s.trim().is_empty() => s,
        Ok(_) => {
            tracing::warn!(target: "engine", summarizer = summarizer.name(), "empty summary, using title");
            counter!("engine_summary_fallbacks_total").increment(1);
            title_a.to_string()
        }
        Err(e) => {
            tracing::debug!(target: "engine", error = ?e, summarizer = summarizer.name(), "summary unavailable, using title");
            counter!("engine_summary_fallbacks_total").increment(1);
            title_a.to_string()
        }
    }
}
