// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::headline::Headline;
use crate::ingest::types::SourceProvider;
use crate::merge::SourceBatch;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const TITLE_MAX_CHARS: usize = 300;

/// One-time metrics registration so series carry descriptions for any recorder.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_headlines_total", "Headlines parsed from providers.");
        describe_counter!(
            "ingest_dropped_total",
            "Headlines dropped for an empty title or url."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_histogram!("ingest_parse_ms", "Provider parse time in milliseconds.");
        describe_counter!(
            "engine_pairs_compared_total",
            "Cross-source pairs evaluated by the matcher."
        );
        describe_counter!("engine_new_matches_total", "Stories confirmed for the first time.");
        describe_counter!(
            "engine_summary_fallbacks_total",
            "Summaries replaced by the first headline's title."
        );
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the pipeline last ran.");
    });
}

/// HTTP client shared by the collectors of one process.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(15))
        .build()
        .context("building collector http client")
}

/// Normalize a title: decode entities, strip tags, fold typographic quotes,
/// collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > TITLE_MAX_CHARS {
        out = out.chars().take(TITLE_MAX_CHARS).collect();
    }
    out
}

/// Normalizes titles and URLs in place and drops what is left malformed.
/// Returns the kept headlines and the number dropped.
pub fn sanitize_headlines(raw: Vec<Headline>) -> (Vec<Headline>, usize) {
    let before = raw.len();
    let kept: Vec<Headline> = raw
        .into_iter()
        .map(|mut h| {
            h.title = normalize_text(&h.title);
            h.url = h.url.trim().to_string();
            h
        })
        .filter(Headline::is_well_formed)
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Runs every provider concurrently and waits for all of them. A failing
/// provider contributes an empty batch.
pub async fn collect_all(providers: &[Box<dyn SourceProvider>]) -> Vec<SourceBatch> {
    ensure_metrics_described();

    let results = join_all(providers.iter().map(|p| p.fetch_latest())).await;

    providers
        .iter()
        .zip(results)
        .map(|(p, res)| {
            let raw = res.unwrap_or_else(|e| {
                tracing::warn!(target: "ingest", error = ?e, provider = p.name(), "provider error");
                counter!("ingest_provider_errors_total").increment(1);
                Vec::new()
            });
            let (kept, dropped) = sanitize_headlines(raw);
            if dropped > 0 {
                tracing::debug!(target: "ingest", provider = p.name(), dropped, "malformed headlines dropped");
                counter!("ingest_dropped_total").increment(dropped as u64);
            }
            tracing::info!(target: "ingest", source = %p.source(), kept = kept.len(), "collected");
            SourceBatch::new(p.source(), kept)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headline::Source;
    use anyhow::bail;
    use chrono::Utc;

    #[test]
    fn normalize_text_decodes_and_collapses() {
        let s = "  Apple&nbsp;&amp; <b>Google</b>\n  settle \u{201C}search\u{201D} case?  ";
        assert_eq!(normalize_text(s), "Apple & Google settle \"search\" case?");
    }

    #[test]
    fn sanitize_drops_blank_titles_and_urls() {
        let now = Utc::now();
        let raw = vec![
            Headline::new(Source::Techmeme, " <i></i> ", "https://x.test/1", now),
            Headline::new(Source::Techmeme, "Real title", "  https://x.test/2 ", now),
            Headline::new(Source::Techmeme, "No link", "", now),
        ];
        let (kept, dropped) = sanitize_headlines(raw);
        assert_eq!(dropped, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "https://x.test/2");
    }

    struct Fixed(Source, Vec<&'static str>);
    struct Broken;

    #[async_trait::async_trait]
    impl SourceProvider for Fixed {
        async fn fetch_latest(&self) -> Result<Vec<Headline>> {
            Ok(self
                .1
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    Headline::new(self.0.clone(), *t, format!("https://f.test/{i}"), Utc::now())
                })
                .collect())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn source(&self) -> Source {
            self.0.clone()
        }
    }

    #[async_trait::async_trait]
    impl SourceProvider for Broken {
        async fn fetch_latest(&self) -> Result<Vec<Headline>> {
            bail!("connection refused")
        }
        fn name(&self) -> &'static str {
            "broken"
        }
        fn source(&self) -> Source {
            Source::NineToFiveMac
        }
    }

    #[tokio::test]
    async fn failing_provider_degrades_to_empty_batch() {
        let providers: Vec<Box<dyn SourceProvider>> = vec![
            Box::new(Fixed(Source::Techmeme, vec!["One headline", "Two headline"])),
            Box::new(Broken),
            Box::new(Fixed(Source::HackerNews, vec!["Three headline"])),
        ];
        let batches = collect_all(&providers).await;
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].headlines.len(), 2);
        assert_eq!(batches[1].source, Source::NineToFiveMac);
        assert!(batches[1].headlines.is_empty());
        assert_eq!(batches[2].headlines[0].title, "Three headline");
    }
}
