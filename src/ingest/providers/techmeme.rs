// src/ingest/providers/techmeme.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::headline::{Headline, Source};
use crate::ingest::normalize_text;
use crate::ingest::types::SourceProvider;

pub const FRONT_PAGE: &str = "https://www.techmeme.com/";
const MIN_TITLE_CHARS: usize = 10;

// Story blocks: any element whose class list contains `ii`.
static RE_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<div[^>]*\bclass\s*=\s*"(?:[^"]*\s)?ii(?:\s[^"]*)?"[^>]*>(.*?)</div>"#)
        .unwrap()
});
static RE_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*\bhref\s*=\s*"([^"]*)"[^>]*>(.*?)</a>"#).unwrap()
});

pub struct TechmemeProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl TechmemeProvider {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                url: FRONT_PAGE.to_string(),
                client,
            },
        }
    }

    /// Headlines in page order; popularity is the position among kept
    /// headlines (0 is the top story). Every headline gets `scraped_at`.
    pub fn parse_page(html: &str, scraped_at: DateTime<Utc>) -> Vec<Headline> {
        let t0 = std::time::Instant::now();
        let base = url::Url::parse(FRONT_PAGE).ok();

        let mut out: Vec<Headline> = Vec::new();
        for block in RE_ITEM.captures_iter(html) {
            for a in RE_ANCHOR.captures_iter(&block[1]) {
                let href = html_escape::decode_html_entities(a[1].trim()).to_string();
                let title = normalize_text(&a[2]);
                if !is_story_link(&title, &href) {
                    continue;
                }
                let Some(url) = absolutize(base.as_ref(), &href) else {
                    continue;
                };
                let pos = out.len() as i64;
                out.push(Headline::new(Source::Techmeme, title, url, scraped_at).with_popularity(pos));
            }
        }

        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_headlines_total").increment(out.len() as u64);
        out
    }
}

/// Navigation text, in-page anchors, sponsored redirects and short labels
/// are not stories.
fn is_story_link(title: &str, href: &str) -> bool {
    !title.is_empty()
        && !href.is_empty()
        && title != "Find"
        && !href.starts_with('#')
        && !href.contains("/r2/")
        && title.chars().count() > MIN_TITLE_CHARS
}

fn absolutize(base: Option<&url::Url>, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    base?.join(href).ok().map(|u| u.to_string())
}

#[async_trait]
impl SourceProvider for TechmemeProvider {
    async fn fetch_latest(&self) -> Result<Vec<Headline>> {
        match &self.mode {
            Mode::Fixture(s) => Ok(Self::parse_page(s, Utc::now())),
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .context("techmeme http get()")?
                    .error_for_status()
                    .context("techmeme http status")?
                    .text()
                    .await
                    .context("techmeme http .text()")?;
                Ok(Self::parse_page(&body, Utc::now()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "Techmeme"
    }

    fn source(&self) -> Source {
        Source::Techmeme
    }
}
