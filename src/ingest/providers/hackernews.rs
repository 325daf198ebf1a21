// src/ingest/providers/hackernews.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::headline::{Headline, Source};
use crate::ingest::types::SourceProvider;

const API_BASE: &str = "https://hacker-news.firebaseio.com/v0";
const DISCUSSION_BASE: &str = "https://news.ycombinator.com/item?id=";
pub const TOP_STORIES: usize = 30;

#[derive(Debug, Deserialize)]
struct Item {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    descendants: Option<i64>,
}

pub struct HackerNewsProvider {
    mode: Mode,
}

enum Mode {
    /// JSON array of item objects, already in rank order.
    Fixture(String),
    Http { client: reqwest::Client },
}

impl HackerNewsProvider {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http { client },
        }
    }

    fn parse_items_from_str(s: &str) -> Result<Vec<Headline>> {
        let items: Vec<Option<Item>> = serde_json::from_str(s).context("parsing hn items json")?;
        Ok(Self::headlines_from_items(items.into_iter().flatten()))
    }

    fn headlines_from_items(items: impl IntoIterator<Item = Item>) -> Vec<Headline> {
        let t0 = std::time::Instant::now();
        let out: Vec<Headline> = items
            .into_iter()
            .take(TOP_STORIES)
            .filter_map(to_headline)
            .collect();
        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_headlines_total").increment(out.len() as u64);
        out
    }

    async fn fetch_http(client: &reqwest::Client) -> Result<Vec<Headline>> {
        let ids: Vec<u64> = client
            .get(format!("{API_BASE}/topstories.json"))
            .send()
            .await
            .context("hn topstories get()")?
            .error_for_status()
            .context("hn topstories status")?
            .json()
            .await
            .context("hn topstories json")?;

        let fetches = ids.into_iter().take(TOP_STORIES).map(|id| async move {
            let res = client
                .get(format!("{API_BASE}/item/{id}.json"))
                .send()
                .await
                .and_then(|r| r.error_for_status());
            match res {
                Ok(r) => r.json::<Option<Item>>().await.ok().flatten(),
                Err(e) => {
                    tracing::debug!(target: "ingest", error = ?e, id, "hn item fetch failed");
                    None
                }
            }
        });
        let items = join_all(fetches).await.into_iter().flatten();
        Ok(Self::headlines_from_items(items))
    }
}

fn to_headline(item: Item) -> Option<Headline> {
    let title = item.title.filter(|t| !t.trim().is_empty())?;
    let discussion = format!("{DISCUSSION_BASE}{}", item.id);
    let url = item
        .url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| discussion.clone());
    let timestamp = DateTime::<Utc>::from_timestamp(item.time, 0).unwrap_or_else(Utc::now);
    let comments = item.descendants.unwrap_or(0);

    let mut h = Headline::new(Source::HackerNews, title, url, timestamp).with_popularity(item.score);
    h.points = Some(item.score);
    h.comment_count = Some(comments);
    h.discussion_url = Some(discussion);
    Some(h)
}

#[async_trait]
impl SourceProvider for HackerNewsProvider {
    async fn fetch_latest(&self) -> Result<Vec<Headline>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s),
            Mode::Http { client } => Self::fetch_http(client).await,
        }
    }

    fn name(&self) -> &'static str {
        "HackerNews"
    }

    fn source(&self) -> Source {
        Source::HackerNews
    }
}
