// src/ingest/providers/ninetofive_mac.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::events::Event;
use quick_xml::Reader;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::headline::{Headline, Source};
use crate::ingest::normalize_text;
use crate::ingest::types::SourceProvider;

pub const FEED_URL: &str = "https://9to5mac.com/feed/";

/// Raw fields of one `<item>`.
#[derive(Debug, Default)]
struct Item {
    title: String,
    link: String,
    pub_date: String,
    creator: String,
    comments: String,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Link,
    PubDate,
    Creator,
    Comments,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"pubDate" => Some(Field::PubDate),
            b"creator" => Some(Field::Creator),
            b"comments" => Some(Field::Comments),
            _ => None,
        }
    }
}

impl Item {
    fn push(&mut self, field: Field, text: &str) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::PubDate => &mut self.pub_date,
            Field::Creator => &mut self.creator,
            Field::Comments => &mut self.comments,
        };
        slot.push_str(text);
    }
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let odt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
}

/// Reads `<item>` elements by local name, so `dc:creator` and
/// `slash:comments` match regardless of prefix.
fn read_items(xml: &str) -> Result<Vec<Item>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<Item> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("parsing 9to5mac rss xml at byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                let name = e.local_name();
                if name.as_ref() == b"item" {
                    current = Some(Item::default());
                } else if current.is_some() {
                    field = Field::from_local_name(name.as_ref());
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"item" {
                    items.extend(current.take());
                }
                field = None;
            }
            Event::Text(t) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    let raw = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    item.push(f, &html_escape::decode_html_entities(&raw));
                }
            }
            Event::CData(c) => {
                if let (Some(item), Some(f)) = (current.as_mut(), field) {
                    item.push(f, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(items)
}

pub struct NineToFiveMacProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl NineToFiveMacProvider {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                url: FEED_URL.to_string(),
                client,
            },
        }
    }

    fn parse_items_from_str(s: &str) -> Result<Vec<Headline>> {
        let t0 = std::time::Instant::now();
        let fetched_at = Utc::now();

        let mut out = Vec::new();
        for it in read_items(s)? {
            if it.creator.to_lowercase().contains("sponsored") {
                continue;
            }
            let title = normalize_text(&it.title);
            let link = it.link.trim();
            if title.is_empty() || link.is_empty() {
                continue;
            }
            let timestamp = parse_rfc2822(&it.pub_date).unwrap_or_else(|| {
                tracing::debug!(target: "ingest", pub_date = %it.pub_date, "unparsable pubDate, using fetch time");
                fetched_at
            });
            let comments: i64 = it.comments.trim().parse().unwrap_or(0);

            let mut h = Headline::new(Source::NineToFiveMac, title, link, timestamp)
                .with_popularity(comments);
            h.comment_count = Some(comments);
            out.push(h);
        }

        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_headlines_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for NineToFiveMacProvider {
    async fn fetch_latest(&self) -> Result<Vec<Headline>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .context("9to5mac http get()")?
                    .error_for_status()
                    .context("9to5mac http status")?
                    .text()
                    .await
                    .context("9to5mac http .text()")?;
                Self::parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "9to5Mac"
    }

    fn source(&self) -> Source {
        Source::NineToFiveMac
    }
}
