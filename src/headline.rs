// src/headline.rs
//! Common data model shared by collectors, the matching core and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// News source a headline was observed on. Open set: unknown names survive
/// as `Other` so stored data from newer collectors still loads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
    Techmeme,
    HackerNews,
    NineToFiveMac,
    Other(String),
}

impl Source {
    /// Stable lowercase identifier used in config files and the store.
    pub fn as_str(&self) -> &str {
        match self {
            Source::Techmeme => "techmeme",
            Source::HackerNews => "hackernews",
            Source::NineToFiveMac => "9to5mac",
            Source::Other(s) => s.as_str(),
        }
    }

    /// Human-facing label.
    pub fn display_name(&self) -> &str {
        match self {
            Source::Techmeme => "Techmeme",
            Source::HackerNews => "Hacker News",
            Source::NineToFiveMac => "9to5Mac",
            Source::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        let norm = s.trim().to_ascii_lowercase();
        match norm.as_str() {
            "techmeme" => Source::Techmeme,
            "hackernews" | "hacker news" | "hn" => Source::HackerNews,
            "9to5mac" | "ninetofivemac" => Source::NineToFiveMac,
            _ => Source::Other(norm),
        }
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Source::parse(&s)
    }
}

impl From<Source> for String {
    fn from(s: Source) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One article as reported by one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub url: String,
    pub source: Source,
    pub timestamp: DateTime<Utc>,
    /// Source-specific ranking signal (page position, points, comments).
    #[serde(default)]
    pub popularity: i64,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub comment_count: Option<i64>,
    #[serde(default)]
    pub discussion_url: Option<String>,
}

impl Headline {
    pub fn new(
        source: Source,
        title: impl Into<String>,
        url: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            source,
            timestamp,
            popularity: 0,
            points: None,
            comment_count: None,
            discussion_url: None,
        }
    }

    pub fn with_popularity(mut self, popularity: i64) -> Self {
        self.popularity = popularity;
        self
    }

    /// Headlines with an empty title or URL never reach the matcher.
    pub fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty() && !self.url.trim().is_empty()
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.title, &self.url)
    }

    /// Identity of this headline within its source.
    pub fn key(&self) -> HeadlineKey {
        HeadlineKey {
            source: self.source.clone(),
            hash: self.content_hash(),
        }
    }
}

/// `(source, hash(title, url))`, the storage uniqueness key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeadlineKey {
    pub source: Source,
    pub hash: String,
}

/// SHA-256 over `title` and `url` (hex, first 16 bytes).
pub fn content_hash(title: &str, url: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeadlineId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryId(pub u64);

impl fmt::Display for HeadlineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// A headline as persisted, with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredHeadline {
    pub id: HeadlineId,
    pub content_hash: String,
    #[serde(flatten)]
    pub headline: Headline,
}

/// A confirmed equivalence between headlines from distinct sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossPlatformStory {
    pub id: StoryId,
    /// Sorted, duplicate-free; the story's identity.
    pub headline_ids: Vec<HeadlineId>,
    pub matched_at: DateTime<Utc>,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Unordered identity of a set of headlines: sorted and deduplicated.
pub fn identity_set(ids: &[HeadlineId]) -> Vec<HeadlineId> {
    let mut v = ids.to_vec();
    v.sort();
    v.dedup();
    v
}

/// `(source, url)` pair shown for a merged line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLink {
    pub source: Source,
    pub url: String,
}

/// One line of the ranked output. Built fresh on every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedHeadline {
    pub title: String,
    pub urls: Vec<SourceLink>,
    pub in_multiple_sources: bool,
    pub popularity: i64,
    pub timestamp: DateTime<Utc>,
    /// Contributing headlines, in the same order as `urls`.
    pub headlines: Vec<Headline>,
}

impl MergedHeadline {
    pub fn single(h: Headline) -> Self {
        Self {
            title: h.title.clone(),
            urls: vec![SourceLink {
                source: h.source.clone(),
                url: h.url.clone(),
            }],
            in_multiple_sources: false,
            popularity: h.popularity,
            timestamp: h.timestamp,
            headlines: vec![h],
        }
    }

    /// Title from the first headline, popularity summed, earliest sighting wins.
    pub fn group(members: Vec<Headline>) -> Option<Self> {
        let first = members.first()?;
        let title = first.title.clone();
        let urls = members
            .iter()
            .map(|h| SourceLink {
                source: h.source.clone(),
                url: h.url.clone(),
            })
            .collect::<Vec<_>>();
        let mut distinct: Vec<&Source> = members.iter().map(|h| &h.source).collect();
        distinct.sort();
        distinct.dedup();
        let popularity = members.iter().map(|h| h.popularity).sum();
        let timestamp = members.iter().map(|h| h.timestamp).min()?;
        Some(Self {
            title,
            urls,
            in_multiple_sources: distinct.len() >= 2,
            popularity,
            timestamp,
            headlines: members,
        })
    }

    /// First contributing headline from `source`, if any.
    pub fn from_source(&self, source: &Source) -> Option<&Headline> {
        self.headlines.iter().find(|h| &h.source == source)
    }
}
